use std::{net::SocketAddr, sync::Arc, time::Duration};

use app_metrics::ServiceCounters;
use axum::{Router, routing::get};
use tokio_util::sync::CancellationToken;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info};
use user_core::{CoreConfig, UserCore};
use user_http::UserServices;
use user_relay::{Executor, RelayConfig};
use utoipa::OpenApi;
use utoipa_rapidoc::RapiDoc;

mod backends;
mod ops;

use ops::{OpsState, ops_routes};

const DEFAULT_HTTP_PORT: u16 = 8082;
const WORKER_BACKOFF: Duration = Duration::from_millis(250);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let _log_guard = app_metrics::init_tracing("user-backend");

    let core_config = CoreConfig::from_env();
    let relay_config = RelayConfig::from_env();
    info!(
        timeout_ms = core_config.timeout.as_millis() as u64,
        instance = %relay_config.instance_id,
        "Initializing backends..."
    );

    let backends = backends::from_env(
        core_config.store_pool_size,
        relay_config.queue_config(),
    )
    .await?;

    let counters = Arc::new(ServiceCounters::new());
    let cancel = CancellationToken::new();

    let core = UserCore::new(
        backends.store,
        core_config,
        cancel.clone(),
        counters.clone(),
    );
    let user_services =
        UserServices::new(core, backends.cache.clone(), counters.clone());

    let executor = Executor::new(
        backends.queue.clone(),
        relay_config.topics.clone(),
        user_services.get_user.clone(),
        user_services.list_users.clone(),
        counters.clone(),
    )
    .spawn(
        &relay_config.consumer("executor"),
        cancel.clone(),
        WORKER_BACKOFF,
    )
    .await?;
    info!("Relay executor started");

    let ops = OpsState {
        counters,
        sql: backends.sql,
    };

    let app = Router::new()
        .merge(ops_routes(ops))
        .merge(user_http::routes(user_services))
        .merge(RapiDoc::new("/api-docs/openapi.json").path("/docs"))
        .route(
            "/api-docs/openapi.json",
            get(|| async { axum::Json(ApiDoc::openapi()) }),
        )
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let port = std::env::var("HTTP_PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_HTTP_PORT);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("User backend starting on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let shutdown = cancel.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", e);
            }
            info!("Shutdown requested");
            shutdown.cancel();
        })
        .await?;

    cancel.cancel();
    if let Err(e) = executor.await {
        error!("Relay executor panicked: {}", e);
    }
    info!("User backend stopped");

    Ok(())
}

#[derive(OpenApi)]
#[openapi(
    paths(
        ops::health_check,
        ops::metrics,
        user_http::create_user,
        user_http::update_user,
        user_http::delete_user,
        user_http::get_user,
        user_http::list_users,
        user_http::add_users
    ),
    components(
        schemas(
            user_models::UserView,
            user_models::Role,
            user_http::ListUsersParams,
            user_commands::CreateUserCommand,
            user_commands::UpdateUserCommand,
            user_commands::DeleteUserCommand,
            user_commands::AddUsersCommand,
            user_responses::CreatedUserResponse,
            user_responses::AddedUsersResponse,
            app_metrics::CountersSnapshot,
            common_errors::ApiErrorResponse,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "users", description = "User management endpoints")
    ),
    info(
        title = "User Service API",
        description = "User management backend with read-through caching",
        version = "1.0.0"
    )
)]
struct ApiDoc;
