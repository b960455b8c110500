use std::{net::SocketAddr, sync::Arc};

use anyhow::Result;
use app_metrics::ServiceCounters;
use axum::{Router, routing::get};
use clap::Parser;
use message_queue::{MemoryQueue, MessageQueue, RedisStreamQueue};
use redis_connection::{config::RedisDbConfig, connect_redis_db};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, warn};
use user_http::RelayServices;
use user_queries::GetUserQuery;
use user_relay::{Forwarder, RelayClient, RelayConfig};
use utoipa::OpenApi;
use utoipa_rapidoc::RapiDoc;

mod cli;

use cli::{Cli, Commands};

async fn queue_from_env(config: &RelayConfig) -> Result<Arc<dyn MessageQueue>> {
    let in_memory = std::env::var("QUEUE_BACKEND")
        .is_ok_and(|v| v.eq_ignore_ascii_case("memory"));

    if in_memory {
        warn!("using in-process queue; only this process can answer requests");
        return Ok(Arc::new(MemoryQueue::new(config.queue_config())));
    }

    let pool = connect_redis_db(&RedisDbConfig::from_env()).await?;
    Ok(Arc::new(RedisStreamQueue::new(pool, config.queue_config())))
}

async fn shutdown_signal(cancel: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }
    info!("Shutdown requested");
    cancel.cancel();
}

/// Stops the response router, then drops its group so one-shot runs leave
/// nothing behind on the stream.
async fn close_client(
    client: &RelayClient, router: JoinHandle<()>, cancel: &CancellationToken,
) {
    cancel.cancel();
    if let Err(e) = router.await {
        error!("router task panicked: {}", e);
    }
    if let Err(e) = client.release().await {
        warn!("Failed to release response group: {}", e);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let _log_guard = app_metrics::init_tracing("ui-gateway");

    let config = RelayConfig::from_env();
    let queue = queue_from_env(&config).await?;
    let counters = Arc::new(ServiceCounters::new());
    let cancel = CancellationToken::new();
    let consumer = config.consumer("forwarder");

    match cli.command {
        Commands::Serve { port } => {
            let forwarder = Forwarder::new(
                queue.clone(),
                config.topics.clone(),
                counters.clone(),
            )
            .spawn(&consumer, cancel.clone(), config.poll_interval)
            .await?;
            let (client, router) = RelayClient::start(
                queue,
                config,
                counters.clone(),
                cancel.clone(),
            )
            .await?;

            let app = Router::new()
                .merge(user_http::relay_routes(RelayServices {
                    client: client.clone(),
                    counters,
                }))
                .merge(RapiDoc::new("/api-docs/openapi.json").path("/docs"))
                .route(
                    "/api-docs/openapi.json",
                    get(|| async { axum::Json(ApiDoc::openapi()) }),
                )
                .layer(CorsLayer::permissive())
                .layer(TraceLayer::new_for_http());

            let addr = SocketAddr::from(([0, 0, 0, 0], port));
            info!("UI gateway starting on {}", addr);

            let listener = tokio::net::TcpListener::bind(addr).await?;
            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown_signal(cancel.clone()))
                .await?;

            close_client(&client, router, &cancel).await;
            if let Err(e) = forwarder.await {
                error!("forwarder task panicked: {}", e);
            }
        },
        Commands::Forward => {
            let forwarder = Forwarder::new(queue, config.topics.clone(), counters)
                .spawn(&consumer, cancel.clone(), config.poll_interval)
                .await?;
            info!("Forwarder running");

            shutdown_signal(cancel).await;
            if let Err(e) = forwarder.await {
                error!("forwarder task panicked: {}", e);
            }
        },
        Commands::List {
            page_size,
            page_num,
            sort_field,
            descending,
        } => {
            let query = user_validation::list_query(
                page_size,
                page_num,
                sort_field.as_deref(),
                descending,
            )?;
            let (client, router) =
                RelayClient::start(queue, config, counters, cancel.clone()).await?;

            let users = client.list_users(query).await;
            close_client(&client, router, &cancel).await;
            println!("{}", serde_json::to_string_pretty(&users?)?);
        },
        Commands::Get { id } => {
            let (client, router) =
                RelayClient::start(queue, config, counters, cancel.clone()).await?;

            let user = client.get_user(GetUserQuery { user_id: id }).await;
            close_client(&client, router, &cancel).await;
            println!("{}", serde_json::to_string_pretty(&user?)?);
        },
    }

    Ok(())
}

#[derive(OpenApi)]
#[openapi(
    paths(
        user_http::relay::relay_list_users,
        user_http::relay::relay_get_user
    ),
    components(
        schemas(
            user_models::UserView,
            user_models::Role,
            user_http::ListUsersParams,
            common_errors::ApiErrorResponse,
        )
    ),
    tags(
        (name = "relay", description = "User reads relayed through the queue")
    ),
    info(
        title = "User Service UI Gateway",
        description = "Queue-backed read API for the user service",
        version = "1.0.0"
    )
)]
struct ApiDoc;
