use std::sync::Arc;

use app_metrics::ServiceCounters;
use axum::{
    Router,
    extract::{Path, Query, State},
    response::Json,
    routing::get,
};
use common_errors::AppError;
use tracing::instrument;
use user_models::UserView;
use user_queries::GetUserQuery;
use user_relay::RelayClient;

use crate::{ListUsersParams, track};

/// State of the UI tier: reads go over the queue instead of to a store.
#[derive(Clone)]
pub struct RelayServices {
    pub client: RelayClient,
    pub counters: Arc<ServiceCounters>,
}

pub fn relay_routes(services: RelayServices) -> Router {
    Router::new()
        .route("/relay/users", get(relay_list_users))
        .route("/relay/user/{id}", get(relay_get_user))
        .with_state(services)
}

#[utoipa::path(
    get,
    path = "/relay/users",
    params(
        ListUsersParams
    ),
    responses(
        (status = 200, description = "List of users", body = Vec<UserView>),
        (status = 400, description = "Invalid query parameters", body = common_errors::ApiErrorResponse),
        (status = 504, description = "No reply before the relay timeout", body = common_errors::ApiErrorResponse),
        (status = 500, description = "Internal server error", body = common_errors::ApiErrorResponse)
    ),
    tag = "relay"
)]
#[instrument(skip_all)]
pub async fn relay_list_users(
    State(services): State<RelayServices>,
    Query(params): Query<ListUsersParams>,
) -> Result<Json<Vec<UserView>>, AppError> {
    let result = match params.to_query() {
        Ok(query) => services.client.list_users(query).await,
        Err(e) => Err(e),
    };

    Ok(Json(track(&services.counters, result)?))
}

#[utoipa::path(
    get,
    path = "/relay/user/{id}",
    params(
        ("id" = i64, Path, description = "User ID")
    ),
    responses(
        (status = 200, description = "User found", body = UserView),
        (status = 504, description = "No reply before the relay timeout", body = common_errors::ApiErrorResponse),
        (status = 500, description = "Backend error, including unknown users", body = common_errors::ApiErrorResponse)
    ),
    tag = "relay"
)]
#[instrument(skip_all, fields(user_id = id))]
pub async fn relay_get_user(
    State(services): State<RelayServices>, Path(id): Path<i64>,
) -> Result<Json<UserView>, AppError> {
    let result = services.client.get_user(GetUserQuery { user_id: id }).await;

    Ok(Json(track(&services.counters, result)?))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::{
        body::{Body, to_bytes},
        http::{Request, StatusCode},
    };
    use message_queue::{MemoryQueue, MessageQueue, QueueConfig};
    use redis_connection::MemoryCache;
    use serde_json::Value;
    use tokio_util::sync::CancellationToken;
    use tower::ServiceExt;
    use user_core::{CoreConfig, UserCore};
    use user_dao::{MemoryUserStore, UserStore};
    use user_models::{NewUser, Role};
    use user_query_handlers::{GetUserQueryHandler, ListUsersQueryHandler};
    use user_relay::{Executor, Forwarder, RelayConfig, RelayTopics};

    use super::*;

    async fn app(cancel: &CancellationToken) -> anyhow::Result<Router> {
        let counters = Arc::new(ServiceCounters::new());
        let store = Arc::new(MemoryUserStore::default());
        store
            .create(NewUser {
                email: "a@b.com".into(),
                name: "A B".into(),
                role: Role::User,
                password_hash: "hash".into(),
            })
            .await?;
        let core = UserCore::new(store, CoreConfig::default(), cancel.clone(), counters.clone());
        let cache = Arc::new(MemoryCache::default());

        let queue: Arc<dyn MessageQueue> = Arc::new(MemoryQueue::new(QueueConfig {
            poll_interval_ms: 20,
            batch_size: 8,
            ..QueueConfig::default()
        }));
        let backoff = Duration::from_millis(20);
        Forwarder::new(queue.clone(), RelayTopics::default(), counters.clone())
            .spawn("forwarder", cancel.clone(), backoff)
            .await?;
        Executor::new(
            queue.clone(),
            RelayTopics::default(),
            GetUserQueryHandler::new(core.clone(), cache.clone(), counters.clone()),
            ListUsersQueryHandler::new(core, cache, counters.clone()),
            counters.clone(),
        )
        .spawn("executor", cancel.clone(), backoff)
        .await?;

        let config = RelayConfig::builder()
            .poll_interval(backoff)
            .request_timeout(Duration::from_secs(2))
            .build();
        let (client, _) =
            RelayClient::start(queue, config, counters.clone(), cancel.clone()).await?;

        Ok(relay_routes(RelayServices { client, counters }))
    }

    async fn get_json(app: &Router, uri: &str) -> anyhow::Result<(StatusCode, Value)> {
        let response = app
            .clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty())?)
            .await?;
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await?;
        Ok((status, serde_json::from_slice(&bytes)?))
    }

    #[tokio::test]
    async fn test_relay_routes_answer_through_queue() -> anyhow::Result<()> {
        let cancel = CancellationToken::new();
        let app = app(&cancel).await?;

        let (status, body) = get_json(&app, "/relay/users?page_size=5").await?;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body[0]["email"], "a@b.com");

        let (status, body) = get_json(&app, "/relay/user/1").await?;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["name"], "A B");

        let (status, _) = get_json(&app, "/relay/user/77").await?;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);

        let (status, body) = get_json(&app, "/relay/users?sort_field=bogus").await?;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["message"], "bad sorting field bogus");

        cancel.cancel();
        Ok(())
    }
}
