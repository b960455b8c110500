use std::sync::Arc;

use app_metrics::{CountersSnapshot, ServiceCounters};
use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::get,
};
use sql_connection::SqlConnect;

#[derive(Clone)]
pub struct OpsState {
    pub counters: Arc<ServiceCounters>,
    pub sql: Option<SqlConnect>,
}

pub fn ops_routes(state: OpsState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics))
        .with_state(state)
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Health check successful with connection pool status", body = String)
    ),
    tag = "health"
)]
pub async fn health_check(State(state): State<OpsState>) -> impl IntoResponse {
    let health_info = match &state.sql {
        Some(db) => {
            let (available, size) = db.get_pool_status();
            format!("OK - Pool: {available}/{size} available")
        },
        None => "OK - in-memory store".to_string(),
    };

    (StatusCode::OK, health_info)
}

#[utoipa::path(
    get,
    path = "/metrics",
    responses(
        (status = 200, description = "Current request counters", body = CountersSnapshot)
    ),
    tag = "health"
)]
pub async fn metrics(State(state): State<OpsState>) -> Json<CountersSnapshot> {
    Json(state.counters.snapshot())
}

#[cfg(test)]
mod tests {
    use axum::{body::Body, http::Request};
    use tower::ServiceExt;

    use super::*;

    #[tokio::test]
    async fn test_health_and_metrics() -> anyhow::Result<()> {
        let counters = Arc::new(ServiceCounters::new());
        ServiceCounters::incr(&counters.requests_in);
        ServiceCounters::incr(&counters.cache_hit);
        let app = ops_routes(OpsState {
            counters,
            sql: None,
        });

        let response = app
            .clone()
            .oneshot(Request::get("/health").body(Body::empty())?)
            .await?;
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
        assert_eq!(&body[..], b"OK - in-memory store");

        let response = app
            .oneshot(Request::get("/metrics").body(Body::empty())?)
            .await?;
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
        let snapshot: serde_json::Value = serde_json::from_slice(&body)?;
        assert_eq!(snapshot["requests_in"], 1);
        assert_eq!(snapshot["cache_hit"], 1);
        assert_eq!(snapshot["relay_executed"], 0);
        Ok(())
    }
}
