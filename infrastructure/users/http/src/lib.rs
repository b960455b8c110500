use std::sync::Arc;

use app_metrics::ServiceCounters;
use axum::{
    Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
};
use common_errors::AppError;
use redis_connection::CacheStore;
use serde::Deserialize;
use tracing::{info, instrument};
use user_command_handlers::{
    AddUsersHandler, CreateUserHandler, DeleteUserHandler, UpdateUserHandler,
};
use user_commands::{
    AddUsersCommand, CreateUserCommand, DeleteUserCommand, UpdateUserCommand,
};
use user_core::UserCore;
use user_errors::UserError;
use user_models::UserView;
use user_query_handlers::{GetUserQueryHandler, ListUsersQueryHandler};
use user_responses::{AddedUsersResponse, CreatedUserResponse};
use utoipa::{IntoParams, ToSchema};

pub mod relay;

pub use relay::{RelayServices, relay_routes};

#[derive(Clone)]
pub struct UserServices {
    pub create_user: CreateUserHandler,
    pub update_user: UpdateUserHandler,
    pub delete_user: DeleteUserHandler,
    pub add_users: AddUsersHandler,

    pub get_user: GetUserQueryHandler,
    pub list_users: ListUsersQueryHandler,

    pub counters: Arc<ServiceCounters>,
}

impl UserServices {
    pub fn new(
        core: UserCore, cache: Arc<dyn CacheStore>,
        counters: Arc<ServiceCounters>,
    ) -> Self {
        Self {
            create_user: CreateUserHandler::new(core.clone(), cache.clone()),
            update_user: UpdateUserHandler::new(core.clone(), cache.clone()),
            delete_user: DeleteUserHandler::new(core.clone(), cache.clone()),
            add_users: AddUsersHandler::new(core.clone(), cache.clone()),
            get_user: GetUserQueryHandler::new(
                core.clone(),
                cache.clone(),
                counters.clone(),
            ),
            list_users: ListUsersQueryHandler::new(core, cache, counters.clone()),
            counters,
        }
    }
}

/// Counts the request and its outcome, then maps the error to a response.
pub(crate) fn track<T>(
    counters: &ServiceCounters, result: Result<T, UserError>,
) -> Result<T, AppError> {
    ServiceCounters::incr(&counters.requests_in);
    counters.record(&result);
    result.map_err(AppError::from)
}

pub fn routes(services: UserServices) -> Router {
    Router::new()
        .route("/user", post(create_user))
        .route(
            "/user/{id}",
            get(get_user).put(update_user).delete(delete_user),
        )
        .route("/users", get(list_users).post(add_users))
        .with_state(services)
}

#[utoipa::path(
    post,
    path = "/user",
    request_body = CreateUserCommand,
    responses(
        (status = 201, description = "User created successfully", body = CreatedUserResponse),
        (status = 400, description = "Invalid request data", body = common_errors::ApiErrorResponse),
        (status = 409, description = "Email already in use", body = common_errors::ApiErrorResponse),
        (status = 504, description = "Store deadline exceeded", body = common_errors::ApiErrorResponse),
        (status = 500, description = "Internal server error", body = common_errors::ApiErrorResponse)
    ),
    tag = "users"
)]
#[instrument(skip_all)]
pub async fn create_user(
    State(services): State<UserServices>,
    Json(command): Json<CreateUserCommand>,
) -> Result<(StatusCode, Json<CreatedUserResponse>), AppError> {
    let result = services.create_user.execute(command).await;
    let created = track(&services.counters, result)?;

    info!("User created: {}", created.id);

    Ok((StatusCode::CREATED, Json(created)))
}

#[utoipa::path(
    put,
    path = "/user/{id}",
    request_body = UpdateUserCommand,
    params(
        ("id" = i64, Path, description = "User ID")
    ),
    responses(
        (status = 204, description = "User updated successfully"),
        (status = 400, description = "Invalid request data", body = common_errors::ApiErrorResponse),
        (status = 403, description = "Old password does not match", body = common_errors::ApiErrorResponse),
        (status = 404, description = "User not found", body = common_errors::ApiErrorResponse),
        (status = 409, description = "Email already in use", body = common_errors::ApiErrorResponse),
        (status = 500, description = "Internal server error", body = common_errors::ApiErrorResponse)
    ),
    tag = "users"
)]
#[instrument(skip_all, fields(user_id = id))]
pub async fn update_user(
    State(services): State<UserServices>, Path(id): Path<i64>,
    Json(mut command): Json<UpdateUserCommand>,
) -> Result<StatusCode, AppError> {
    command.user_id = id;
    let result = services.update_user.execute(command).await;
    track(&services.counters, result)?;

    info!("User updated: {}", id);

    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    delete,
    path = "/user/{id}",
    request_body = DeleteUserCommand,
    params(
        ("id" = i64, Path, description = "User ID")
    ),
    responses(
        (status = 204, description = "User deleted successfully"),
        (status = 400, description = "Invalid request data", body = common_errors::ApiErrorResponse),
        (status = 403, description = "Password does not match", body = common_errors::ApiErrorResponse),
        (status = 404, description = "User not found", body = common_errors::ApiErrorResponse),
        (status = 500, description = "Internal server error", body = common_errors::ApiErrorResponse)
    ),
    tag = "users"
)]
#[instrument(skip_all, fields(user_id = id))]
pub async fn delete_user(
    State(services): State<UserServices>, Path(id): Path<i64>,
    Json(mut command): Json<DeleteUserCommand>,
) -> Result<StatusCode, AppError> {
    command.user_id = id;
    let result = services.delete_user.execute(command).await;
    track(&services.counters, result)?;

    info!("User deleted: {}", id);

    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/user/{id}",
    params(
        ("id" = i64, Path, description = "User ID")
    ),
    responses(
        (status = 200, description = "User found", body = UserView),
        (status = 404, description = "User not found", body = common_errors::ApiErrorResponse),
        (status = 504, description = "Store deadline exceeded", body = common_errors::ApiErrorResponse),
        (status = 500, description = "Internal server error", body = common_errors::ApiErrorResponse)
    ),
    tag = "users"
)]
#[instrument(skip_all, fields(user_id = id))]
pub async fn get_user(
    State(services): State<UserServices>, Path(id): Path<i64>,
) -> Result<Json<UserView>, AppError> {
    let query = user_queries::GetUserQuery { user_id: id };
    let result = services.get_user.execute(query).await;

    Ok(Json(track(&services.counters, result)?))
}

/// Paging and ordering for user listings. Omitted values take the defaults
/// (page size 5, page 1, sorted by id ascending).
#[derive(Debug, Default, Deserialize, ToSchema, IntoParams)]
pub struct ListUsersParams {
    pub page_size: Option<u64>,
    pub page_num: Option<u64>,
    /// `id`, `name` or `email`
    pub sort_field: Option<String>,
    pub descending: Option<bool>,
}

impl ListUsersParams {
    pub fn to_query(&self) -> Result<user_queries::ListUsersQuery, UserError> {
        user_validation::list_query(
            self.page_size,
            self.page_num,
            self.sort_field.as_deref(),
            self.descending,
        )
    }
}

#[utoipa::path(
    get,
    path = "/users",
    params(
        ListUsersParams
    ),
    responses(
        (status = 200, description = "List of users", body = Vec<UserView>),
        (status = 400, description = "Invalid query parameters", body = common_errors::ApiErrorResponse),
        (status = 500, description = "Internal server error", body = common_errors::ApiErrorResponse)
    ),
    tag = "users"
)]
#[instrument(skip_all)]
pub async fn list_users(
    State(services): State<UserServices>,
    Query(params): Query<ListUsersParams>,
) -> Result<Json<Vec<UserView>>, AppError> {
    let result = match params.to_query() {
        Ok(query) => services.list_users.execute(query).await,
        Err(e) => Err(e),
    };

    Ok(Json(track(&services.counters, result)?))
}

#[utoipa::path(
    post,
    path = "/users",
    request_body = AddUsersCommand,
    responses(
        (status = 201, description = "Users created in input order", body = AddedUsersResponse),
        (status = 400, description = "Invalid request data", body = common_errors::ApiErrorResponse),
        (status = 409, description = "Email already in use", body = common_errors::ApiErrorResponse),
        (status = 500, description = "Internal server error", body = common_errors::ApiErrorResponse)
    ),
    tag = "users"
)]
#[instrument(skip_all)]
pub async fn add_users(
    State(services): State<UserServices>,
    Json(command): Json<AddUsersCommand>,
) -> Result<(StatusCode, Json<AddedUsersResponse>), AppError> {
    let result = services.add_users.execute(command).await;
    let added = track(&services.counters, result)?;

    info!("Users added: {}", added.ids.len());

    Ok((StatusCode::CREATED, Json(added)))
}

#[cfg(test)]
mod tests {
    use axum::{
        body::{Body, to_bytes},
        http::{Request, header},
    };
    use redis_connection::MemoryCache;
    use serde_json::{Value, json};
    use tokio_util::sync::CancellationToken;
    use tower::ServiceExt;
    use user_core::CoreConfig;
    use user_dao::MemoryUserStore;

    use super::*;

    fn app() -> (Router, Arc<ServiceCounters>) {
        let counters = Arc::new(ServiceCounters::new());
        let core = UserCore::new(
            Arc::new(MemoryUserStore::default()),
            CoreConfig::default(),
            CancellationToken::new(),
            counters.clone(),
        );
        let services =
            UserServices::new(core, Arc::new(MemoryCache::default()), counters.clone());
        (routes(services), counters)
    }

    async fn send(
        app: &Router, method: &str, uri: &str, body: Option<Value>,
    ) -> anyhow::Result<(StatusCode, Value)> {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        let request = match body {
            Some(body) => request.body(Body::from(serde_json::to_vec(&body)?))?,
            None => request.body(Body::empty())?,
        };

        let response = app.clone().oneshot(request).await?;
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await?;
        let json = if bytes.is_empty() {
            Value::Null
        }
        else {
            serde_json::from_slice(&bytes)?
        };
        Ok((status, json))
    }

    fn user_body(email: &str, name: &str) -> Value {
        json!({"email": email, "name": name, "role": "Admin", "password": "abc123"})
    }

    #[tokio::test]
    async fn test_crud_over_http() -> anyhow::Result<()> {
        let (app, counters) = app();

        let (status, body) =
            send(&app, "POST", "/user", Some(user_body("a@b.com", "A B"))).await?;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body, json!({"id": 1}));

        let (status, body) = send(&app, "GET", "/user/1", None).await?;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({"id": 1, "email": "a@b.com", "name": "A B", "role": "Admin"})
        );

        let (status, body) =
            send(&app, "GET", "/users?page_size=5&page_num=1", None).await?;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().map(Vec::len), Some(1));

        let update = json!({
            "email": "a@b.com", "name": "A B2", "role": "Admin",
            "password": "abc123", "old_password": "abc123"
        });
        let (status, _) = send(&app, "PUT", "/user/1", Some(update)).await?;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (_, body) = send(&app, "GET", "/user/1", None).await?;
        assert_eq!(body["name"], "A B2");

        let (status, _) =
            send(&app, "DELETE", "/user/1", Some(json!({"password": "abc123"}))).await?;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, body) = send(&app, "GET", "/user/1", None).await?;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], "USER_NOT_FOUND");

        let snapshot = counters.snapshot();
        assert_eq!(snapshot.requests_in, 7);
        assert_eq!(snapshot.failed, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_error_statuses() -> anyhow::Result<()> {
        let (app, _) = app();
        send(&app, "POST", "/user", Some(user_body("a@b.com", "A B"))).await?;

        let (status, _) =
            send(&app, "POST", "/user", Some(user_body("a@b.com", "Again"))).await?;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, body) =
            send(&app, "POST", "/user", Some(user_body("broken", "A B"))).await?;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["message"], "bad email broken");

        let (status, _) =
            send(&app, "DELETE", "/user/1", Some(json!({"password": "wrong99"}))).await?;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let mut bad_role = user_body("c@d.com", "C D");
        bad_role["role"] = json!("Root");
        let (status, body) = send(&app, "POST", "/user", Some(bad_role)).await?;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["message"], "bad role Root");
        Ok(())
    }

    #[tokio::test]
    async fn test_bogus_sort_field_is_rejected() -> anyhow::Result<()> {
        let (app, counters) = app();

        let (status, body) =
            send(&app, "GET", "/users?sort_field=bogus", None).await?;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["message"], "bad sorting field bogus");
        assert_eq!(counters.snapshot().cache_miss, 0);
        assert_eq!(counters.snapshot().requests_out, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_out_of_range_page_is_bad_request() -> anyhow::Result<()> {
        let (app, counters) = app();

        let (status, body) =
            send(&app, "GET", "/users?page_num=18446744073709551615", None).await?;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            body["error"]["message"],
            "bad page 18446744073709551615 of size 5"
        );
        assert_eq!(counters.snapshot().requests_out, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_add_users_returns_ids_in_order() -> anyhow::Result<()> {
        let (app, _) = app();

        let (status, body) = send(
            &app,
            "POST",
            "/users",
            Some(json!([user_body("a@b.com", "A B"), user_body("c@d.com", "C D")])),
        )
        .await?;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body, json!({"ids": [1, 2]}));

        let (status, body) = send(&app, "POST", "/users", Some(json!([]))).await?;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["message"], "data is empty");

        let (_, body) =
            send(&app, "GET", "/users?sort_field=email&descending=true", None).await?;
        assert_eq!(body[0]["email"], "c@d.com");
        Ok(())
    }
}
