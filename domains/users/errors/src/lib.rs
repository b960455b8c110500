use common_errors::AppError;
use credentials::CredentialError;
use message_queue::QueueError;
use redis_connection::{PoolError, RedisError, cache::CacheError};
use sql_connection::{PgError, PoolError as DbPoolError};
use thiserror::Error;
use user_models::ParseError;

/// Prefix the relay uses for validation failures carried as text.
pub const INVALID_ARGUMENT_PREFIX: &str = "invalid argument: ";

#[derive(Debug, Error)]
pub enum UserError {
    #[error("{0}")]
    InvalidArgument(String),
    #[error("User not found: {user_id}")]
    NotFound { user_id: i64 },
    #[error("user with email {email} already exists")]
    AlreadyExists { email: String },
    #[error("role {role} not found")]
    RoleNotFound { role: String },
    #[error("{0}")]
    PermissionDenied(String),
    #[error("deadline exceeded: {operation}")]
    DeadlineExceeded { operation: &'static str },
    #[error("Database error: {0}")]
    Database(#[from] PgError),
    #[error("Database Pool error: {0}")]
    DatabasePool(#[from] DbPoolError),
    #[error("Redis error: {0}")]
    Redis(#[from] RedisError),
    #[error("Redis Pool error: {0}")]
    RedisPool(#[from] PoolError),
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),
    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl UserError {
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Renders the error the way it travels inside a relay response
    /// envelope.
    pub fn to_relay_text(&self) -> String {
        match self {
            UserError::InvalidArgument(msg) => {
                format!("{INVALID_ARGUMENT_PREFIX}{msg}")
            }
            UserError::Internal(msg) => msg.clone(),
            other => other.to_string(),
        }
    }

    /// Inverse of [`UserError::to_relay_text`]. Only validation failures
    /// keep their kind; everything else comes back as internal.
    pub fn from_relay_text(text: &str) -> Self {
        match text.strip_prefix(INVALID_ARGUMENT_PREFIX) {
            Some(msg) => UserError::InvalidArgument(msg.to_string()),
            None => UserError::Internal(text.to_string()),
        }
    }
}

impl From<ParseError> for UserError {
    fn from(err: ParseError) -> Self {
        UserError::InvalidArgument(err.to_string())
    }
}

impl From<CredentialError> for UserError {
    fn from(err: CredentialError) -> Self {
        match err {
            CredentialError::Mismatch => {
                UserError::PermissionDenied("wrong password".to_string())
            }
            other => UserError::Internal(other.to_string()),
        }
    }
}

impl From<UserError> for AppError {
    fn from(err: UserError) -> Self {
        match err {
            UserError::InvalidArgument(msg) => {
                AppError::bad_request("INVALID_ARGUMENT", &msg)
            }
            UserError::NotFound { user_id } => {
                AppError::not_found(
                    "USER_NOT_FOUND",
                    &format!("User with ID {user_id} not found"),
                )
            }
            UserError::AlreadyExists { email } => {
                AppError::conflict(
                    "USER_ALREADY_EXISTS",
                    &format!("A user with email {email} already exists"),
                )
            }
            UserError::RoleNotFound { role } => {
                AppError::bad_request(
                    "ROLE_NOT_FOUND",
                    &format!("Role {role} not found"),
                )
            }
            UserError::PermissionDenied(msg) => {
                AppError::forbidden("PERMISSION_DENIED", &msg)
            }
            UserError::DeadlineExceeded { operation } => {
                AppError::gateway_timeout(
                    "DEADLINE_EXCEEDED",
                    &format!("Operation {operation} timed out"),
                )
            }
            UserError::Database(db_err) => {
                AppError::internal_server_error(&format!(
                    "Database error: {db_err}"
                ))
            }
            UserError::DatabasePool(pool_err) => {
                AppError::internal_server_error(&format!(
                    "Database connection error: {pool_err}"
                ))
            }
            UserError::Redis(redis_err) => {
                AppError::internal_server_error(&format!(
                    "Cache error: {redis_err}"
                ))
            }
            UserError::RedisPool(pool_err) => {
                AppError::internal_server_error(&format!(
                    "Cache connection error: {pool_err}"
                ))
            }
            UserError::Cache(cache_err) => {
                AppError::internal_server_error(&format!(
                    "Cache error: {cache_err}"
                ))
            }
            UserError::Queue(queue_err) => {
                AppError::internal_server_error(&format!(
                    "Queue error: {queue_err}"
                ))
            }
            UserError::Internal(msg) => {
                AppError::internal_server_error(&format!(
                    "Internal error: {msg}"
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::{http::StatusCode, response::IntoResponse};

    use super::*;

    fn status_of(err: UserError) -> StatusCode {
        AppError::from(err).into_response().status()
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            status_of(UserError::InvalidArgument("bad email x".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(UserError::NotFound { user_id: 1 }),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(UserError::AlreadyExists {
                email: "a@b.com".into()
            }),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(UserError::PermissionDenied("wrong password".into())),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            status_of(UserError::DeadlineExceeded { operation: "get" }),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            status_of(UserError::internal("boom")),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_relay_text_keeps_invalid_argument() {
        let err = UserError::InvalidArgument("bad sorting field bogus".into());
        let text = err.to_relay_text();
        assert_eq!(text, "invalid argument: bad sorting field bogus");

        match UserError::from_relay_text(&text) {
            UserError::InvalidArgument(msg) => {
                assert_eq!(msg, "bad sorting field bogus")
            }
            other => panic!("Expected InvalidArgument, got {other:?}"),
        }

        match UserError::from_relay_text("User not found: 4") {
            UserError::Internal(msg) => {
                assert_eq!(msg, "User not found: 4")
            }
            other => panic!("Expected Internal, got {other:?}"),
        }
    }

    #[test]
    fn test_internal_relay_text_is_bare() {
        let err = UserError::internal("unsupported command UserCreate");
        assert_eq!(err.to_relay_text(), "unsupported command UserCreate");
    }

    #[test]
    fn test_credential_mismatch_is_permission_denied() {
        let err: UserError = CredentialError::Mismatch.into();
        assert!(matches!(err, UserError::PermissionDenied(_)));
    }
}
