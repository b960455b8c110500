use tokio_postgres::error::SqlState;

/// True when the statement failed on a unique constraint
pub fn is_unique_violation(err: &tokio_postgres::Error) -> bool {
    err.code() == Some(&SqlState::UNIQUE_VIOLATION)
}
