pub use config::{DbConnectConfig, DbOptionsConfig, PostgresDbConfig};
pub use connection::{ConnectError, connect_postgres_db};
pub use deadpool_postgres::PoolError;
pub use impl_get_connect::SqlConnect;
pub use tokio_postgres::Error as PgError;

pub mod config;
mod connection;
mod impl_get_connect;
