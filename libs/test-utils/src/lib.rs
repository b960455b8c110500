pub mod postgres;
pub mod redis;

pub use postgres::TestPostgresContainer;
pub use redis::TestRedisContainer;
