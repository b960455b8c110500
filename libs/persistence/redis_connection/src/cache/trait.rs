use std::time::Duration;

use bytes::Bytes;
use deadpool_redis::PoolError;
use redis::RedisError;

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Redis error: {0}")]
    Redis(#[from] RedisError),

    #[error("Redis pool error: {0}")]
    Pool(#[from] PoolError),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),
}

pub type CacheResult<T> = Result<T, CacheError>;

/// Byte-level key/value cache with per-entry expiry.
///
/// A miss is `Ok(None)`. Every `Err` means the backend could not answer,
/// which callers surface instead of falling through to the store.
#[async_trait::async_trait]
pub trait CacheStore: Send + Sync {
    async fn lookup(&self, key: &str) -> CacheResult<Option<Bytes>>;

    async fn store(
        &self, key: &str, value: Bytes, ttl: Duration,
    ) -> CacheResult<()>;

    /// Drops one key. Returns whether it was present.
    async fn invalidate_exact(&self, key: &str) -> CacheResult<bool>;

    /// Drops every key starting with `prefix`. Returns how many were removed.
    async fn invalidate_prefix(&self, prefix: &str) -> CacheResult<u64>;
}
