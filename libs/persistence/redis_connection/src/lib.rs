use deadpool_redis::{Config, Pool, Runtime};
pub use deadpool_redis::{CreatePoolError, PoolError};
pub use redis::{AsyncCommands, RedisError};
use tracing::{info, instrument};
use url::Url;

pub mod binding;
pub mod cache;
pub mod config;
pub mod key;
pub mod macros;
pub mod value;

pub use binding::{CacheEntry, CacheTypeBind};
pub use cache::{CacheError, CacheResult, CacheStore, MemoryCache, RedisCache};
pub use key::CacheKey;
pub use value::Json;

#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    #[error("invalid redis address: {0}")]
    Url(String),
    #[error(transparent)]
    Pool(#[from] CreatePoolError),
}

pub fn redis_url<C>(config: &C) -> Result<Url, ConnectError>
where
    C: config::DbConnectConfig,
{
    let raw = match config.password() {
        Some(password) => format!("redis://:{password}@{}", config.host()),
        None => format!("redis://{}", config.host()),
    };
    let mut url = Url::parse(&raw).map_err(|e| ConnectError::Url(e.to_string()))?;

    url.set_port(Some(config.port()))
        .map_err(|_| ConnectError::Url(raw.clone()))?;
    url.set_path(&config.db().to_string());

    Ok(url)
}

#[instrument(skip_all, name = "connect-redis")]
pub async fn connect_redis_db<C>(config: &C) -> Result<Pool, ConnectError>
where
    C: config::DbConnectConfig,
{
    let url = redis_url(config)?;

    info!(redis.host = config.host(), redis.db = config.db(), redis.connect = true);

    let cfg = Config {
        url: Some(url.to_string()),
        pool: Some(deadpool_redis::PoolConfig::default()),
        connection: None,
    };

    let pool = cfg.create_pool(Some(Runtime::Tokio1))?;
    Ok(pool)
}
