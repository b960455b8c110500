use std::sync::Arc;

use deadpool_redis::Pool;
use message_queue::{MemoryQueue, MessageQueue, QueueConfig, RedisStreamQueue};
use redis_connection::{
    CacheStore, MemoryCache, RedisCache,
    config::{MemoryConfig, RedisDbConfig},
    connect_redis_db,
};
use sql_connection::{PostgresDbConfig, SqlConnect, connect_postgres_db};
use tracing::info;
use user_dao::{MemoryUserStore, UserDao, UserStore};

/// `true` when `var` is set to `memory`.
fn in_memory(var: &str) -> bool {
    std::env::var(var).is_ok_and(|v| v.eq_ignore_ascii_case("memory"))
}

/// Connects Redis at most once, however many components need it.
#[derive(Default)]
struct RedisSlot(Option<Pool>);

impl RedisSlot {
    async fn get(&mut self) -> anyhow::Result<Pool> {
        if let Some(pool) = &self.0 {
            return Ok(pool.clone());
        }
        let pool = connect_redis_db(&RedisDbConfig::from_env()).await?;
        self.0 = Some(pool.clone());
        Ok(pool)
    }
}

pub struct Backends {
    pub store: Arc<dyn UserStore>,
    pub cache: Arc<dyn CacheStore>,
    pub queue: Arc<dyn MessageQueue>,
    /// Present when the store is Postgres, for pool health reporting.
    pub sql: Option<SqlConnect>,
}

/// Picks each backend from `STORE_BACKEND`, `CACHE_BACKEND` and
/// `QUEUE_BACKEND`.
pub async fn from_env(
    store_pool_size: usize, queue_config: QueueConfig,
) -> anyhow::Result<Backends> {
    let mut redis = RedisSlot::default();

    let mut sql = None;
    let store: Arc<dyn UserStore> = if in_memory("STORE_BACKEND") {
        info!(store_pool_size, "using in-memory user store");
        Arc::new(MemoryUserStore::new(store_pool_size))
    }
    else {
        let pool = connect_postgres_db(&PostgresDbConfig::from_env()).await?;
        let db = SqlConnect::new(pool);
        sql = Some(db.clone());
        info!("using postgres user store");
        Arc::new(UserDao::new(db))
    };

    let cache: Arc<dyn CacheStore> = if in_memory("CACHE_BACKEND") {
        info!("using in-process cache");
        Arc::new(MemoryCache::new(MemoryConfig::from_env()))
    }
    else {
        info!("using redis cache");
        Arc::new(RedisCache::new(redis.get().await?))
    };

    let queue: Arc<dyn MessageQueue> = if in_memory("QUEUE_BACKEND") {
        info!("using in-process queue");
        Arc::new(MemoryQueue::new(queue_config))
    }
    else {
        info!("using redis streams queue");
        Arc::new(RedisStreamQueue::new(redis.get().await?, queue_config))
    };

    Ok(Backends {
        store,
        cache,
        queue,
        sql,
    })
}
