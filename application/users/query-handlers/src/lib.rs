use std::sync::Arc;

use app_metrics::ServiceCounters;
use redis_connection::{CacheEntry, CacheStore, CacheTypeBind};
use serde::{Serialize, de::DeserializeOwned};
use tracing::{debug, instrument};
use user_cache_keys::{
    EpochMark, USER_CACHE_TTL, UserGetCacheKey, UserListCacheKey, WriteEpoch,
};
use user_core::UserCore;
use user_errors::UserError;
use user_models::UserView;
use user_queries::{GetUserQuery, ListUsersQuery};

/// Caches a value read from the store. If a write advanced the epoch since
/// `seen` was taken, its invalidation may have run before this populate, so
/// the entry is dropped again.
async fn populate<T>(
    cache: &dyn CacheStore, entry: &CacheEntry<'_, T>, value: &T,
    seen: &EpochMark,
) -> Result<(), UserError>
where
    T: Serialize + DeserializeOwned + Send + Sync + Clone,
{
    entry.set_with_expire(value, USER_CACHE_TTL).await?;

    if WriteEpoch::current(cache).await? != *seen {
        debug!(key = entry.key(), "write raced the read, entry dropped");
        entry.remove().await?;
    }
    Ok(())
}

#[derive(Clone)]
pub struct GetUserQueryHandler {
    core: UserCore,
    cache: Arc<dyn CacheStore>,
    counters: Arc<ServiceCounters>,
}

impl GetUserQueryHandler {
    pub fn new(
        core: UserCore, cache: Arc<dyn CacheStore>,
        counters: Arc<ServiceCounters>,
    ) -> Self {
        Self {
            core,
            cache,
            counters,
        }
    }

    #[instrument(skip(self))]
    pub async fn execute(
        &self, query: GetUserQuery,
    ) -> Result<UserView, UserError> {
        let cache = UserGetCacheKey.bind_with(self.cache.as_ref(), &query.user_id);

        if let Some(user) = cache.try_get().await? {
            debug!(key = cache.key(), "cache hit");
            ServiceCounters::incr(&self.counters.cache_hit);
            return Ok(user);
        }

        debug!(key = cache.key(), "cache miss");
        ServiceCounters::incr(&self.counters.cache_miss);

        let seen = WriteEpoch::current(self.cache.as_ref()).await?;
        let user = UserView::from(self.core.get(query.user_id).await?);
        populate(self.cache.as_ref(), &cache, &user, &seen).await?;

        Ok(user)
    }
}

#[derive(Clone)]
pub struct ListUsersQueryHandler {
    core: UserCore,
    cache: Arc<dyn CacheStore>,
    counters: Arc<ServiceCounters>,
}

impl ListUsersQueryHandler {
    pub fn new(
        core: UserCore, cache: Arc<dyn CacheStore>,
        counters: Arc<ServiceCounters>,
    ) -> Self {
        Self {
            core,
            cache,
            counters,
        }
    }

    #[instrument(skip(self))]
    pub async fn execute(
        &self, query: ListUsersQuery,
    ) -> Result<Vec<UserView>, UserError> {
        let ListUsersQuery { page, order } = query;
        let cache = UserListCacheKey.bind_with_args(
            self.cache.as_ref(),
            (&page.page_size, &page.page_num, &order.field, &order.descending),
        );

        if let Some(users) = cache.try_get().await? {
            debug!(key = cache.key(), "cache hit");
            ServiceCounters::incr(&self.counters.cache_hit);
            return Ok(users);
        }

        debug!(key = cache.key(), "cache miss");
        ServiceCounters::incr(&self.counters.cache_miss);

        let seen = WriteEpoch::current(self.cache.as_ref()).await?;
        let users: Vec<UserView> = self
            .core
            .list(page, order)
            .await?
            .into_iter()
            .map(UserView::from)
            .collect();
        populate(self.cache.as_ref(), &cache, &users, &seen).await?;

        Ok(users)
    }
}
