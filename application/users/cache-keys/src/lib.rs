use std::time::Duration;

use bytes::Bytes;
use redis_connection::{CacheResult, CacheStore, cache_key};
use user_models::{SortField, UserView};
use uuid::Uuid;

/// How long a read stays cached when no write invalidates it first.
pub const USER_CACHE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

cache_key!(UserGetCacheKey::<UserView> => "UserGet:{}"[id: i64]);
cache_key!(UserListCacheKey::<Vec<UserView>> => "UserList:{}:{}:{}:{}"[page_size: u64, page_num: u64, field: SortField, descending: bool]);

impl UserListCacheKey {
    /// Shared by every list key, used for prefix invalidation.
    pub const PREFIX: &'static str = "UserList:";
}

/// Marker that every write replaces before it invalidates.
///
/// A reader takes a [`EpochMark`] before its store read and compares it
/// again after populating. A different mark means a write may have
/// invalidated ahead of the populate, so the fresh entry is dropped.
pub struct WriteEpoch;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpochMark(Option<Bytes>);

impl WriteEpoch {
    pub const KEY: &'static str = "UserWriteEpoch";

    pub async fn current(cache: &dyn CacheStore) -> CacheResult<EpochMark> {
        Ok(EpochMark(cache.lookup(Self::KEY).await?))
    }

    pub async fn advance(cache: &dyn CacheStore) -> CacheResult<()> {
        let mark = Bytes::from(Uuid::new_v4().simple().to_string());
        cache.store(Self::KEY, mark, USER_CACHE_TTL).await
    }
}

#[cfg(test)]
mod tests {
    use redis_connection::{CacheKey, MemoryCache};

    use super::*;

    #[test]
    fn test_get_key() {
        assert_eq!(UserGetCacheKey.get_key_with_args((&42,)), "UserGet:42");
    }

    #[test]
    fn test_list_keys_do_not_collide() {
        let a = UserListCacheKey
            .get_key_with_args((&5, &1, &SortField::Id, &false));
        let b = UserListCacheKey
            .get_key_with_args((&5, &1, &SortField::Id, &true));
        let c = UserListCacheKey
            .get_key_with_args((&51, &1, &SortField::Id, &false));

        assert_eq!(a, "UserList:5:1:id:false");
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert!(a.starts_with(UserListCacheKey::PREFIX));
        assert!(
            !UserGetCacheKey
                .get_key_with_args((&1,))
                .starts_with(UserListCacheKey::PREFIX)
        );
    }

    #[tokio::test]
    async fn test_write_epoch_changes_on_advance() -> anyhow::Result<()> {
        let cache = MemoryCache::default();
        let before = WriteEpoch::current(&cache).await?;
        assert_eq!(before, WriteEpoch::current(&cache).await?);

        WriteEpoch::advance(&cache).await?;
        let first = WriteEpoch::current(&cache).await?;
        assert_ne!(before, first);

        WriteEpoch::advance(&cache).await?;
        assert_ne!(first, WriteEpoch::current(&cache).await?);

        cache.invalidate_prefix(UserListCacheKey::PREFIX).await?;
        assert!(cache.lookup(WriteEpoch::KEY).await?.is_some());
        Ok(())
    }
}
