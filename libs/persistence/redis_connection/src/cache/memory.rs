use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use moka::{Expiry, future::Cache};

use super::r#trait::{CacheResult, CacheStore};
use crate::config::MemoryConfig;

#[derive(Clone)]
struct Entry {
    bytes: Bytes,
    ttl: Duration,
}

struct PerEntryTtl;

impl Expiry<String, Entry> for PerEntryTtl {
    fn expire_after_create(
        &self, _key: &String, value: &Entry, _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self, _key: &String, value: &Entry, _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// In-process cache backed by moka.
#[derive(Clone)]
pub struct MemoryCache {
    memory: Cache<String, Entry>,
    config: MemoryConfig,
}

impl MemoryCache {
    pub fn new(config: MemoryConfig) -> Self {
        let memory = Cache::builder()
            .max_capacity(config.capacity)
            .expire_after(PerEntryTtl)
            .build();
        Self { memory, config }
    }

    pub fn entry_count(&self) -> u64 { self.memory.entry_count() }
}

impl Default for MemoryCache {
    fn default() -> Self { Self::new(MemoryConfig::default()) }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn lookup(&self, key: &str) -> CacheResult<Option<Bytes>> {
        Ok(self.memory.get(key).await.map(|entry| entry.bytes))
    }

    async fn store(
        &self, key: &str, value: Bytes, ttl: Duration,
    ) -> CacheResult<()> {
        let entry = Entry {
            bytes: value,
            ttl: ttl.min(self.config.ttl()),
        };
        self.memory.insert(key.to_string(), entry).await;
        Ok(())
    }

    async fn invalidate_exact(&self, key: &str) -> CacheResult<bool> {
        Ok(self.memory.remove(key).await.is_some())
    }

    async fn invalidate_prefix(&self, prefix: &str) -> CacheResult<u64> {
        let matching: Vec<String> = self
            .memory
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| key.as_ref().clone())
            .collect();

        let mut removed = 0;
        for key in matching {
            if self.memory.remove(&key).await.is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_lookup_miss_is_none() {
        let cache = MemoryCache::default();
        assert!(cache.lookup("UserGet:1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_store_and_exact_invalidation() {
        let cache = MemoryCache::default();
        cache
            .store("UserGet:1", Bytes::from_static(b"{}"), Duration::from_secs(60))
            .await
            .unwrap();

        assert_eq!(
            cache.lookup("UserGet:1").await.unwrap(),
            Some(Bytes::from_static(b"{}"))
        );
        assert!(cache.invalidate_exact("UserGet:1").await.unwrap());
        assert!(!cache.invalidate_exact("UserGet:1").await.unwrap());
        assert!(cache.lookup("UserGet:1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_prefix_invalidation_leaves_other_keys() {
        let cache = MemoryCache::default();
        let ttl = Duration::from_secs(60);
        for key in [
            "UserList:5:1:id:false",
            "UserList:10:2:email:true",
            "UserGet:1",
            "RoleList:5:1:id:false",
        ] {
            cache.store(key, Bytes::from_static(b"[]"), ttl).await.unwrap();
        }

        let removed = cache.invalidate_prefix("UserList:").await.unwrap();
        assert_eq!(removed, 2);
        assert!(cache.lookup("UserList:5:1:id:false").await.unwrap().is_none());
        assert!(cache.lookup("UserList:10:2:email:true").await.unwrap().is_none());
        assert!(cache.lookup("UserGet:1").await.unwrap().is_some());
        assert!(cache.lookup("RoleList:5:1:id:false").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_entries_expire_after_ttl() {
        let cache = MemoryCache::default();
        cache
            .store("UserGet:1", Bytes::from_static(b"{}"), Duration::from_millis(50))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(cache.lookup("UserGet:1").await.unwrap().is_none());
    }
}
