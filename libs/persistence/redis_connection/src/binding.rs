use std::{borrow::Cow, marker::PhantomData, time::Duration};

use serde::{Serialize, de::DeserializeOwned};

use crate::{
    cache::{CacheResult, CacheStore},
    key::{CacheKey, CacheKeyArg1},
    value::Json,
};

/// Typed view over one key of a [`CacheStore`].
pub struct CacheEntry<'cache, T> {
    cache: &'cache dyn CacheStore,
    key: Cow<'static, str>,
    __phantom: PhantomData<T>,
}

impl<T> CacheEntry<'_, T>
where
    T: Serialize + DeserializeOwned + Send + Sync,
{
    pub fn key(&self) -> &str { &self.key }

    pub async fn try_get(&self) -> CacheResult<Option<T>> {
        match self.cache.lookup(&self.key).await? {
            Some(bytes) => Ok(Some(Json::<T>::from_bytes(&bytes)?.inner())),
            None => Ok(None),
        }
    }

    pub async fn set_with_expire(
        &self, value: &T, ttl: Duration,
    ) -> CacheResult<()>
    where
        T: Clone,
    {
        let bytes = Json(value.clone()).to_bytes()?;
        self.cache.store(&self.key, bytes, ttl).await
    }

    pub async fn remove(&self) -> CacheResult<bool> {
        self.cache.invalidate_exact(&self.key).await
    }
}

pub trait CacheTypeBind: CacheKey {
    type Value: Serialize + DeserializeOwned + Send + Sync;

    /// Construct a typed binding, when key construction requires 2 or more
    /// parameters
    fn bind_with_args<'cache>(
        &self, cache: &'cache dyn CacheStore, args: <Self as CacheKey>::Args<'_>,
    ) -> CacheEntry<'cache, Self::Value> {
        CacheEntry {
            cache,
            key: CacheKey::get_key_with_args(self, args),
            __phantom: PhantomData,
        }
    }

    /// Construct a typed binding, when key construction requires a
    /// parameter
    fn bind_with<'cache, 'r>(
        &self, cache: &'cache dyn CacheStore,
        arg: <<Self as CacheKey>::Args<'r> as CacheKeyArg1>::Arg0,
    ) -> CacheEntry<'cache, Self::Value>
    where
        <Self as CacheKey>::Args<'r>: CacheKeyArg1,
    {
        self.bind_with_args(
            cache,
            <<Self as CacheKey>::Args<'r> as CacheKeyArg1>::construct(arg),
        )
    }
}
