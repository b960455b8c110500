use std::ops::Deref;

use bytes::Bytes;
use serde::{Serialize, de::DeserializeOwned};

use crate::cache::{CacheError, CacheResult};

/// JSON encoding for cached values.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Json<T>(pub T);

impl<T> Json<T> {
    pub fn inner(self) -> T { self.0 }
}

impl<T> Deref for Json<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target { &self.0 }
}

impl<T> Json<T>
where
    T: Serialize,
{
    pub fn to_bytes(&self) -> CacheResult<Bytes> {
        serde_json::to_vec(&self.0)
            .map(Bytes::from)
            .map_err(|e| CacheError::Serialization(e.to_string()))
    }
}

impl<T> Json<T>
where
    T: DeserializeOwned,
{
    pub fn from_bytes(bytes: &[u8]) -> CacheResult<Self> {
        serde_json::from_slice(bytes)
            .map(Json)
            .map_err(|e| CacheError::Deserialization(e.to_string()))
    }
}
