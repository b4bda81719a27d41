#![allow(dead_code)]

use async_trait::async_trait;
use thiserror::Error;

#[cfg(test)]
pub mod memory;
pub mod permission;
pub mod redis;
pub mod retry;

#[cfg(test)]
pub use self::memory::MemoryCache;
pub use self::permission::{CacheKeys, PermissionCache};
pub use self::redis::RedisCache;
pub use self::retry::{InvalidationQueue, RetryPolicy};

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache unavailable: {0}")]
    Unavailable(String),
    #[error("cache entry malformed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<::redis::RedisError> for CacheError {
    fn from(e: ::redis::RedisError) -> Self {
        CacheError::Unavailable(e.to_string())
    }
}

pub type CacheResult<T> = Result<T, CacheError>;

/// Cache boundary: a shared string key-value store. No TTLs; entries change only
/// when a writer sets or deletes them.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &str) -> CacheResult<Option<String>>;
    async fn set(&self, key: &str, value: &str) -> CacheResult<()>;
    /// Writes only if the key is absent. Returns whether it wrote.
    async fn set_if_absent(&self, key: &str, value: &str) -> CacheResult<bool>;
    async fn del(&self, key: &str) -> CacheResult<()>;
    fn backend_name(&self) -> &'static str;
}
