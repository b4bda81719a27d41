use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{CacheBackend, CacheError, CacheResult};

/// Process-local cache for tests.
///
/// `set_offline(true)` makes every call fail with `Unavailable`, which is how the
/// degraded paths are exercised.
#[derive(Clone, Default)]
pub struct MemoryCache {
    entries: Arc<RwLock<HashMap<String, String>>>,
    offline: Arc<AtomicBool>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn check(&self) -> CacheResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(CacheError::Unavailable("memory cache offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl CacheBackend for MemoryCache {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        self.check()?;
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> CacheResult<()> {
        self.check()?;
        self.entries
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: &str) -> CacheResult<bool> {
        self.check()?;
        let mut entries = self.entries.write().await;
        if entries.contains_key(key) {
            return Ok(false);
        }
        entries.insert(key.to_string(), value.to_string());
        Ok(true)
    }

    async fn del(&self, key: &str) -> CacheResult<()> {
        self.check()?;
        self.entries.write().await.remove(key);
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_if_absent_keeps_existing() {
        let cache = MemoryCache::new();
        assert!(cache.set_if_absent("k", "a").await.unwrap());
        assert!(!cache.set_if_absent("k", "b").await.unwrap());
        assert_eq!(cache.get("k").await.unwrap().as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn test_offline_fails_every_call() {
        let cache = MemoryCache::new();
        cache.set("k", "v").await.unwrap();
        cache.set_offline(true);
        assert!(matches!(cache.get("k").await, Err(CacheError::Unavailable(_))));
        assert!(cache.del("k").await.is_err());
        cache.set_offline(false);
        assert_eq!(cache.get("k").await.unwrap().as_deref(), Some("v"));
    }
}
