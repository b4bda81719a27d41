//! Background retry of cache invalidations that failed after a store commit.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{error, info, warn};

use super::CacheBackend;

const QUEUE_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 8,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(10),
        }
    }
}

/// Handle to the retry worker. Only deletes are retried: removing a key is safe
/// whatever was written to it in between, re-setting an old value is not.
#[derive(Clone)]
pub struct InvalidationQueue {
    tx: mpsc::Sender<String>,
}

impl InvalidationQueue {
    /// Spawns the worker on the current tokio runtime.
    pub fn spawn(cache: Arc<dyn CacheBackend>, policy: RetryPolicy) -> Self {
        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
        tokio::spawn(run(cache, rx, policy));
        Self { tx }
    }

    pub fn enqueue(&self, key: String) {
        if let Err(e) = self.tx.try_send(key) {
            error!("cache invalidation dropped, entry may stay stale: {e}");
        }
    }
}

async fn run(cache: Arc<dyn CacheBackend>, mut rx: mpsc::Receiver<String>, policy: RetryPolicy) {
    while let Some(key) = rx.recv().await {
        tokio::spawn(retry_del(cache.clone(), key, policy));
    }
}

async fn retry_del(cache: Arc<dyn CacheBackend>, key: String, policy: RetryPolicy) {
    let mut delay = policy.initial_backoff;
    for attempt in 1..=policy.max_attempts {
        tokio::time::sleep(delay).await;
        match cache.del(&key).await {
            Ok(()) => {
                info!(key = %key, attempt, "deferred cache invalidation applied");
                return;
            }
            Err(e) => warn!(key = %key, attempt, "cache invalidation retry failed: {e}"),
        }
        delay = (delay * 2).min(policy.max_backoff);
    }
    error!(
        key = %key,
        "giving up on cache invalidation after {} attempts",
        policy.max_attempts
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;

    #[tokio::test(start_paused = true)]
    async fn test_retries_until_cache_recovers() {
        let cache = MemoryCache::new();
        cache.set("k", "stale").await.unwrap();
        cache.set_offline(true);

        let queue = InvalidationQueue::spawn(Arc::new(cache.clone()), RetryPolicy::default());
        queue.enqueue("k".to_string());

        tokio::time::sleep(Duration::from_millis(250)).await;
        cache.set_offline(false);
        tokio::time::sleep(Duration::from_secs(5)).await;

        assert_eq!(cache.get("k").await.unwrap(), None);
    }
}
