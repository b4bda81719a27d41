use std::time::Duration;

use async_trait::async_trait;
use ::redis::aio::ConnectionManager;
use ::redis::{AsyncCommands, Client};
use tokio::sync::OnceCell;
use tracing::info;

use super::{CacheBackend, CacheError, CacheResult};

/// Redis-backed cache shared by every API process.
///
/// Connects lazily so the API starts (and serves from the store) while Redis is
/// down. Each round trip is bounded by `timeout`.
pub struct RedisCache {
    client: Client,
    conn: OnceCell<ConnectionManager>,
    timeout: Duration,
}

impl RedisCache {
    pub fn new(client: Client, timeout: Duration) -> Self {
        Self {
            client,
            conn: OnceCell::new(),
            timeout,
        }
    }

    async fn connection(&self) -> CacheResult<ConnectionManager> {
        let conn = self
            .conn
            .get_or_try_init(|| async {
                let conn = ConnectionManager::new(self.client.clone()).await?;
                info!("Redis connection established");
                Ok::<_, CacheError>(conn)
            })
            .await?;
        Ok(conn.clone())
    }

    async fn bounded<T, F>(&self, op: F) -> CacheResult<T>
    where
        F: std::future::Future<Output = CacheResult<T>>,
    {
        tokio::time::timeout(self.timeout, op)
            .await
            .map_err(|_| CacheError::Unavailable(format!("timed out after {:?}", self.timeout)))?
    }
}

#[async_trait]
impl CacheBackend for RedisCache {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        self.bounded(async {
            let mut conn = self.connection().await?;
            Ok(conn.get::<_, Option<String>>(key).await?)
        })
        .await
    }

    async fn set(&self, key: &str, value: &str) -> CacheResult<()> {
        self.bounded(async {
            let mut conn = self.connection().await?;
            conn.set::<_, _, ()>(key, value).await?;
            Ok(())
        })
        .await
    }

    async fn set_if_absent(&self, key: &str, value: &str) -> CacheResult<bool> {
        self.bounded(async {
            let mut conn = self.connection().await?;
            Ok(conn.set_nx::<_, _, bool>(key, value).await?)
        })
        .await
    }

    async fn del(&self, key: &str) -> CacheResult<()> {
        self.bounded(async {
            let mut conn = self.connection().await?;
            conn.del::<_, ()>(key).await?;
            Ok(())
        })
        .await
    }

    fn backend_name(&self) -> &'static str {
        "redis"
    }
}
