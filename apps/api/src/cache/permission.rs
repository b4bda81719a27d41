//! Read-through cache of permission and role documents.
//!
//! Keys are `<prefix><id>`; values are the serialized record, or `null` for a
//! record known to be absent. Writers call `cache_*`/`evict_*` only after the store
//! has committed. Readers populate with set-if-absent, so a reader holding an old
//! store read never overwrites what a writer put there.

#![allow(dead_code)]

use std::sync::Arc;

use serde::de::DeserializeOwned;
use tracing::{debug, error, warn};
use uuid::Uuid;

use super::{CacheBackend, InvalidationQueue};
use crate::models::{Entity, Permission, Record, Role};
use crate::query::Filter;
use crate::store::{DocumentStore, SoftDeleteCollection, StoreResult};

const TOMBSTONE: &str = "null";

#[derive(Debug, Clone)]
pub struct CacheKeys {
    pub permission_prefix: String,
    pub role_prefix: String,
}

impl Default for CacheKeys {
    fn default() -> Self {
        Self {
            permission_prefix: "rbac:permission:".to_string(),
            role_prefix: "rbac:role:".to_string(),
        }
    }
}

impl CacheKeys {
    pub fn permission(&self, id: Uuid) -> String {
        format!("{}{id}", self.permission_prefix)
    }

    pub fn role(&self, id: Uuid) -> String {
        format!("{}{id}", self.role_prefix)
    }
}

#[derive(Clone)]
pub struct PermissionCache {
    cache: Arc<dyn CacheBackend>,
    permissions: SoftDeleteCollection,
    roles: SoftDeleteCollection,
    keys: CacheKeys,
    retry: InvalidationQueue,
}

impl PermissionCache {
    pub fn new(
        cache: Arc<dyn CacheBackend>,
        store: Arc<dyn DocumentStore>,
        keys: CacheKeys,
        retry: InvalidationQueue,
    ) -> Self {
        Self {
            cache,
            permissions: SoftDeleteCollection::new(store.clone(), Permission::COLLECTION),
            roles: SoftDeleteCollection::new(store, Role::COLLECTION),
            keys,
            retry,
        }
    }

    pub fn keys(&self) -> &CacheKeys {
        &self.keys
    }

    pub fn backend_name(&self) -> &'static str {
        self.cache.backend_name()
    }

    pub async fn get_permission(&self, id: Uuid) -> StoreResult<Option<Record<Permission>>> {
        self.read_through(self.keys.permission(id), &self.permissions, id)
            .await
    }

    pub async fn get_role(&self, id: Uuid) -> StoreResult<Option<Record<Role>>> {
        self.read_through(self.keys.role(id), &self.roles, id).await
    }

    /// Live permissions of a live role. A permission counts only when both sides
    /// of the link agree.
    pub async fn get_role_permissions(&self, role_id: Uuid) -> StoreResult<Vec<Record<Permission>>> {
        let Some(role) = self.get_role(role_id).await? else {
            return Ok(Vec::new());
        };
        let mut granted = Vec::with_capacity(role.data.permissions.len());
        for permission_id in &role.data.permissions {
            match self.get_permission(*permission_id).await? {
                Some(p) if p.data.held_by(role_id) => granted.push(p),
                Some(_) => debug!(%role_id, %permission_id, "one-sided role link ignored"),
                None => {}
            }
        }
        Ok(granted)
    }

    pub async fn cache_permission(&self, record: &Record<Permission>) {
        self.write_record(self.keys.permission(record.id()), record)
            .await
    }

    pub async fn evict_permission(&self, id: Uuid) {
        self.write(self.keys.permission(id), TOMBSTONE.to_string())
            .await
    }

    pub async fn cache_role(&self, record: &Record<Role>) {
        self.write_record(self.keys.role(record.id()), record).await
    }

    pub async fn evict_role(&self, id: Uuid) {
        self.write(self.keys.role(id), TOMBSTONE.to_string()).await
    }

    /// Forgets a permission entry so the next read reloads it from the store.
    /// For records whose store state is unknown after a failed write.
    pub async fn drop_permission(&self, id: Uuid) {
        self.remove(self.keys.permission(id)).await
    }

    pub async fn drop_role(&self, id: Uuid) {
        self.remove(self.keys.role(id)).await
    }

    async fn read_through<T: Entity>(
        &self,
        key: String,
        source: &SoftDeleteCollection,
        id: Uuid,
    ) -> StoreResult<Option<Record<T>>> {
        match self.cache.get(&key).await {
            Ok(Some(raw)) => match serde_json::from_str::<Option<Record<T>>>(&raw) {
                Ok(cached) => {
                    debug!(key = %key, "cache hit");
                    return Ok(cached);
                }
                Err(e) => {
                    warn!(key = %key, "malformed cache entry dropped: {e}");
                    self.remove(key.clone()).await;
                }
            },
            Ok(None) => debug!(key = %key, "cache miss"),
            Err(e) => {
                warn!(key = %key, "cache unavailable, reading store: {e}");
                return load(source, id).await;
            }
        }

        let record = load::<T>(source, id).await?;
        let value = match &record {
            Some(r) => serde_json::to_string(r)?,
            None => TOMBSTONE.to_string(),
        };
        if let Err(e) = self.cache.set_if_absent(&key, &value).await {
            warn!(key = %key, "cache populate failed: {e}");
        }
        Ok(record)
    }

    async fn write_record<T: serde::Serialize>(&self, key: String, record: &Record<T>) {
        match serde_json::to_string(record) {
            Ok(value) => self.write(key, value).await,
            Err(e) => {
                warn!(key = %key, "could not serialize cache entry: {e}");
                self.remove(key).await;
            }
        }
    }

    /// Overwrites an entry after a committed mutation. If the write fails the entry
    /// is removed instead, and if that fails too the removal is retried in the
    /// background.
    async fn write(&self, key: String, value: String) {
        match self.cache.set(&key, &value).await {
            Ok(()) => debug!(key = %key, "cache entry refreshed"),
            Err(e) => {
                warn!(key = %key, "cache write failed, removing entry: {e}");
                self.remove(key).await;
            }
        }
    }

    async fn remove(&self, key: String) {
        if let Err(e) = self.cache.del(&key).await {
            error!(key = %key, "cache entry could not be removed, queued for retry: {e}");
            self.retry.enqueue(key);
        }
    }
}

async fn load<T: DeserializeOwned>(
    source: &SoftDeleteCollection,
    id: Uuid,
) -> StoreResult<Option<Record<T>>> {
    let doc = source.find_one(&Filter::by_id(id)).await?;
    Ok(doc.map(|d| d.into_record::<T>()).transpose()?)
}
