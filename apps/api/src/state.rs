use std::sync::Arc;

use crate::cache::{CacheBackend, CacheKeys, InvalidationQueue, PermissionCache, RetryPolicy};
use crate::config::Config;
use crate::models::Entity;
use crate::rbac::{PrincipalLoader, RbacResolver};
use crate::service::{BaseService, DisclosurePolicy, PermissionService, RoleService, UserService};
use crate::store::{DocumentStore, PaginatedAggregator};

/// The knobs `AppState` is built from. `Config` supplies them in production,
/// tests take the defaults.
#[derive(Debug, Clone, Default)]
pub struct Settings {
    pub keys: CacheKeys,
    pub max_page_size: Option<u64>,
    pub disclosure: DisclosurePolicy,
    pub retry: RetryPolicy,
}

impl Settings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            keys: config.cache_keys(),
            max_page_size: Some(config.max_page_size),
            disclosure: config.disclosure(),
            retry: RetryPolicy::default(),
        }
    }
}

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn DocumentStore>,
    pub cache: PermissionCache,
    pub rbac: RbacResolver,
    pub aggregator: PaginatedAggregator,
    pub principals: PrincipalLoader,
    pub disclosure: DisclosurePolicy,
}

impl AppState {
    /// Must be called inside a Tokio runtime: it starts the cache retry worker.
    pub fn new(store: Arc<dyn DocumentStore>, backend: Arc<dyn CacheBackend>, settings: Settings) -> Self {
        let retry = InvalidationQueue::spawn(backend.clone(), settings.retry);
        let cache = PermissionCache::new(backend, store.clone(), settings.keys, retry);
        let aggregator = settings
            .max_page_size
            .map(PaginatedAggregator::new)
            .unwrap_or_default();
        Self {
            rbac: RbacResolver::new(cache.clone()),
            principals: PrincipalLoader::new(store.clone()),
            store,
            cache,
            aggregator,
            disclosure: settings.disclosure,
        }
    }

    pub fn service<T: Entity>(&self) -> BaseService<T> {
        BaseService::new(
            self.store.clone(),
            self.aggregator,
            self.rbac.clone(),
            self.disclosure,
        )
    }

    pub fn permissions(&self) -> PermissionService {
        PermissionService::new(self.service(), self.service(), self.cache.clone())
    }

    pub fn roles(&self) -> RoleService {
        RoleService::new(self.service(), self.permissions(), self.cache.clone())
    }

    pub fn users(&self) -> UserService {
        UserService::new(self.service(), self.service())
    }
}
