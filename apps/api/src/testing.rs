//! Shared fixtures for unit tests: in-memory store and cache, and helpers to seed
//! grants and records.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::cache::{CacheBackend, CacheKeys, InvalidationQueue, MemoryCache, PermissionCache, RetryPolicy};
use crate::models::record::body_fields;
use crate::models::{Document, Entity, Permission, Record, Resume, Role, Scope};
use crate::query::{Filter, Sort};
use crate::rbac::RbacResolver;
use crate::service::{BaseService, DisclosurePolicy};
use crate::store::{
    DocumentStore, FacetQuery, MemoryStore, Page, PaginatedAggregator, Patch, SoftDeleteCollection,
    StoreError, StoreResult,
};

pub struct TestEnv {
    pub store: Arc<dyn DocumentStore>,
    pub cache: MemoryCache,
    pub permissions: PermissionCache,
    pub rbac: RbacResolver,
}

impl TestEnv {
    pub fn new() -> Self {
        Self::with_store(Arc::new(MemoryStore::new()))
    }

    pub fn with_store(store: Arc<dyn DocumentStore>) -> Self {
        let cache = MemoryCache::new();
        let backend: Arc<dyn CacheBackend> = Arc::new(cache.clone());
        let permissions = PermissionCache::new(
            backend.clone(),
            store.clone(),
            CacheKeys::default(),
            InvalidationQueue::spawn(backend, RetryPolicy::default()),
        );
        Self {
            rbac: RbacResolver::new(permissions.clone()),
            store,
            cache,
            permissions,
        }
    }

    pub fn service<T: Entity>(&self, disclosure: DisclosurePolicy) -> BaseService<T> {
        BaseService::new(
            self.store.clone(),
            PaginatedAggregator::default(),
            self.rbac.clone(),
            disclosure,
        )
    }

    pub async fn insert<T: Entity>(&self, data: &T, actor: Option<Uuid>) -> Record<T> {
        SoftDeleteCollection::new(self.store.clone(), T::COLLECTION)
            .insert_one(body_fields(data).unwrap(), actor)
            .await
            .unwrap()
            .into_record()
            .unwrap()
    }

    /// A fresh role holding one permission, linked on both sides. Returns the role id.
    pub async fn grant(&self, resource: &str, action: &str, scope: Scope) -> Uuid {
        let role = self
            .insert(
                &Role {
                    name: format!("{resource}:{action}:{}", Uuid::new_v4()),
                    permissions: vec![],
                },
                None,
            )
            .await;
        let permission = self
            .insert(
                &Permission {
                    name: format!("{resource}_{action}_{}", Uuid::new_v4()),
                    action: action.to_string(),
                    resource: resource.to_string(),
                    scope,
                    roles: vec![role.id()],
                },
                None,
            )
            .await;
        self.store
            .update_one(
                Role::COLLECTION,
                &Filter::by_id(role.id()),
                &Patch::default().add_to_set("permissions", permission.id().to_string()),
            )
            .await
            .unwrap();
        role.id()
    }
}

pub fn resume(company_id: Uuid, firstname: &str) -> Resume {
    Resume {
        company_id,
        firstname: firstname.to_string(),
        lastname: "Doe".to_string(),
        email: None,
        mobile: None,
        status: "pending".to_string(),
        min_salary: None,
        max_salary: None,
    }
}

/// A [`MemoryStore`] whose updates to one collection fail while armed.
pub struct FlakyStore {
    inner: MemoryStore,
    collection: &'static str,
    failing: AtomicBool,
}

impl FlakyStore {
    pub fn new(collection: &'static str) -> Self {
        Self {
            inner: MemoryStore::new(),
            collection,
            failing: AtomicBool::new(false),
        }
    }

    pub fn arm(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl DocumentStore for FlakyStore {
    async fn find_one(&self, collection: &str, filter: &Filter) -> StoreResult<Option<Document>> {
        self.inner.find_one(collection, filter).await
    }

    async fn find(&self, collection: &str, filter: &Filter, sort: &Sort) -> StoreResult<Vec<Document>> {
        self.inner.find(collection, filter, sort).await
    }

    async fn count(&self, collection: &str, filter: &Filter) -> StoreResult<u64> {
        self.inner.count(collection, filter).await
    }

    async fn aggregate(&self, collection: &str, query: &FacetQuery) -> StoreResult<Page<Document>> {
        self.inner.aggregate(collection, query).await
    }

    async fn insert_one(&self, collection: &str, doc: Document) -> StoreResult<Document> {
        self.inner.insert_one(collection, doc).await
    }

    async fn insert_many(&self, collection: &str, docs: Vec<Document>) -> StoreResult<Vec<Document>> {
        self.inner.insert_many(collection, docs).await
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: &Filter,
        patch: &Patch,
    ) -> StoreResult<Option<Document>> {
        if collection == self.collection && self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(format!("{collection} offline")));
        }
        self.inner.update_one(collection, filter, patch).await
    }

    async fn soft_delete(
        &self,
        collection: &str,
        filter: &Filter,
        actor: Option<Uuid>,
    ) -> StoreResult<Option<Document>> {
        self.inner.soft_delete(collection, filter, actor).await
    }

    async fn restore(&self, collection: &str, filter: &Filter) -> StoreResult<Option<Document>> {
        self.inner.restore(collection, filter).await
    }

    async fn health_check(&self) -> StoreResult<()> {
        self.inner.health_check().await
    }

    fn backend_name(&self) -> &'static str {
        "flaky"
    }
}
