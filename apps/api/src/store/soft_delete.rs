//! Soft-delete view over one collection.
//!
//! Every read goes through [`SoftDeleteCollection::scoped`], which adds
//! `deleted = false` unless the handle was opened with [`SoftDeleteCollection::with_deleted`].
//! Deletes never remove rows.

#![allow(dead_code)]

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::debug;
use uuid::Uuid;

use super::{DocumentStore, FacetQuery, Page, Patch, StoreError, StoreResult};
use crate::models::Document;
use crate::query::{Filter, Sort};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Live,
    WithDeleted,
}

#[derive(Clone)]
pub struct SoftDeleteCollection {
    store: Arc<dyn DocumentStore>,
    collection: &'static str,
    visibility: Visibility,
}

impl SoftDeleteCollection {
    pub fn new(store: Arc<dyn DocumentStore>, collection: &'static str) -> Self {
        Self {
            store,
            collection,
            visibility: Visibility::Live,
        }
    }

    /// The same collection with deleted records visible to reads.
    pub fn with_deleted(&self) -> Self {
        Self {
            visibility: Visibility::WithDeleted,
            ..self.clone()
        }
    }

    pub fn collection(&self) -> &'static str {
        self.collection
    }

    pub fn visibility(&self) -> Visibility {
        self.visibility
    }

    fn scoped(&self, filter: &Filter) -> Filter {
        match self.visibility {
            Visibility::Live => live(filter),
            Visibility::WithDeleted => filter.clone(),
        }
    }

    pub async fn find_one(&self, filter: &Filter) -> StoreResult<Option<Document>> {
        self.store.find_one(self.collection, &self.scoped(filter)).await
    }

    pub async fn find(&self, filter: &Filter, sort: &Sort) -> StoreResult<Vec<Document>> {
        self.store
            .find(self.collection, &self.scoped(filter), sort)
            .await
    }

    pub async fn count(&self, filter: &Filter) -> StoreResult<u64> {
        self.store.count(self.collection, &self.scoped(filter)).await
    }

    pub async fn aggregate(&self, query: &FacetQuery) -> StoreResult<Page<Document>> {
        let query = FacetQuery {
            filter: self.scoped(&query.filter),
            ..query.clone()
        };
        self.store.aggregate(self.collection, &query).await
    }

    pub async fn insert_one(
        &self,
        fields: Map<String, Value>,
        actor: Option<Uuid>,
    ) -> StoreResult<Document> {
        let doc = Document::new(actor, fields);
        self.store.insert_one(self.collection, doc).await
    }

    pub async fn insert_many(
        &self,
        bodies: Vec<Map<String, Value>>,
        actor: Option<Uuid>,
    ) -> StoreResult<Vec<Document>> {
        let docs = bodies
            .into_iter()
            .map(|fields| Document::new(actor, fields))
            .collect();
        self.store.insert_many(self.collection, docs).await
    }

    /// Deleted records are never updated, whatever the visibility.
    pub async fn update_one(&self, filter: &Filter, patch: &Patch) -> StoreResult<Option<Document>> {
        self.store
            .update_one(self.collection, &live(filter), patch)
            .await
    }

    /// Stamps the first match deleted and returns its state from before the call.
    /// Deleting an already-deleted record succeeds and changes nothing.
    pub async fn delete(&self, filter: &Filter, actor: Option<Uuid>) -> StoreResult<Document> {
        let previous = self
            .store
            .soft_delete(self.collection, filter, actor)
            .await?
            .ok_or_else(|| StoreError::NotFound(self.collection.to_string()))?;
        if previous.meta.deleted {
            debug!(collection = self.collection, id = %previous.id(), "already deleted");
        }
        Ok(previous)
    }

    pub async fn restore(&self, filter: &Filter) -> StoreResult<Document> {
        self.store
            .restore(self.collection, filter)
            .await?
            .ok_or_else(|| StoreError::NotFound(self.collection.to_string()))
    }
}

fn live(filter: &Filter) -> Filter {
    filter.and(&Filter::eq("deleted", false))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{Direction, Pagination};
    use crate::store::MemoryStore;
    use serde_json::json;

    fn body(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap_or_default()
    }

    fn resumes() -> SoftDeleteCollection {
        SoftDeleteCollection::new(Arc::new(MemoryStore::new()), "resumes")
    }

    #[tokio::test]
    async fn test_delete_hides_record_from_reads() {
        let resumes = resumes();
        let x = resumes.insert_one(body(json!({"firstname": "X"})), None).await.unwrap();
        resumes.insert_one(body(json!({"firstname": "Y"})), None).await.unwrap();
        let actor = Uuid::new_v4();

        let previous = resumes.delete(&Filter::by_id(x.id()), Some(actor)).await.unwrap();
        assert!(!previous.meta.deleted);

        assert!(resumes.find_one(&Filter::by_id(x.id())).await.unwrap().is_none());
        let all = resumes.find(&Filter::all(), &Sort::default()).await.unwrap();
        assert_eq!(all.len(), 1);
        assert!(all.iter().all(|d| d.id() != x.id()));
        assert_eq!(resumes.count(&Filter::all()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_second_delete_is_a_noop() {
        let resumes = resumes();
        let x = resumes.insert_one(body(json!({})), None).await.unwrap();
        let first_actor = Uuid::new_v4();
        resumes.delete(&Filter::by_id(x.id()), Some(first_actor)).await.unwrap();

        let again = resumes
            .delete(&Filter::by_id(x.id()), Some(Uuid::new_v4()))
            .await
            .unwrap();
        assert!(again.meta.deleted);
        assert_eq!(again.meta.deleted_by, Some(first_actor));
        assert!(again.meta.delete_markers_consistent());
    }

    #[tokio::test]
    async fn test_delete_missing_is_not_found() {
        let err = resumes()
            .delete(&Filter::by_id(Uuid::new_v4()), None)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_include_deleted_is_opt_in() {
        let resumes = resumes();
        let x = resumes.insert_one(body(json!({})), None).await.unwrap();
        resumes.delete(&Filter::by_id(x.id()), None).await.unwrap();

        let found = resumes
            .with_deleted()
            .find_one(&Filter::by_id(x.id()))
            .await
            .unwrap()
            .unwrap();
        assert!(found.meta.deleted);
        assert!(found.meta.deleted_at.is_some());
    }

    #[tokio::test]
    async fn test_deleted_records_are_not_updated() {
        let resumes = resumes();
        let x = resumes
            .insert_one(body(json!({"status": "pending"})), None)
            .await
            .unwrap();
        resumes.delete(&Filter::by_id(x.id()), None).await.unwrap();
        let updated = resumes
            .with_deleted()
            .update_one(&Filter::by_id(x.id()), &Patch::default().set("status", "hired"))
            .await
            .unwrap();
        assert!(updated.is_none());
    }

    #[tokio::test]
    async fn test_restore_clears_markers() {
        let resumes = resumes();
        let x = resumes.insert_one(body(json!({})), None).await.unwrap();
        resumes.delete(&Filter::by_id(x.id()), Some(Uuid::new_v4())).await.unwrap();

        let restored = resumes.restore(&Filter::by_id(x.id())).await.unwrap();
        assert!(!restored.meta.deleted);
        assert!(restored.meta.delete_markers_consistent());
        assert!(resumes.find_one(&Filter::by_id(x.id())).await.unwrap().is_some());

        let missing = resumes.restore(&Filter::by_id(Uuid::new_v4())).await;
        assert!(matches!(missing, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_aggregate_excludes_deleted() {
        let resumes = resumes();
        let mut ids = Vec::new();
        for n in 0..3 {
            ids.push(resumes.insert_one(body(json!({"n": n})), None).await.unwrap().id());
        }
        resumes.delete(&Filter::by_id(ids[1]), None).await.unwrap();
        let page = resumes
            .aggregate(&FacetQuery {
                filter: Filter::all(),
                sort: Sort::by("n", Direction::Asc),
                pagination: Pagination::default(),
            })
            .await
            .unwrap();
        assert_eq!(page.total_docs, 2);
        assert!(page.docs.iter().all(|d| d.id() != ids[1]));
    }
}
