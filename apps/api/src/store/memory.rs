//! In-memory `DocumentStore`.
//!
//! Collections are insertion-ordered `Vec<Document>`s behind one `tokio::sync::RwLock`.
//! Each operation takes the lock once, so a delete or update is a single atomic step
//! with respect to every other call. Nothing is durable; this backend serves tests.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{DocumentStore, FacetQuery, Page, Patch, StoreResult};
use crate::models::Document;
use crate::query::{Filter, Sort};

#[derive(Debug, Default)]
struct Collections {
    next_seq: i64,
    docs: HashMap<String, Vec<Document>>,
}

impl Collections {
    fn stamp(&mut self, mut doc: Document) -> Document {
        self.next_seq += 1;
        doc.meta.seq = self.next_seq;
        doc
    }

    fn matching<'a>(&'a self, collection: &str, filter: &'a Filter) -> Vec<&'a Document> {
        if filter.is_nothing() {
            return Vec::new();
        }
        self.docs
            .get(collection)
            .map(|docs| docs.iter().filter(|d| filter.matches(d)).collect())
            .unwrap_or_default()
    }

    fn first_mut(&mut self, collection: &str, filter: &Filter) -> Option<&mut Document> {
        if filter.is_nothing() {
            return None;
        }
        self.docs
            .get_mut(collection)?
            .iter_mut()
            .find(|d| filter.matches(d))
    }
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<Collections>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn find_one(&self, collection: &str, filter: &Filter) -> StoreResult<Option<Document>> {
        let guard = self.inner.read().await;
        Ok(guard.matching(collection, filter).first().map(|d| (*d).clone()))
    }

    async fn find(
        &self,
        collection: &str,
        filter: &Filter,
        sort: &Sort,
    ) -> StoreResult<Vec<Document>> {
        let guard = self.inner.read().await;
        let mut docs: Vec<Document> = guard
            .matching(collection, filter)
            .into_iter()
            .cloned()
            .collect();
        docs.sort_by(|a, b| sort.compare(a, b));
        Ok(docs)
    }

    async fn count(&self, collection: &str, filter: &Filter) -> StoreResult<u64> {
        let guard = self.inner.read().await;
        Ok(guard.matching(collection, filter).len() as u64)
    }

    async fn aggregate(&self, collection: &str, query: &FacetQuery) -> StoreResult<Page<Document>> {
        // Count and page come from the same read guard, so they agree.
        let guard = self.inner.read().await;
        let mut matched = guard.matching(collection, &query.filter);
        let total_docs = matched.len() as u64;
        matched.sort_by(|a, b| query.sort.compare(a, b));
        let docs = matched
            .into_iter()
            .skip(query.pagination.skip() as usize)
            .take(query.pagination.limit() as usize)
            .cloned()
            .collect();
        Ok(Page { total_docs, docs })
    }

    async fn insert_one(&self, collection: &str, doc: Document) -> StoreResult<Document> {
        let mut guard = self.inner.write().await;
        let doc = guard.stamp(doc);
        guard
            .docs
            .entry(collection.to_string())
            .or_default()
            .push(doc.clone());
        Ok(doc)
    }

    async fn insert_many(
        &self,
        collection: &str,
        docs: Vec<Document>,
    ) -> StoreResult<Vec<Document>> {
        let mut guard = self.inner.write().await;
        let stamped: Vec<Document> = docs.into_iter().map(|d| guard.stamp(d)).collect();
        guard
            .docs
            .entry(collection.to_string())
            .or_default()
            .extend(stamped.iter().cloned());
        Ok(stamped)
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: &Filter,
        patch: &Patch,
    ) -> StoreResult<Option<Document>> {
        let mut guard = self.inner.write().await;
        let Some(doc) = guard.first_mut(collection, filter) else {
            return Ok(None);
        };
        patch.apply(&mut doc.fields);
        doc.meta.updated_at = Utc::now();
        doc.meta.revision += 1;
        Ok(Some(doc.clone()))
    }

    async fn soft_delete(
        &self,
        collection: &str,
        filter: &Filter,
        actor: Option<Uuid>,
    ) -> StoreResult<Option<Document>> {
        let mut guard = self.inner.write().await;
        let Some(doc) = guard.first_mut(collection, filter) else {
            return Ok(None);
        };
        let previous = doc.clone();
        if !doc.meta.deleted {
            doc.meta.mark_deleted(actor, Utc::now());
        }
        Ok(Some(previous))
    }

    async fn restore(&self, collection: &str, filter: &Filter) -> StoreResult<Option<Document>> {
        let mut guard = self.inner.write().await;
        let Some(doc) = guard.first_mut(collection, filter) else {
            return Ok(None);
        };
        if doc.meta.deleted {
            doc.meta.clear_deleted();
        }
        Ok(Some(doc.clone()))
    }

    async fn health_check(&self) -> StoreResult<()> {
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{Direction, Pagination};
    use serde_json::{json, Map, Value};

    fn doc(body: Value) -> Document {
        Document::new(None, body.as_object().cloned().unwrap_or_else(Map::new))
    }

    #[tokio::test]
    async fn test_insert_assigns_increasing_seq() {
        let store = MemoryStore::new();
        let a = store.insert_one("c", doc(json!({}))).await.unwrap();
        let many = store
            .insert_many("c", vec![doc(json!({})), doc(json!({}))])
            .await
            .unwrap();
        assert!(a.meta.seq < many[0].meta.seq);
        assert!(many[0].meta.seq < many[1].meta.seq);
    }

    #[tokio::test]
    async fn test_aggregate_counts_and_pages_together() {
        let store = MemoryStore::new();
        for n in 0..5 {
            store.insert_one("c", doc(json!({ "n": n }))).await.unwrap();
        }
        let query = FacetQuery {
            filter: Filter::all(),
            sort: Sort::by("n", Direction::Desc),
            pagination: Pagination::new(1, 2, 10).unwrap(),
        };
        let page = store.aggregate("c", &query).await.unwrap();
        assert_eq!(page.total_docs, 5);
        let ns: Vec<_> = page.docs.iter().map(|d| d.fields["n"].clone()).collect();
        assert_eq!(ns, vec![json!(3), json!(2)]);
    }

    #[tokio::test]
    async fn test_soft_delete_returns_previous_state_once() {
        let store = MemoryStore::new();
        let d = store.insert_one("c", doc(json!({}))).await.unwrap();
        let actor = Uuid::new_v4();

        let first = store
            .soft_delete("c", &Filter::by_id(d.id()), Some(actor))
            .await
            .unwrap()
            .unwrap();
        assert!(!first.meta.deleted);

        let second = store
            .soft_delete("c", &Filter::by_id(d.id()), Some(Uuid::new_v4()))
            .await
            .unwrap()
            .unwrap();
        assert!(second.meta.deleted);
        assert_eq!(second.meta.deleted_by, Some(actor));
    }

    #[tokio::test]
    async fn test_update_bumps_revision() {
        let store = MemoryStore::new();
        let d = store.insert_one("c", doc(json!({"a": 1}))).await.unwrap();
        let updated = store
            .update_one("c", &Filter::by_id(d.id()), &Patch::default().set("a", 2))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.fields["a"], json!(2));
        assert_eq!(updated.meta.revision, d.meta.revision + 1);
        assert!(updated.meta.updated_at >= d.meta.updated_at);
    }

    #[tokio::test]
    async fn test_collections_are_isolated() {
        let store = MemoryStore::new();
        store.insert_one("a", doc(json!({}))).await.unwrap();
        assert_eq!(store.count("b", &Filter::all()).await.unwrap(), 0);
    }
}
