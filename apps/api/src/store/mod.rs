#![allow(dead_code)]

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;
use uuid::Uuid;

use crate::models::record::is_reserved;
use crate::models::Document;
use crate::query::filter::values_equal;
use crate::query::{Filter, Pagination, Sort};

pub mod aggregate;
#[cfg(test)]
pub mod memory;
pub mod postgres;
pub mod soft_delete;

pub use aggregate::PaginatedAggregator;
#[cfg(test)]
pub use memory::MemoryStore;
pub use postgres::PgStore;
pub use soft_delete::SoftDeleteCollection;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("malformed document: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => StoreError::NotFound("row".to_string()),
            other => StoreError::Unavailable(other.to_string()),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// One page of a faceted query plus the total match count, taken together.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Page<T> {
    #[serde(rename = "totalDocs")]
    pub total_docs: u64,
    pub docs: Vec<T>,
}

impl<T> Page<T> {
    pub fn empty() -> Self {
        Self {
            total_docs: 0,
            docs: Vec::new(),
        }
    }

    pub fn try_map<U, E>(self, f: impl FnMut(T) -> Result<U, E>) -> Result<Page<U>, E> {
        Ok(Page {
            total_docs: self.total_docs,
            docs: self.docs.into_iter().map(f).collect::<Result<_, _>>()?,
        })
    }
}

/// Match, sort, then one window: the facet-shaped aggregation.
#[derive(Debug, Clone)]
pub struct FacetQuery {
    pub filter: Filter,
    pub sort: Sort,
    pub pagination: Pagination,
}

/// A partial update: `$set`, `$addToSet` and `$pull`. Reserved metadata fields are
/// ignored.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Patch {
    pub set: Map<String, Value>,
    pub add_to_set: Vec<(String, Value)>,
    pub pull: Vec<(String, Value)>,
}

impl Patch {
    /// `$set` of every non-reserved key in a request body.
    pub fn from_body(body: Map<String, Value>) -> Self {
        let mut patch = Self::default();
        for (k, v) in body {
            if !is_reserved(&k) {
                patch.set.insert(k, v);
            }
        }
        patch
    }

    pub fn set(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        let field = field.into();
        if !is_reserved(&field) {
            self.set.insert(field, value.into());
        }
        self
    }

    pub fn add_to_set(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.add_to_set.push((field.into(), value.into()));
        self
    }

    pub fn pull(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.pull.push((field.into(), value.into()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty() && self.add_to_set.is_empty() && self.pull.is_empty()
    }

    /// Applies the patch to a document body in place.
    pub fn apply(&self, fields: &mut Map<String, Value>) {
        for (k, v) in &self.set {
            if !is_reserved(k) {
                fields.insert(k.clone(), v.clone());
            }
        }
        for (k, v) in &self.add_to_set {
            if is_reserved(k) {
                continue;
            }
            let slot = fields
                .entry(k.clone())
                .or_insert_with(|| Value::Array(Vec::new()));
            if !slot.is_array() {
                *slot = Value::Array(Vec::new());
            }
            if let Value::Array(items) = slot {
                if !items.iter().any(|i| values_equal(i, v)) {
                    items.push(v.clone());
                }
            }
        }
        for (k, v) in &self.pull {
            if let Some(Value::Array(items)) = fields.get_mut(k) {
                items.retain(|i| !values_equal(i, v));
            }
        }
    }
}

/// Persistence boundary: an abstract document store.
///
/// Implementations apply filters exactly as given. Metadata fields compare by
/// their column type (UUID, instant, bool, integer); body fields compare as stored
/// JSON. Soft-delete visibility is the job of [`SoftDeleteCollection`], which is
/// the only thing services talk to.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn find_one(&self, collection: &str, filter: &Filter) -> StoreResult<Option<Document>>;
    async fn find(&self, collection: &str, filter: &Filter, sort: &Sort)
        -> StoreResult<Vec<Document>>;
    async fn count(&self, collection: &str, filter: &Filter) -> StoreResult<u64>;
    /// Total count and one sorted page, read together in one round trip.
    async fn aggregate(&self, collection: &str, query: &FacetQuery) -> StoreResult<Page<Document>>;

    async fn insert_one(&self, collection: &str, doc: Document) -> StoreResult<Document>;
    async fn insert_many(&self, collection: &str, docs: Vec<Document>)
        -> StoreResult<Vec<Document>>;
    /// Updates the first match (insertion order) and returns it as updated.
    async fn update_one(
        &self,
        collection: &str,
        filter: &Filter,
        patch: &Patch,
    ) -> StoreResult<Option<Document>>;
    /// Stamps the first match deleted in one atomic step and returns its state from
    /// before the call. Already-deleted matches are returned untouched.
    async fn soft_delete(
        &self,
        collection: &str,
        filter: &Filter,
        actor: Option<Uuid>,
    ) -> StoreResult<Option<Document>>;
    /// Clears the delete stamp on the first match and returns it as restored.
    async fn restore(&self, collection: &str, filter: &Filter) -> StoreResult<Option<Document>>;

    async fn health_check(&self) -> StoreResult<()>;
    fn backend_name(&self) -> &'static str;
}
