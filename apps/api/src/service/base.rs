//! Generic per-entity service.
//!
//! Unscoped operations (`find_one`, `get_all`, `create`, `update_one`, `delete`, ...)
//! are for system and admin code paths. Everything a principal triggers goes through
//! the scoped ones, which merge the RBAC filter into every read and write.

#![allow(dead_code)]

use std::marker::PhantomData;
use std::sync::Arc;

use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use super::{DisclosurePolicy, ServiceError, ServiceResult};
use crate::models::record::body_fields;
use crate::models::{Document, Entity, Record, Scope};
use crate::query::{Filter, Pagination, Sort};
use crate::rbac::{Principal, RbacResolver, READ, WRITE};
use crate::store::{
    DocumentStore, Page, PaginatedAggregator, Patch, SoftDeleteCollection, StoreError,
};

/// What a list endpoint asks for. `filter` is the endpoint's own filter, before
/// any scoping.
#[derive(Debug, Clone, Default)]
pub struct ListQuery {
    pub filter: Filter,
    pub pagination: Pagination,
    pub sort: Sort,
    pub include_deleted: bool,
}

pub struct BaseService<T> {
    collection: SoftDeleteCollection,
    aggregator: PaginatedAggregator,
    rbac: RbacResolver,
    disclosure: DisclosurePolicy,
    _entity: PhantomData<fn() -> T>,
}

impl<T> Clone for BaseService<T> {
    fn clone(&self) -> Self {
        Self {
            collection: self.collection.clone(),
            aggregator: self.aggregator,
            rbac: self.rbac.clone(),
            disclosure: self.disclosure,
            _entity: PhantomData,
        }
    }
}

fn decode<T: Entity>(doc: Document) -> ServiceResult<Record<T>> {
    doc.into_record()
        .map_err(|e| ServiceError::from(StoreError::from(e)))
}

impl<T: Entity> BaseService<T> {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        aggregator: PaginatedAggregator,
        rbac: RbacResolver,
        disclosure: DisclosurePolicy,
    ) -> Self {
        Self {
            collection: SoftDeleteCollection::new(store, T::COLLECTION),
            aggregator,
            rbac,
            disclosure,
            _entity: PhantomData,
        }
    }

    pub fn aggregator(&self) -> &PaginatedAggregator {
        &self.aggregator
    }

    // ────────────────────────────────────────────────────────────────────────
    // Unscoped
    // ────────────────────────────────────────────────────────────────────────

    pub async fn find_one(&self, filter: &Filter) -> ServiceResult<Option<Record<T>>> {
        self.collection
            .find_one(filter)
            .await?
            .map(decode::<T>)
            .transpose()
    }

    pub async fn get_all(&self, filter: &Filter, sort: &Sort) -> ServiceResult<Vec<Record<T>>> {
        self.collection
            .find(filter, sort)
            .await?
            .into_iter()
            .map(decode::<T>)
            .collect()
    }

    /// Live record by id, or `NotFound`.
    pub async fn get(&self, id: Uuid) -> ServiceResult<Record<T>> {
        self.find_one(&Filter::by_id(id))
            .await?
            .ok_or_else(|| not_found::<T>(id))
    }

    pub async fn exists(&self, id: Uuid) -> ServiceResult<bool> {
        Ok(self.collection.count(&Filter::by_id(id)).await? > 0)
    }

    /// Paginated list without RBAC scoping.
    pub async fn paginate(&self, query: &ListQuery) -> ServiceResult<Page<Record<T>>> {
        let source = if query.include_deleted {
            self.collection.with_deleted()
        } else {
            self.collection.clone()
        };
        let page = self
            .aggregator
            .find(&source, &query.filter, query.pagination, &query.sort)
            .await?;
        page.try_map(decode::<T>)
    }

    pub async fn create(&self, data: &T, actor: Option<Uuid>) -> ServiceResult<Record<T>> {
        let fields = body_fields(data).map_err(StoreError::from)?;
        decode(self.collection.insert_one(fields, actor).await?)
    }

    pub async fn create_many(&self, data: &[T], actor: Option<Uuid>) -> ServiceResult<Vec<Record<T>>> {
        let bodies = data
            .iter()
            .map(body_fields)
            .collect::<Result<Vec<_>, _>>()
            .map_err(StoreError::from)?;
        self.collection
            .insert_many(bodies, actor)
            .await?
            .into_iter()
            .map(decode::<T>)
            .collect()
    }

    /// Patches the first live match and returns it as updated, `None` if nothing
    /// matched.
    pub async fn update_one(&self, filter: &Filter, patch: &Patch) -> ServiceResult<Option<Record<T>>> {
        self.collection
            .update_one(filter, patch)
            .await?
            .map(decode::<T>)
            .transpose()
    }

    /// Soft-deletes the first match and returns its previous state. Idempotent.
    pub async fn delete(&self, filter: &Filter, actor: Option<Uuid>) -> ServiceResult<Record<T>> {
        decode(self.collection.delete(filter, actor).await?)
    }

    // ────────────────────────────────────────────────────────────────────────
    // Scoped
    // ────────────────────────────────────────────────────────────────────────

    /// The endpoint's filter intersected with the principal's read scope.
    ///
    /// `include_deleted` is honoured only for principals reading with scope `all`;
    /// for everyone else it is ignored rather than refused.
    pub async fn find(&self, principal: &Principal, query: ListQuery) -> ServiceResult<Page<Record<T>>> {
        let scopes = self.rbac.grants(principal, T::COLLECTION, READ).await?;
        let scope = scopes.to_filter(principal, T::COLLECTION);
        let source = if query.include_deleted && scopes.contains(Scope::All) {
            self.collection.with_deleted()
        } else {
            if query.include_deleted {
                debug!(user_id = %principal.user_id, collection = T::COLLECTION, "include_deleted ignored");
            }
            self.collection.clone()
        };
        let filter = query.filter.and(&scope);
        let page = self
            .aggregator
            .find(&source, &filter, query.pagination, &query.sort)
            .await?;
        page.try_map(decode::<T>)
    }

    pub async fn find_by_id(&self, principal: &Principal, id: Uuid) -> ServiceResult<Record<T>> {
        let scope = self.rbac.resolve(principal, T::COLLECTION).await?;
        match self.collection.find_one(&Filter::by_id(id).and(&scope)).await? {
            Some(doc) => decode(doc),
            None => Err(self.out_of_scope(id, &self.collection).await?),
        }
    }

    /// Inserts on behalf of the principal. The new record must fall inside the
    /// principal's write scope.
    pub async fn create_scoped(&self, principal: &Principal, data: &T) -> ServiceResult<Record<T>> {
        let scope = self
            .rbac
            .resolve_for(principal, T::COLLECTION, WRITE)
            .await?;
        let fields = body_fields(data).map_err(StoreError::from)?;
        let preview = Document::new(Some(principal.user_id), fields.clone());
        if !scope.matches(&preview) {
            return Err(ServiceError::Forbidden);
        }
        decode(
            self.collection
                .insert_one(fields, Some(principal.user_id))
                .await?,
        )
    }

    /// Patches a record the principal may write. The patched record must still
    /// be inside the write scope and still parse as `T`.
    pub async fn update_by_id(
        &self,
        principal: &Principal,
        id: Uuid,
        patch: &Patch,
    ) -> ServiceResult<Record<T>> {
        let scope = self
            .rbac
            .resolve_for(principal, T::COLLECTION, WRITE)
            .await?;
        let target = Filter::by_id(id).and(&scope);
        let Some(mut preview) = self.collection.find_one(&target).await? else {
            return Err(self.out_of_scope(id, &self.collection).await?);
        };
        patch.apply(&mut preview.fields);
        if !scope.matches(&preview) {
            return Err(ServiceError::Forbidden);
        }
        serde_json::from_value::<T>(Value::Object(preview.fields))
            .map_err(|e| ServiceError::Validation(e.to_string()))?;

        match self.collection.update_one(&target, patch).await? {
            Some(doc) => decode(doc),
            None => Err(not_found::<T>(id)),
        }
    }

    /// Soft-deletes a record the principal may write and returns its previous
    /// state. Deleting an already-deleted record succeeds.
    pub async fn delete_by_id(&self, principal: &Principal, id: Uuid) -> ServiceResult<Record<T>> {
        let scope = self
            .rbac
            .resolve_for(principal, T::COLLECTION, WRITE)
            .await?;
        match self
            .collection
            .delete(&Filter::by_id(id).and(&scope), Some(principal.user_id))
            .await
        {
            Ok(previous) => decode(previous),
            Err(StoreError::NotFound(_)) => {
                Err(self.out_of_scope(id, &self.collection.with_deleted()).await?)
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn restore_by_id(&self, principal: &Principal, id: Uuid) -> ServiceResult<Record<T>> {
        let scope = self
            .rbac
            .resolve_for(principal, T::COLLECTION, WRITE)
            .await?;
        match self.collection.restore(&Filter::by_id(id).and(&scope)).await {
            Ok(doc) => decode(doc),
            Err(StoreError::NotFound(_)) => {
                Err(self.out_of_scope(id, &self.collection.with_deleted()).await?)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// The error for an id the scoped lookup did not reach. Under `Conceal` this is
    /// always `NotFound`; under `Disclose` an existing record yields `Forbidden`.
    async fn out_of_scope(&self, id: Uuid, source: &SoftDeleteCollection) -> ServiceResult<ServiceError> {
        if self.disclosure == DisclosurePolicy::Conceal {
            return Ok(not_found::<T>(id));
        }
        if source.count(&Filter::by_id(id)).await? > 0 {
            Ok(ServiceError::Forbidden)
        } else {
            Ok(not_found::<T>(id))
        }
    }
}

fn not_found<T: Entity>(id: Uuid) -> ServiceError {
    ServiceError::NotFound(format!("{} {id}", T::COLLECTION))
}
