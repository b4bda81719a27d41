//! Principal → scoping filter.
//!
//! The filter is the union of what every held grant allows. It is only ever merged
//! into an endpoint's own filter, so it can narrow a query but never widen it.

#![allow(dead_code)]

use std::collections::HashSet;

use tracing::debug;

use super::{Principal, READ};
use crate::cache::PermissionCache;
use crate::models::{Company, Entity, Permission, Record, Scope};
use crate::query::{Filter, Predicate};
use crate::store::StoreResult;

/// The scopes a principal holds for one (resource, action) pair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScopeSet {
    all: bool,
    company: bool,
    own: bool,
}

impl ScopeSet {
    pub fn insert(&mut self, scope: Scope) {
        match scope {
            Scope::All => self.all = true,
            Scope::Company => self.company = true,
            Scope::Own => self.own = true,
        }
    }

    pub fn contains(&self, scope: Scope) -> bool {
        match scope {
            Scope::All => self.all,
            Scope::Company => self.company,
            Scope::Own => self.own,
        }
    }

    pub fn is_empty(&self) -> bool {
        !(self.all || self.company || self.own)
    }

    /// `all` wins outright. Otherwise each held scope contributes one alternative
    /// and no alternative at all matches nothing.
    pub fn to_filter(&self, principal: &Principal, resource: &str) -> Filter {
        if self.all {
            return Filter::all();
        }
        let mut alternatives = Vec::with_capacity(2);
        if self.company && !principal.company_ids.is_empty() {
            alternatives.push(Predicate::is_in(
                company_field(resource),
                principal.company_ids.iter().map(|id| id.to_string()),
            ));
        }
        if self.own {
            alternatives.push(Predicate::eq("created_by", principal.user_id.to_string()));
        }
        Filter::any_of(alternatives)
    }
}

/// Companies are scoped by their own id, everything else by `company_id`.
fn company_field(resource: &str) -> &'static str {
    if resource == Company::COLLECTION {
        "id"
    } else {
        "company_id"
    }
}

#[derive(Clone)]
pub struct RbacResolver {
    cache: PermissionCache,
}

impl RbacResolver {
    pub fn new(cache: PermissionCache) -> Self {
        Self { cache }
    }

    /// Every permission held through any of the principal's roles, each once.
    pub async fn capabilities(&self, principal: &Principal) -> StoreResult<Vec<Record<Permission>>> {
        let mut seen = HashSet::new();
        let mut held = Vec::new();
        for role_id in &principal.role_ids {
            for permission in self.cache.get_role_permissions(*role_id).await? {
                if seen.insert(permission.id()) {
                    held.push(permission);
                }
            }
        }
        Ok(held)
    }

    pub async fn grants(
        &self,
        principal: &Principal,
        resource: &str,
        action: &str,
    ) -> StoreResult<ScopeSet> {
        let mut scopes = ScopeSet::default();
        for permission in self.capabilities(principal).await? {
            if permission.data.grants(resource, action) {
                scopes.insert(permission.data.scope);
            }
        }
        debug!(user_id = %principal.user_id, resource, action, ?scopes, "resolved grants");
        Ok(scopes)
    }

    /// Read scope for `resource`.
    pub async fn resolve(&self, principal: &Principal, resource: &str) -> StoreResult<Filter> {
        self.resolve_for(principal, resource, READ).await
    }

    pub async fn resolve_for(
        &self,
        principal: &Principal,
        resource: &str,
        action: &str,
    ) -> StoreResult<Filter> {
        Ok(self
            .grants(principal, resource, action)
            .await?
            .to_filter(principal, resource))
    }

    pub async fn is_allowed(
        &self,
        principal: &Principal,
        resource: &str,
        action: &str,
    ) -> StoreResult<bool> {
        Ok(!self.grants(principal, resource, action).await?.is_empty())
    }
}
