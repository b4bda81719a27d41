//! Permission administration.
//!
//! The permission ↔ role link is stored on both sides (`permission.roles`,
//! `role.permissions`). Every mutation commits to the store first, then refreshes
//! the cache entry of each record it touched.

use serde_json::{Map, Value};
use tracing::{error, info};
use uuid::Uuid;

use super::{parse_body, BaseService, ListQuery, ServiceError, ServiceResult};
use crate::cache::PermissionCache;
use crate::models::record::body_fields;
use crate::models::{Permission, Record, Role};
use crate::query::{Filter, Pagination, Sort};
use crate::store::{Page, Patch, StoreError};

#[derive(Clone)]
pub struct PermissionService {
    permissions: BaseService<Permission>,
    roles: BaseService<Role>,
    cache: PermissionCache,
}

impl PermissionService {
    pub fn new(
        permissions: BaseService<Permission>,
        roles: BaseService<Role>,
        cache: PermissionCache,
    ) -> Self {
        Self {
            permissions,
            roles,
            cache,
        }
    }

    /// Live permissions, optionally only those named exactly `name`.
    pub async fn list(
        &self,
        name: Option<&str>,
        pagination: Pagination,
        sort: Sort,
    ) -> ServiceResult<Page<Record<Permission>>> {
        let filter = match name {
            Some(name) => Filter::eq("name", name),
            None => Filter::all(),
        };
        self.permissions
            .paginate(&ListQuery {
                filter,
                pagination,
                sort,
                include_deleted: false,
            })
            .await
    }

    /// Served from the cache.
    pub async fn get(&self, id: Uuid) -> ServiceResult<Record<Permission>> {
        self.cache
            .get_permission(id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("permission {id}")))
    }

    pub async fn create(&self, actor: Uuid, input: Permission) -> ServiceResult<Record<Permission>> {
        self.ensure_unique(&input, None).await?;
        self.ensure_roles_exist(&input.roles).await?;

        let created = self.permissions.create(&input, Some(actor)).await?;
        let linked = self.link_roles(created.id(), &created.data.roles, &[]).await;
        self.cache.cache_permission(&created).await;
        linked?;
        info!(id = %created.id(), name = %created.data.name, "permission created");
        Ok(created)
    }

    /// Applies a partial body. `roles`, when present, replaces the role set and the
    /// role side of each link is brought in line.
    pub async fn update(&self, id: Uuid, body: Map<String, Value>) -> ServiceResult<Record<Permission>> {
        let current = self.permissions.get(id).await?;
        let patch = Patch::from_body(body);
        if patch.is_empty() {
            return Ok(current);
        }

        let mut preview = body_fields(&current.data).map_err(StoreError::from)?;
        patch.apply(&mut preview);
        let next: Permission = parse_body(Value::Object(preview))?;
        self.ensure_unique(&next, Some(id)).await?;

        let added: Vec<Uuid> = next
            .roles
            .iter()
            .filter(|r| !current.data.roles.contains(r))
            .copied()
            .collect();
        let removed: Vec<Uuid> = current
            .data
            .roles
            .iter()
            .filter(|r| !next.roles.contains(r))
            .copied()
            .collect();
        self.ensure_roles_exist(&added).await?;

        let updated = self
            .permissions
            .update_one(&Filter::by_id(id), &patch)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("permission {id}")))?;
        let linked = self.link_roles(id, &added, &removed).await;
        self.cache.cache_permission(&updated).await;
        linked?;
        Ok(updated)
    }

    pub async fn add_role(&self, id: Uuid, role_id: Uuid) -> ServiceResult<Record<Permission>> {
        self.permissions.get(id).await?;
        self.ensure_roles_exist(&[role_id]).await?;
        let updated = self.attach_permission_side(id, role_id).await?;
        self.link_roles(id, &[role_id], &[]).await?;
        Ok(updated)
    }

    pub async fn remove_role(&self, id: Uuid, role_id: Uuid) -> ServiceResult<Record<Permission>> {
        self.permissions.get(id).await?;
        self.ensure_roles_exist(&[role_id]).await?;
        let updated = self.detach_permission_side(id, role_id).await?;
        self.link_roles(id, &[], &[role_id]).await?;
        Ok(updated)
    }

    /// Soft-deletes and returns the previous state. Roles lose the link; the cache
    /// entry is replaced by an absent marker.
    pub async fn delete(&self, id: Uuid, actor: Uuid) -> ServiceResult<Record<Permission>> {
        let previous = self.permissions.delete(&Filter::by_id(id), Some(actor)).await?;
        let unlinked = if previous.meta.deleted {
            Ok(())
        } else {
            self.link_roles(id, &[], &previous.data.roles).await
        };
        self.cache.evict_permission(id).await;
        unlinked?;
        if !previous.meta.deleted {
            info!(%id, "permission deleted");
        }
        Ok(previous)
    }

    // ────────────────────────────────────────────────────────────────────────
    // Link maintenance, shared with RoleService
    // ────────────────────────────────────────────────────────────────────────

    /// Brings the role side of each link in line once the permission side has
    /// committed. Every role is attempted. On any failure the entries of all roles
    /// involved are dropped, so the next read reloads them from the store.
    async fn link_roles(&self, id: Uuid, added: &[Uuid], removed: &[Uuid]) -> ServiceResult<()> {
        let mut failure = None;
        for role_id in added {
            if let Err(e) = self.attach_role_side(*role_id, id).await {
                failure.get_or_insert(e);
            }
        }
        for role_id in removed {
            if let Err(e) = self.detach_role_side(*role_id, id).await {
                failure.get_or_insert(e);
            }
        }
        let Some(e) = failure else {
            return Ok(());
        };
        error!(permission_id = %id, "role links left inconsistent: {e}");
        for role_id in added.iter().chain(removed) {
            self.cache.drop_role(*role_id).await;
        }
        Err(e)
    }

    pub(super) async fn attach_permission_side(
        &self,
        id: Uuid,
        role_id: Uuid,
    ) -> ServiceResult<Record<Permission>> {
        let patch = Patch::default().add_to_set("roles", role_id.to_string());
        self.patch_permission(id, &patch).await
    }

    pub(super) async fn detach_permission_side(
        &self,
        id: Uuid,
        role_id: Uuid,
    ) -> ServiceResult<Record<Permission>> {
        let patch = Patch::default().pull("roles", role_id.to_string());
        self.patch_permission(id, &patch).await
    }

    pub(super) async fn attach_role_side(&self, role_id: Uuid, id: Uuid) -> ServiceResult<()> {
        let patch = Patch::default().add_to_set("permissions", id.to_string());
        self.patch_role(role_id, &patch).await
    }

    pub(super) async fn detach_role_side(&self, role_id: Uuid, id: Uuid) -> ServiceResult<()> {
        let patch = Patch::default().pull("permissions", id.to_string());
        self.patch_role(role_id, &patch).await
    }

    pub(super) async fn ensure_permissions_exist(&self, ids: &[Uuid]) -> ServiceResult<()> {
        for id in ids {
            if !self.permissions.exists(*id).await? {
                return Err(ServiceError::NotFound(format!("permission {id}")));
            }
        }
        Ok(())
    }

    async fn patch_permission(&self, id: Uuid, patch: &Patch) -> ServiceResult<Record<Permission>> {
        let updated = self
            .permissions
            .update_one(&Filter::by_id(id), patch)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("permission {id}")))?;
        self.cache.cache_permission(&updated).await;
        Ok(updated)
    }

    /// A role deleted in the meantime is skipped: there is no link left to keep.
    async fn patch_role(&self, role_id: Uuid, patch: &Patch) -> ServiceResult<()> {
        if let Some(updated) = self.roles.update_one(&Filter::by_id(role_id), patch).await? {
            self.cache.cache_role(&updated).await;
        }
        Ok(())
    }

    async fn ensure_roles_exist(&self, ids: &[Uuid]) -> ServiceResult<()> {
        for id in ids {
            if !self.roles.exists(*id).await? {
                return Err(ServiceError::NotFound(format!("role {id}")));
            }
        }
        Ok(())
    }

    /// Names are unique, and so is each (resource, action, scope) grant.
    async fn ensure_unique(&self, candidate: &Permission, except: Option<Uuid>) -> ServiceResult<()> {
        let same_name = Filter::eq("name", candidate.name.as_str());
        let same_grant = Filter::eq("resource", candidate.resource.as_str())
            .and(&Filter::eq("action", candidate.action.as_str()))
            .and(&Filter::eq("scope", serde_json::to_value(candidate.scope).map_err(StoreError::from)?));

        for (filter, what) in [(same_name, "name"), (same_grant, "grant")] {
            let clashes = self.permissions.get_all(&filter, &Sort::default()).await?;
            if clashes.iter().any(|p| Some(p.id()) != except) {
                return Err(ServiceError::AlreadyExists(format!("permission with this {what}")));
            }
        }
        Ok(())
    }
}
