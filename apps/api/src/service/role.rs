use tracing::{error, info};
use uuid::Uuid;

use super::{BaseService, PermissionService, ServiceError, ServiceResult};
use crate::cache::PermissionCache;
use crate::models::{Record, Role};
use crate::query::{Filter, Sort};

#[derive(Clone)]
pub struct RoleService {
    roles: BaseService<Role>,
    permissions: PermissionService,
    cache: PermissionCache,
}

impl RoleService {
    pub fn new(roles: BaseService<Role>, permissions: PermissionService, cache: PermissionCache) -> Self {
        Self {
            roles,
            permissions,
            cache,
        }
    }

    pub async fn get(&self, id: Uuid) -> ServiceResult<Record<Role>> {
        self.cache
            .get_role(id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("role {id}")))
    }

    pub async fn create(&self, actor: Uuid, mut input: Role) -> ServiceResult<Record<Role>> {
        let clashes = self
            .roles
            .get_all(&Filter::eq("name", input.name.as_str()), &Sort::default())
            .await?;
        if !clashes.is_empty() {
            return Err(ServiceError::AlreadyExists(format!("role '{}'", input.name)));
        }
        input.permissions.sort();
        input.permissions.dedup();
        self.permissions
            .ensure_permissions_exist(&input.permissions)
            .await?;

        let created = self.roles.create(&input, Some(actor)).await?;
        let linked = self
            .link_permissions(created.id(), &created.data.permissions, &[])
            .await;
        self.cache.cache_role(&created).await;
        linked?;
        info!(id = %created.id(), name = %created.data.name, "role created");
        Ok(created)
    }

    pub async fn attach_permission(&self, id: Uuid, permission_id: Uuid) -> ServiceResult<Record<Role>> {
        self.permissions.add_role(permission_id, id).await?;
        self.roles.get(id).await
    }

    pub async fn detach_permission(&self, id: Uuid, permission_id: Uuid) -> ServiceResult<Record<Role>> {
        self.permissions.remove_role(permission_id, id).await?;
        self.roles.get(id).await
    }

    /// Soft-deletes and returns the previous state. Permissions lose the link and
    /// the role's cache entry is replaced by an absent marker.
    pub async fn delete(&self, id: Uuid, actor: Uuid) -> ServiceResult<Record<Role>> {
        let previous = self.roles.delete(&Filter::by_id(id), Some(actor)).await?;
        let unlinked = if previous.meta.deleted {
            Ok(())
        } else {
            self.link_permissions(id, &[], &previous.data.permissions)
                .await
        };
        self.cache.evict_role(id).await;
        unlinked?;
        if !previous.meta.deleted {
            info!(%id, "role deleted");
        }
        Ok(previous)
    }

    /// Permission side of each link, after the role side has committed. A
    /// permission deleted in the meantime has no link left to remove. On any
    /// failure the entries of all permissions involved are dropped.
    async fn link_permissions(&self, id: Uuid, added: &[Uuid], removed: &[Uuid]) -> ServiceResult<()> {
        let mut failure = None;
        for permission_id in added {
            if let Err(e) = self.permissions.attach_permission_side(*permission_id, id).await {
                failure.get_or_insert(e);
            }
        }
        for permission_id in removed {
            match self.permissions.detach_permission_side(*permission_id, id).await {
                Ok(_) | Err(ServiceError::NotFound(_)) => {}
                Err(e) => {
                    failure.get_or_insert(e);
                }
            }
        }
        let Some(e) = failure else {
            return Ok(());
        };
        error!(role_id = %id, "permission links left inconsistent: {e}");
        for permission_id in added.iter().chain(removed) {
            self.cache.drop_permission(*permission_id).await;
        }
        Err(e)
    }
}
