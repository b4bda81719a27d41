use tracing::info;
use uuid::Uuid;

use super::{BaseService, ServiceError, ServiceResult};
use crate::models::{Record, Role, User};
use crate::query::Filter;
use crate::store::Patch;

/// Role assignment on users. Principals are rebuilt from the user record on every
/// request, so there is no cache entry to refresh here.
#[derive(Clone)]
pub struct UserService {
    users: BaseService<User>,
    roles: BaseService<Role>,
}

impl UserService {
    pub fn new(users: BaseService<User>, roles: BaseService<Role>) -> Self {
        Self { users, roles }
    }

    pub async fn add_role(&self, user_id: Uuid, role_id: Uuid) -> ServiceResult<Record<User>> {
        if !self.roles.exists(role_id).await? {
            return Err(ServiceError::NotFound(format!("role {role_id}")));
        }
        let patch = Patch::default().add_to_set("roles", role_id.to_string());
        let updated = self.patch(user_id, &patch).await?;
        info!(%user_id, %role_id, "role assigned");
        Ok(updated)
    }

    pub async fn remove_role(&self, user_id: Uuid, role_id: Uuid) -> ServiceResult<Record<User>> {
        let patch = Patch::default().pull("roles", role_id.to_string());
        let updated = self.patch(user_id, &patch).await?;
        info!(%user_id, %role_id, "role unassigned");
        Ok(updated)
    }

    async fn patch(&self, user_id: Uuid, patch: &Patch) -> ServiceResult<Record<User>> {
        self.users
            .update_one(&Filter::by_id(user_id), patch)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("user {user_id}")))
    }
}
