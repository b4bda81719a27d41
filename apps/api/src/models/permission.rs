use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::record::Entity;

/// How far a grant reaches within its resource.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    /// Every record of the resource.
    All,
    /// Records whose `company_id` is one of the principal's companies.
    Company,
    /// Records the principal created.
    #[default]
    Own,
}

/// A named grant of `action` on `resource`, held by the roles listed in `roles`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Permission {
    pub name: String,
    pub action: String,
    pub resource: String,
    #[serde(default)]
    pub scope: Scope,
    #[serde(default)]
    pub roles: Vec<Uuid>,
}

impl Entity for Permission {
    const COLLECTION: &'static str = "permissions";
}

impl Permission {
    pub fn grants(&self, resource: &str, action: &str) -> bool {
        self.resource == resource && self.action == action
    }

    pub fn held_by(&self, role_id: Uuid) -> bool {
        self.roles.contains(&role_id)
    }
}
