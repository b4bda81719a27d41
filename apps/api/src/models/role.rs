use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::record::Entity;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Role {
    pub name: String,
    #[serde(default)]
    pub permissions: Vec<Uuid>,
}

impl Entity for Role {
    const COLLECTION: &'static str = "roles";
}
