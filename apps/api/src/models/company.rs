use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::record::Entity;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Company {
    pub name: String,
    #[serde(default)]
    pub logo: Option<String>,
    pub manager_id: Uuid,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

impl Entity for Company {
    const COLLECTION: &'static str = "companies";
}
