use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::record::Entity;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub firstname: String,
    pub lastname: String,
    pub mobile: String,
    #[serde(default)]
    pub roles: Vec<Uuid>,
    #[serde(default)]
    pub company_ids: Vec<Uuid>,
    #[serde(default)]
    pub is_banned: bool,
}

impl Entity for User {
    const COLLECTION: &'static str = "users";
}
