use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::record::Entity;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Resume {
    pub company_id: Uuid,
    pub firstname: String,
    pub lastname: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub mobile: Option<String>,
    #[serde(default = "default_status")]
    pub status: String,
    #[serde(default)]
    pub min_salary: Option<i64>,
    #[serde(default)]
    pub max_salary: Option<i64>,
}

fn default_status() -> String {
    "pending".to_string()
}

impl Entity for Resume {
    const COLLECTION: &'static str = "resumes";
}
