use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

use crate::query::sort::SortError;
use crate::query::PaginationError;
use crate::store::StoreError;

pub mod base;
pub mod permission;
pub mod role;
pub mod user;

pub use base::{BaseService, ListQuery};
pub use permission::PermissionService;
pub use role::RoleService;
pub use user::UserService;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("forbidden")]
    Forbidden,
    #[error("invalid filter: {0}")]
    InvalidFilter(String),
    #[error("{0} already exists")]
    AlreadyExists(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),
}

impl From<StoreError> for ServiceError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(what) => ServiceError::NotFound(what),
            StoreError::Conflict(msg) => ServiceError::Conflict(msg),
            StoreError::Unavailable(msg) => ServiceError::StoreUnavailable(msg),
            StoreError::Serialization(e) => {
                ServiceError::StoreUnavailable(format!("stored document unreadable: {e}"))
            }
        }
    }
}

impl From<PaginationError> for ServiceError {
    fn from(e: PaginationError) -> Self {
        ServiceError::InvalidFilter(e.to_string())
    }
}

impl From<SortError> for ServiceError {
    fn from(e: SortError) -> Self {
        ServiceError::InvalidFilter(e.to_string())
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;

/// What a caller learns when it addresses a record outside its scope.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DisclosurePolicy {
    /// Out of scope looks exactly like absent: `NotFound`.
    #[default]
    Conceal,
    /// Out of scope is reported as `Forbidden`.
    Disclose,
}

impl DisclosurePolicy {
    pub fn from_flag(disclose: bool) -> Self {
        if disclose {
            DisclosurePolicy::Disclose
        } else {
            DisclosurePolicy::Conceal
        }
    }
}

/// Parses a request body into an entity, reporting serde's message as a
/// validation error.
pub fn parse_body<T: DeserializeOwned>(body: Value) -> ServiceResult<T> {
    serde_json::from_value(body).map_err(|e| ServiceError::Validation(e.to_string()))
}
