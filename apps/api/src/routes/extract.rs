use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use serde::Deserialize;
use tracing::debug;
use uuid::Uuid;

use crate::errors::AppError;
use crate::query::pagination::DEFAULT_PAGE_SIZE;
use crate::query::{Filter, Sort};
use crate::rbac::Principal;
use crate::service::ListQuery;
use crate::state::AppState;

/// Set by the authentication gateway in front of this service.
pub const USER_ID_HEADER: &str = "x-user-id";

/// The caller, rebuilt from the user record. Unknown, deleted and banned users
/// are all rejected as unauthenticated.
#[async_trait]
impl FromRequestParts<AppState> for Principal {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| Uuid::parse_str(v.trim()).ok())
            .ok_or(AppError::Unauthorized)?;

        match state.principals.load(user_id).await? {
            Some(principal) => Ok(principal),
            None => {
                debug!(%user_id, "rejected principal");
                Err(AppError::Unauthorized)
            }
        }
    }
}

/// `?page=2&size=50&sort=-created_at,name&include_deleted=true`
#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub page: Option<u64>,
    pub size: Option<u64>,
    pub sort: Option<String>,
    #[serde(default)]
    pub include_deleted: bool,
}

impl ListParams {
    pub fn into_query(self, state: &AppState, filter: Filter) -> Result<ListQuery, AppError> {
        let pagination = state
            .aggregator
            .page(self.page.unwrap_or(1), self.size.unwrap_or(DEFAULT_PAGE_SIZE))
            .map_err(|e| AppError::InvalidFilter(e.to_string()))?;
        let sort = match self.sort.as_deref() {
            Some(raw) => Sort::parse(raw).map_err(|e| AppError::InvalidFilter(e.to_string()))?,
            None => Sort::default(),
        };
        Ok(ListQuery {
            filter,
            pagination,
            sort,
            include_deleted: self.include_deleted,
        })
    }
}

/// Admin endpoints: the caller must hold `action` on `resource`, at any scope.
pub async fn require(
    state: &AppState,
    principal: &Principal,
    resource: &str,
    action: &str,
) -> Result<(), AppError> {
    if state.rbac.is_allowed(principal, resource, action).await? {
        Ok(())
    } else {
        debug!(user_id = %principal.user_id, resource, action, "admin action refused");
        Err(AppError::Forbidden)
    }
}
