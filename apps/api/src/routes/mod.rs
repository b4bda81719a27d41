pub mod extract;
pub mod health;
pub mod permissions;
pub mod records;
pub mod roles;

use axum::{routing::get, Router};

use crate::models::{Company, Resume};
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // RBAC administration
        .nest("/api/v1/permissions", permissions::router())
        .nest("/api/v1/roles", roles::router())
        .nest("/api/v1/users", roles::user_router())
        // Scoped business records
        .nest("/api/v1/resumes", records::router::<Resume>())
        .nest("/api/v1/companies", records::router::<Company>())
        .with_state(state)
}
