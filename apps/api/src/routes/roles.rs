use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use super::extract::require;
use crate::errors::AppError;
use crate::models::{Entity, Record, Role, User};
use crate::rbac::{Principal, MANAGE};
use crate::service::parse_body;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct PermissionLink {
    pub permission_id: Uuid,
}

#[derive(Deserialize)]
pub struct RoleAssignment {
    pub role_id: Uuid,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(handle_create))
        .route("/:id", get(handle_get).delete(handle_delete))
        .route("/:id/permissions", post(handle_attach_permission))
        .route(
            "/:id/permissions/:permission_id",
            delete(handle_detach_permission),
        )
}

/// Role assignment lives under users but is guarded like the rest of role admin.
pub fn user_router() -> Router<AppState> {
    Router::new()
        .route("/:id/roles", post(handle_assign))
        .route("/:id/roles/:role_id", delete(handle_unassign))
}

async fn guard(state: &AppState, principal: &Principal) -> Result<(), AppError> {
    require(state, principal, Role::COLLECTION, MANAGE).await
}

/// POST /api/v1/roles
pub async fn handle_create(
    State(state): State<AppState>,
    principal: Principal,
    Json(body): Json<Value>,
) -> Result<(StatusCode, Json<Record<Role>>), AppError> {
    guard(&state, &principal).await?;
    let input: Role = parse_body(body)?;
    let created = state.roles().create(principal.user_id, input).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// GET /api/v1/roles/:id
pub async fn handle_get(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<Uuid>,
) -> Result<Json<Record<Role>>, AppError> {
    guard(&state, &principal).await?;
    Ok(Json(state.roles().get(id).await?))
}

/// DELETE /api/v1/roles/:id
pub async fn handle_delete(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<Uuid>,
) -> Result<Json<Record<Role>>, AppError> {
    guard(&state, &principal).await?;
    Ok(Json(state.roles().delete(id, principal.user_id).await?))
}

/// POST /api/v1/roles/:id/permissions
pub async fn handle_attach_permission(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<Uuid>,
    Json(link): Json<PermissionLink>,
) -> Result<Json<Record<Role>>, AppError> {
    guard(&state, &principal).await?;
    Ok(Json(
        state.roles().attach_permission(id, link.permission_id).await?,
    ))
}

/// DELETE /api/v1/roles/:id/permissions/:permission_id
pub async fn handle_detach_permission(
    State(state): State<AppState>,
    principal: Principal,
    Path((id, permission_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<Record<Role>>, AppError> {
    guard(&state, &principal).await?;
    Ok(Json(state.roles().detach_permission(id, permission_id).await?))
}

/// POST /api/v1/users/:id/roles
pub async fn handle_assign(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<Uuid>,
    Json(assignment): Json<RoleAssignment>,
) -> Result<Json<Record<User>>, AppError> {
    guard(&state, &principal).await?;
    Ok(Json(state.users().add_role(id, assignment.role_id).await?))
}

/// DELETE /api/v1/users/:id/roles/:role_id
pub async fn handle_unassign(
    State(state): State<AppState>,
    principal: Principal,
    Path((id, role_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<Record<User>>, AppError> {
    guard(&state, &principal).await?;
    Ok(Json(state.users().remove_role(id, role_id).await?))
}
