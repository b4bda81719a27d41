use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{Map, Value};
use uuid::Uuid;

use super::extract::{require, ListParams};
use crate::errors::AppError;
use crate::models::{Entity, Permission, Record};
use crate::query::Filter;
use crate::rbac::{Principal, MANAGE};
use crate::service::parse_body;
use crate::state::AppState;
use crate::store::Page;

#[derive(Deserialize)]
pub struct SearchQuery {
    /// Exact permission name.
    pub query: Option<String>,
}

#[derive(Deserialize)]
pub struct RoleLink {
    pub role_id: Uuid,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(handle_list).post(handle_create))
        .route(
            "/:id",
            get(handle_get).patch(handle_update).delete(handle_delete),
        )
        .route("/:id/roles", post(handle_add_role))
        .route("/:id/roles/:role_id", delete(handle_remove_role))
}

async fn guard(state: &AppState, principal: &Principal) -> Result<(), AppError> {
    require(state, principal, Permission::COLLECTION, MANAGE).await
}

/// GET /api/v1/permissions
pub async fn handle_list(
    State(state): State<AppState>,
    principal: Principal,
    Query(params): Query<ListParams>,
    Query(search): Query<SearchQuery>,
) -> Result<Json<Page<Record<Permission>>>, AppError> {
    guard(&state, &principal).await?;
    let query = params.into_query(&state, Filter::all())?;
    let page = state
        .permissions()
        .list(search.query.as_deref(), query.pagination, query.sort)
        .await?;
    Ok(Json(page))
}

/// POST /api/v1/permissions
pub async fn handle_create(
    State(state): State<AppState>,
    principal: Principal,
    Json(body): Json<Value>,
) -> Result<(StatusCode, Json<Record<Permission>>), AppError> {
    guard(&state, &principal).await?;
    let input: Permission = parse_body(body)?;
    let created = state.permissions().create(principal.user_id, input).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// GET /api/v1/permissions/:id
pub async fn handle_get(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<Uuid>,
) -> Result<Json<Record<Permission>>, AppError> {
    guard(&state, &principal).await?;
    Ok(Json(state.permissions().get(id).await?))
}

/// PATCH /api/v1/permissions/:id
pub async fn handle_update(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<Uuid>,
    Json(body): Json<Map<String, Value>>,
) -> Result<Json<Record<Permission>>, AppError> {
    guard(&state, &principal).await?;
    Ok(Json(state.permissions().update(id, body).await?))
}

/// DELETE /api/v1/permissions/:id
pub async fn handle_delete(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<Uuid>,
) -> Result<Json<Record<Permission>>, AppError> {
    guard(&state, &principal).await?;
    Ok(Json(state.permissions().delete(id, principal.user_id).await?))
}

/// POST /api/v1/permissions/:id/roles
pub async fn handle_add_role(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<Uuid>,
    Json(link): Json<RoleLink>,
) -> Result<Json<Record<Permission>>, AppError> {
    guard(&state, &principal).await?;
    Ok(Json(state.permissions().add_role(id, link.role_id).await?))
}

/// DELETE /api/v1/permissions/:id/roles/:role_id
pub async fn handle_remove_role(
    State(state): State<AppState>,
    principal: Principal,
    Path((id, role_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<Record<Permission>>, AppError> {
    guard(&state, &principal).await?;
    Ok(Json(state.permissions().remove_role(id, role_id).await?))
}
