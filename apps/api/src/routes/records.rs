//! Scoped CRUD for business records (resumes, companies). The caller's grants
//! on the collection decide what each handler can see and touch.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde_json::{Map, Value};
use uuid::Uuid;

use super::extract::ListParams;
use crate::errors::AppError;
use crate::models::{Entity, Record};
use crate::query::Filter;
use crate::rbac::Principal;
use crate::service::parse_body;
use crate::state::AppState;
use crate::store::{Page, Patch};

/// `/` and `/:id` routes for one entity kind, to be nested under its path.
pub fn router<T: Entity>() -> Router<AppState> {
    Router::new()
        .route("/", get(list::<T>).post(create::<T>))
        .route("/:id", get(fetch::<T>).patch(update::<T>).delete(remove::<T>))
        .route("/:id/restore", post(restore::<T>))
}

/// GET /api/v1/{collection}
pub async fn list<T: Entity>(
    State(state): State<AppState>,
    principal: Principal,
    Query(params): Query<ListParams>,
) -> Result<Json<Page<Record<T>>>, AppError> {
    let query = params.into_query(&state, Filter::all())?;
    let page = state.service::<T>().find(&principal, query).await?;
    Ok(Json(page))
}

/// POST /api/v1/{collection}
pub async fn create<T: Entity>(
    State(state): State<AppState>,
    principal: Principal,
    Json(body): Json<Value>,
) -> Result<(StatusCode, Json<Record<T>>), AppError> {
    let data: T = parse_body(body)?;
    let created = state.service::<T>().create_scoped(&principal, &data).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// GET /api/v1/{collection}/:id
pub async fn fetch<T: Entity>(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<Uuid>,
) -> Result<Json<Record<T>>, AppError> {
    Ok(Json(state.service::<T>().find_by_id(&principal, id).await?))
}

/// PATCH /api/v1/{collection}/:id
pub async fn update<T: Entity>(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<Uuid>,
    Json(body): Json<Map<String, Value>>,
) -> Result<Json<Record<T>>, AppError> {
    let patch = Patch::from_body(body);
    let updated = state
        .service::<T>()
        .update_by_id(&principal, id, &patch)
        .await?;
    Ok(Json(updated))
}

/// DELETE /api/v1/{collection}/:id
/// Responds with the record as it was before the delete.
pub async fn remove<T: Entity>(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<Uuid>,
) -> Result<Json<Record<T>>, AppError> {
    Ok(Json(state.service::<T>().delete_by_id(&principal, id).await?))
}

/// POST /api/v1/{collection}/:id/restore
pub async fn restore<T: Entity>(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<Uuid>,
) -> Result<Json<Record<T>>, AppError> {
    Ok(Json(state.service::<T>().restore_by_id(&principal, id).await?))
}
