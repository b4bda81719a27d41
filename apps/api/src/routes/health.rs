use axum::{extract::State, http::StatusCode, Json};
use serde_json::{json, Value};
use tracing::warn;

use crate::state::AppState;

/// GET /health
/// Reports service version and the backends in use. 503 when the store does not
/// answer.
pub async fn health_handler(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let (status, store_status) = match state.store.health_check().await {
        Ok(()) => (StatusCode::OK, "ok"),
        Err(e) => {
            warn!("store health check failed: {e}");
            (StatusCode::SERVICE_UNAVAILABLE, "unavailable")
        }
    };

    (
        status,
        Json(json!({
            "status": store_status,
            "version": env!("CARGO_PKG_VERSION"),
            "service": env!("CARGO_PKG_NAME"),
            "store": state.store.backend_name(),
            "cache": state.cache.backend_name(),
        })),
    )
}
