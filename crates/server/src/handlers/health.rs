//! Health check.

use crate::error::ApiResult;
use crate::state::AppState;
use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

/// GET /healthz - datastore connectivity probe for load balancers.
pub async fn health_check(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    state.store.health_check().await?;
    Ok(Json(json!({"status": "ok"})))
}
