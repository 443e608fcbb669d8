//! Session endpoints.

use crate::error::ApiResult;
use crate::state::AppState;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde_json::Value;

/// GET /api/session - public view of the current session.
pub async fn get_session(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<Value>> {
    let session = state.sessions.session_from_request(&headers)?;
    Ok(Json(session.public_view()))
}

/// DELETE /api/session - log out.
pub async fn delete_session(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<StatusCode> {
    let session = state.sessions.session_from_request(&headers)?;
    state.sessions.logout(&session.sid);
    tracing::info!(user = %session.user.uid, "session ended");
    Ok(StatusCode::NO_CONTENT)
}
