//! Service-to-service dataset lookup, guarded by an API key.

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::Json;
use curator_core::RecordId;
use serde::{Deserialize, Serialize};

/// Lookup query. `record_id`/`upstream_id` is the current pair; `id` and
/// `identifier` are accepted as aliases for one release.
#[derive(Debug, Deserialize)]
pub struct LookupParams {
    #[serde(default)]
    pub record_id: Option<String>,
    #[serde(default)]
    pub upstream_id: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub identifier: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LookupResponse {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
    pub owner: String,
    pub published: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub synced: Option<i64>,
}

/// GET /api/lookup/dataset.
pub async fn lookup_dataset(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<LookupParams>,
) -> ApiResult<Json<LookupResponse>> {
    let configured_key = &state.config.server.lookup_api_key;
    let presented = headers
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if configured_key.is_empty() || presented != configured_key {
        return Err(ApiError::Unauthorized("invalid api key".to_string()));
    }

    let record_id = params.record_id.or(params.id);
    let upstream_id = params.upstream_id.or(params.identifier);

    let record = match (record_id, upstream_id) {
        (Some(_), Some(_)) => {
            return Err(ApiError::BadRequest(
                "both record_id and upstream_id in query".to_string(),
            ));
        }
        (None, None) => {
            return Err(ApiError::BadRequest(
                "either record_id or upstream_id required in query".to_string(),
            ));
        }
        (Some(raw), None) => {
            let id = RecordId::parse(&raw).map_err(|_| ApiError::InvalidId)?;
            state.store.get(id).await?
        }
        (None, Some(identifier)) => state.store.get_by_upstream_identifier(&identifier).await?,
    };

    Ok(Json(LookupResponse {
        id: record.id.to_string(),
        identifier: record.upstream_identifier().map(str::to_string),
        owner: record.owner.to_string(),
        published: record.published,
        synced: record.synced.map(|t| t.unix_timestamp()),
    }))
}
