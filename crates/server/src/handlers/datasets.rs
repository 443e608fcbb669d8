//! Dataset ownership endpoints: the thin HTTP surface over the record model,
//! the sync engine and the publication engine.

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use curator_core::{draft, Record, RecordId, User, UPSTREAM_FAMILY};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Request body for dataset creation.
#[derive(Debug, Deserialize)]
pub struct CreateDatasetRequest {
    pub schema: String,
    pub dataset: Value,
    #[serde(default)]
    pub cumulative_state: Option<String>,
}

/// Request body for dataset updates.
#[derive(Debug, Deserialize)]
pub struct UpdateDatasetRequest {
    pub dataset: Value,
    #[serde(default)]
    pub cumulative_state: Option<String>,
}

/// One record as the owner sees it.
#[derive(Debug, Serialize)]
pub struct DatasetResponse {
    pub id: String,
    pub schema: String,
    pub published: bool,
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub synced: Option<i64>,
    pub created: i64,
    pub modified: i64,
    pub dataset: Value,
}

impl DatasetResponse {
    fn from_record(record: Record) -> Self {
        Self {
            id: record.id.to_string(),
            schema: record.schema,
            published: record.published,
            valid: record.valid,
            synced: record.synced.map(|t| t.unix_timestamp()),
            created: record.created.unix_timestamp(),
            modified: record.modified.unix_timestamp(),
            dataset: record.blob,
        }
    }
}

/// One row of the owner's record listing.
#[derive(Debug, Serialize)]
pub struct DatasetListEntry {
    pub id: String,
    pub schema: String,
    pub published: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub synced: Option<i64>,
    pub modified: i64,
}

/// Response for publish.
#[derive(Debug, Serialize)]
pub struct PublishResponse {
    pub identifier: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_version_identifier: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_id: Option<String>,
}

fn session_user(state: &AppState, headers: &HeaderMap) -> ApiResult<User> {
    Ok(state.sessions.session_from_request(headers)?.user.clone())
}

fn parse_id(raw: &str) -> ApiResult<RecordId> {
    RecordId::parse(raw).map_err(|_| ApiError::InvalidId)
}

fn draft_extras(user: &User, cumulative_state: Option<&str>) -> HashMap<String, String> {
    let mut extras = HashMap::from([
        ("identity".to_string(), user.identity.clone()),
        ("org".to_string(), user.organisation.clone()),
    ]);
    if let Some(state) = cumulative_state {
        extras.insert("cumulative_state".to_string(), state.to_string());
    }
    extras
}

/// GET /api/datasets - list the caller's records.
///
/// `?fetch` runs a rate-limited sync first, `?fetchall` a full one.
pub async fn list_datasets(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> ApiResult<Json<Vec<DatasetListEntry>>> {
    let user = session_user(&state, &headers)?;

    if params.contains_key("fetch") {
        state.sync.fetch(user.uid, &user.identity).await?;
    } else if params.contains_key("fetchall") {
        state.sync.fetch_all(user.uid, &user.identity).await?;
    } else if !params.is_empty() {
        return Err(ApiError::BadRequest("invalid parameter".to_string()));
    }

    let records = state.store.get_all_for_uid(user.uid).await?;
    let listing = records
        .into_iter()
        .map(|record| DatasetListEntry {
            id: record.id.to_string(),
            schema: record.schema,
            published: record.published,
            synced: record.synced.map(|t| t.unix_timestamp()),
            modified: record.modified.unix_timestamp(),
        })
        .collect();
    Ok(Json(listing))
}

/// POST /api/datasets - create a draft.
pub async fn create_dataset(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CreateDatasetRequest>,
) -> ApiResult<(StatusCode, Json<DatasetResponse>)> {
    let user = session_user(&state, &headers)?;

    let extras = draft_extras(&user, request.cumulative_state.as_deref());
    let record = draft::new_draft(
        UPSTREAM_FAMILY,
        &request.schema,
        user.uid,
        request.dataset,
        &extras,
    )?;
    draft::validate_created(&record)?;

    state.store.create(&record).await?;
    tracing::info!(id = %record.id, user = %user.uid, schema = %record.schema, "draft created");
    Ok((StatusCode::CREATED, Json(DatasetResponse::from_record(record))))
}

/// GET /api/datasets/{id}.
pub async fn get_dataset(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<Json<DatasetResponse>> {
    let user = session_user(&state, &headers)?;
    let id = parse_id(&id)?;
    let record = state.store.get_with_owner(id, user.uid).await?;
    Ok(Json(DatasetResponse::from_record(record)))
}

/// PUT /api/datasets/{id} - update a draft.
pub async fn update_dataset(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(request): Json<UpdateDatasetRequest>,
) -> ApiResult<Json<DatasetResponse>> {
    let user = session_user(&state, &headers)?;
    let id = parse_id(&id)?;

    let existing = state.store.get_with_owner(id, user.uid).await?;
    let extras = draft_extras(&user, request.cumulative_state.as_deref());
    let patch = draft::update_draft(&existing, request.dataset, &extras)?;

    // validate the merged result before anything is written
    let mut proposed = existing.clone();
    if let (Some(target), Some(source)) = (proposed.blob.as_object_mut(), patch.as_object()) {
        for (key, value) in source {
            target.insert(key.clone(), value.clone());
        }
    }
    draft::validate_updated(&existing, &proposed)?;

    let updated = state.store.smart_update_with_owner(id, &patch, user.uid).await?;
    Ok(Json(DatasetResponse::from_record(updated)))
}

/// DELETE /api/datasets/{id} - unpublish upstream and delete locally.
pub async fn delete_dataset(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let user = session_user(&state, &headers)?;
    let id = parse_id(&id)?;
    state.sync.unpublish_and_delete(id, &user).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/datasets/{id}/publish.
pub async fn publish_dataset(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<Json<PublishResponse>> {
    let user = session_user(&state, &headers)?;
    let id = parse_id(&id)?;

    let outcome = state.sync.publish(id, &user).await?;
    Ok(Json(PublishResponse {
        identifier: outcome.upstream_id,
        new_version_identifier: outcome.new_upstream_id,
        new_id: outcome.new_record_id.map(|id| id.to_string()),
    }))
}

#[derive(Debug, Deserialize)]
pub struct CumulativeStateParams {
    pub state: String,
}

/// POST /api/datasets/{id}/change_cumulative_state?state=.
pub async fn change_cumulative_state(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Query(params): Query<CumulativeStateParams>,
) -> ApiResult<Json<Value>> {
    let user = session_user(&state, &headers)?;
    let id = parse_id(&id)?;

    let new_id = state
        .sync
        .change_cumulative_state(id, &user, &params.state)
        .await?;
    Ok(Json(serde_json::json!({
        "new_id": new_id.map(|id| id.to_string()),
    })))
}

#[derive(Debug, Deserialize)]
pub struct RefreshDirectoryParams {
    pub directory: String,
}

/// POST /api/datasets/{id}/refresh_directory_content?directory=.
pub async fn refresh_directory_content(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Query(params): Query<RefreshDirectoryParams>,
) -> ApiResult<Json<Value>> {
    let user = session_user(&state, &headers)?;
    let id = parse_id(&id)?;

    let new_id = state
        .sync
        .refresh_directory_content(id, &user, &params.directory)
        .await?;
    Ok(Json(serde_json::json!({
        "new_id": new_id.map(|id| id.to_string()),
    })))
}
