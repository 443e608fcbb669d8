//! Authorization proxy for the upstream file and directory catalog.
//!
//! The front-end browses the upstream's `/files/` and `/directories/`
//! endpoints through this proxy using the service credentials, so every
//! request and every response is constrained to the projects of the session's
//! user:
//!
//! - queries may only name projects the user is a member of, and the
//!   proxy-controlled parameters cannot be supplied by the client;
//! - non-GET requests are scoped with `allowed_projects` and their bodies are
//!   stamped with the authenticated identity;
//! - 2xx response bodies are walked recursively, and any `project_identifier`
//!   outside the user's projects turns the whole response into a 403.

use crate::error::{ApiError, ApiResult};
use crate::sessions::Session;
use crate::state::AppState;
use axum::body::{to_bytes, Body};
use axum::extract::{Request, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use curator_core::User;
use curator_upstream::UpstreamError;
use serde_json::Value;
use url::form_urlencoded;

/// Largest request or response body the proxy will buffer.
const MAX_BODY_BYTES: usize = 64 * 1024 * 1024;

/// Proxy entry point for `/files/` and `/directories/` routes.
pub async fn handle(State(state): State<AppState>, req: Request) -> Response {
    match forward(state, req).await {
        Ok(response) => response,
        Err(err) => err.into_response(),
    }
}

async fn forward(state: AppState, req: Request) -> ApiResult<Response> {
    let (parts, body) = req.into_parts();

    let path = parts.uri.path().to_string();
    if !(path.starts_with("/directories/") || path.starts_with("/files/")) {
        return Err(ApiError::Forbidden("access denied".to_string()));
    }

    let session = state.sessions.session_from_request(&parts.headers)?;

    let raw_query = parts.uri.query().unwrap_or("").to_string();
    let pairs: Vec<(String, String)> = form_urlencoded::parse(raw_query.as_bytes())
        .into_owned()
        .collect();

    // proxy-controlled parameters must not come from the client
    if pairs.iter().any(|(k, _)| k == "allowed_projects") {
        return Err(ApiError::BadRequest(
            "allowed_projects is not allowed".to_string(),
        ));
    }
    if pairs.iter().any(|(k, _)| k == "project_identifier") {
        return Err(ApiError::BadRequest(
            "project_identifier is not allowed".to_string(),
        ));
    }

    let mut query = raw_query;
    let project_values: Vec<&str> = pairs
        .iter()
        .filter(|(k, _)| k == "project")
        .map(|(_, v)| v.as_str())
        .collect();
    if !project_values.is_empty() {
        if project_values.len() > 1 {
            return Err(ApiError::BadRequest(
                "multiple projects in query".to_string(),
            ));
        }
        if session.user.projects.is_empty() {
            return Err(ApiError::Forbidden(
                "access denied: user has no projects".to_string(),
            ));
        }
        let project = project_values[0];
        if !session.user.has_project(project) {
            tracing::debug!(wanted = project, "project membership check failed");
            return Err(ApiError::Forbidden(
                "access denied: invalid project".to_string(),
            ));
        }

        // the files endpoint calls the parameter project_identifier
        if path.starts_with("/files/") {
            let mut serializer = form_urlencoded::Serializer::new(String::new());
            for (key, value) in &pairs {
                if key == "project" {
                    serializer.append_pair("project_identifier", value);
                } else {
                    serializer.append_pair(key, value);
                }
            }
            query = serializer.finish();
        }
    }

    let mut request_body: Option<Vec<u8>> = None;
    if parts.method != Method::GET {
        // appended raw: the commas in the project list must stay literal
        let suffix = format!("allowed_projects={}", session.user.allowed_projects());
        query = if query.is_empty() {
            suffix
        } else {
            format!("{query}&{suffix}")
        };

        let bytes = to_bytes(body, MAX_BODY_BYTES)
            .await
            .map_err(|e| ApiError::Internal(format!("failed to read request body: {e}")))?;
        request_body = Some(rewrite_body(&bytes, &parts.method, &session.user)?);
    }

    let mut url = state
        .proxy_base
        .join(path.trim_start_matches('/'))
        .map_err(|e| ApiError::Internal(format!("failed to build upstream url: {e}")))?;
    if !query.is_empty() {
        url.set_query(Some(&query));
    }

    // the incoming Authorization header dies here; the upstream sees only the
    // service credentials
    let mut upstream_req = state
        .proxy_http
        .request(parts.method.clone(), url)
        .basic_auth(
            &state.config.upstream.username,
            Some(&state.config.upstream.password),
        );
    if let Some(body) = request_body {
        upstream_req = upstream_req
            .header(CONTENT_TYPE, "application/json")
            .body(body);
    }

    let upstream_response = upstream_req.send().await.map_err(classify_connect_error)?;
    let status = upstream_response.status();
    let body = upstream_response
        .bytes()
        .await
        .map_err(classify_connect_error)?;

    // upstream errors are forwarded as-is for the front-end to interpret
    if !status.is_success() {
        return Ok(json_response(status, body.to_vec()));
    }

    let parsed: Value = serde_json::from_slice(&body)
        .map_err(|_| ApiError::Internal("response is not json".to_string()))?;
    if !projects_allowed(&session, &parsed) {
        tracing::warn!(user = %session.user.uid, "upstream response named a foreign project");
        return Err(ApiError::Forbidden("invalid project in response".to_string()));
    }

    Ok(json_response(status, body.to_vec()))
}

/// Stamp the authenticated identity into a JSON request body.
///
/// An object gets the key directly; each object element of an array gets it
/// too, other elements are left untouched.
fn rewrite_body(bytes: &[u8], method: &Method, user: &User) -> ApiResult<Vec<u8>> {
    let mut data: Value = serde_json::from_slice(bytes)
        .map_err(|e| ApiError::Internal(format!("request body is not json: {e}")))?;

    let key = if *method == Method::POST {
        "user_created"
    } else {
        "user_modified"
    };

    match &mut data {
        Value::Object(object) => {
            object.insert(key.to_string(), Value::String(user.identity.clone()));
        }
        Value::Array(elements) => {
            for element in elements {
                if let Value::Object(object) = element {
                    object.insert(key.to_string(), Value::String(user.identity.clone()));
                }
            }
        }
        _ => {}
    }

    serde_json::to_vec(&data).map_err(|e| ApiError::Internal(e.to_string()))
}

/// Walk a response body recursively: every string under a `project_identifier`
/// map key must belong to the session's user. Other keys are not inspected.
fn projects_allowed(session: &Session, value: &Value) -> bool {
    match value {
        Value::Object(object) => object.iter().all(|(key, v)| match v {
            Value::String(s) if key == "project_identifier" => session.user.has_project(s),
            Value::Object(_) | Value::Array(_) => projects_allowed(session, v),
            _ => true,
        }),
        Value::Array(elements) => elements.iter().all(|v| match v {
            Value::Object(_) | Value::Array(_) => projects_allowed(session, v),
            _ => true,
        }),
        _ => true,
    }
}

/// Map a proxied transport failure to a friendly 502.
fn classify_connect_error(err: reqwest::Error) -> ApiError {
    match UpstreamError::from(err) {
        UpstreamError::Transport { hint } => ApiError::BadGateway(hint.to_string()),
        _ => ApiError::BadGateway("bad gateway".to_string()),
    }
}

/// A response carrying only this service's standard JSON headers.
fn json_response(status: StatusCode, body: Vec<u8>) -> Response {
    let mut response = (status, Body::from(body)).into_response();
    let headers = response.headers_mut();
    headers.clear();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(
        "x-content-type-options",
        HeaderValue::from_static("nosniff"),
    );
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use time::OffsetDateTime;

    fn session_with_projects(projects: &[&str]) -> Session {
        Session {
            sid: "test".to_string(),
            user: User::for_testing("matti", projects),
            expires: OffsetDateTime::now_utc() + time::Duration::hours(1),
        }
    }

    #[test]
    fn walk_accepts_member_projects() {
        let session = session_with_projects(&["P1", "P2"]);
        let body = json!({
            "results": [
                {"project_identifier": "P1", "directories": [{"project_identifier": "P2"}]},
            ],
            "count": 1,
        });
        assert!(projects_allowed(&session, &body));
    }

    #[test]
    fn walk_rejects_foreign_projects_at_any_depth() {
        let session = session_with_projects(&["P1"]);
        let body = json!({
            "results": [
                {"project_identifier": "P1"},
                {"nested": {"deep": [{"project_identifier": "P2"}]}},
            ],
        });
        assert!(!projects_allowed(&session, &body));
    }

    #[test]
    fn walk_ignores_other_keys_and_non_strings() {
        let session = session_with_projects(&[]);
        let body = json!({
            "project": "P9",
            "identifier": "P9",
            "project_identifier": 42,
            "list": ["P9", 1, null],
        });
        assert!(projects_allowed(&session, &body));
    }

    #[test]
    fn rewrite_sets_user_created_on_post_objects() {
        let user = User::for_testing("matti", &[]);
        let out = rewrite_body(br#"{"identifier": "1"}"#, &Method::POST, &user).unwrap();
        let value: Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(value, json!({"identifier": "1", "user_created": "matti"}));
    }

    #[test]
    fn rewrite_sets_user_modified_on_patch() {
        let user = User::for_testing("matti", &[]);
        let out = rewrite_body(br#"{"identifier": "1"}"#, &Method::PATCH, &user).unwrap();
        let value: Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(value["user_modified"], "matti");
        assert!(value.get("user_created").is_none());
    }

    #[test]
    fn rewrite_stamps_each_object_element_of_arrays() {
        let user = User::for_testing("matti", &[]);
        let out = rewrite_body(br#"[{"a": 1}, 7, {"b": 2}]"#, &Method::POST, &user).unwrap();
        let value: Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(
            value,
            json!([
                {"a": 1, "user_created": "matti"},
                7,
                {"b": 2, "user_created": "matti"},
            ])
        );
    }

    #[test]
    fn rewrite_rejects_non_json() {
        let user = User::for_testing("matti", &[]);
        assert!(rewrite_body(b"not json", &Method::POST, &user).is_err());
    }
}
