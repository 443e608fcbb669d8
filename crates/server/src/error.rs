//! API error types and status mapping.
//!
//! Every error response carries a fresh time-ordered `error_id`; the identical
//! id is attached to the correlated log event so operators can find the
//! server-side context for any failure a user reports.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use curator_core::RecordId;
use curator_store::StoreError;
use curator_sync::SyncError;
use curator_upstream::UpstreamError;
use serde::Serialize;
use serde_json::value::RawValue;

/// API error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub status: u16,
    pub msg: String,
    pub error_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub more: Option<Box<RawValue>>,
}

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("resource not found")]
    NotFound,

    #[error("resource exists already")]
    Exists,

    #[error("not resource owner")]
    NotOwner,

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("bad format for record id")]
    InvalidId,

    #[error("session not found")]
    SessionNotFound,

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("too many sync requests")]
    TooSoon,

    #[error("{0}")]
    Transient(String),

    /// The upstream was unreachable from the proxy.
    #[error("{0}")]
    BadGateway(String),

    /// An upstream failure forwarded to the client; the body travels verbatim
    /// under `more` when it is JSON.
    #[error("upstream error: {message}")]
    Upstream {
        status: u16,
        message: String,
        body: Vec<u8>,
    },

    #[error("{0}")]
    Validation(curator_core::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Translate an upstream status code into one this service may emit.
pub fn map_upstream(code: u16) -> StatusCode {
    let mapped = match code {
        300..=399 => 200,
        401 | 403 => 500,
        500 => 502,
        503 => 504,
        other => other,
    };
    StatusCode::from_u16(mapped).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

impl ApiError {
    /// The HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Exists => StatusCode::CONFLICT,
            Self::NotOwner => StatusCode::FORBIDDEN,
            Self::BadRequest(_) | Self::InvalidId | Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::SessionNotFound => StatusCode::UNAUTHORIZED,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::TooSoon => StatusCode::TOO_MANY_REQUESTS,
            Self::Transient(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::BadGateway(_) => StatusCode::BAD_GATEWAY,
            Self::Upstream { status, .. } => map_upstream(*status),
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let error_id = RecordId::new().to_string();
        let status = self.status_code();
        let msg = self.to_string();

        tracing::error!(error_id = %error_id, status = status.as_u16(), error = %msg, "request failed");

        let (origin, more) = match &self {
            Self::Upstream { body, .. } => {
                let more = serde_json::from_slice::<Box<RawValue>>(body).ok();
                (Some("upstream"), more)
            }
            _ => (None, None),
        };

        let body = ErrorResponse {
            status: status.as_u16(),
            msg,
            error_id,
            origin,
            more,
        };
        (status, [("x-content-type-options", "nosniff")], Json(body)).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => Self::NotFound,
            StoreError::Exists => Self::Exists,
            StoreError::NotOwner => Self::NotOwner,
            StoreError::InvalidInput(msg) => Self::BadRequest(msg),
            StoreError::Connection => Self::Transient("no database connection".to_string()),
            StoreError::Timeout => Self::Transient("database timeout".to_string()),
            StoreError::Database(err) => Self::Internal(format!("database error: {err}")),
            StoreError::Internal(msg) => Self::Internal(msg),
        }
    }
}

impl From<UpstreamError> for ApiError {
    fn from(err: UpstreamError) -> Self {
        match err {
            UpstreamError::Api {
                status,
                message,
                body,
            } => Self::Upstream {
                status,
                message,
                body,
            },
            UpstreamError::Transport { hint } => Self::Transient(hint.to_string()),
            UpstreamError::MalformedResponse(msg) => {
                Self::Internal(format!("malformed upstream response: {msg}"))
            }
            UpstreamError::InvalidRequest(msg) => Self::BadRequest(msg),
        }
    }
}

impl From<SyncError> for ApiError {
    fn from(err: SyncError) -> Self {
        match err {
            SyncError::TooSoon => Self::TooSoon,
            SyncError::Timeout => Self::Transient("sync timed out".to_string()),
            SyncError::NoIdentifier => Self::BadRequest("no identifier in dataset".to_string()),
            SyncError::NotUpstreamDataset(id) => {
                Self::BadRequest(format!("not an upstream dataset: {id}"))
            }
            SyncError::Core(err) => err.into(),
            SyncError::Store(err) => err.into(),
            SyncError::Upstream(err) => err.into(),
        }
    }
}

impl From<curator_core::Error> for ApiError {
    fn from(err: curator_core::Error) -> Self {
        match err {
            curator_core::Error::InvalidId => Self::InvalidId,
            other => Self::Validation(other),
        }
    }
}

/// Result type for API handlers.
pub type ApiResult<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping_table() {
        assert_eq!(ApiError::Exists.status_code(), StatusCode::CONFLICT);
        assert_eq!(ApiError::NotFound.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError::NotOwner.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(
            ApiError::BadRequest("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(ApiError::InvalidId.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ApiError::SessionNotFound.status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::Unauthorized("key".into()).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::Forbidden("member".into()).status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ApiError::Transient("db".into()).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ApiError::BadGateway("unknown host".into()).status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(ApiError::TooSoon.status_code(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            ApiError::Internal("x".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn upstream_statuses_are_remapped() {
        assert_eq!(map_upstream(302), StatusCode::OK);
        assert_eq!(map_upstream(401), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(map_upstream(403), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(map_upstream(500), StatusCode::BAD_GATEWAY);
        assert_eq!(map_upstream(503), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(map_upstream(404), StatusCode::NOT_FOUND);
        assert_eq!(map_upstream(201), StatusCode::CREATED);
    }

    #[test]
    fn store_errors_translate() {
        assert_eq!(
            ApiError::from(StoreError::Timeout).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ApiError::from(StoreError::NotOwner).status_code(),
            StatusCode::FORBIDDEN
        );
    }
}
