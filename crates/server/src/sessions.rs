//! Session store and lookup.
//!
//! Sessions are created by the out-of-scope login flow via
//! [`SessionManager::login`] and resolved per request from the `sid` cookie.
//! The map only sees writes at login and logout; reads are lock-free dashmap
//! lookups.

use crate::error::ApiError;
use axum::http::header::COOKIE;
use axum::http::HeaderMap;
use curator_core::{RecordId, User};
use curator_sync::SyncService;
use dashmap::DashMap;
use serde_json::{json, Value};
use std::sync::Arc;
use time::{Duration, OffsetDateTime};

/// Name of the session cookie.
pub const SESSION_COOKIE: &str = "sid";

/// One logged-in session.
#[derive(Debug, Clone)]
pub struct Session {
    pub sid: String,
    pub user: User,
    pub expires: OffsetDateTime,
}

impl Session {
    /// PII-filtered projection for the front-end.
    pub fn public_view(&self) -> Value {
        json!({
            "user": self.user.public_view(),
            "expires": self.expires.unix_timestamp(),
        })
    }
}

/// Thread-safe session map keyed by sid.
pub struct SessionManager {
    sessions: DashMap<String, Arc<Session>>,
    ttl: Duration,
}

impl SessionManager {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            ttl,
        }
    }

    /// Create a session for a logged-in user and return its sid.
    pub fn login(&self, user: User, expires: Option<OffsetDateTime>) -> String {
        let sid = RecordId::new().to_string();
        let session = Session {
            sid: sid.clone(),
            user,
            expires: expires.unwrap_or_else(|| OffsetDateTime::now_utc() + self.ttl),
        };
        self.sessions.insert(sid.clone(), Arc::new(session));
        sid
    }

    /// Drop a session. Unknown sids are fine.
    pub fn logout(&self, sid: &str) {
        self.sessions.remove(sid);
    }

    /// Resolve the request's `sid` cookie to a live session. Expired sessions
    /// are evicted and treated as missing.
    pub fn session_from_request(&self, headers: &HeaderMap) -> Result<Arc<Session>, ApiError> {
        let sid = sid_from_headers(headers).ok_or(ApiError::SessionNotFound)?;
        let session = self
            .sessions
            .get(&sid)
            .map(|entry| entry.value().clone())
            .ok_or(ApiError::SessionNotFound)?;
        if session.expires <= OffsetDateTime::now_utc() {
            self.sessions.remove(&sid);
            return Err(ApiError::SessionNotFound);
        }
        Ok(session)
    }
}

fn sid_from_headers(headers: &HeaderMap) -> Option<String> {
    for value in headers.get_all(COOKIE) {
        let Ok(raw) = value.to_str() else { continue };
        for pair in raw.split(';') {
            let pair = pair.trim();
            if let Some(sid) = pair.strip_prefix("sid=") {
                if !sid.is_empty() {
                    return Some(sid.to_string());
                }
            }
        }
    }
    None
}

/// Fire-and-forget sync after login: the user's records start reconciling
/// while the front-end loads.
pub fn spawn_post_login_sync(sync: SyncService, user: &User) {
    let uid = user.uid;
    let identity = user.identity.clone();
    tokio::spawn(async move {
        if let Err(err) = sync.fetch(uid, &identity).await {
            tracing::info!(user = %uid, error = %err, "post-login sync failed");
        }
    });
}
