//! Application state shared across handlers.

use crate::error::ApiError;
use crate::sessions::SessionManager;
use curator_core::config::AppConfig;
use curator_store::Datastore;
use curator_sync::SyncService;
use curator_upstream::UpstreamClient;
use std::sync::Arc;
use std::time::Duration;
use time::Duration as TimeDuration;
use url::Url;

/// User-Agent the proxy presents to the upstream.
const PROXY_USER_AGENT: &str = concat!("curator/", env!("CARGO_PKG_VERSION"));

/// Connect timeout for proxied upstream calls.
const PROXY_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Shared state: configuration, collaborators and the session map.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Datastore,
    pub sync: SyncService,
    pub sessions: Arc<SessionManager>,
    /// HTTP client for the authorization proxy; forwards raw requests,
    /// separate from the typed upstream client.
    pub proxy_http: reqwest::Client,
    pub proxy_base: Url,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        store: Datastore,
        upstream: UpstreamClient,
    ) -> Result<Self, ApiError> {
        let proxy_base = Url::parse(&config.upstream.url)
            .map_err(|e| ApiError::Internal(format!("invalid upstream url: {e}")))?;
        let proxy_http = reqwest::Client::builder()
            .user_agent(PROXY_USER_AGENT)
            .connect_timeout(PROXY_CONNECT_TIMEOUT)
            .danger_accept_invalid_certs(config.upstream.insecure_certificates)
            .build()
            .map_err(|e| ApiError::Internal(format!("proxy client: {e}")))?;

        let sessions = Arc::new(SessionManager::new(TimeDuration::seconds(
            config.server.session_ttl_secs as i64,
        )));
        let sync = SyncService::new(upstream, store.clone());

        Ok(Self {
            config: Arc::new(config),
            store,
            sync,
            sessions,
            proxy_http,
            proxy_base,
        })
    }
}
