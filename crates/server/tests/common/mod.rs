//! Common test utilities: a running application instance against a mock
//! upstream and a lazily-connected datastore.

use curator_core::config::AppConfig;
use curator_core::User;
use curator_server::{create_router, AppState, SessionManager};
use curator_store::Datastore;
use curator_upstream::UpstreamClient;
use std::net::SocketAddr;
use std::sync::Arc;

pub struct TestApp {
    pub addr: SocketAddr,
    pub sessions: Arc<SessionManager>,
    pub http: reqwest::Client,
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Create a session and return its cookie value.
    pub fn login(&self, user: User) -> String {
        self.sessions.login(user, None)
    }
}

/// Boot the app with the given upstream base URL. The datastore pool is lazy,
/// so tests that never touch the database do not need one.
pub async fn spawn_app(upstream_url: &str) -> TestApp {
    let mut config = AppConfig::for_testing();
    config.upstream.url = upstream_url.to_string();

    let store = Datastore::connect_lazy(&config.database.url).expect("lazy pool");
    let upstream = UpstreamClient::new(&config.upstream).expect("upstream client");
    let state = AppState::new(config, store, upstream).expect("app state");
    let sessions = state.sessions.clone();

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test listener");
    let addr = listener.local_addr().expect("local addr");
    let router = create_router(state);
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("test server");
    });

    TestApp {
        addr,
        sessions,
        http: reqwest::Client::new(),
    }
}
