//! HTTP API server for the Curator dataset gateway.
//!
//! This crate provides the HTTP control plane:
//! - Dataset ownership endpoints (create, update, publish, delete, sync)
//! - The authorization proxy for the upstream's file and directory catalog
//! - Session resolution and the session store
//! - Service-to-service dataset lookup
//! - The error taxonomy and upstream status mapping

pub mod error;
pub mod handlers;
pub mod proxy;
pub mod routes;
pub mod sessions;
pub mod state;

pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use sessions::{Session, SessionManager};
pub use state::AppState;
