//! Typed client for the upstream dataset catalog service.
//!
//! Covers the dataset REST endpoints, the two RPC endpoints, and the
//! streaming list read used by the sync engine. Authentication is HTTP Basic
//! with the service account from configuration.

pub mod client;
pub mod error;
pub mod options;
pub mod stream;

pub use client::{ReadStream, UpstreamClient};
pub use error::{TransportHint, UpstreamError, UpstreamResult};
pub use options::QueryOptions;
