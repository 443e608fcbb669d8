//! PostgreSQL datastore for the Curator dataset gateway.
//!
//! Owns the `records` and `sync_status` tables and every transaction
//! boundary: plain CRUD, publish stores, derived-version stores and the sync
//! batches that apply a whole reconciliation run atomically.

pub mod batch;
pub mod error;
pub mod models;
pub mod store;

pub use batch::Batch;
pub use error::{StoreError, StoreResult};
pub use store::Datastore;
