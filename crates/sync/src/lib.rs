//! Sync and publication engines for the Curator dataset gateway.
//!
//! [`SyncService`] owns both directions of reconciliation: streaming a user's
//! records down from the upstream into the datastore, and pushing local drafts
//! up via publish and the dataset RPCs.

pub mod error;
pub mod fetch;
pub mod publish;

pub use error::{SyncError, SyncResult};
pub use fetch::SyncStats;
pub use publish::PublishOutcome;

use curator_core::RecordId;
use curator_store::Datastore;
use curator_upstream::UpstreamClient;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Deadline for one sync batch, stream reads included.
pub const BATCH_TIMEOUT: Duration = Duration::from_secs(15);

/// Deadline for one publish or RPC call.
pub const PUBLISH_TIMEOUT: Duration = Duration::from_secs(10);

/// Minimum interval between rate-limited syncs per user.
pub const RETRY_INTERVAL: Duration = Duration::from_secs(10);

/// The engine pair: shared by the HTTP surface and the CLI.
#[derive(Clone)]
pub struct SyncService {
    upstream: UpstreamClient,
    store: Datastore,
    /// Per-user batch serialization; two syncs for one user never run
    /// concurrently.
    locks: Arc<DashMap<RecordId, Arc<Mutex<()>>>>,
}

impl SyncService {
    pub fn new(upstream: UpstreamClient, store: Datastore) -> Self {
        Self {
            upstream,
            store,
            locks: Arc::new(DashMap::new()),
        }
    }

    pub fn store(&self) -> &Datastore {
        &self.store
    }

    pub fn upstream(&self) -> &UpstreamClient {
        &self.upstream
    }

    pub(crate) fn user_lock(&self, uid: RecordId) -> Arc<Mutex<()>> {
        self.locks
            .entry(uid)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .value()
            .clone()
    }
}
