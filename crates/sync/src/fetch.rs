//! The sync engine: stream a user's records from the upstream and reconcile
//! them with the datastore in one transactional batch.

use crate::error::{SyncError, SyncResult};
use crate::{SyncService, BATCH_TIMEOUT, RETRY_INTERVAL};
use curator_core::{effective_modified, ExternalRecord, RecordId, UPSTREAM_FAMILY};
use curator_store::{Batch, StoreError};
use curator_upstream::QueryOptions;
use serde_json::Value;
use std::collections::HashMap;
use time::OffsetDateTime;
use tracing::Instrument;

/// Per-batch outcome tally. Every streamed record lands in exactly one bucket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncStats {
    pub total_hint: u64,
    pub read: u64,
    pub written: u64,
    pub deleted: u64,
    pub skipped: u64,
    pub failed: u64,
}

impl SyncStats {
    fn merge(&mut self, other: SyncStats) {
        self.total_hint += other.total_hint;
        self.read += other.read;
        self.written += other.written;
        self.deleted += other.deleted;
        self.skipped += other.skipped;
        self.failed += other.failed;
    }
}

/// What happened to one streamed record.
enum Outcome {
    Written,
    Deleted,
    Skipped,
    Failed,
}

/// Local reconciliation state for one user, loaded once per batch.
#[derive(Default)]
struct SyncIndex {
    /// Upstream identifier to local record id, for records authored
    /// elsewhere that we already track.
    by_identifier: HashMap<String, RecordId>,
    /// Per-record time of last sync.
    synced: HashMap<RecordId, OffsetDateTime>,
}

impl SyncService {
    /// Sync a user since their last successful run. Refuses to run more often
    /// than every [`RETRY_INTERVAL`] per user.
    pub async fn fetch(&self, uid: RecordId, identity: &str) -> SyncResult<SyncStats> {
        match self.store().get_last_sync(uid).await {
            Ok(last) => {
                if OffsetDateTime::now_utc() - last < RETRY_INTERVAL {
                    return Err(SyncError::TooSoon);
                }
                self.fetch_from(uid, identity, Some(last)).await
            }
            Err(StoreError::NotFound) => self.fetch_from(uid, identity, None).await,
            Err(err) => Err(err.into()),
        }
    }

    /// Sync a user's full history. Bypasses the rate limit.
    pub async fn fetch_all(&self, uid: RecordId, identity: &str) -> SyncResult<SyncStats> {
        self.fetch_from(uid, identity, None).await
    }

    /// Sync a user since an explicit time. Bypasses the rate limit.
    pub async fn fetch_since(
        &self,
        uid: RecordId,
        identity: &str,
        since: OffsetDateTime,
    ) -> SyncResult<SyncStats> {
        self.fetch_from(uid, identity, Some(since)).await
    }

    async fn fetch_from(
        &self,
        uid: RecordId,
        identity: &str,
        since: Option<OffsetDateTime>,
    ) -> SyncResult<SyncStats> {
        let lock = self.user_lock(uid);
        let _guard = lock.lock().await;

        let mut options = if identity.is_empty() {
            QueryOptions::new().with_owner(uid.to_string())
        } else {
            QueryOptions::new().with_user(identity)
        };
        if let Some(since) = since {
            options = options.since(since);
        }

        tracing::info!(user = %uid, identity, "starting sync");
        let mut stats = self.sync_batch(uid, options.clone()).await?;

        tracing::info!(user = %uid, identity, "syncing removed");
        stats.merge(self.sync_batch(uid, options.with_removed()).await?);

        Ok(stats)
    }

    /// Sync a single record by upstream identifier, returning its local id.
    ///
    /// Used after the dataset RPCs, where the upstream has just rewritten the
    /// record behind our back.
    pub async fn fetch_one(
        &self,
        uid: RecordId,
        upstream_id: &str,
    ) -> SyncResult<Option<RecordId>> {
        let lock = self.user_lock(uid);
        let _guard = lock.lock().await;

        let blob = match self.upstream().get(upstream_id).await {
            Ok(blob) => blob,
            Err(err) if err.is_not_found() => self.upstream().get_removed(upstream_id).await?,
            Err(err) => return Err(err.into()),
        };

        let index = self.load_index(uid).await?;
        let mut batch = self.store().new_batch_for_user(uid).await?;
        let (id, outcome) = sync_record(&mut batch, &index, uid, blob).await?;
        if matches!(outcome, Outcome::Failed) {
            batch.rollback().await?;
            return Err(SyncError::NotUpstreamDataset(upstream_id.to_string()));
        }
        batch.commit().await?;
        Ok(id)
    }

    /// Run one reconciliation batch: one upstream stream, one datastore
    /// transaction. Partial batches never land.
    async fn sync_batch(&self, uid: RecordId, options: QueryOptions) -> SyncResult<SyncStats> {
        let span = tracing::info_span!("sync_batch", sync_id = %RecordId::new());
        let work = async {
            let mut stream = self.upstream().read_stream(options).await?;

            let mut batch = self.store().new_batch_for_user(uid).await?;
            let index = if stream.total_hint > 0 {
                self.load_index(uid).await?
            } else {
                SyncIndex::default()
            };

            let mut stats = SyncStats {
                total_hint: stream.total_hint,
                ..SyncStats::default()
            };

            while let Some(raw) = stream.records.recv().await {
                stats.read += 1;
                let (_, outcome) = sync_record(&mut batch, &index, uid, raw).await?;
                match outcome {
                    Outcome::Written => stats.written += 1,
                    Outcome::Deleted => stats.deleted += 1,
                    Outcome::Skipped => stats.skipped += 1,
                    Outcome::Failed => stats.failed += 1,
                }
            }

            // the record channel closed: either a clean end of stream or a
            // stream-level failure waiting on the error channel
            if let Some(err) = stream.errors.recv().await {
                tracing::info!(error = %err, "api error");
                return Err(err.into());
            }

            batch.commit().await?;
            Ok(stats)
        };

        let stats = match tokio::time::timeout(BATCH_TIMEOUT, work.instrument(span)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::info!(user = %uid, "sync batch timed out");
                Err(SyncError::Timeout)
            }
        }?;

        tracing::info!(
            total = stats.total_hint,
            written = stats.written,
            skipped = stats.skipped,
            deleted = stats.deleted,
            failed = stats.failed,
            "successful sync"
        );
        Ok(stats)
    }

    async fn load_index(&self, uid: RecordId) -> SyncResult<SyncIndex> {
        let mut index = SyncIndex::default();
        for record in self.store().get_all_for_uid(uid).await? {
            if record.family != UPSTREAM_FAMILY {
                continue;
            }
            if let Some(synced) = record.synced {
                index.synced.insert(record.id, synced);
            }
            let Some(identifier) = record.upstream_identifier() else {
                continue;
            };
            if index.by_identifier.contains_key(identifier) {
                tracing::warn!(identifier, "multiple records share one upstream identifier");
                continue;
            }
            index.by_identifier.insert(identifier.to_string(), record.id);
        }
        Ok(index)
    }
}

/// Reconcile one streamed record against the batch.
///
/// Parse failures count as `Failed` without aborting the batch; datastore
/// failures abort it, since the transaction is poisoned anyway.
async fn sync_record(
    batch: &mut Batch,
    index: &SyncIndex,
    uid: RecordId,
    raw: Value,
) -> SyncResult<(Option<RecordId>, Outcome)> {
    let external = ExternalRecord(raw);
    let identifier = external.identifier().map(str::to_string);

    let (mut record, mut is_new) = match external.into_record() {
        Ok(parsed) => parsed,
        Err(err) => {
            tracing::debug!(error = %err, "error parsing record");
            return Ok((None, Outcome::Failed));
        }
    };

    // a record authored elsewhere may already be tracked under its upstream
    // identifier; adopt the existing local id instead of creating a twin
    if is_new {
        if let Some(existing) = identifier.as_deref().and_then(|i| index.by_identifier.get(i)) {
            is_new = false;
            record.id = *existing;
        }
    }

    if record.removed {
        // never synced means it does not exist locally
        if !index.synced.contains_key(&record.id) {
            tracing::debug!(id = %record.id, "not tracked locally, skipping deletion");
            return Ok((None, Outcome::Skipped));
        }
        batch.delete(record.id).await?;
        tracing::debug!(id = %record.id, "deleted record");
        return Ok((None, Outcome::Deleted));
    }

    if is_new {
        record.id = RecordId::new();
        // the record comes from the upstream, so it is published and valid
        record.creator = uid;
        record.owner = uid;
        record.published = true;
        record.valid = true;
        batch.create_with_metadata(&record).await?;
        tracing::debug!(id = %record.id, "created record");
        return Ok((Some(record.id), Outcome::Written));
    }

    // skip when the upstream has not moved since our last sync
    let modified = effective_modified(&record.blob);
    let last_synced = index.synced.get(&record.id).copied();
    if let (Some(modified), Some(last)) = (modified, last_synced) {
        if modified <= last {
            tracing::debug!(id = %record.id, "not modified upstream since last sync");
            batch.update_synced(record.id).await?;
            return Ok((Some(record.id), Outcome::Skipped));
        }
    }

    batch.update(record.id, &record.blob).await?;
    tracing::debug!(id = %record.id, "updated record");
    Ok((Some(record.id), Outcome::Written))
}
