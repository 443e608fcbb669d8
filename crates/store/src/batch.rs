//! Sync batches: one datastore transaction per reconciliation run.

use crate::error::{StoreError, StoreResult};
use curator_core::{Record, RecordId};
use serde_json::Value;
use sqlx::{Postgres, Transaction};
use time::OffsetDateTime;

/// A batch of record writes for one user, applied in one transaction.
///
/// Nothing is visible to other connections until [`Batch::commit`]; dropping
/// the batch rolls everything back. Commit also records the user's last-sync
/// time, which drives both incremental syncs and the per-user rate limit.
pub struct Batch {
    tx: Transaction<'static, Postgres>,
    owner: RecordId,
}

impl Batch {
    pub(crate) fn new(tx: Transaction<'static, Postgres>, owner: RecordId) -> Self {
        Self { tx, owner }
    }

    /// Insert a new record as-is.
    pub async fn create(&mut self, record: &Record) -> StoreResult<()> {
        self.insert(record, record.synced).await
    }

    /// Insert a record that just arrived from the upstream: the sync time is
    /// stamped now.
    pub async fn create_with_metadata(&mut self, record: &Record) -> StoreResult<()> {
        self.insert(record, Some(OffsetDateTime::now_utc())).await
    }

    async fn insert(&mut self, record: &Record, synced: Option<OffsetDateTime>) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO records (id, family, schema, creator, owner, created, modified, synced, published, valid, blob)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(record.id.as_uuid())
        .bind(record.family)
        .bind(&record.schema)
        .bind(record.creator.as_uuid())
        .bind(record.owner.as_uuid())
        .bind(record.created)
        .bind(record.modified)
        .bind(synced)
        .bind(record.published)
        .bind(record.valid)
        .bind(&record.blob)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    /// Replace a record's payload with the upstream's and mark it synced.
    pub async fn update(&mut self, id: RecordId, blob: &Value) -> StoreResult<()> {
        let now = OffsetDateTime::now_utc();
        let result = sqlx::query(
            "UPDATE records SET blob = $3, modified = $4, synced = $4, published = TRUE, valid = TRUE WHERE id = $1 AND owner = $2",
        )
        .bind(id.as_uuid())
        .bind(self.owner.as_uuid())
        .bind(blob)
        .bind(now)
        .execute(&mut *self.tx)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    /// Bump the sync timestamp without touching the payload.
    pub async fn update_synced(&mut self, id: RecordId) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE records SET synced = $3 WHERE id = $1 AND owner = $2",
        )
        .bind(id.as_uuid())
        .bind(self.owner.as_uuid())
        .bind(OffsetDateTime::now_utc())
        .execute(&mut *self.tx)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    /// Delete a record the upstream reports as removed.
    pub async fn delete(&mut self, id: RecordId) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM records WHERE id = $1 AND owner = $2")
            .bind(id.as_uuid())
            .bind(self.owner.as_uuid())
            .execute(&mut *self.tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    /// Commit the batch and record the user's last-sync time.
    pub async fn commit(mut self) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO sync_status (owner, last_sync) VALUES ($1, $2)
            ON CONFLICT (owner) DO UPDATE SET last_sync = EXCLUDED.last_sync
            "#,
        )
        .bind(self.owner.as_uuid())
        .bind(OffsetDateTime::now_utc())
        .execute(&mut *self.tx)
        .await?;
        self.tx.commit().await?;
        Ok(())
    }

    /// Discard the batch. Dropping without calling this has the same effect.
    pub async fn rollback(self) -> StoreResult<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}
