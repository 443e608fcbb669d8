//! The PostgreSQL datastore.

use crate::batch::Batch;
use crate::error::{StoreError, StoreResult};
use crate::models::RecordRow;
use curator_core::{draft, set_path, Record, RecordId};
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Transaction};
use time::OffsetDateTime;

/// Embedded schema, executed statement by statement at startup.
const SCHEMA_SQL: &str = include_str!("schema.sql");

// Postgres rejects multiple statements in one prepared statement, so the
// schema runs one statement at a time. Fragments that hold only comments or
// whitespace are dropped.
fn schema_statements(schema: &str) -> impl Iterator<Item = &str> {
    schema.split(';').map(str::trim).filter(|statement| {
        statement
            .lines()
            .map(str::trim)
            .any(|line| !line.is_empty() && !line.starts_with("--"))
    })
}

/// The datastore: local authoritative record state.
#[derive(Clone)]
pub struct Datastore {
    pool: PgPool,
}

impl Datastore {
    /// Connect and run migrations.
    pub async fn connect(url: &str, max_connections: u32) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;
        let store = Self { pool };
        store.migrate().await?;
        tracing::debug!(max_connections, "datastore connected, schema ensured");
        Ok(store)
    }

    /// Wrap an existing pool (tests).
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Build a store without connecting; the first query opens a connection.
    /// No migration runs. Useful when the database may not be there yet.
    pub fn connect_lazy(url: &str) -> StoreResult<Self> {
        let pool = PgPoolOptions::new().connect_lazy(url)?;
        Ok(Self { pool })
    }

    /// Execute the embedded schema.
    pub async fn migrate(&self) -> StoreResult<()> {
        for statement in schema_statements(SCHEMA_SQL) {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    /// Check database connectivity.
    pub async fn health_check(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// Get a record by id.
    pub async fn get(&self, id: RecordId) -> StoreResult<Record> {
        let row = sqlx::query_as::<_, RecordRow>("SELECT * FROM records WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::NotFound)?;
        Ok(row.into_record())
    }

    /// Get a record by id, confirming ownership.
    pub async fn get_with_owner(&self, id: RecordId, owner: RecordId) -> StoreResult<Record> {
        let record = self.get(id).await?;
        if record.owner != owner {
            return Err(StoreError::NotOwner);
        }
        Ok(record)
    }

    /// Get a record by the upstream's canonical identifier.
    pub async fn get_by_upstream_identifier(&self, identifier: &str) -> StoreResult<Record> {
        let row = sqlx::query_as::<_, RecordRow>(
            "SELECT * FROM records WHERE blob->>'identifier' = $1 ORDER BY created LIMIT 1",
        )
        .bind(identifier)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotFound)?;
        Ok(row.into_record())
    }

    /// All records owned by a user.
    pub async fn get_all_for_uid(&self, uid: RecordId) -> StoreResult<Vec<Record>> {
        let rows = sqlx::query_as::<_, RecordRow>(
            "SELECT * FROM records WHERE owner = $1 ORDER BY created",
        )
        .bind(uid.as_uuid())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(RecordRow::into_record).collect())
    }

    /// Time of the user's last successful sync.
    pub async fn get_last_sync(&self, uid: RecordId) -> StoreResult<OffsetDateTime> {
        sqlx::query_scalar::<_, OffsetDateTime>(
            "SELECT last_sync FROM sync_status WHERE owner = $1",
        )
        .bind(uid.as_uuid())
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotFound)
    }

    /// Insert a new record.
    pub async fn create(&self, record: &Record) -> StoreResult<()> {
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
        .bind(record.synced)
        .bind(record.published)
        .bind(record.valid)
        .bind(&record.blob)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Replace a record's payload.
    pub async fn update(&self, id: RecordId, blob: &Value) -> StoreResult<()> {
        let result = sqlx::query("UPDATE records SET blob = $2, modified = $3 WHERE id = $1")
            .bind(id.as_uuid())
            .bind(blob)
            .bind(OffsetDateTime::now_utc())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    /// Merge a payload into a record owned by `owner`, preserving the fields
    /// only the upstream may change.
    ///
    /// Top-level keys of `patch` overwrite the stored payload; readonly fields
    /// (and `cumulative_state` once published) are restored from the stored
    /// value afterwards, so a client cannot smuggle changes past validation.
    pub async fn smart_update_with_owner(
        &self,
        id: RecordId,
        patch: &Value,
        owner: RecordId,
    ) -> StoreResult<Record> {
        let existing = self.get_with_owner(id, owner).await?;
        let patch_obj = patch
            .as_object()
            .ok_or_else(|| StoreError::InvalidInput("payload must be a JSON object".into()))?;

        let mut blob = existing.blob.clone();
        {
            let obj = blob
                .as_object_mut()
                .ok_or_else(|| StoreError::Internal("stored payload is not an object".into()))?;
            for (key, value) in patch_obj {
                obj.insert(key.clone(), value.clone());
            }
        }

        let mut preserved: Vec<&str> = draft::READONLY_FIELDS.to_vec();
        if existing.published {
            preserved.push("cumulative_state");
        }
        preserved.push("identifier");
        for field in preserved {
            let stored = curator_core::get_path(&existing.blob, field).cloned();
            set_path(&mut blob, field, stored);
        }

        self.update(id, &blob).await?;
        let mut updated = existing;
        updated.blob = blob;
        updated.modified = OffsetDateTime::now_utc();
        Ok(updated)
    }

    /// Delete a record, optionally confirming ownership first.
    pub async fn delete(&self, id: RecordId, owner: Option<RecordId>) -> StoreResult<()> {
        if let Some(owner) = owner {
            // distinguishes NotOwner from NotFound before deleting
            self.get_with_owner(id, owner).await?;
        }
        let result = sqlx::query("DELETE FROM records WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    /// Record the upstream's publish response: payload, flags and sync time.
    pub async fn store_published(
        &self,
        id: RecordId,
        blob: &Value,
        synced: OffsetDateTime,
    ) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE records
            SET blob = $2, synced = $3, modified = $4, published = TRUE, valid = TRUE
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .bind(blob)
        .bind(synced)
        .bind(OffsetDateTime::now_utc())
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    /// Store a derived record the upstream spawned from `parent`, in a single
    /// transaction. The new record inherits the parent's family, schema and
    /// ownership.
    pub async fn store_new_version(
        &self,
        parent: RecordId,
        new_id: RecordId,
        synced: OffsetDateTime,
        blob: &Value,
    ) -> StoreResult<()> {
        let mut tx: Transaction<'_, Postgres> = self.pool.begin().await?;

        let parent_row = sqlx::query_as::<_, RecordRow>(
            "SELECT * FROM records WHERE id = $1 FOR UPDATE",
        )
        .bind(parent.as_uuid())
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(StoreError::NotFound)?;

        let now = OffsetDateTime::now_utc();
        sqlx::query(
            r#"
            INSERT INTO records (id, family, schema, creator, owner, created, modified, synced, published, valid, blob)
            VALUES ($1, $2, $3, $4, $5, $6, $6, $7, TRUE, TRUE, $8)
            "#,
        )
        .bind(new_id.as_uuid())
        .bind(parent_row.family)
        .bind(&parent_row.schema)
        .bind(parent_row.creator)
        .bind(parent_row.owner)
        .bind(now)
        .bind(synced)
        .bind(blob)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Open a sync batch for a user: one transaction wrapping all of the
    /// batch's writes.
    pub async fn new_batch_for_user(&self, uid: RecordId) -> StoreResult<Batch> {
        let tx = self.pool.begin().await?;
        Ok(Batch::new(tx, uid))
    }
}
