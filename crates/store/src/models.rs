//! Row types mapped with sqlx.

use curator_core::{Record, RecordId};
use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

/// A row of the `records` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RecordRow {
    pub id: Uuid,
    pub family: i16,
    pub schema: String,
    pub creator: Uuid,
    pub owner: Uuid,
    pub created: OffsetDateTime,
    pub modified: OffsetDateTime,
    pub synced: Option<OffsetDateTime>,
    pub published: bool,
    pub valid: bool,
    pub blob: Value,
}

impl RecordRow {
    /// Convert into the core record type. Rows are never tombstones; removed
    /// records are deleted outright.
    pub fn into_record(self) -> Record {
        Record {
            id: RecordId::from_uuid(self.id),
            family: self.family,
            schema: self.schema,
            creator: RecordId::from_uuid(self.creator),
            owner: RecordId::from_uuid(self.owner),
            created: self.created,
            modified: self.modified,
            synced: self.synced,
            published: self.published,
            valid: self.valid,
            removed: false,
            blob: self.blob,
        }
    }
}
