//! The dataset record: local authoritative draft and published state.

use crate::blob::get_string;
use crate::id::RecordId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;

/// One local draft or published dataset entity.
///
/// The `blob` payload schema is owned by the upstream; the core reads a small
/// set of paths through [`crate::blob`]. Lifecycle flags mirror what the
/// datastore persists alongside the payload.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Record {
    pub id: RecordId,
    pub family: i16,
    pub schema: String,
    pub creator: RecordId,
    pub owner: RecordId,
    #[serde(with = "time::serde::rfc3339")]
    pub created: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub modified: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub synced: Option<OffsetDateTime>,
    pub published: bool,
    pub valid: bool,
    pub removed: bool,
    pub blob: Value,
}

impl Record {
    /// The upstream's canonical identifier, set only after publication.
    pub fn upstream_identifier(&self) -> Option<&str> {
        get_string(&self.blob, "identifier")
    }

    /// A record counts as published exactly when the upstream assigned it an
    /// identifier.
    pub fn is_published(&self) -> bool {
        self.upstream_identifier().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(blob: Value) -> Record {
        let now = OffsetDateTime::now_utc();
        Record {
            id: RecordId::new(),
            family: crate::UPSTREAM_FAMILY,
            schema: "metax-ida".to_string(),
            creator: RecordId::new(),
            owner: RecordId::new(),
            created: now,
            modified: now,
            synced: None,
            published: false,
            valid: true,
            removed: false,
            blob,
        }
    }

    #[test]
    fn published_iff_identifier_present() {
        assert!(!record(json!({})).is_published());
        assert!(!record(json!({"identifier": ""})).is_published());
        assert!(record(json!({"identifier": "urn:x"})).is_published());
    }
}
