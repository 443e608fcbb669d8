//! Translation between upstream payloads and local records.

use crate::blob::{get_path, get_string};
use crate::draft::catalog_identifier;
use crate::id::RecordId;
use crate::record::Record;
use crate::schema::schema_for_catalog;
use crate::user::User;
use crate::{Error, Result, APP_MARKER, UPSTREAM_FAMILY};
use serde_json::{json, Value};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

/// Keys carrying upstream timestamps; the latest set one is the effective
/// modification time.
const DATE_KEYS: &[&str] = &["date_created", "date_modified", "date_deprecated", "date_removed"];

/// An unparsed record as the upstream serves it.
#[derive(Clone, Debug)]
pub struct ExternalRecord(pub Value);

impl ExternalRecord {
    /// Parse raw upstream bytes.
    pub fn parse(raw: &[u8]) -> Result<Self> {
        Ok(Self(serde_json::from_slice(raw)?))
    }

    /// The upstream's canonical identifier.
    pub fn identifier(&self) -> Option<&str> {
        get_string(&self.0, "identifier")
    }

    /// The identifier of a derived version, present in publish responses that
    /// spawned one.
    pub fn new_version_identifier(&self) -> Option<&str> {
        get_string(&self.0, "new_version_created.identifier")
    }

    /// True when the upstream reports this record as removed.
    pub fn removed(&self) -> bool {
        get_path(&self.0, "removed").and_then(Value::as_bool).unwrap_or(false)
    }

    /// The local record id claimed by the editor metadata.
    ///
    /// `Ok(None)` means the payload is not ours (absent or foreign editor, or
    /// no record id); a present but unparsable id is an error.
    pub fn local_id(&self) -> Result<Option<RecordId>> {
        if get_string(&self.0, "editor.identifier") != Some(APP_MARKER) {
            return Ok(None);
        }
        match get_string(&self.0, "editor.record_id") {
            None => Ok(None),
            Some(raw) => RecordId::parse(raw).map(Some).map_err(|_| Error::InvalidId),
        }
    }

    /// Convert into a local record.
    ///
    /// Returns the record and whether it is new to this service. A record with
    /// valid editor metadata keeps its claimed id; anything else comes back
    /// with a nil id for the caller to assign.
    pub fn into_record(self) -> Result<(Record, bool)> {
        let local_id = self.local_id()?;
        let is_new = local_id.is_none();
        let removed = self.removed();

        // removed records only exist to be deleted or skipped; the upstream
        // does not always keep their catalog around
        let schema = if removed {
            catalog_identifier(&self.0)
                .and_then(schema_for_catalog)
                .unwrap_or_default()
        } else {
            let catalog = catalog_identifier(&self.0)
                .ok_or_else(|| Error::UnknownCatalog("<missing>".to_string()))?;
            schema_for_catalog(catalog)
                .ok_or_else(|| Error::UnknownCatalog(catalog.to_string()))?
        };

        let now = OffsetDateTime::now_utc();
        let created = parse_date(&self.0, "date_created").unwrap_or(now);
        let modified = parse_date(&self.0, "date_modified").unwrap_or(now);

        Ok((
            Record {
                id: local_id.unwrap_or_else(RecordId::nil),
                family: UPSTREAM_FAMILY,
                schema: schema.to_string(),
                creator: RecordId::nil(),
                owner: RecordId::nil(),
                created,
                modified,
                synced: None,
                published: false,
                valid: false,
                removed,
                blob: self.0,
            },
            is_new,
        ))
    }
}

fn parse_date(blob: &Value, key: &str) -> Option<OffsetDateTime> {
    get_string(blob, key).and_then(|s| OffsetDateTime::parse(s, &Rfc3339).ok())
}

/// The effective upstream modification time: the latest of the creation,
/// modification, deprecation and removal dates that is set.
pub fn effective_modified(blob: &Value) -> Option<OffsetDateTime> {
    DATE_KEYS
        .iter()
        .filter_map(|key| parse_date(blob, key))
        .max()
}

/// Classify raw upstream bytes into a local record; see
/// [`ExternalRecord::into_record`].
pub fn from_external(raw: &[u8]) -> Result<(Record, bool)> {
    ExternalRecord::parse(raw)?.into_record()
}

/// Serialize a record for the upstream, restamping the editor metadata so the
/// payload always links back to the local id.
pub fn to_external(record: &Record, _owner: &User) -> Result<Vec<u8>> {
    let mut blob = record.blob.clone();
    if let Some(obj) = blob.as_object_mut() {
        obj.insert(
            "editor".to_string(),
            json!({
                "identifier": APP_MARKER,
                "record_id": record.id.to_string(),
            }),
        );
    }
    Ok(serde_json::to_vec(&blob)?)
}
