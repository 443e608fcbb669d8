//! Draft creation, partial updates and the update validation rules.

use crate::blob::{get_path, get_string, normalized_eq};
use crate::id::RecordId;
use crate::record::Record;
use crate::registry::registry;
use crate::schema::{self, PAS_CATALOG};
use crate::{Error, Result, APP_MARKER};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use time::OffsetDateTime;

/// Fields only the upstream may set or change.
pub const READONLY_FIELDS: &[&str] = &[
    "research_dataset.metadata_version_identifier",
    "research_dataset.preferred_identifier",
    "research_dataset.total_files_byte_size",
    "preservation_state",
];

/// Editor metadata identifying this service as the author of a payload.
fn editor_value(id: RecordId) -> Value {
    json!({
        "identifier": APP_MARKER,
        "record_id": id.to_string(),
    })
}

/// Parse an extras `cumulative_state` into its JSON number form.
///
/// `"2"` is only meaningful for already-published records, which rules it out
/// at creation time.
fn cumulative_state_value(raw: &str, published: bool) -> Result<Value> {
    match raw {
        "0" => Ok(json!(0)),
        "1" => Ok(json!(1)),
        "2" if published => Ok(json!(2)),
        other => Err(Error::InvalidInput(format!(
            "invalid cumulative_state value {other}"
        ))),
    }
}

/// Consume an extras map, rejecting keys outside the closed set.
struct Extras<'a> {
    map: &'a HashMap<String, String>,
    used: Vec<&'static str>,
}

impl<'a> Extras<'a> {
    fn new(map: &'a HashMap<String, String>) -> Self {
        Self { map, used: Vec::new() }
    }

    fn take(&mut self, key: &'static str) -> Option<&'a str> {
        self.used.push(key);
        self.map.get(key).map(String::as_str).filter(|v| !v.is_empty())
    }

    fn finish(self) -> Result<()> {
        for key in self.map.keys() {
            if !self.used.iter().any(|used| *used == key.as_str()) {
                return Err(Error::InvalidInput(format!("unknown key {key} in extra map")));
            }
        }
        Ok(())
    }
}

/// Create a new draft record: merge the payload into the schema template,
/// stamp editor metadata and write the provenance fields.
pub fn new_draft(
    family: i16,
    schema_key: &str,
    creator: RecordId,
    payload: Value,
    extras: &HashMap<String, String>,
) -> Result<Record> {
    let descriptor = registry().get(family)?;
    if !descriptor.has_schema(schema_key) {
        return Err(Error::UnknownSchema(schema_key.to_string()));
    }
    let template = schema::template(schema_key)
        .ok_or_else(|| Error::UnknownSchema(schema_key.to_string()))?;

    let id = RecordId::new();
    let mut blob = template.clone();
    let obj = blob
        .as_object_mut()
        .expect("payload templates are JSON objects");
    obj.insert("research_dataset".to_string(), payload);
    obj.insert("editor".to_string(), editor_value(id));

    let mut extras = Extras::new(extras);
    if let Some(identity) = extras.take("identity") {
        obj.insert("metadata_provider_user".to_string(), json!(identity));
    }
    if let Some(org) = extras.take("org") {
        obj.insert("metadata_provider_org".to_string(), json!(org));
    }
    if let Some(state) = extras.take("cumulative_state") {
        obj.insert(
            "cumulative_state".to_string(),
            cumulative_state_value(state, false)?,
        );
    }
    extras.finish()?;

    let now = OffsetDateTime::now_utc();
    Ok(Record {
        id,
        family,
        schema: schema_key.to_string(),
        creator,
        owner: creator,
        created: now,
        modified: now,
        synced: None,
        published: false,
        valid: true,
        removed: false,
        blob,
    })
}

/// Build the partial payload used to patch an existing record.
///
/// Only `research_dataset`, `editor` and the supplied extras travel; the
/// upstream merges the patch into its stored document.
pub fn update_draft(
    record: &Record,
    payload: Value,
    extras: &HashMap<String, String>,
) -> Result<Value> {
    let descriptor = registry().get(record.family)?;
    if !descriptor.has_schema(&record.schema) {
        return Err(Error::UnknownSchema(record.schema.clone()));
    }

    let mut patch = Map::new();
    patch.insert("research_dataset".to_string(), payload);
    patch.insert("editor".to_string(), editor_value(record.id));

    let mut extras = Extras::new(extras);
    if let Some(identity) = extras.take("identity") {
        patch.insert("metadata_provider_user".to_string(), json!(identity));
    }
    if let Some(state) = extras.take("cumulative_state") {
        patch.insert(
            "cumulative_state".to_string(),
            cumulative_state_value(state, record.published)?,
        );
    }
    extras.finish()?;

    Ok(Value::Object(patch))
}

/// Family validation hook: check `cumulative_state` against the record's
/// publication state.
pub fn validate_payload(record: &Record) -> Result<()> {
    match get_path(&record.blob, "cumulative_state") {
        None => Ok(()),
        Some(v) => match v.as_i64() {
            Some(0) | Some(1) => Ok(()),
            Some(2) if record.published => Ok(()),
            _ => Err(Error::InvalidInput(format!(
                "invalid cumulative_state value {v}"
            ))),
        },
    }
}

/// Validate a freshly created record: payload checks plus the rule that
/// upstream-owned fields are not set before first publication.
pub fn validate_created(record: &Record) -> Result<()> {
    let descriptor = registry().get(record.family)?;
    (descriptor.validate)(record)?;

    for field in READONLY_FIELDS {
        if let Some(v) = get_path(&record.blob, field) {
            return Err(Error::InvalidInput(format!(
                "readonly field {field} should not be set, has value: {v}"
            )));
        }
    }
    Ok(())
}

/// The catalog identifier, read from `data_catalog.identifier` or a direct
/// string `data_catalog`.
pub fn catalog_identifier(blob: &Value) -> Option<&str> {
    get_string(blob, "data_catalog.identifier").or_else(|| get_string(blob, "data_catalog"))
}

/// Validate a proposed update against the stored record.
pub fn validate_updated(existing: &Record, proposed: &Record) -> Result<()> {
    if existing.family != proposed.family {
        return Err(Error::InvalidInput("dataset family mismatch".into()));
    }
    if existing.schema != proposed.schema {
        return Err(Error::InvalidInput("dataset schema mismatch".into()));
    }

    let descriptor = registry().get(proposed.family)?;
    (descriptor.validate)(proposed)?;

    let preservation_state = get_path(&existing.blob, "preservation_state")
        .and_then(Value::as_i64)
        .unwrap_or(0);
    if preservation_state >= 80 && preservation_state != 100 && preservation_state != 130 {
        return Err(Error::Frozen(preservation_state));
    }

    let mut readonly: Vec<&str> = READONLY_FIELDS.to_vec();
    // only the upstream may change cumulative_state after publication
    if existing.published {
        readonly.push("cumulative_state");
    }

    for field in readonly {
        let old = get_path(&existing.blob, field);
        let new = get_path(&proposed.blob, field);
        if !normalized_eq(old, new) {
            // a missing top-level field keeps its stored value
            if !field.contains('.') && new.is_none() {
                continue;
            }
            return Err(Error::ReadOnlyField {
                field: field.to_string(),
                old: old.map(Value::to_string).unwrap_or_default(),
                new: new.map(Value::to_string).unwrap_or_default(),
            });
        }
    }

    // file and directory structure is frozen for superseded records and for
    // the preservation catalog
    let is_pas = preservation_state > 0
        || catalog_identifier(&existing.blob) == Some(PAS_CATALOG);
    let is_superseded = get_string(&existing.blob, "next_dataset_version.identifier").is_some();
    if is_pas || is_superseded {
        if !normalized_eq(
            get_path(&existing.blob, "research_dataset.files"),
            get_path(&proposed.blob, "research_dataset.files"),
        ) {
            return Err(Error::FileStructureChanged("files"));
        }
        if !normalized_eq(
            get_path(&existing.blob, "research_dataset.directories"),
            get_path(&proposed.blob, "research_dataset.directories"),
        ) {
            return Err(Error::FileStructureChanged("directories"));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn extras(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn draft() -> Record {
        new_draft(
            crate::UPSTREAM_FAMILY,
            "metax-ida",
            RecordId::new(),
            json!({"title": {"en": "Test"}}),
            &extras(&[("identity", "alice@example.org"), ("org", "example.org")]),
        )
        .unwrap()
    }

    #[test]
    fn new_draft_stamps_editor_and_provenance() {
        let r = draft();
        assert_eq!(get_string(&r.blob, "editor.identifier"), Some(APP_MARKER));
        assert_eq!(
            get_string(&r.blob, "editor.record_id"),
            Some(r.id.to_string().as_str())
        );
        assert_eq!(
            get_string(&r.blob, "metadata_provider_user"),
            Some("alice@example.org")
        );
        assert_eq!(get_string(&r.blob, "metadata_provider_org"), Some("example.org"));
        assert_eq!(
            get_path(&r.blob, "research_dataset.title.en"),
            Some(&json!("Test"))
        );
        assert!(!r.published);
        assert_eq!(r.creator, r.owner);
    }

    #[test]
    fn new_draft_rejects_unknown_extras() {
        let err = new_draft(
            crate::UPSTREAM_FAMILY,
            "metax-ida",
            RecordId::new(),
            json!({}),
            &extras(&[("color", "blue")]),
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn new_draft_rejects_unknown_schema() {
        let err = new_draft(
            crate::UPSTREAM_FAMILY,
            "no-such-schema",
            RecordId::new(),
            json!({}),
            &HashMap::new(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::UnknownSchema(_)));
    }

    #[test]
    fn cumulative_state_boundaries_at_creation() {
        for (value, ok) in [("0", true), ("1", true), ("2", false), ("7", false)] {
            let result = new_draft(
                crate::UPSTREAM_FAMILY,
                "metax-ida",
                RecordId::new(),
                json!({}),
                &extras(&[("cumulative_state", value)]),
            );
            assert_eq!(result.is_ok(), ok, "cumulative_state = {value}");
        }
    }

    #[test]
    fn update_draft_is_partial() {
        let r = draft();
        let patch = update_draft(
            &r,
            json!({"title": {"en": "Renamed"}}),
            &extras(&[("identity", "alice@example.org")]),
        )
        .unwrap();
        let keys: Vec<_> = patch.as_object().unwrap().keys().cloned().collect();
        assert_eq!(keys.len(), 3);
        assert!(keys.contains(&"research_dataset".to_string()));
        assert!(keys.contains(&"editor".to_string()));
        assert!(keys.contains(&"metadata_provider_user".to_string()));
    }

    #[test]
    fn update_draft_allows_closing_cumulative_after_publish() {
        let mut r = draft();
        r.published = true;
        assert!(update_draft(&r, json!({}), &extras(&[("cumulative_state", "2")])).is_ok());

        let unpublished = draft();
        assert!(
            update_draft(&unpublished, json!({}), &extras(&[("cumulative_state", "2")])).is_err()
        );
    }

    #[test]
    fn validate_created_rejects_readonly_fields() {
        let mut r = draft();
        assert!(validate_created(&r).is_ok());
        r.blob["preservation_state"] = json!(10);
        assert!(validate_created(&r).is_err());
    }

    #[test]
    fn identity_update_is_valid() {
        let r = draft();
        assert!(validate_updated(&r, &r).is_ok());
    }

    #[test]
    fn preservation_state_boundaries() {
        for (state, ok) in [(0, true), (79, true), (80, false), (100, true), (130, true), (90, false)] {
            let mut existing = draft();
            existing.blob["preservation_state"] = json!(state);
            let mut proposed = existing.clone();
            proposed.blob["research_dataset"]["title"] = json!({"en": "edit"});
            assert_eq!(
                validate_updated(&existing, &proposed).is_ok(),
                ok,
                "preservation_state = {state}"
            );
        }
    }

    #[test]
    fn readonly_fields_must_roundtrip_for_published() {
        let mut existing = draft();
        existing.published = true;
        existing.blob["research_dataset"]["preferred_identifier"] = json!("urn:pid:1");
        let mut proposed = existing.clone();
        proposed.blob["research_dataset"]["preferred_identifier"] = json!("urn:pid:2");
        assert!(matches!(
            validate_updated(&existing, &proposed),
            Err(Error::ReadOnlyField { .. })
        ));
    }

    #[test]
    fn missing_top_level_readonly_field_keeps_stored_value() {
        let mut existing = draft();
        existing.blob["preservation_state"] = json!(0);
        let mut proposed = existing.clone();
        proposed.blob.as_object_mut().unwrap().remove("preservation_state");
        assert!(validate_updated(&existing, &proposed).is_ok());
    }

    #[test]
    fn cumulative_state_readonly_after_publish() {
        let mut existing = draft();
        existing.published = true;
        existing.blob["cumulative_state"] = json!(1);
        let mut proposed = existing.clone();
        proposed.blob["cumulative_state"] = json!(0);
        assert!(validate_updated(&existing, &proposed).is_err());
    }

    #[test]
    fn superseded_record_freezes_files() {
        let mut existing = draft();
        existing.blob["next_dataset_version"] = json!({"identifier": "urn:next"});
        existing.blob["research_dataset"]["files"] = json!([{"identifier": "f1"}]);
        let mut proposed = existing.clone();
        proposed.blob["research_dataset"]["files"] = json!([{"identifier": "f2"}]);
        assert!(matches!(
            validate_updated(&existing, &proposed),
            Err(Error::FileStructureChanged("files"))
        ));
    }

    #[test]
    fn pas_catalog_freezes_directories() {
        let mut existing = new_draft(
            crate::UPSTREAM_FAMILY,
            "metax-pas",
            RecordId::new(),
            json!({"directories": [{"identifier": "d1"}]}),
            &HashMap::new(),
        )
        .unwrap();
        existing.blob["research_dataset"]["directories"] = json!([{"identifier": "d1"}]);
        let mut proposed = existing.clone();
        proposed.blob["research_dataset"]["directories"] = json!([{"identifier": "d2"}]);
        assert!(matches!(
            validate_updated(&existing, &proposed),
            Err(Error::FileStructureChanged("directories"))
        ));
    }

    #[test]
    fn frozen_files_compare_normalized_not_textually() {
        let mut existing = draft();
        existing.blob["next_dataset_version"] = json!({"identifier": "urn:next"});
        existing.blob["research_dataset"]["files"] =
            serde_json::from_str(r#"[{"identifier": "f1", "title": "a"}]"#).unwrap();
        let mut proposed = existing.clone();
        proposed.blob["research_dataset"]["files"] =
            serde_json::from_str(r#"[{"title": "a", "identifier": "f1"}]"#).unwrap();
        assert!(validate_updated(&existing, &proposed).is_ok());
    }
}
