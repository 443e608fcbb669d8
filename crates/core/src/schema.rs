//! Payload templates and the catalog table.
//!
//! Both maps are process-wide and immutable after first use; readers never
//! take a lock.

use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::LazyLock;

/// Catalog identifier of the preservation (PAS) catalog. Records in it keep a
/// frozen file/directory structure.
pub const PAS_CATALOG: &str = "urn:nbn:fi:att:data-catalog-pas";

/// Catalog identifier of the IDA storage catalog.
pub const IDA_CATALOG: &str = "urn:nbn:fi:att:data-catalog-ida";

/// Catalog identifier of the remote-resources (ATT) catalog.
pub const ATT_CATALOG: &str = "urn:nbn:fi:att:data-catalog-att";

/// Payload templates keyed by schema.
///
/// A template is the skeleton a new draft is merged into; the caller's payload
/// becomes its `research_dataset`.
static TEMPLATES: LazyLock<HashMap<&'static str, Value>> = LazyLock::new(|| {
    HashMap::from([
        (
            "metax-ida",
            json!({
                "data_catalog": { "identifier": IDA_CATALOG },
                "research_dataset": {},
            }),
        ),
        (
            "metax-att",
            json!({
                "data_catalog": { "identifier": ATT_CATALOG },
                "research_dataset": {},
            }),
        ),
        (
            "metax-pas",
            json!({
                "data_catalog": { "identifier": PAS_CATALOG },
                "research_dataset": {},
            }),
        ),
    ])
});

/// Catalog identifier to schema key.
static CATALOGS: LazyLock<HashMap<&'static str, &'static str>> = LazyLock::new(|| {
    HashMap::from([
        (IDA_CATALOG, "metax-ida"),
        (ATT_CATALOG, "metax-att"),
        (PAS_CATALOG, "metax-pas"),
    ])
});

/// Get the payload template for a schema key.
pub fn template(schema: &str) -> Option<&'static Value> {
    TEMPLATES.get(schema)
}

/// Resolve a catalog identifier to its schema key.
pub fn schema_for_catalog(catalog: &str) -> Option<&'static str> {
    CATALOGS.get(catalog).copied()
}

/// All known schema keys, for registry construction.
pub fn known_schemas() -> Vec<&'static str> {
    let mut keys: Vec<_> = TEMPLATES.keys().copied().collect();
    keys.sort_unstable();
    keys
}
