//! Schema family registry.
//!
//! Families opt in once, at process init; after that the registry is immutable
//! and readers are lock-free. The upstream catalog family (family 2) is always
//! present.

use crate::record::Record;
use crate::schema;
use std::collections::HashMap;
use std::sync::OnceLock;

/// Per-family dispatch entry: how records of this family are created, loaded
/// and validated.
pub struct FamilyDescriptor {
    pub family: i16,
    pub name: &'static str,
    /// Schema keys this family accepts.
    pub schemas: Vec<&'static str>,
    /// Family-specific payload validation, run on create and update.
    pub validate: fn(&Record) -> crate::Result<()>,
}

impl FamilyDescriptor {
    /// True when the schema key belongs to this family.
    pub fn has_schema(&self, schema: &str) -> bool {
        self.schemas.iter().any(|s| *s == schema)
    }
}

/// The process-wide family table.
pub struct Registry {
    families: HashMap<i16, FamilyDescriptor>,
}

impl Registry {
    fn with_families(descriptors: Vec<FamilyDescriptor>) -> Self {
        let mut families = HashMap::new();
        for d in descriptors {
            families.insert(d.family, d);
        }
        Self { families }
    }

    /// Look up a family descriptor.
    pub fn get(&self, family: i16) -> crate::Result<&FamilyDescriptor> {
        self.families
            .get(&family)
            .ok_or(crate::Error::UnknownFamily(family))
    }
}

static REGISTRY: OnceLock<Registry> = OnceLock::new();

fn upstream_family() -> FamilyDescriptor {
    FamilyDescriptor {
        family: crate::UPSTREAM_FAMILY,
        name: "upstream",
        schemas: schema::known_schemas(),
        validate: crate::draft::validate_payload,
    }
}

/// Register additional families. May only be called before the first
/// [`registry`] read; later calls return an error and change nothing.
pub fn register_families(extra: Vec<FamilyDescriptor>) -> crate::Result<()> {
    let mut descriptors = vec![upstream_family()];
    descriptors.extend(extra);
    REGISTRY
        .set(Registry::with_families(descriptors))
        .map_err(|_| crate::Error::InvalidInput("family registry already initialized".into()))
}

/// The process-wide registry, initialized with the builtin families on first
/// use.
pub fn registry() -> &'static Registry {
    REGISTRY.get_or_init(|| Registry::with_families(vec![upstream_family()]))
}
