//! Core domain types and shared logic for the Curator dataset gateway.
//!
//! This crate defines the canonical data model used across all other crates:
//! - Time-ordered record identifiers
//! - The dataset record and its lifecycle flags
//! - Editor metadata linking upstream payloads back to local records
//! - Schema family registry, payload templates and the catalog table
//! - Draft creation/update and the update validation rules
//! - JSON path access and normalized structural equality
//! - User facts (identity, organisation, project membership)

pub mod blob;
pub mod config;
pub mod draft;
pub mod error;
pub mod external;
pub mod id;
pub mod record;
pub mod registry;
pub mod schema;
pub mod user;

pub use blob::{get_path, get_string, normalized_eq, set_path};
pub use draft::{new_draft, update_draft, validate_created, validate_updated};
pub use error::{Error, Result};
pub use external::{effective_modified, from_external, to_external, ExternalRecord};
pub use id::RecordId;
pub use record::Record;
pub use registry::{registry, FamilyDescriptor, Registry};
pub use user::User;

/// Schema family of records owned by the upstream catalog service.
pub const UPSTREAM_FAMILY: i16 = 2;

/// Marker written to `editor.identifier` in every payload authored here.
pub const APP_MARKER: &str = "curator";
