//! User facts supplied by the login collaborator.

use crate::id::RecordId;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// An authenticated user as the outer session layer resolves it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct User {
    pub uid: RecordId,
    /// External subject string from the identity provider.
    pub identity: String,
    pub name: String,
    pub email: String,
    pub organisation: String,
    /// Project memberships, in token order.
    pub projects: Vec<String>,
}

impl User {
    /// Membership test over `projects`.
    pub fn has_project(&self, project: &str) -> bool {
        self.projects.iter().any(|p| p == project)
    }

    /// The comma-joined project list forwarded to the upstream. The commas
    /// must stay literal, so callers append this without form-escaping.
    pub fn allowed_projects(&self) -> String {
        self.projects.join(",")
    }

    /// PII-filtered projection for the front-end.
    pub fn public_view(&self) -> Value {
        json!({
            "uid": self.uid.to_string(),
            "identity": self.identity,
            "name": self.name,
            "organisation": self.organisation,
            "projects": self.projects,
        })
    }

    /// A throwaway user for tests.
    pub fn for_testing(identity: &str, projects: &[&str]) -> Self {
        Self {
            uid: RecordId::new(),
            identity: identity.to_string(),
            name: identity.to_string(),
            email: format!("{identity}@example.org"),
            organisation: "example.org".to_string(),
            projects: projects.iter().map(|p| p.to_string()).collect(),
        }
    }
}
