//! Query options for dataset listing and streaming.

use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

/// Options for a dataset stream read.
///
/// At most one of the owner and user filters applies; setting one clears the
/// other. The since filter and the removed view are independent.
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    owner: Option<String>,
    user: Option<String>,
    since: Option<OffsetDateTime>,
    removed: bool,
}

impl QueryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Filter on records this service authored for the given owner id.
    pub fn with_owner(mut self, uid: impl Into<String>) -> Self {
        self.owner = Some(uid.into());
        self.user = None;
        self
    }

    /// Filter on the external user identity recorded in
    /// `metadata_provider_user`.
    pub fn with_user(mut self, identity: impl Into<String>) -> Self {
        self.user = Some(identity.into());
        self.owner = None;
        self
    }

    /// Only records the upstream modified after this time.
    pub fn since(mut self, t: OffsetDateTime) -> Self {
        self.since = Some(t);
        self
    }

    /// Read the removed-records view.
    pub fn with_removed(mut self) -> Self {
        self.removed = true;
        self
    }

    pub fn is_removed(&self) -> bool {
        self.removed
    }

    /// Render the raw query string, streaming parameters included.
    pub(crate) fn to_query(&self) -> String {
        let mut parts = vec!["stream=true".to_string(), "no_pagination=true".to_string()];
        if let Some(owner) = &self.owner {
            parts.push(format!("editor={}", curator_core::APP_MARKER));
            parts.push(format!("owner_id={owner}"));
        }
        if let Some(user) = &self.user {
            parts.push(format!("metadata_provider_user={user}"));
        }
        if let Some(since) = &self.since {
            if let Ok(ts) = since.format(&Rfc3339) {
                parts.push(format!("modified_since={ts}"));
            }
        }
        if self.removed {
            parts.push("removed=true".to_string());
        }
        parts.join("&")
    }
}
