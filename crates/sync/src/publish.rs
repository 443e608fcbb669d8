//! The publication engine: push local drafts upstream and record what came
//! back.

use crate::error::{SyncError, SyncResult};
use crate::{SyncService, PUBLISH_TIMEOUT};
use curator_core::{effective_modified, ExternalRecord, RecordId, User, UPSTREAM_FAMILY};
use serde_json::json;
use time::OffsetDateTime;

/// Result of a publish call.
#[derive(Debug, Clone)]
pub struct PublishOutcome {
    /// The upstream's canonical identifier for the published record.
    pub upstream_id: String,
    /// Identifier of a derived version, when the publish spawned one.
    pub new_upstream_id: Option<String>,
    /// Local id of the stored derived version.
    pub new_record_id: Option<RecordId>,
}

impl SyncService {
    /// Publish a local record upstream.
    ///
    /// First publishes create, later ones patch. The upstream's response
    /// becomes the stored payload; when it announces a derived version, that
    /// version is fetched and stored in the same transaction shape the
    /// datastore guarantees. The whole call runs under one deadline.
    pub async fn publish(&self, id: RecordId, owner: &User) -> SyncResult<PublishOutcome> {
        match tokio::time::timeout(PUBLISH_TIMEOUT, self.publish_inner(id, owner)).await {
            Ok(result) => result,
            Err(_) => Err(SyncError::Timeout),
        }
    }

    async fn publish_inner(&self, id: RecordId, owner: &User) -> SyncResult<PublishOutcome> {
        let record = self.store().get_with_owner(id, owner.uid).await?;

        let mut blob = record.blob.clone();
        let provenance_key = if record.published {
            "user_modified"
        } else {
            "user_created"
        };
        if let Some(obj) = blob.as_object_mut() {
            obj.insert(provenance_key.to_string(), json!(owner.identity));
        }

        tracing::debug!(id = %id, published = record.published, "publishing record");
        let response = if record.published {
            let upstream_id = record
                .upstream_identifier()
                .ok_or(SyncError::NoIdentifier)?;
            self.upstream().update(upstream_id, &blob, owner).await?
        } else {
            self.upstream().create(&blob, owner).await?
        };

        let external = ExternalRecord(response);
        let upstream_id = external
            .identifier()
            .ok_or(SyncError::NoIdentifier)?
            .to_string();
        let synced = effective_modified(&external.0).unwrap_or_else(OffsetDateTime::now_utc);
        self.store().store_published(id, &external.0, synced).await?;
        tracing::info!(id = %id, upstream_id = %upstream_id, "record published");

        let Some(new_upstream_id) = external.new_version_identifier().map(str::to_string) else {
            return Ok(PublishOutcome {
                upstream_id,
                new_upstream_id: None,
                new_record_id: None,
            });
        };

        // the upstream spawned a derived version; mirror it locally
        let new_blob = self.upstream().get(&new_upstream_id).await?;
        let new_record_id = RecordId::new();
        let new_synced = effective_modified(&new_blob).unwrap_or_else(OffsetDateTime::now_utc);
        self.store()
            .store_new_version(id, new_record_id, new_synced, &new_blob)
            .await?;
        tracing::info!(
            id = %id,
            new_upstream_id = %new_upstream_id,
            new_record_id = %new_record_id,
            "derived version stored"
        );

        Ok(PublishOutcome {
            upstream_id,
            new_upstream_id: Some(new_upstream_id),
            new_record_id: Some(new_record_id),
        })
    }

    /// Change a published record's cumulative state via the upstream RPC, then
    /// re-sync the affected record (and the derived version, when one was
    /// created). Any unpublished local changes are overwritten.
    pub async fn change_cumulative_state(
        &self,
        id: RecordId,
        owner: &User,
        state: &str,
    ) -> SyncResult<Option<RecordId>> {
        let identifier = self.upstream_identifier_of(id, owner).await?;
        let new_upstream_id = match tokio::time::timeout(
            PUBLISH_TIMEOUT,
            self.upstream().change_cumulative_state(&identifier, state),
        )
        .await
        {
            Ok(result) => result?,
            Err(_) => return Err(SyncError::Timeout),
        };
        tracing::debug!(
            identifier = %identifier,
            state,
            new_version = new_upstream_id.as_deref().unwrap_or(""),
            "changed cumulative state"
        );
        self.refetch_after_rpc(owner.uid, &identifier, new_upstream_id).await
    }

    /// Refresh one directory's content inside a published record via the
    /// upstream RPC, then re-sync like [`Self::change_cumulative_state`].
    pub async fn refresh_directory_content(
        &self,
        id: RecordId,
        owner: &User,
        directory_id: &str,
    ) -> SyncResult<Option<RecordId>> {
        let identifier = self.upstream_identifier_of(id, owner).await?;
        let new_upstream_id = match tokio::time::timeout(
            PUBLISH_TIMEOUT,
            self.upstream()
                .refresh_directory_content(&identifier, directory_id),
        )
        .await
        {
            Ok(result) => result?,
            Err(_) => return Err(SyncError::Timeout),
        };
        tracing::debug!(
            identifier = %identifier,
            directory_id,
            new_version = new_upstream_id.as_deref().unwrap_or(""),
            "refreshed directory content"
        );
        self.refetch_after_rpc(owner.uid, &identifier, new_upstream_id).await
    }

    /// Soft-delete upstream, then delete locally. Fails closed: only an
    /// upstream NotFound lets the local deletion proceed after a failure.
    pub async fn unpublish_and_delete(&self, id: RecordId, owner: &User) -> SyncResult<()> {
        let record = self.store().get_with_owner(id, owner.uid).await?;

        if record.upstream_identifier().is_some() {
            let result = match tokio::time::timeout(
                PUBLISH_TIMEOUT,
                self.upstream().delete(&record.blob),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => return Err(SyncError::Timeout),
            };
            match result {
                Ok(()) => {}
                Err(err) if err.is_not_found() => {
                    tracing::debug!(id = %id, "already gone upstream");
                }
                Err(err) => return Err(err.into()),
            }
        }

        self.store().delete(id, Some(owner.uid)).await?;
        tracing::info!(id = %id, "record unpublished and deleted");
        Ok(())
    }

    async fn upstream_identifier_of(&self, id: RecordId, owner: &User) -> SyncResult<String> {
        let record = self.store().get_with_owner(id, owner.uid).await?;
        if record.family != UPSTREAM_FAMILY {
            return Err(SyncError::NotUpstreamDataset(id.to_string()));
        }
        record
            .upstream_identifier()
            .map(str::to_string)
            .ok_or(SyncError::NoIdentifier)
    }

    async fn refetch_after_rpc(
        &self,
        uid: RecordId,
        identifier: &str,
        new_upstream_id: Option<String>,
    ) -> SyncResult<Option<RecordId>> {
        self.fetch_one(uid, identifier).await?;
        match new_upstream_id {
            Some(new_id) => self.fetch_one(uid, &new_id).await,
            None => Ok(None),
        }
    }
}
