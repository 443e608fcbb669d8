//! Datastore integration tests.
//!
//! These run against a live PostgreSQL pointed to by
//! `CURATOR_TEST_DATABASE_URL` and are skipped when the variable is unset.

use curator_store::{Datastore, StoreError};

use curator_core::{draft, RecordId, UPSTREAM_FAMILY};
use serde_json::json;
use std::collections::HashMap;
use time::OffsetDateTime;

async fn store_or_skip() -> Option<Datastore> {
    let Ok(url) = std::env::var("CURATOR_TEST_DATABASE_URL") else {
        eprintln!("Skipping datastore test: CURATOR_TEST_DATABASE_URL not set");
        return None;
    };
    Some(
        Datastore::connect(&url, 2)
            .await
            .expect("datastore connection failed"),
    )
}

fn fresh_record(owner: RecordId) -> curator_core::Record {
    draft::new_draft(
        UPSTREAM_FAMILY,
        "metax-ida",
        owner,
        json!({"title": {"en": "integration"}}),
        &HashMap::new(),
    )
    .expect("draft creation failed")
}

#[tokio::test]
async fn record_lifecycle() {
    let Some(store) = store_or_skip().await else {
        return;
    };
    let owner = RecordId::new();
    let record = fresh_record(owner);

    store.create(&record).await.expect("create failed");
    assert!(matches!(
        store.create(&record).await,
        Err(StoreError::Exists)
    ));

    let loaded = store.get(record.id).await.expect("get failed");
    assert_eq!(loaded.id, record.id);
    assert_eq!(loaded.schema, "metax-ida");
    assert!(!loaded.published);

    // ownership checks
    assert!(matches!(
        store.get_with_owner(record.id, RecordId::new()).await,
        Err(StoreError::NotOwner)
    ));
    assert!(matches!(
        store.get(RecordId::new()).await,
        Err(StoreError::NotFound)
    ));

    store
        .delete(record.id, Some(owner))
        .await
        .expect("delete failed");
    assert!(matches!(
        store.get(record.id).await,
        Err(StoreError::NotFound)
    ));
}

#[tokio::test]
async fn last_sync_written_on_batch_commit() {
    let Some(store) = store_or_skip().await else {
        return;
    };
    let uid = RecordId::new();

    assert!(matches!(
        store.get_last_sync(uid).await,
        Err(StoreError::NotFound)
    ));

    let before = OffsetDateTime::now_utc();
    let mut batch = store.new_batch_for_user(uid).await.expect("batch failed");
    let record = fresh_record(uid);
    batch
        .create_with_metadata(&record)
        .await
        .expect("batch create failed");
    batch.commit().await.expect("commit failed");

    let last = store.get_last_sync(uid).await.expect("no last sync");
    assert!(last >= before);

    let loaded = store.get(record.id).await.expect("record not committed");
    assert!(loaded.synced.is_some());
}

#[tokio::test]
async fn batch_rollback_discards_writes() {
    let Some(store) = store_or_skip().await else {
        return;
    };
    let uid = RecordId::new();
    let record = fresh_record(uid);

    let mut batch = store.new_batch_for_user(uid).await.expect("batch failed");
    batch.create(&record).await.expect("batch create failed");
    batch.rollback().await.expect("rollback failed");

    assert!(matches!(
        store.get(record.id).await,
        Err(StoreError::NotFound)
    ));
    assert!(matches!(
        store.get_last_sync(uid).await,
        Err(StoreError::NotFound)
    ));
}

#[tokio::test]
async fn store_published_sets_flags_and_sync_time() {
    let Some(store) = store_or_skip().await else {
        return;
    };
    let uid = RecordId::new();
    let record = fresh_record(uid);
    store.create(&record).await.expect("create failed");

    let synced = OffsetDateTime::from_unix_timestamp(1_577_934_245).unwrap();
    let mut blob = record.blob.clone();
    blob["identifier"] = json!("urn:published:1");
    store
        .store_published(record.id, &blob, synced)
        .await
        .expect("store_published failed");

    let loaded = store.get(record.id).await.expect("get failed");
    assert!(loaded.published);
    assert!(loaded.valid);
    assert_eq!(loaded.synced, Some(synced));
    assert_eq!(loaded.upstream_identifier(), Some("urn:published:1"));

    store.delete(record.id, None).await.expect("cleanup failed");
}

#[tokio::test]
async fn store_new_version_inherits_parent_ownership() {
    let Some(store) = store_or_skip().await else {
        return;
    };
    let uid = RecordId::new();
    let parent = fresh_record(uid);
    store.create(&parent).await.expect("create failed");

    let new_id = RecordId::new();
    let synced = OffsetDateTime::now_utc();
    let blob = json!({"identifier": "urn:derived:1", "data_catalog": {"identifier": "urn:nbn:fi:att:data-catalog-ida"}});
    store
        .store_new_version(parent.id, new_id, synced, &blob)
        .await
        .expect("store_new_version failed");

    let derived = store.get(new_id).await.expect("derived missing");
    assert_eq!(derived.owner, uid);
    assert_eq!(derived.creator, parent.creator);
    assert_eq!(derived.schema, parent.schema);
    assert!(derived.published);

    // a missing parent aborts before any insert
    assert!(matches!(
        store
            .store_new_version(RecordId::new(), RecordId::new(), synced, &blob)
            .await,
        Err(StoreError::NotFound)
    ));
}

#[tokio::test]
async fn smart_update_preserves_upstream_owned_fields() {
    let Some(store) = store_or_skip().await else {
        return;
    };
    let uid = RecordId::new();
    let record = fresh_record(uid);
    store.create(&record).await.expect("create failed");

    let synced = OffsetDateTime::now_utc();
    let mut published = record.blob.clone();
    published["identifier"] = json!("urn:published:2");
    published["preservation_state"] = json!(0);
    published["cumulative_state"] = json!(1);
    store
        .store_published(record.id, &published, synced)
        .await
        .expect("store_published failed");

    let patch = json!({
        "research_dataset": {"title": {"en": "edited"}},
        "identifier": "urn:forged",
        "cumulative_state": 0,
    });
    let updated = store
        .smart_update_with_owner(record.id, &patch, uid)
        .await
        .expect("smart update failed");

    // client edits land
    assert_eq!(
        curator_core::get_string(&updated.blob, "research_dataset.title.en"),
        Some("edited")
    );
    // upstream-owned fields do not
    assert_eq!(updated.upstream_identifier(), Some("urn:published:2"));
    assert_eq!(updated.blob["cumulative_state"], json!(1));
}
