//! Deployment engine integration tests

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use dashmaster::content::hash;
use dashmaster::errors::CompanionError;
use dashmaster::events::EventFilter;
use dashmaster::registry::DeviceStatus;
use dashmaster::storage::ConfigStore;

use crate::common::{pack, Fixture};

#[tokio::test]
async fn test_first_upload_and_identical_reupload() {
    let fixture = Fixture::claimed().await;
    let deployer = &fixture.state.deployer;
    let h1 = hash(br#"{"a":1}"#);

    let first = deployer
        .upload("esp-000", pack(&[("config.json", r#"{"a":1}"#)]), None)
        .await
        .unwrap();
    assert_eq!(first.hashes["config.json"], Some(h1.clone()));
    assert_eq!(first.diff["config.json"], true);
    assert_eq!(first.device.status, DeviceStatus::Configured);
    assert_eq!(first.snapshot.files, vec!["config.json".to_string()]);

    let second = deployer
        .upload("esp-000", pack(&[("config.json", r#"{"a":1}"#)]), None)
        .await
        .unwrap();
    assert_eq!(second.diff["config.json"], false);
    assert_eq!(second.hashes["config.json"], Some(h1));
    assert_ne!(second.snapshot.name, first.snapshot.name);

    let device = fixture.state.registry.get("esp-000").unwrap();
    assert_eq!(
        device.snapshot_names,
        vec![first.snapshot.name, second.snapshot.name]
    );
}

#[tokio::test]
async fn test_partial_upload_merges_left_biased() {
    let fixture = Fixture::claimed().await;
    let deployer = &fixture.state.deployer;

    deployer
        .upload(
            "esp-000",
            pack(&[("layout.json", "[1]"), ("theme.css", "body {}")]),
            Some("alice".to_string()),
        )
        .await
        .unwrap();
    let outcome = deployer
        .upload("esp-000", pack(&[("layout.json", "[2]")]), None)
        .await
        .unwrap();

    // Diff only covers the uploaded file
    assert_eq!(outcome.diff.len(), 1);
    assert_eq!(outcome.diff["layout.json"], true);

    // Untouched files keep their hash and content
    assert_eq!(outcome.hashes["layout.json"], Some(hash(b"[2]")));
    assert_eq!(outcome.hashes["theme.css"], Some(hash(b"body {}")));
    let files = fixture.generation("esp-000", &outcome.snapshot.name).await;
    assert_eq!(files["layout.json"], b"[2]".to_vec());
    assert_eq!(files["theme.css"], b"body {}".to_vec());

    let snapshots = deployer.snapshots("esp-000").await.unwrap();
    assert_eq!(snapshots.len(), 2);
    assert_eq!(snapshots[0].actor.as_deref(), Some("alice"));
    assert_eq!(snapshots[1].files, vec!["layout.json".to_string()]);
    assert_eq!(snapshots[1].hashes, outcome.hashes);
}

#[tokio::test]
async fn test_upload_requires_claimed_device() {
    let fixture = Fixture::new(2).await;
    let deployer = &fixture.state.deployer;

    let err = deployer
        .upload("esp-001", pack(&[("config.json", "{}")]), None)
        .await
        .unwrap_err();
    assert!(matches!(err, CompanionError::InvalidState(_)));

    let err = deployer
        .upload("esp-404", pack(&[("config.json", "{}")]), None)
        .await
        .unwrap_err();
    assert!(matches!(err, CompanionError::NotFound(_)));
    assert_eq!(fixture.store.generation_count("esp-001"), 0);
}

#[tokio::test]
async fn test_storage_failure_leaves_no_trace() {
    let fixture = Fixture::claimed().await;
    let deployer = &fixture.state.deployer;
    deployer
        .upload("esp-000", pack(&[("config.json", "{}")]), None)
        .await
        .unwrap();
    let before = fixture.state.registry.get("esp-000").unwrap();
    let mut sub = fixture.state.events.subscribe(EventFilter::all());

    fixture.store.set_fail_snapshot_commits(true);
    let err = deployer
        .upload("esp-000", pack(&[("config.json", "[]")]), None)
        .await
        .unwrap_err();
    assert!(matches!(err, CompanionError::StorageFailure(_)));
    assert_eq!(fixture.store.generation_count("esp-000"), 1);

    fixture.store.set_fail_snapshot_commits(false);
    fixture.store.set_fail_generation_writes(true);
    let err = deployer
        .upload("esp-000", pack(&[("config.json", "[]")]), None)
        .await
        .unwrap_err();
    assert!(matches!(err, CompanionError::StorageFailure(_)));

    assert_eq!(fixture.state.registry.get("esp-000").unwrap(), before);
    assert_eq!(fixture.store.list_snapshots("esp-000").await.unwrap().len(), 1);
    assert!(sub.try_recv().is_none());
}

#[tokio::test]
async fn test_concurrent_uploads_serialize() {
    let fixture = Fixture::claimed().await;
    let deployer = fixture.state.deployer.clone();

    let mut handles = Vec::new();
    for i in 0..10 {
        let deployer = deployer.clone();
        handles.push(tokio::spawn(async move {
            let name = format!("file-{}.json", i);
            let body = format!("[{}]", i);
            deployer
                .upload("esp-000", pack(&[(name.as_str(), body.as_str())]), None)
                .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let device = fixture.state.registry.get("esp-000").unwrap();
    assert_eq!(device.snapshot_names.len(), 10);
    let unique: HashSet<&String> = device.snapshot_names.iter().collect();
    assert_eq!(unique.len(), 10);
    assert_eq!(device.current_hashes.len(), 10);

    // The last generation holds every file
    let files = fixture
        .generation("esp-000", device.snapshot_names.last().unwrap())
        .await;
    assert_eq!(files.len(), 10);

    let stored: Vec<String> = fixture
        .store
        .list_snapshots("esp-000")
        .await
        .unwrap()
        .into_iter()
        .map(|s| s.name)
        .collect();
    assert_eq!(stored, device.snapshot_names);
}

#[tokio::test]
async fn test_distinct_devices_do_not_contend() {
    let fixture = Fixture::claimed().await;
    fixture.state.registry.claim("esp-001", None).await.unwrap();

    let _held = fixture.state.registry.lease("esp-000").await.unwrap();
    let outcome = tokio::time::timeout(
        Duration::from_secs(1),
        fixture
            .state
            .deployer
            .upload("esp-001", pack(&[("config.json", "{}")]), None),
    )
    .await
    .unwrap()
    .unwrap();
    assert_eq!(outcome.device.hostname, "esp-001");

    // The held device waits for its lease
    let deployer = Arc::clone(&fixture.state.deployer);
    let blocked = tokio::time::timeout(
        Duration::from_millis(50),
        deployer.upload("esp-000", pack(&[("config.json", "{}")]), None),
    )
    .await;
    assert!(blocked.is_err());
}
