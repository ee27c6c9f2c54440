//! Rollback engine integration tests

use std::collections::HashSet;

use dashmaster::content::hash;
use dashmaster::deploy::UploadOutcome;
use dashmaster::errors::CompanionError;
use dashmaster::events::{Event, EventFilter};
use dashmaster::storage::ConfigStore;

use crate::common::{pack, Fixture};

async fn upload(fixture: &Fixture, files: &[(&str, &str)]) -> UploadOutcome {
    fixture
        .state
        .deployer
        .upload("esp-000", pack(files), None)
        .await
        .unwrap()
}

#[tokio::test]
async fn test_rollback_to_previous_snapshot() {
    let fixture = Fixture::claimed().await;
    let first = upload(&fixture, &[("config.json", r#"{"a":1}"#)]).await;
    let second = upload(&fixture, &[("config.json", r#"{"a":2}"#)]).await;
    let mut sub = fixture.state.events.subscribe(EventFilter::all());

    let outcome = fixture
        .state
        .rollback
        .rollback("esp-000", None, Some("bob".to_string()))
        .await
        .unwrap();

    assert_eq!(outcome.target, first.snapshot.name);
    assert_eq!(outcome.hashes["config.json"], Some(hash(br#"{"a":1}"#)));
    assert_eq!(outcome.diff["config.json"], true);
    assert!(outcome.snapshot.name.ends_with("-rollback"));
    assert!(outcome.snapshot.name > second.snapshot.name);
    assert_eq!(
        outcome.snapshot.note.as_deref(),
        Some(format!("rolled_back_to={}", first.snapshot.name).as_str())
    );

    let device = fixture.state.registry.get("esp-000").unwrap();
    assert_eq!(device.current_hashes, first.hashes);
    assert_eq!(
        device.snapshot_names,
        vec![
            first.snapshot.name.clone(),
            second.snapshot.name.clone(),
            outcome.snapshot.name.clone()
        ]
    );

    // History is append-only; the target itself is untouched
    let files = fixture.generation("esp-000", &outcome.snapshot.name).await;
    assert_eq!(files["config.json"], br#"{"a":1}"#.to_vec());
    let target = fixture.generation("esp-000", &first.snapshot.name).await;
    assert_eq!(target["config.json"], br#"{"a":1}"#.to_vec());

    match sub.recv().await.unwrap() {
        Event::ConfigRollback(event) => {
            assert_eq!(event.hostname, "esp-000");
            assert_eq!(event.snapshot, first.snapshot.name);
            assert_eq!(event.actor.as_deref(), Some("bob"));
        }
        other => panic!("unexpected event {:?}", other),
    }
}

#[tokio::test]
async fn test_rollback_to_named_snapshot_keeps_later_files() {
    let fixture = Fixture::claimed().await;
    let first = upload(&fixture, &[("layout.json", "[1]")]).await;
    upload(&fixture, &[("layout.json", "[2]")]).await;
    let third = upload(&fixture, &[("theme.css", "body {}")]).await;

    let outcome = fixture
        .state
        .rollback
        .rollback("esp-000", Some(&first.snapshot.name), None)
        .await
        .unwrap();

    assert_eq!(outcome.diff.len(), 1);
    assert_eq!(outcome.diff["layout.json"], true);
    assert_eq!(outcome.hashes["layout.json"], Some(hash(b"[1]")));
    assert_eq!(outcome.hashes["theme.css"], third.hashes["theme.css"]);
    assert_eq!(outcome.snapshot.files, vec!["layout.json".to_string()]);

    let files = fixture.generation("esp-000", &outcome.snapshot.name).await;
    assert_eq!(files["layout.json"], b"[1]".to_vec());
    assert_eq!(files["theme.css"], b"body {}".to_vec());
}

#[tokio::test]
async fn test_rollback_to_missing_snapshot() {
    let fixture = Fixture::claimed().await;
    upload(&fixture, &[("config.json", "{}")]).await;
    upload(&fixture, &[("config.json", "[]")]).await;
    let before = fixture.state.registry.get("esp-000").unwrap();

    let err = fixture
        .state
        .rollback
        .rollback("esp-000", Some("19700101T000000.000000Z"), None)
        .await
        .unwrap_err();
    assert!(matches!(err, CompanionError::NotFound(_)));
    assert_eq!(fixture.state.registry.get("esp-000").unwrap(), before);
    assert_eq!(fixture.store.generation_count("esp-000"), 2);
}

#[tokio::test]
async fn test_rollback_needs_an_earlier_snapshot() {
    let fixture = Fixture::claimed().await;
    let rollback = &fixture.state.rollback;

    let err = rollback.rollback("esp-000", None, None).await.unwrap_err();
    assert!(matches!(err, CompanionError::NotFound(_)));

    upload(&fixture, &[("config.json", "{}")]).await;
    let err = rollback.rollback("esp-000", None, None).await.unwrap_err();
    assert_eq!(
        err.to_string(),
        "No earlier snapshot to roll back to for esp-000"
    );
}

#[tokio::test]
async fn test_rollback_requires_claimed_device() {
    let fixture = Fixture::new(2).await;
    let rollback = &fixture.state.rollback;

    let err = rollback.rollback("esp-001", None, None).await.unwrap_err();
    assert!(matches!(err, CompanionError::InvalidState(_)));

    let err = rollback.rollback("esp-404", None, None).await.unwrap_err();
    assert!(matches!(err, CompanionError::NotFound(_)));
}

#[tokio::test]
async fn test_rollback_storage_failure() {
    let fixture = Fixture::claimed().await;
    upload(&fixture, &[("config.json", "{}")]).await;
    upload(&fixture, &[("config.json", "[]")]).await;
    let before = fixture.state.registry.get("esp-000").unwrap();
    let mut sub = fixture.state.events.subscribe(EventFilter::all());

    fixture.store.set_fail_snapshot_commits(true);
    let err = fixture
        .state
        .rollback
        .rollback("esp-000", None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, CompanionError::StorageFailure(_)));

    assert_eq!(fixture.state.registry.get("esp-000").unwrap(), before);
    assert_eq!(fixture.store.generation_count("esp-000"), 2);
    assert_eq!(fixture.store.list_snapshots("esp-000").await.unwrap().len(), 2);
    assert!(sub.try_recv().is_none());
}

#[tokio::test]
async fn test_upload_after_rollback_builds_on_restored_files() {
    let fixture = Fixture::claimed().await;
    upload(&fixture, &[("layout.json", "[1]"), ("theme.css", "a {}")]).await;
    upload(&fixture, &[("layout.json", "[2]")]).await;
    fixture
        .state
        .rollback
        .rollback("esp-000", None, None)
        .await
        .unwrap();

    let outcome = upload(&fixture, &[("theme.css", "b {}")]).await;
    assert_eq!(outcome.hashes["layout.json"], Some(hash(b"[1]")));
    let files = fixture.generation("esp-000", &outcome.snapshot.name).await;
    assert_eq!(files["layout.json"], b"[1]".to_vec());
    assert_eq!(files["theme.css"], b"b {}".to_vec());
}

#[tokio::test]
async fn test_interleaved_uploads_and_rollbacks_keep_history_consistent() {
    let fixture = Fixture::claimed().await;
    upload(&fixture, &[("config.json", "[0]")]).await;
    upload(&fixture, &[("config.json", "[1]")]).await;

    let mut tasks = Vec::new();
    for i in 0..12 {
        if i % 3 == 0 {
            let rollback = fixture.state.rollback.clone();
            tasks.push(tokio::spawn(async move {
                rollback
                    .rollback("esp-000", None, None)
                    .await
                    .map(|outcome| outcome.snapshot.name)
            }));
        } else {
            let deployer = fixture.state.deployer.clone();
            let body = format!("[{}]", i + 2);
            tasks.push(tokio::spawn(async move {
                deployer
                    .upload("esp-000", pack(&[("config.json", body.as_str())]), None)
                    .await
                    .map(|outcome| outcome.snapshot.name)
            }));
        }
    }

    let mut created = Vec::new();
    for task in tasks {
        created.push(task.await.unwrap().unwrap());
    }

    let device = fixture.state.registry.get("esp-000").unwrap();
    assert_eq!(device.snapshot_names.len(), 14);
    let unique: HashSet<&String> = device.snapshot_names.iter().collect();
    assert_eq!(unique.len(), device.snapshot_names.len());
    assert!(created.iter().all(|name| unique.contains(name)));

    let stored = fixture.store.list_snapshots("esp-000").await.unwrap();
    let stored_names: Vec<String> = stored.iter().map(|s| s.name.clone()).collect();
    assert_eq!(stored_names, device.snapshot_names);

    let last = stored.last().unwrap();
    assert_eq!(device.current_hashes, last.hashes);
    let files = fixture.generation("esp-000", &last.name).await;
    assert_eq!(
        Some(hash(&files["config.json"])),
        device.current_hashes["config.json"]
    );
}
