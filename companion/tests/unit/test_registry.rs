//! Registry integration tests

use std::sync::Arc;

use dashmaster::app::state::AppState;
use dashmaster::errors::CompanionError;
use dashmaster::events::{Event, EventFilter};
use dashmaster::filesys::dir::Dir;
use dashmaster::registry::DeviceStatus;
use dashmaster::storage::layout::StorageLayout;
use dashmaster::storage::reservations::{generated_reservations, Reservation};
use dashmaster::storage::{FsConfigStore, MemoryConfigStore};

use crate::common::{pack, test_options, Fixture, MockTransport};

#[tokio::test]
async fn test_seed_and_claim() {
    let fixture = Fixture::new(3).await;
    let registry = &fixture.state.registry;
    let mut sub = fixture.state.events.subscribe(EventFilter::all());

    let device = registry.get("esp-000").unwrap();
    assert_eq!(device.status, DeviceStatus::Unclaimed);
    assert_eq!(device.slot_index, 0);
    assert_eq!(device.http_port, 8100);
    assert_eq!(device.admin_port, 8200);
    assert_eq!(device.mqtt_topic, "dashmaster/devices/000");

    let device = registry
        .claim("esp-000", Some("sensor-v1".to_string()))
        .await
        .unwrap();
    assert_eq!(device.status, DeviceStatus::Claimed);
    assert_eq!(device.profile.as_deref(), Some("sensor-v1"));

    match sub.recv().await.unwrap() {
        Event::DeviceClaimed(claimed) => {
            assert_eq!(claimed.hostname, "esp-000");
            assert_eq!(claimed.slot_index, 0);
            assert_eq!(claimed.profile.as_deref(), Some("sensor-v1"));
        }
        other => panic!("unexpected event {:?}", other),
    }
}

#[tokio::test]
async fn test_claim_twice_is_invalid_state() {
    let fixture = Fixture::claimed().await;
    let mut sub = fixture.state.events.subscribe(EventFilter::all());

    let err = fixture
        .state
        .registry
        .claim("esp-000", Some("other".to_string()))
        .await
        .unwrap_err();
    assert!(matches!(err, CompanionError::InvalidState(_)));

    let device = fixture.state.registry.get("esp-000").unwrap();
    assert_eq!(device.profile.as_deref(), Some("sensor-v1"));
    assert!(sub.try_recv().is_none());
}

#[tokio::test]
async fn test_release_keeps_slot() {
    let fixture = Fixture::claimed().await;
    let registry = &fixture.state.registry;
    let before = registry.get("esp-000").unwrap();
    let mut sub = fixture.state.events.subscribe(EventFilter::all());

    let device = registry.release("esp-000").await.unwrap();
    assert_eq!(device.status, DeviceStatus::Unclaimed);
    assert_eq!(device.profile, None);
    assert_eq!(device.slot_index, before.slot_index);
    assert_eq!(device.http_port, before.http_port);
    assert_eq!(device.mqtt_topic, before.mqtt_topic);
    assert!(matches!(sub.recv().await, Some(Event::DeviceReleased(_))));

    // Claimable again on the same slot
    let device = registry.claim("esp-000", None).await.unwrap();
    assert_eq!(device.slot_index, before.slot_index);
}

#[tokio::test]
async fn test_lookup_and_listing() {
    let fixture = Fixture::new(3).await;
    let registry = &fixture.state.registry;

    assert!(matches!(
        registry.get("esp-404"),
        Err(CompanionError::NotFound(_))
    ));
    assert!(matches!(
        registry.claim("esp-404", None).await,
        Err(CompanionError::NotFound(_))
    ));

    let slots: Vec<u32> = registry.list().iter().map(|d| d.slot_index).collect();
    assert_eq!(slots, vec![0, 1, 2]);
}

#[tokio::test]
async fn test_capacity_exhausted() {
    let fixture = Fixture::new(2).await;
    let registry = &fixture.state.registry;

    assert!(matches!(
        registry.seed("esp-extra"),
        Err(CompanionError::CapacityExhausted(_))
    ));

    registry.claim_next(None).await.unwrap();
    registry.claim_next(None).await.unwrap();
    let err = registry.claim_next(None).await.unwrap_err();
    assert!(matches!(err, CompanionError::InvalidState(_)));
    assert_eq!(err.to_string(), "No available device slots");
}

#[tokio::test]
async fn test_reads_do_not_wait_on_leases() {
    let fixture = Fixture::claimed().await;
    let registry = &fixture.state.registry;

    let _lease = registry.lease("esp-000").await.unwrap();
    assert_eq!(registry.get("esp-000").unwrap().status, DeviceStatus::Claimed);
    assert_eq!(registry.list().len(), 2);

    // Other hostnames are not held up either
    let claimed = tokio::time::timeout(
        std::time::Duration::from_secs(1),
        registry.claim("esp-001", None),
    )
    .await
    .unwrap()
    .unwrap();
    assert_eq!(claimed.hostname, "esp-001");
}

#[tokio::test]
async fn test_history_survives_restart() {
    let root = Dir::create_temp_dir("dashmaster-restart").await.unwrap();
    let options = test_options(2);
    let reservations = generated_reservations("esp", 2);

    let first = AppState::build(
        &options,
        Arc::new(FsConfigStore::new(StorageLayout::new(root.path()))),
        Arc::new(MockTransport::default()),
        &reservations,
    )
    .await
    .unwrap();
    first.registry.claim("esp-000", None).await.unwrap();
    let s1 = first
        .deployer
        .upload("esp-000", pack(&[("config.json", r#"{"a":1}"#)]), None)
        .await
        .unwrap();
    let s2 = first
        .deployer
        .upload("esp-000", pack(&[("config.json", r#"{"a":2}"#)]), None)
        .await
        .unwrap();
    drop(first);

    let second = AppState::build(
        &options,
        Arc::new(FsConfigStore::new(StorageLayout::new(root.path()))),
        Arc::new(MockTransport::default()),
        &reservations,
    )
    .await
    .unwrap();

    let device = second.registry.get("esp-000").unwrap();
    assert_eq!(device.status, DeviceStatus::Unclaimed);
    assert_eq!(
        device.snapshot_names,
        vec![s1.snapshot.name.clone(), s2.snapshot.name.clone()]
    );
    assert_eq!(device.current_hashes, s2.hashes);
    assert_eq!(device.last_upload_at, Some(s2.snapshot.created_at));

    // Restored history is usable once the device is claimed again
    second.registry.claim("esp-000", None).await.unwrap();
    let outcome = second.rollback.rollback("esp-000", None, None).await.unwrap();
    assert_eq!(outcome.target, s1.snapshot.name);
    assert_eq!(outcome.hashes, s1.hashes);

    root.delete().await.unwrap();
}

#[tokio::test]
async fn test_reserved_slots_survive_reordered_reservations() {
    let root = Dir::create_temp_dir("dashmaster-slots").await.unwrap();
    let options = test_options(3);

    let first = AppState::build(
        &options,
        Arc::new(FsConfigStore::new(StorageLayout::new(root.path()))),
        Arc::new(MockTransport::default()),
        &[Reservation::pinned("lobby", 0), Reservation::pinned("kitchen", 1)],
    )
    .await
    .unwrap();
    first.registry.claim("kitchen", None).await.unwrap();
    let upload = first
        .deployer
        .upload("kitchen", pack(&[("config.json", "{}")]), None)
        .await
        .unwrap();
    let before = first.registry.get("kitchen").unwrap();
    drop(first);

    // lobby is gone and an unpinned device is listed ahead of kitchen
    let second = AppState::build(
        &options,
        Arc::new(FsConfigStore::new(StorageLayout::new(root.path()))),
        Arc::new(MockTransport::default()),
        &[Reservation::new("hall"), Reservation::pinned("kitchen", 1)],
    )
    .await
    .unwrap();

    let after = second.registry.get("kitchen").unwrap();
    assert_eq!(after.slot_index, before.slot_index);
    assert_eq!(after.http_port, before.http_port);
    assert_eq!(after.admin_port, before.admin_port);
    assert_eq!(after.mqtt_topic, before.mqtt_topic);
    assert_eq!(after.snapshot_names, vec![upload.snapshot.name]);
    assert_eq!(second.registry.get("hall").unwrap().slot_index, 0);

    root.delete().await.unwrap();
}

#[tokio::test]
async fn test_conflicting_reservations_fail_startup() {
    let options = test_options(2);
    let result = AppState::build(
        &options,
        Arc::new(MemoryConfigStore::new()),
        Arc::new(MockTransport::default()),
        &[Reservation::pinned("lobby", 1), Reservation::pinned("kitchen", 1)],
    )
    .await;
    assert!(matches!(result, Err(CompanionError::ValidationError(_))));

    let result = AppState::build(
        &options,
        Arc::new(MemoryConfigStore::new()),
        Arc::new(MockTransport::default()),
        &[Reservation::pinned("lobby", 2)],
    )
    .await;
    assert!(matches!(result, Err(CompanionError::ValidationError(_))));
}
