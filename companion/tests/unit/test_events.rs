//! Event delivery through the engines

use dashmaster::events::{Event, EventFilter, EventKind};

use crate::common::{pack, test_options, Fixture};

#[tokio::test]
async fn test_upload_publishes_config_uploaded() {
    let fixture = Fixture::claimed().await;
    let mut sub = fixture
        .state
        .events
        .subscribe(EventFilter::only([EventKind::ConfigUploaded]));

    let outcome = fixture
        .state
        .deployer
        .upload(
            "esp-000",
            pack(&[("config.json", "{}")]),
            Some("carol".to_string()),
        )
        .await
        .unwrap();

    match sub.recv().await.unwrap() {
        Event::ConfigUploaded(event) => {
            assert_eq!(event.hostname, "esp-000");
            assert_eq!(event.snapshot, outcome.snapshot.name);
            assert_eq!(event.hashes, outcome.hashes);
            assert_eq!(event.diff, outcome.diff);
            assert_eq!(event.actor.as_deref(), Some("carol"));
        }
        other => panic!("unexpected event {:?}", other),
    }
}

#[tokio::test]
async fn test_events_follow_operation_order() {
    let fixture = Fixture::new(2).await;
    let mut sub = fixture.state.events.subscribe(EventFilter::all());

    let registry = &fixture.state.registry;
    registry.claim("esp-000", None).await.unwrap();
    fixture
        .state
        .deployer
        .upload("esp-000", pack(&[("config.json", "{}")]), None)
        .await
        .unwrap();
    registry.release("esp-000").await.unwrap();

    let kinds: Vec<EventKind> = (0..3)
        .map(|_| sub.try_recv().unwrap().kind())
        .collect();
    assert_eq!(
        kinds,
        vec![
            EventKind::DeviceClaimed,
            EventKind::ConfigUploaded,
            EventKind::DeviceReleased
        ]
    );
    assert!(sub.try_recv().is_none());
}

#[tokio::test]
async fn test_filtered_subscriber_skips_other_types() {
    let fixture = Fixture::new(2).await;
    let mut releases = fixture
        .state
        .events
        .subscribe(EventFilter::only([EventKind::DeviceReleased]));

    fixture.state.registry.claim("esp-001", None).await.unwrap();
    fixture.state.registry.release("esp-001").await.unwrap();

    assert!(matches!(
        releases.try_recv(),
        Some(Event::DeviceReleased(_))
    ));
    assert!(releases.try_recv().is_none());
}

#[tokio::test]
async fn test_slow_subscriber_is_dropped_without_failing_uploads() {
    let mut options = test_options(2);
    options.subscriber_capacity = 2;
    let fixture = Fixture::with_options(options).await;
    fixture.state.registry.claim("esp-000", None).await.unwrap();

    let mut slow = fixture.state.events.subscribe(EventFilter::all());
    let mut fast = fixture.state.events.subscribe(EventFilter::all());

    for i in 0..5 {
        let body = format!("[{}]", i);
        fixture
            .state
            .deployer
            .upload("esp-000", pack(&[("config.json", body.as_str())]), None)
            .await
            .unwrap();
        assert!(fast.recv().await.is_some());
    }

    assert_eq!(fixture.state.events.subscriber_count(), 1);

    // The slow subscriber keeps what it buffered, then ends
    assert!(slow.recv().await.is_some());
    assert!(slow.recv().await.is_some());
    assert!(slow.recv().await.is_none());

    let device = fixture.state.registry.get("esp-000").unwrap();
    assert_eq!(device.snapshot_names.len(), 5);
}

#[tokio::test]
async fn test_event_json_carries_type_tag() {
    let fixture = Fixture::claimed().await;
    let mut sub = fixture.state.events.subscribe(EventFilter::all());
    fixture
        .state
        .deployer
        .upload("esp-000", pack(&[("config.json", "{}")]), None)
        .await
        .unwrap();

    let event = sub.recv().await.unwrap();
    let json = serde_json::to_value(&event).unwrap();
    assert_eq!(json["type"], "config.uploaded");
    assert_eq!(json["hostname"], "esp-000");
    assert!(json["snapshot"].is_string());
}
