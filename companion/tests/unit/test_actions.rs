//! Device action dispatch tests

use dashmaster::actions::DeviceAction;
use dashmaster::errors::CompanionError;
use dashmaster::events::EventFilter;
use tokio_test::{assert_err, assert_ok};

use crate::common::{Fixture, MockReply};

#[tokio::test]
async fn test_identify_routes_to_device_ports() {
    let fixture = Fixture::claimed().await;
    let mut sub = fixture.state.events.subscribe(EventFilter::all());
    let before = fixture.state.registry.get("esp-000").unwrap();

    let action = fixture
        .state
        .dispatcher
        .identify("esp-000", 7)
        .await
        .unwrap();
    assert_eq!(action, DeviceAction::Identify { minutes: 7 });

    let sent = fixture.transport.sent();
    assert_eq!(sent.len(), 1);
    let (address, action) = &sent[0];
    assert_eq!(address.hostname, "esp-000");
    assert_eq!(address.http_port, before.http_port);
    assert_eq!(*action, DeviceAction::Identify { minutes: 7 });

    // Commands never touch device state or emit events
    assert_eq!(fixture.state.registry.get("esp-000").unwrap(), before);
    assert!(sub.try_recv().is_none());
}

#[tokio::test]
async fn test_reboot_and_factory_reset() {
    let fixture = Fixture::claimed().await;
    let dispatcher = &fixture.state.dispatcher;

    assert_eq!(
        dispatcher.reboot("esp-000").await.unwrap(),
        DeviceAction::Reboot
    );
    assert_eq!(
        dispatcher.factory_reset("esp-000").await.unwrap(),
        DeviceAction::FactoryReset
    );

    let paths: Vec<&str> = fixture
        .transport
        .sent()
        .iter()
        .map(|(_, action)| action.path())
        .collect();
    assert_eq!(paths, vec!["/api/reboot", "/api/factory_reset"]);
}

#[tokio::test]
async fn test_actions_require_claimed_device() {
    let fixture = Fixture::new(2).await;
    let dispatcher = &fixture.state.dispatcher;

    let err = assert_err!(dispatcher.reboot("esp-001").await);
    assert!(matches!(err, CompanionError::InvalidState(_)));

    let err = dispatcher.reboot("esp-404").await.unwrap_err();
    assert!(matches!(err, CompanionError::NotFound(_)));

    assert!(fixture.transport.sent().is_empty());
}

#[tokio::test]
async fn test_identify_minutes_are_validated() {
    let fixture = Fixture::claimed().await;

    for minutes in [0, 11] {
        let err = fixture
            .state
            .dispatcher
            .identify("esp-000", minutes)
            .await
            .unwrap_err();
        assert!(matches!(err, CompanionError::ValidationError(_)));
    }
    assert!(fixture.transport.sent().is_empty());
}

#[tokio::test]
async fn test_error_status_is_not_retried() {
    let fixture = Fixture::claimed().await;
    fixture.transport.script(&[MockReply::Status(500)]);

    let err = fixture.state.dispatcher.reboot("esp-000").await.unwrap_err();
    assert!(matches!(err, CompanionError::UpstreamUnavailable(_)));
    assert_eq!(err.to_string(), "Device responded with 500");
    assert_eq!(fixture.transport.sent().len(), 1);
}

#[tokio::test]
async fn test_unreachable_device_is_retried() {
    let fixture = Fixture::claimed().await;
    fixture
        .transport
        .script(&[MockReply::Unreachable, MockReply::Unreachable]);

    assert_ok!(fixture.state.dispatcher.reboot("esp-000").await);
    assert_eq!(fixture.transport.sent().len(), 3);
}

#[tokio::test]
async fn test_gives_up_after_max_attempts() {
    let fixture = Fixture::claimed().await;
    fixture.transport.script(&[
        MockReply::Hang,
        MockReply::Unreachable,
        MockReply::Hang,
        MockReply::Status(200),
    ]);

    let err = fixture.state.dispatcher.reboot("esp-000").await.unwrap_err();
    assert!(matches!(err, CompanionError::UpstreamUnavailable(_)));
    assert_eq!(fixture.transport.sent().len(), 3);
}
