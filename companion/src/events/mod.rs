//! Domain events and their fan-out to live subscribers

pub mod broadcaster;
pub mod event;

pub use broadcaster::{EventBroadcaster, Subscription};
pub use event::{
    ConfigRollback, ConfigUploaded, DeviceClaimed, DeviceReleased, Event, EventFilter, EventKind,
};
