//! Device actions

pub mod dispatcher;
pub mod transport;

use crate::errors::CompanionError;

pub use dispatcher::{ActionDispatcher, DispatchOptions};
pub use transport::{DeviceReply, DeviceTransport, HttpDeviceTransport};

/// Allowed identify durations in minutes
pub const IDENTIFY_MINUTES: std::ops::RangeInclusive<u32> = 1..=10;

/// Command sent to a device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceAction {
    Identify { minutes: u32 },
    Reboot,
    FactoryReset,
}

impl DeviceAction {
    /// Identify for `minutes`, validated against [`IDENTIFY_MINUTES`]
    pub fn identify(minutes: u32) -> Result<Self, CompanionError> {
        if !IDENTIFY_MINUTES.contains(&minutes) {
            return Err(CompanionError::ValidationError(format!(
                "minutes must be between {} and {}",
                IDENTIFY_MINUTES.start(),
                IDENTIFY_MINUTES.end()
            )));
        }
        Ok(DeviceAction::Identify { minutes })
    }

    /// Device endpoint for the command
    pub fn path(&self) -> &'static str {
        match self {
            DeviceAction::Identify { .. } => "/api/identify",
            DeviceAction::Reboot => "/api/reboot",
            DeviceAction::FactoryReset => "/api/factory_reset",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            DeviceAction::Identify { .. } => "identify",
            DeviceAction::Reboot => "reboot",
            DeviceAction::FactoryReset => "factory_reset",
        }
    }
}
