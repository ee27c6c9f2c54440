//! Device model and claim lifecycle state machine

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::content::FileHashes;
use crate::errors::CompanionError;

/// Device lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
    /// Seeded but not in use
    Unclaimed,

    /// Claimed, no configuration deployed yet
    Claimed,

    /// Claimed with at least one deployed configuration
    Configured,
}

impl DeviceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceStatus::Unclaimed => "unclaimed",
            DeviceStatus::Claimed => "claimed",
            DeviceStatus::Configured => "configured",
        }
    }

    /// Whether the device is in use
    pub fn is_claimed(&self) -> bool {
        !matches!(self, DeviceStatus::Unclaimed)
    }

    /// Status after applying `transition`, or `None` if it is not allowed
    pub fn next(&self, transition: DeviceTransition) -> Option<DeviceStatus> {
        match (self, transition) {
            (DeviceStatus::Unclaimed, DeviceTransition::Claim) => Some(DeviceStatus::Claimed),

            (DeviceStatus::Claimed, DeviceTransition::Configure)
            | (DeviceStatus::Configured, DeviceTransition::Configure) => {
                Some(DeviceStatus::Configured)
            }

            (DeviceStatus::Claimed, DeviceTransition::Release)
            | (DeviceStatus::Configured, DeviceTransition::Release) => {
                Some(DeviceStatus::Unclaimed)
            }

            _ => None,
        }
    }
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceTransition {
    /// Take an unclaimed device into use
    Claim,

    /// Record a successful upload or rollback
    Configure,

    /// Return the device to the pool
    Release,
}

impl DeviceTransition {
    fn verb(&self) -> &'static str {
        match self {
            DeviceTransition::Claim => "claim",
            DeviceTransition::Configure => "configure",
            DeviceTransition::Release => "release",
        }
    }
}

/// Resolved network address of a device's ports
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceAddress {
    pub hostname: String,
    pub http_port: u16,
    pub admin_port: u16,
}

/// Registry entry for one device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub hostname: String,

    /// Assigned once at seeding, never changes
    pub slot_index: u32,

    pub http_port: u16,
    pub admin_port: u16,
    pub mqtt_topic: String,

    pub status: DeviceStatus,

    /// Set on claim, cleared on release
    pub profile: Option<String>,

    pub last_seen: Option<DateTime<Utc>>,
    pub last_upload_at: Option<DateTime<Utc>>,

    /// Filename to content hash of the live generation
    pub current_hashes: FileHashes,

    /// Snapshot names in creation order
    pub snapshot_names: Vec<String>,
}

impl Device {
    /// Apply a lifecycle transition
    pub fn apply(&mut self, transition: DeviceTransition) -> Result<(), CompanionError> {
        match self.status.next(transition) {
            Some(status) => {
                self.status = status;
                Ok(())
            }
            None => Err(CompanionError::InvalidState(match (self.status, transition) {
                (DeviceStatus::Unclaimed, _) => format!("Device {} is not claimed", self.hostname),
                (_, DeviceTransition::Claim) => {
                    format!("Device {} is already claimed", self.hostname)
                }
                (status, t) => format!(
                    "Cannot {} device {} while {}",
                    t.verb(),
                    self.hostname,
                    status
                ),
            })),
        }
    }

    /// Fail with `InvalidState` unless the device is claimed
    pub fn ensure_claimed(&self) -> Result<(), CompanionError> {
        if self.status.is_claimed() {
            Ok(())
        } else {
            Err(CompanionError::InvalidState(format!(
                "Device {} is not claimed",
                self.hostname
            )))
        }
    }

    pub fn address(&self) -> DeviceAddress {
        DeviceAddress {
            hostname: self.hostname.clone(),
            http_port: self.http_port,
            admin_port: self.admin_port,
        }
    }

    /// Snapshot backing the live generation
    pub fn live_snapshot(&self) -> Option<&str> {
        self.snapshot_names.last().map(String::as_str)
    }
}
