//! Event definitions

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::content::{ConfigDiff, FileHashes};
use crate::errors::CompanionError;

/// Event type tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    DeviceClaimed,
    DeviceReleased,
    ConfigUploaded,
    ConfigRollback,
}

impl EventKind {
    pub const ALL: [EventKind; 4] = [
        EventKind::DeviceClaimed,
        EventKind::DeviceReleased,
        EventKind::ConfigUploaded,
        EventKind::ConfigRollback,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::DeviceClaimed => "device.claimed",
            EventKind::DeviceReleased => "device.released",
            EventKind::ConfigUploaded => "config.uploaded",
            EventKind::ConfigRollback => "config.rollback",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = CompanionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| CompanionError::ValidationError(format!("Unknown event type: {}", s)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceClaimed {
    pub hostname: String,
    pub slot_index: u32,
    pub profile: Option<String>,
    pub ts: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceReleased {
    pub hostname: String,
    pub ts: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigUploaded {
    pub hostname: String,
    /// Merged hash view after the upload
    pub hashes: FileHashes,
    pub diff: ConfigDiff,
    /// Snapshot created by the upload
    pub snapshot: String,
    pub actor: Option<String>,
    pub ts: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigRollback {
    pub hostname: String,
    /// Snapshot that was restored
    pub snapshot: String,
    pub hashes: FileHashes,
    pub diff: ConfigDiff,
    pub actor: Option<String>,
    pub ts: DateTime<Utc>,
}

/// A domain event. Serialized with its type tag in the `type` field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    #[serde(rename = "device.claimed")]
    DeviceClaimed(DeviceClaimed),

    #[serde(rename = "device.released")]
    DeviceReleased(DeviceReleased),

    #[serde(rename = "config.uploaded")]
    ConfigUploaded(ConfigUploaded),

    #[serde(rename = "config.rollback")]
    ConfigRollback(ConfigRollback),
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::DeviceClaimed(_) => EventKind::DeviceClaimed,
            Event::DeviceReleased(_) => EventKind::DeviceReleased,
            Event::ConfigUploaded(_) => EventKind::ConfigUploaded,
            Event::ConfigRollback(_) => EventKind::ConfigRollback,
        }
    }

    pub fn hostname(&self) -> &str {
        match self {
            Event::DeviceClaimed(e) => &e.hostname,
            Event::DeviceReleased(e) => &e.hostname,
            Event::ConfigUploaded(e) => &e.hostname,
            Event::ConfigRollback(e) => &e.hostname,
        }
    }
}

/// Set of event types a subscriber wants. The default accepts everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventFilter {
    kinds: Option<HashSet<EventKind>>,
}

impl EventFilter {
    /// Accept every event type
    pub fn all() -> Self {
        Self { kinds: None }
    }

    /// Accept only the given event types
    pub fn only(kinds: impl IntoIterator<Item = EventKind>) -> Self {
        Self {
            kinds: Some(kinds.into_iter().collect()),
        }
    }

    /// Parse a comma separated list of event types. Blank means all.
    pub fn parse(list: &str) -> Result<Self, CompanionError> {
        let kinds = list
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(EventKind::from_str)
            .collect::<Result<HashSet<_>, _>>()?;
        if kinds.is_empty() {
            return Ok(Self::all());
        }
        Ok(Self { kinds: Some(kinds) })
    }

    pub fn matches(&self, kind: EventKind) -> bool {
        self.kinds
            .as_ref()
            .map(|kinds| kinds.contains(&kind))
            .unwrap_or(true)
    }
}
