//! Reserved hostname list

use serde::{Deserialize, Serialize};

use crate::errors::CompanionError;
use crate::filesys::file::File;

/// One reserved device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub hostname: String,

    /// Pinned slot. Unpinned devices take the lowest slot left free once
    /// every pinned device is seeded.
    #[serde(default)]
    pub slot_index: Option<u32>,
}

impl Reservation {
    pub fn new(hostname: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            slot_index: None,
        }
    }

    pub fn pinned(hostname: impl Into<String>, slot_index: u32) -> Self {
        Self {
            hostname: hostname.into(),
            slot_index: Some(slot_index),
        }
    }
}

/// Contents of `reservations.json`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservations {
    #[serde(default)]
    pub devices: Vec<Reservation>,
}

impl Reservations {
    pub async fn load(file: &File) -> Result<Self, CompanionError> {
        file.read_json().await.map_err(|e| {
            CompanionError::ConfigError(format!(
                "Unable to read reservations file {}: {}",
                file.path().display(),
                e
            ))
        })
    }
}

/// One reservation per slot, named `{prefix}-{NNN}` and pinned to that slot
pub fn generated_reservations(prefix: &str, capacity: u32) -> Vec<Reservation> {
    (0..capacity)
        .map(|idx| Reservation::pinned(format!("{}-{:03}", prefix, idx), idx))
        .collect()
}
