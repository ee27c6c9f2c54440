//! Fixed-capacity slot pool
//!
//! A seeded hostname is bound either to a reserved slot or to the lowest free
//! one. Ports and the MQTT topic are pure functions of the slot index. A slot
//! stays bound to its hostname for the life of the registry.

use std::collections::{BTreeMap, HashMap};

use crate::errors::CompanionError;
use crate::storage::settings::RegistrySettings;

/// Derives a slot's ports and topic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotLayout {
    pub http_base_port: u16,
    pub admin_base_port: u16,
    pub topic_prefix: String,
}

impl SlotLayout {
    pub fn http_port(&self, slot: u32) -> Option<u16> {
        offset_port(self.http_base_port, slot)
    }

    pub fn admin_port(&self, slot: u32) -> Option<u16> {
        offset_port(self.admin_base_port, slot)
    }

    pub fn mqtt_topic(&self, slot: u32) -> String {
        format!("{}/{:03}", self.topic_prefix.trim_end_matches('/'), slot)
    }
}

impl From<&RegistrySettings> for SlotLayout {
    fn from(settings: &RegistrySettings) -> Self {
        Self {
            http_base_port: settings.http_base_port,
            admin_base_port: settings.admin_base_port,
            topic_prefix: settings.topic_prefix.clone(),
        }
    }
}

fn offset_port(base: u16, slot: u32) -> Option<u16> {
    u16::try_from(slot).ok().and_then(|slot| base.checked_add(slot))
}

/// Slot assigned to a hostname
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotAssignment {
    pub slot_index: u32,
    pub http_port: u16,
    pub admin_port: u16,
    pub mqtt_topic: String,
}

/// Slot allocation pool
#[derive(Debug)]
pub struct SlotPool {
    capacity: u32,
    layout: SlotLayout,
    by_slot: BTreeMap<u32, String>,
    by_hostname: HashMap<String, u32>,
}

impl SlotPool {
    pub fn new(capacity: u32, layout: SlotLayout) -> Self {
        Self {
            capacity,
            layout,
            by_slot: BTreeMap::new(),
            by_hostname: HashMap::new(),
        }
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Slot currently bound to `hostname`
    fn slot_of(&self, hostname: &str) -> Option<u32> {
        self.by_hostname.get(hostname).copied()
    }

    /// Bind `hostname` to the lowest free slot. A hostname that already holds
    /// a slot gets the same one back.
    pub fn allocate(&mut self, hostname: &str) -> Result<SlotAssignment, CompanionError> {
        if let Some(slot) = self.slot_of(hostname) {
            return self.assignment(slot);
        }

        let slot = (0..self.capacity)
            .find(|slot| !self.by_slot.contains_key(slot))
            .ok_or_else(|| {
                CompanionError::CapacityExhausted(format!(
                    "All {} device slots are allocated",
                    self.capacity
                ))
            })?;

        self.bind(slot, hostname)
    }

    /// Bind `hostname` to a reserved `slot`. The slot must be in range and
    /// free, and the hostname must not already hold a different slot.
    pub fn allocate_at(
        &mut self,
        slot: u32,
        hostname: &str,
    ) -> Result<SlotAssignment, CompanionError> {
        if slot >= self.capacity {
            return Err(CompanionError::ValidationError(format!(
                "Slot {} for {} is outside the pool of {} slots",
                slot, hostname, self.capacity
            )));
        }
        match self.slot_of(hostname) {
            Some(held) if held == slot => return self.assignment(slot),
            Some(held) => {
                return Err(CompanionError::ValidationError(format!(
                    "{} already holds slot {}, cannot reserve slot {}",
                    hostname, held, slot
                )))
            }
            None => {}
        }
        if let Some(owner) = self.by_slot.get(&slot) {
            return Err(CompanionError::ValidationError(format!(
                "Slot {} is reserved by both {} and {}",
                slot, owner, hostname
            )));
        }

        self.bind(slot, hostname)
    }

    fn bind(&mut self, slot: u32, hostname: &str) -> Result<SlotAssignment, CompanionError> {
        let assignment = self.assignment(slot)?;
        self.by_slot.insert(slot, hostname.to_string());
        self.by_hostname.insert(hostname.to_string(), slot);
        Ok(assignment)
    }

    fn assignment(&self, slot: u32) -> Result<SlotAssignment, CompanionError> {
        let (Some(http_port), Some(admin_port)) =
            (self.layout.http_port(slot), self.layout.admin_port(slot))
        else {
            return Err(CompanionError::CapacityExhausted(format!(
                "Slot {} has no port available",
                slot
            )));
        };

        Ok(SlotAssignment {
            slot_index: slot,
            http_port,
            admin_port,
            mqtt_topic: self.layout.mqtt_topic(slot),
        })
    }
}
