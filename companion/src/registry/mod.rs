//! Device registry
//!
//! Authoritative map of hostname to device state. Devices are created only by
//! seeding and are never removed; releasing a device keeps its slot.

pub mod device;
pub mod lease;
pub mod slots;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::content::{hash, FileHashes};
use crate::errors::CompanionError;
use crate::events::{DeviceClaimed, DeviceReleased, Event, EventBroadcaster};
use crate::storage::layout::is_safe_component;
use crate::storage::reservations::Reservation;

pub use device::{Device, DeviceAddress, DeviceStatus, DeviceTransition};
pub use lease::DeviceLease;
pub use slots::{SlotAssignment, SlotLayout, SlotPool};

use lease::DeviceEntry;

/// Device birth certificate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BirthCertificate {
    pub device_id: String,
    pub configs: FileHashes,
}

impl BirthCertificate {
    /// SHA-256 of the certificate's JSON encoding
    pub fn sha256(&self) -> Result<String, CompanionError> {
        Ok(hash(&serde_json::to_vec(self)?))
    }
}

/// Device registry
pub struct Registry {
    slots: Mutex<SlotPool>,
    devices: RwLock<HashMap<String, Arc<DeviceEntry>>>,
    events: EventBroadcaster,
}

impl Registry {
    pub fn new(capacity: u32, layout: SlotLayout, events: EventBroadcaster) -> Self {
        Self {
            slots: Mutex::new(SlotPool::new(capacity, layout)),
            devices: RwLock::new(HashMap::new()),
            events,
        }
    }

    /// Slot capacity of the pool
    pub fn capacity(&self) -> u32 {
        let slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots.capacity()
    }

    /// Add a device on the lowest free slot. Seeding a hostname that is
    /// already present returns it unchanged.
    pub fn seed(&self, hostname: &str) -> Result<Device, CompanionError> {
        self.seed_with(hostname, |slots| slots.allocate(hostname))
    }

    /// Add a device on a reserved slot. Re-seeding it on the same slot
    /// returns it unchanged; a taken, mismatched or out-of-range slot is a
    /// validation error.
    pub fn seed_at(&self, hostname: &str, slot: u32) -> Result<Device, CompanionError> {
        self.seed_with(hostname, |slots| slots.allocate_at(slot, hostname))
    }

    /// Seed every reservation, pinned slots first so unpinned devices never
    /// take a slot another device has reserved
    pub fn seed_reservations(&self, reservations: &[Reservation]) -> Result<(), CompanionError> {
        for reservation in reservations {
            if let Some(slot) = reservation.slot_index {
                self.seed_at(&reservation.hostname, slot)?;
            }
        }
        for reservation in reservations.iter().filter(|r| r.slot_index.is_none()) {
            self.seed(&reservation.hostname)?;
        }
        Ok(())
    }

    fn seed_with(
        &self,
        hostname: &str,
        allocate: impl FnOnce(&mut SlotPool) -> Result<SlotAssignment, CompanionError>,
    ) -> Result<Device, CompanionError> {
        if !is_safe_component(hostname) {
            return Err(CompanionError::ValidationError(format!(
                "Invalid hostname: {:?}",
                hostname
            )));
        }

        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        let slot = allocate(&mut *slots)?;
        if let Some(entry) = self.entry(hostname) {
            return Ok(entry.device());
        }

        let device = Device {
            hostname: hostname.to_string(),
            slot_index: slot.slot_index,
            http_port: slot.http_port,
            admin_port: slot.admin_port,
            mqtt_topic: slot.mqtt_topic,
            status: DeviceStatus::Unclaimed,
            profile: None,
            last_seen: None,
            last_upload_at: None,
            current_hashes: FileHashes::new(),
            snapshot_names: Vec::new(),
        };

        let mut devices = self.devices.write().unwrap_or_else(|e| e.into_inner());
        devices.insert(hostname.to_string(), Arc::new(DeviceEntry::new(device.clone())));
        debug!("Seeded {} on slot {}", hostname, device.slot_index);
        Ok(device)
    }

    fn entry(&self, hostname: &str) -> Option<Arc<DeviceEntry>> {
        let devices = self.devices.read().unwrap_or_else(|e| e.into_inner());
        devices.get(hostname).cloned()
    }

    fn require(&self, hostname: &str) -> Result<Arc<DeviceEntry>, CompanionError> {
        self.entry(hostname)
            .ok_or_else(|| CompanionError::NotFound(format!("Device {} not found", hostname)))
    }

    /// Fetch a device
    pub fn get(&self, hostname: &str) -> Result<Device, CompanionError> {
        Ok(self.require(hostname)?.device())
    }

    /// All devices ordered by slot
    pub fn list(&self) -> Vec<Device> {
        let entries: Vec<Arc<DeviceEntry>> = {
            let devices = self.devices.read().unwrap_or_else(|e| e.into_inner());
            devices.values().cloned().collect()
        };
        let mut list: Vec<Device> = entries.iter().map(|e| e.device()).collect();
        list.sort_by_key(|d| d.slot_index);
        list
    }

    /// Take the exclusive lease on a device, waiting for any operation in
    /// progress on the same hostname
    pub async fn lease(&self, hostname: &str) -> Result<DeviceLease, CompanionError> {
        let entry = self.require(hostname)?;
        Ok(entry.lease().await)
    }

    /// Claim an unclaimed device
    pub async fn claim(
        &self,
        hostname: &str,
        profile: Option<String>,
    ) -> Result<Device, CompanionError> {
        let lease = self.lease(hostname).await?;
        let device = lease.claim(profile)?;
        info!(
            "Claimed {} (slot {}, profile {:?})",
            device.hostname, device.slot_index, device.profile
        );

        self.events.publish(Event::DeviceClaimed(DeviceClaimed {
            hostname: device.hostname.clone(),
            slot_index: device.slot_index,
            profile: device.profile.clone(),
            ts: Utc::now(),
        }));
        Ok(device)
    }

    /// Claim the lowest-slot unclaimed device
    pub async fn claim_next(&self, profile: Option<String>) -> Result<Device, CompanionError> {
        for candidate in self.list() {
            if candidate.status.is_claimed() {
                continue;
            }
            match self.claim(&candidate.hostname, profile.clone()).await {
                Ok(device) => return Ok(device),
                // Claimed by someone else in the meantime
                Err(CompanionError::InvalidState(_)) => continue,
                Err(e) => return Err(e),
            }
        }
        Err(CompanionError::InvalidState(
            "No available device slots".to_string(),
        ))
    }

    /// Return a device to unclaimed. Releasing an unclaimed device changes
    /// nothing and publishes no event.
    pub async fn release(&self, hostname: &str) -> Result<Device, CompanionError> {
        let lease = self.lease(hostname).await?;
        let Some(device) = lease.release()? else {
            debug!("Release of unclaimed {} ignored", hostname);
            return Ok(lease.device());
        };
        info!("Released {}", hostname);

        self.events.publish(Event::DeviceReleased(DeviceReleased {
            hostname: device.hostname.clone(),
            ts: Utc::now(),
        }));
        Ok(device)
    }

    /// Birth certificate of a device
    pub fn birth(&self, hostname: &str) -> Result<BirthCertificate, CompanionError> {
        let device = self.get(hostname)?;
        Ok(BirthCertificate {
            device_id: device.hostname,
            configs: device.current_hashes,
        })
    }

    /// Resolve where to reach a device. Unclaimed devices are not routable.
    pub fn route(&self, hostname: &str) -> Result<DeviceAddress, CompanionError> {
        let device = self.get(hostname)?;
        device.ensure_claimed()?;
        Ok(device.address())
    }
}
