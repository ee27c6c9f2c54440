//! Per-device exclusive lease
//!
//! Each device owns an async operation lock and a short-held state lock. The
//! operation lock is held across a whole upload or rollback pipeline so
//! operations on one hostname serialize. The state lock is only taken to copy
//! or swap the device record, so readers never wait on pipeline I/O.

use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

use crate::content::{merge, FileHashes};
use crate::errors::CompanionError;
use crate::registry::device::{Device, DeviceTransition};
use crate::storage::snapshots::Snapshot;

#[derive(Debug)]
pub(crate) struct DeviceEntry {
    op_lock: Arc<Mutex<()>>,
    state: RwLock<Device>,
}

impl DeviceEntry {
    pub(crate) fn new(device: Device) -> Self {
        Self {
            op_lock: Arc::new(Mutex::new(())),
            state: RwLock::new(device),
        }
    }

    /// Copy of the current device record
    pub(crate) fn device(&self) -> Device {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        state.clone()
    }

    /// Apply `f` to a copy of the record and keep the result only if it
    /// succeeds
    fn update<T>(
        &self,
        f: impl FnOnce(&mut Device) -> Result<T, CompanionError>,
    ) -> Result<(T, Device), CompanionError> {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        let mut next = state.clone();
        let out = f(&mut next)?;
        *state = next.clone();
        Ok((out, next))
    }

    pub(crate) async fn lease(self: Arc<Self>) -> DeviceLease {
        let guard = self.op_lock.clone().lock_owned().await;
        DeviceLease {
            entry: self,
            _guard: guard,
        }
    }
}

/// Exclusive right to mutate one device. Released on drop.
pub struct DeviceLease {
    entry: Arc<DeviceEntry>,
    _guard: OwnedMutexGuard<()>,
}

impl DeviceLease {
    /// Current device record
    pub fn device(&self) -> Device {
        self.entry.device()
    }

    /// Current device record, failing unless it is claimed
    pub fn claimed_device(&self) -> Result<Device, CompanionError> {
        let device = self.device();
        device.ensure_claimed()?;
        Ok(device)
    }

    pub(crate) fn claim(&self, profile: Option<String>) -> Result<Device, CompanionError> {
        let ((), device) = self.entry.update(|device| {
            device.apply(DeviceTransition::Claim)?;
            device.profile = profile;
            Ok(())
        })?;
        Ok(device)
    }

    /// Return the device to unclaimed. `None` if it already was.
    pub(crate) fn release(&self) -> Result<Option<Device>, CompanionError> {
        let (released, device) = self.entry.update(|device| {
            if !device.status.is_claimed() {
                return Ok(false);
            }
            device.apply(DeviceTransition::Release)?;
            device.profile = None;
            Ok(true)
        })?;
        Ok(released.then_some(device))
    }

    /// Record a committed upload
    pub fn record_upload(
        &self,
        hashes: &FileHashes,
        snapshot: &str,
        at: DateTime<Utc>,
    ) -> Result<Device, CompanionError> {
        self.record_generation(hashes, snapshot, at)
    }

    /// Record a committed rollback
    pub fn record_rollback(
        &self,
        hashes: &FileHashes,
        snapshot: &str,
        at: DateTime<Utc>,
    ) -> Result<Device, CompanionError> {
        self.record_generation(hashes, snapshot, at)
    }

    fn record_generation(
        &self,
        hashes: &FileHashes,
        snapshot: &str,
        at: DateTime<Utc>,
    ) -> Result<Device, CompanionError> {
        let ((), device) = self.entry.update(|device| {
            device.apply(DeviceTransition::Configure)?;
            device.current_hashes = merge(&device.current_hashes, hashes);
            device.last_upload_at = Some(at);
            device.snapshot_names.push(snapshot.to_string());
            Ok(())
        })?;
        debug!(
            "Device {} now at snapshot {} ({} files)",
            device.hostname,
            snapshot,
            device.current_hashes.len()
        );
        Ok(device)
    }

    /// Re-hydrate history from persisted snapshots in creation order. The
    /// claim status is left untouched.
    pub fn restore_history(&self, snapshots: &[Snapshot]) -> Device {
        let mut state = self.entry.state.write().unwrap_or_else(|e| e.into_inner());
        state.snapshot_names = snapshots.iter().map(|s| s.name.clone()).collect();
        if let Some(last) = snapshots.last() {
            state.current_hashes = last.hashes.clone();
            state.last_upload_at = Some(last.created_at);
        }
        state.clone()
    }
}
