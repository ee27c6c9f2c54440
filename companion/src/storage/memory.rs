//! In-memory snapshot store
//!
//! Suitable for development and testing. Write failures can be injected to
//! exercise the engines' storage-failure paths.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;

use crate::errors::CompanionError;
use crate::storage::snapshots::{sort_snapshots, ConfigStore, GenerationFiles, Snapshot};

#[derive(Debug, Default)]
struct DeviceHistory {
    generations: HashMap<String, GenerationFiles>,
    snapshots: Vec<Snapshot>,
}

/// In-memory snapshot store
#[derive(Debug, Default)]
pub struct MemoryConfigStore {
    devices: RwLock<HashMap<String, DeviceHistory>>,
    fail_generation_writes: AtomicBool,
    fail_snapshot_commits: AtomicBool,
}

impl MemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent generation write fail
    pub fn set_fail_generation_writes(&self, fail: bool) {
        self.fail_generation_writes.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent snapshot commit fail
    pub fn set_fail_snapshot_commits(&self, fail: bool) {
        self.fail_snapshot_commits.store(fail, Ordering::SeqCst);
    }

    /// Number of generations currently stored for a device
    pub fn generation_count(&self, hostname: &str) -> usize {
        let devices = self.devices.read().unwrap_or_else(|e| e.into_inner());
        devices
            .get(hostname)
            .map(|h| h.generations.len())
            .unwrap_or(0)
    }
}

#[async_trait]
impl ConfigStore for MemoryConfigStore {
    async fn write_generation(
        &self,
        hostname: &str,
        generation: &str,
        files: &GenerationFiles,
    ) -> Result<(), CompanionError> {
        if self.fail_generation_writes.load(Ordering::SeqCst) {
            return Err(CompanionError::StorageFailure(format!(
                "Injected failure writing generation {} for {}",
                generation, hostname
            )));
        }

        let mut devices = self.devices.write().unwrap_or_else(|e| e.into_inner());
        let history = devices.entry(hostname.to_string()).or_default();
        if history.generations.contains_key(generation) {
            return Err(CompanionError::StorageFailure(format!(
                "Generation {} already exists for {}",
                generation, hostname
            )));
        }
        history
            .generations
            .insert(generation.to_string(), files.clone());
        Ok(())
    }

    async fn read_generation(
        &self,
        hostname: &str,
        generation: &str,
    ) -> Result<GenerationFiles, CompanionError> {
        let devices = self.devices.read().unwrap_or_else(|e| e.into_inner());
        devices
            .get(hostname)
            .and_then(|h| h.generations.get(generation))
            .cloned()
            .ok_or_else(|| {
                CompanionError::StorageFailure(format!(
                    "Generation {} is missing for {}",
                    generation, hostname
                ))
            })
    }

    async fn discard_generation(
        &self,
        hostname: &str,
        generation: &str,
    ) -> Result<(), CompanionError> {
        let mut devices = self.devices.write().unwrap_or_else(|e| e.into_inner());
        if let Some(history) = devices.get_mut(hostname) {
            history.generations.remove(generation);
        }
        Ok(())
    }

    async fn commit_snapshot(
        &self,
        hostname: &str,
        snapshot: &Snapshot,
    ) -> Result<(), CompanionError> {
        if self.fail_snapshot_commits.load(Ordering::SeqCst) {
            return Err(CompanionError::StorageFailure(format!(
                "Injected failure committing snapshot {} for {}",
                snapshot.name, hostname
            )));
        }

        let mut devices = self.devices.write().unwrap_or_else(|e| e.into_inner());
        let history = devices.entry(hostname.to_string()).or_default();
        if history.snapshots.iter().any(|s| s.name == snapshot.name) {
            return Err(CompanionError::StorageFailure(format!(
                "Snapshot {} already exists for {}",
                snapshot.name, hostname
            )));
        }
        history.snapshots.push(snapshot.clone());
        sort_snapshots(&mut history.snapshots);
        Ok(())
    }

    async fn get_snapshot(
        &self,
        hostname: &str,
        name: &str,
    ) -> Result<Option<Snapshot>, CompanionError> {
        let devices = self.devices.read().unwrap_or_else(|e| e.into_inner());
        Ok(devices
            .get(hostname)
            .and_then(|h| h.snapshots.iter().find(|s| s.name == name))
            .cloned())
    }

    async fn list_snapshots(&self, hostname: &str) -> Result<Vec<Snapshot>, CompanionError> {
        let devices = self.devices.read().unwrap_or_else(|e| e.into_inner());
        Ok(devices
            .get(hostname)
            .map(|h| h.snapshots.clone())
            .unwrap_or_default())
    }
}
