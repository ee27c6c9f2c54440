//! Rollback engine
//!
//! Restores a prior snapshot as a new generation. History only moves
//! forward: the target is read, never rewritten.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info};

use crate::content::{diff, merge, ConfigDiff, FileHashes};
use crate::deploy::generation::{live_files, persist};
use crate::deploy::naming::{next_stamp, rollback_name};
use crate::errors::CompanionError;
use crate::events::{ConfigRollback, Event, EventBroadcaster};
use crate::registry::{Device, Registry};
use crate::storage::snapshots::{ConfigStore, Snapshot};

/// Result of a successful rollback
#[derive(Debug, Clone)]
pub struct RollbackOutcome {
    pub device: Device,
    /// Snapshot that was restored
    pub target: String,
    /// Snapshot created by the rollback
    pub snapshot: Snapshot,
    pub hashes: FileHashes,
    pub diff: ConfigDiff,
}

/// Rollback engine
pub struct RollbackEngine {
    registry: Arc<Registry>,
    store: Arc<dyn ConfigStore>,
    events: EventBroadcaster,
}

impl RollbackEngine {
    pub fn new(
        registry: Arc<Registry>,
        store: Arc<dyn ConfigStore>,
        events: EventBroadcaster,
    ) -> Self {
        Self {
            registry,
            store,
            events,
        }
    }

    /// Roll a device back to `target`, or to the snapshot preceding the live
    /// one when no target is given
    pub async fn rollback(
        &self,
        hostname: &str,
        target: Option<&str>,
        actor: Option<String>,
    ) -> Result<RollbackOutcome, CompanionError> {
        let lease = self.registry.lease(hostname).await?;
        let device = lease.claimed_device()?;

        let target = self.select_target(&device, target).await?;
        debug!("Rolling {} back to {}", hostname, target.name);

        let restored = self
            .store
            .read_generation(hostname, &target.name)
            .await
            .map_err(CompanionError::into_storage)?;
        let mut files = live_files(self.store.as_ref(), &device).await?;
        files.extend(restored.iter().map(|(k, v)| (k.clone(), v.clone())));

        let diff = diff(&device.current_hashes, &target.hashes);
        let merged = merge(&device.current_hashes, &target.hashes);

        let created_at = next_stamp(device.last_upload_at);
        let snapshot = Snapshot {
            name: rollback_name(created_at),
            created_at,
            files: restored.keys().cloned().collect(),
            hashes: merged.clone(),
            actor: actor.clone(),
            note: Some(format!("rolled_back_to={}", target.name)),
        };
        persist(self.store.as_ref(), hostname, &snapshot, &files).await?;

        let device = lease.record_rollback(&merged, &snapshot.name, created_at)?;
        info!(
            "Rolled {} back to {} as snapshot {}",
            hostname, target.name, snapshot.name
        );

        self.events.publish(Event::ConfigRollback(ConfigRollback {
            hostname: hostname.to_string(),
            snapshot: target.name.clone(),
            hashes: merged.clone(),
            diff: diff.clone(),
            actor,
            ts: Utc::now(),
        }));

        Ok(RollbackOutcome {
            device,
            target: target.name,
            snapshot,
            hashes: merged,
            diff,
        })
    }

    async fn select_target(
        &self,
        device: &Device,
        requested: Option<&str>,
    ) -> Result<Snapshot, CompanionError> {
        let hostname = &device.hostname;
        let name = match requested {
            Some(name) => name,
            None => {
                let names = &device.snapshot_names;
                if names.len() < 2 {
                    return Err(CompanionError::NotFound(format!(
                        "No earlier snapshot to roll back to for {}",
                        hostname
                    )));
                }
                names[names.len() - 2].as_str()
            }
        };

        self.store
            .get_snapshot(hostname, name)
            .await
            .map_err(CompanionError::into_storage)?
            .ok_or_else(|| {
                CompanionError::NotFound(format!("Snapshot {} not found for {}", name, hostname))
            })
    }
}
