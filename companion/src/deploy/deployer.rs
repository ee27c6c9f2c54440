//! Deployment engine
//!
//! Upload pipeline for one device, run under the device's lease:
//! validate, hash, diff, persist the merged generation, commit the snapshot,
//! update the registry, publish `config.uploaded`. A failure before the
//! snapshot commit leaves no trace.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info};

use crate::content::{diff, merge, ConfigDiff, FileHashes};
use crate::deploy::generation::{live_files, persist};
use crate::deploy::naming::{next_stamp, upload_name};
use crate::deploy::pack::ConfigPack;
use crate::errors::CompanionError;
use crate::events::{ConfigUploaded, Event, EventBroadcaster};
use crate::registry::{Device, Registry};
use crate::storage::snapshots::{ConfigStore, Snapshot};

/// Result of a successful upload
#[derive(Debug, Clone)]
pub struct UploadOutcome {
    pub device: Device,
    /// Merged hash view after the upload
    pub hashes: FileHashes,
    pub diff: ConfigDiff,
    pub snapshot: Snapshot,
}

/// Deployment engine
pub struct DeploymentEngine {
    registry: Arc<Registry>,
    store: Arc<dyn ConfigStore>,
    events: EventBroadcaster,
}

impl DeploymentEngine {
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

    /// Deploy a validated pack to a claimed device
    pub async fn upload(
        &self,
        hostname: &str,
        pack: ConfigPack,
        actor: Option<String>,
    ) -> Result<UploadOutcome, CompanionError> {
        let lease = self.registry.lease(hostname).await?;
        let device = lease.claimed_device()?;

        let uploaded = pack.hashes();
        let diff = diff(&device.current_hashes, &uploaded);
        let merged = merge(&device.current_hashes, &uploaded);
        debug!(
            "Upload to {}: {} files, {} changed",
            hostname,
            uploaded.len(),
            diff.values().filter(|changed| **changed).count()
        );

        let mut files = live_files(self.store.as_ref(), &device).await?;
        files.extend(pack.files().iter().map(|(k, v)| (k.clone(), v.clone())));

        let created_at = next_stamp(device.last_upload_at);
        let snapshot = Snapshot {
            name: upload_name(created_at),
            created_at,
            files: pack.names(),
            hashes: merged.clone(),
            actor: actor.clone(),
            note: None,
        };
        persist(self.store.as_ref(), hostname, &snapshot, &files).await?;

        let device = lease.record_upload(&merged, &snapshot.name, created_at)?;
        info!("Deployed snapshot {} to {}", snapshot.name, hostname);

        self.events.publish(Event::ConfigUploaded(ConfigUploaded {
            hostname: hostname.to_string(),
            hashes: merged.clone(),
            diff: diff.clone(),
            snapshot: snapshot.name.clone(),
            actor,
            ts: Utc::now(),
        }));

        Ok(UploadOutcome {
            device,
            hashes: merged,
            diff,
            snapshot,
        })
    }

    /// Snapshot history of a device in creation order
    pub async fn snapshots(&self, hostname: &str) -> Result<Vec<Snapshot>, CompanionError> {
        self.registry.get(hostname)?;
        self.store.list_snapshots(hostname).await
    }
}
