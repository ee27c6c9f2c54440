//! Append-only snapshot store
//!
//! A device's configuration history is a sequence of immutable generations.
//! Each generation is the complete set of live files at the time it was
//! created and is described by a snapshot manifest. Writing the manifest is
//! the commit point: a generation without a manifest is invisible and is
//! discarded by the engine that staged it.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::content::FileHashes;
use crate::errors::CompanionError;
use crate::storage::layout::{is_safe_component, StorageLayout};

/// Filename to file contents of one generation
pub type GenerationFiles = BTreeMap<String, Vec<u8>>;

/// Immutable record of one generation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Unique per device, sortable by creation order
    pub name: String,

    pub created_at: DateTime<Utc>,

    /// Files written by the operation that created the snapshot
    pub files: Vec<String>,

    /// Full merged hash view of the generation
    pub hashes: FileHashes,

    #[serde(default)]
    pub actor: Option<String>,

    #[serde(default)]
    pub note: Option<String>,
}

/// Storage operations behind the deployment and rollback engines
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Durably write a new generation. Fails if the generation already exists.
    async fn write_generation(
        &self,
        hostname: &str,
        generation: &str,
        files: &GenerationFiles,
    ) -> Result<(), CompanionError>;

    /// Read every file of a generation
    async fn read_generation(
        &self,
        hostname: &str,
        generation: &str,
    ) -> Result<GenerationFiles, CompanionError>;

    /// Remove a generation that was never committed
    async fn discard_generation(&self, hostname: &str, generation: &str)
        -> Result<(), CompanionError>;

    /// Record a snapshot manifest. Fails if the name is already taken.
    async fn commit_snapshot(&self, hostname: &str, snapshot: &Snapshot)
        -> Result<(), CompanionError>;

    /// Fetch a snapshot by name
    async fn get_snapshot(
        &self,
        hostname: &str,
        name: &str,
    ) -> Result<Option<Snapshot>, CompanionError>;

    /// All snapshots of a device in creation order
    async fn list_snapshots(&self, hostname: &str) -> Result<Vec<Snapshot>, CompanionError>;
}

/// Sort snapshots by creation order
pub fn sort_snapshots(snapshots: &mut [Snapshot]) {
    snapshots.sort_by(|a, b| {
        a.created_at
            .cmp(&b.created_at)
            .then_with(|| a.name.cmp(&b.name))
    });
}

/// Filesystem snapshot store
#[derive(Debug, Clone)]
pub struct FsConfigStore {
    layout: StorageLayout,
}

impl FsConfigStore {
    pub fn new(layout: StorageLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &StorageLayout {
        &self.layout
    }

    fn check_key(hostname: &str, name: &str) -> Result<(), CompanionError> {
        if !is_safe_component(hostname) || !is_safe_component(name) {
            return Err(CompanionError::StorageFailure(format!(
                "Invalid storage key {}/{}",
                hostname, name
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl ConfigStore for FsConfigStore {
    async fn write_generation(
        &self,
        hostname: &str,
        generation: &str,
        files: &GenerationFiles,
    ) -> Result<(), CompanionError> {
        Self::check_key(hostname, generation)?;
        let dir = self.layout.generation_dir(hostname, generation);
        if dir.exists().await {
            return Err(CompanionError::StorageFailure(format!(
                "Generation {} already exists for {}",
                generation, hostname
            )));
        }

        let result = async {
            dir.create().await?;
            for (name, contents) in files {
                Self::check_key(hostname, name)?;
                dir.file(name).write_bytes(contents).await?;
            }
            Ok::<(), CompanionError>(())
        }
        .await;

        if let Err(e) = result {
            warn!("Failed to write generation {} for {}: {}", generation, hostname, e);
            if let Err(cleanup) = dir.delete().await {
                warn!("Failed to remove partial generation {}: {}", generation, cleanup);
            }
            return Err(e.into_storage());
        }

        debug!("Wrote generation {} for {} ({} files)", generation, hostname, files.len());
        Ok(())
    }

    async fn read_generation(
        &self,
        hostname: &str,
        generation: &str,
    ) -> Result<GenerationFiles, CompanionError> {
        Self::check_key(hostname, generation)?;
        let dir = self.layout.generation_dir(hostname, generation);
        if !dir.exists().await {
            return Err(CompanionError::StorageFailure(format!(
                "Generation {} is missing for {}",
                generation, hostname
            )));
        }

        let mut files = GenerationFiles::new();
        for file in dir.list_files().await.map_err(CompanionError::into_storage)? {
            let Some(name) = file.name().map(str::to_string) else {
                continue;
            };
            let contents = file.read_bytes().await.map_err(CompanionError::into_storage)?;
            files.insert(name, contents);
        }
        Ok(files)
    }

    async fn discard_generation(
        &self,
        hostname: &str,
        generation: &str,
    ) -> Result<(), CompanionError> {
        Self::check_key(hostname, generation)?;
        self.layout
            .generation_dir(hostname, generation)
            .delete()
            .await
            .map_err(CompanionError::into_storage)
    }

    async fn commit_snapshot(
        &self,
        hostname: &str,
        snapshot: &Snapshot,
    ) -> Result<(), CompanionError> {
        Self::check_key(hostname, &snapshot.name)?;
        let file = self.layout.snapshot_file(hostname, &snapshot.name);
        if file.exists().await {
            return Err(CompanionError::StorageFailure(format!(
                "Snapshot {} already exists for {}",
                snapshot.name, hostname
            )));
        }
        file.write_json(snapshot)
            .await
            .map_err(CompanionError::into_storage)
    }

    async fn get_snapshot(
        &self,
        hostname: &str,
        name: &str,
    ) -> Result<Option<Snapshot>, CompanionError> {
        if !is_safe_component(hostname) || !is_safe_component(name) {
            return Ok(None);
        }
        let file = self.layout.snapshot_file(hostname, name);
        if !file.exists().await {
            return Ok(None);
        }
        let snapshot = file.read_json().await.map_err(CompanionError::into_storage)?;
        Ok(Some(snapshot))
    }

    async fn list_snapshots(&self, hostname: &str) -> Result<Vec<Snapshot>, CompanionError> {
        if !is_safe_component(hostname) {
            return Ok(Vec::new());
        }

        let mut snapshots = Vec::new();
        let files = self
            .layout
            .history_dir(hostname)
            .list_files()
            .await
            .map_err(CompanionError::into_storage)?;
        for file in files {
            let is_manifest = file
                .name()
                .map(|n| n.ends_with(".json") && !n.starts_with('.'))
                .unwrap_or(false);
            if !is_manifest {
                continue;
            }
            let snapshot: Snapshot = file.read_json().await.map_err(CompanionError::into_storage)?;
            snapshots.push(snapshot);
        }

        sort_snapshots(&mut snapshots);
        Ok(snapshots)
    }
}
