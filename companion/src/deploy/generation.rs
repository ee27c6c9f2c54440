//! Staging and committing generations

use tracing::{error, warn};

use crate::errors::CompanionError;
use crate::registry::Device;
use crate::storage::snapshots::{ConfigStore, GenerationFiles, Snapshot};

/// Files of the device's live generation. Empty before the first upload.
pub async fn live_files(
    store: &dyn ConfigStore,
    device: &Device,
) -> Result<GenerationFiles, CompanionError> {
    match device.live_snapshot() {
        Some(name) => store
            .read_generation(&device.hostname, name)
            .await
            .map_err(CompanionError::into_storage),
        None => Ok(GenerationFiles::new()),
    }
}

/// Write a generation under the snapshot's name, then commit its manifest.
/// Nothing stays visible if either step fails.
pub async fn persist(
    store: &dyn ConfigStore,
    hostname: &str,
    snapshot: &Snapshot,
    files: &GenerationFiles,
) -> Result<(), CompanionError> {
    if let Err(e) = store.write_generation(hostname, &snapshot.name, files).await {
        error!("Failed to write generation {} for {}: {}", snapshot.name, hostname, e);
        return Err(e.into_storage());
    }

    if let Err(e) = store.commit_snapshot(hostname, snapshot).await {
        error!("Failed to commit snapshot {} for {}: {}", snapshot.name, hostname, e);
        if let Err(cleanup) = store.discard_generation(hostname, &snapshot.name).await {
            warn!("Failed to discard generation {}: {}", snapshot.name, cleanup);
        }
        return Err(e.into_storage());
    }

    Ok(())
}
