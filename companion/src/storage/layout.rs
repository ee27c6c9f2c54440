//! Storage layout configuration

use std::path::PathBuf;

use crate::errors::CompanionError;
use crate::filesys::dir::Dir;
use crate::filesys::file::File;

/// Environment variable overriding the storage root
pub const STORAGE_ROOT_ENV: &str = "DASHMASTER_STORAGE_ROOT";

/// Storage layout for the companion
///
/// ```text
/// <base>/settings.json
/// <base>/reservations.json
/// <base>/devices/<hostname>/generations/<snapshot>/<file>
/// <base>/devices/<hostname>/history/<snapshot>.json
/// <base>/logs/
/// ```
#[derive(Debug, Clone)]
pub struct StorageLayout {
    /// Base directory for all storage
    pub base_dir: PathBuf,
}

impl StorageLayout {
    /// Create a new storage layout
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Get the settings file path
    pub fn settings_file(&self) -> File {
        File::new(self.base_dir.join("settings.json"))
    }

    /// Get the slot reservations file path
    pub fn reservations_file(&self) -> File {
        File::new(self.base_dir.join("reservations.json"))
    }

    /// Get the root of all per-device storage
    pub fn devices_dir(&self) -> Dir {
        Dir::new(self.base_dir.join("devices"))
    }

    /// Get the storage directory of one device
    pub fn device_dir(&self, hostname: &str) -> Dir {
        self.devices_dir().subdir(hostname)
    }

    /// Get the directory holding every generation of a device
    pub fn generations_dir(&self, hostname: &str) -> Dir {
        self.device_dir(hostname).subdir("generations")
    }

    /// Get the directory holding one generation's files
    pub fn generation_dir(&self, hostname: &str, generation: &str) -> Dir {
        self.generations_dir(hostname).subdir(generation)
    }

    /// Get the snapshot manifest directory of a device
    pub fn history_dir(&self, hostname: &str) -> Dir {
        self.device_dir(hostname).subdir("history")
    }

    /// Get the manifest file of one snapshot
    pub fn snapshot_file(&self, hostname: &str, name: &str) -> File {
        self.history_dir(hostname).file(&format!("{}.json", name))
    }

    /// Get the logs directory
    pub fn logs_dir(&self) -> Dir {
        Dir::new(self.base_dir.join("logs"))
    }

    /// Setup the storage layout (create directories)
    pub async fn setup(&self) -> Result<(), CompanionError> {
        self.devices_dir().create().await?;
        self.logs_dir().create().await?;
        Ok(())
    }
}

impl Default for StorageLayout {
    fn default() -> Self {
        if let Some(root) = std::env::var_os(STORAGE_ROOT_ENV) {
            return Self::new(root);
        }

        #[cfg(target_os = "linux")]
        let base_dir = PathBuf::from("/var/lib/dashmaster");

        #[cfg(not(target_os = "linux"))]
        let base_dir = std::env::var_os("HOME")
            .or_else(|| std::env::var_os("USERPROFILE"))
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".dashmaster");

        Self::new(base_dir)
    }
}

/// Whether `name` can be used as a single path component: non-empty, not
/// hidden, no separators and no traversal.
pub fn is_safe_component(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && name.len() <= 128
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}
