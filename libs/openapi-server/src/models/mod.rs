//! Companion API models

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Filename to content digest. A `null` digest means the file is absent.
pub type FileHashes = BTreeMap<String, Option<String>>;

/// Filename to "content changed" flag.
pub type FileDiff = BTreeMap<String, bool>;

/// Health response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
    pub git_hash: String,
    pub devices: usize,
    /// Slot capacity of the registry
    pub capacity: u32,
    pub subscribers: usize,
}

/// Device entry as listed by the registry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceRef {
    pub hostname: String,
    pub slot_index: u32,
    pub http_port: u16,
    pub admin_port: u16,
    pub mqtt_topic: String,
    pub status: String,
    pub profile: Option<String>,
    pub last_seen: Option<DateTime<Utc>>,
    pub last_upload_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub current_hashes: FileHashes,
    #[serde(default)]
    pub snapshots: Vec<String>,
}

/// Claim request. Without `requested_hostname` the lowest free slot is claimed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceClaimRequest {
    pub profile: Option<String>,
    pub requested_hostname: Option<String>,
    pub actor: Option<String>,
}

/// Claim response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceClaimResponse {
    pub hostname: String,
    pub http_port: u16,
    pub admin_port: u16,
    pub mqtt_topic: String,
    pub slot_index: u32,
    pub profile: Option<String>,
}

/// Release response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceReleaseResponse {
    pub hostname: String,
    pub status: String,
}

/// Birth certificate response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceBirthResponse {
    pub hostname: String,
    pub birth: serde_json::Value,
    pub sha256: String,
}

/// Snapshot entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotRef {
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub files: Vec<String>,
    pub hashes: FileHashes,
    pub actor: Option<String>,
    pub note: Option<String>,
}

/// Snapshot list response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotListResponse {
    pub hostname: String,
    pub snapshots: Vec<SnapshotRef>,
    pub total: usize,
}

/// Config pack upload. File contents are base64 encoded.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UploadRequest {
    pub files: BTreeMap<String, String>,
    pub actor: Option<String>,
}

/// Upload response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadResponse {
    pub device: String,
    pub hashes: FileHashes,
    pub diff: FileDiff,
    pub snapshot: String,
}

/// Rollback request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RollbackRequest {
    pub snapshot: Option<String>,
    pub actor: Option<String>,
}

/// Rollback response. `rollback` names the restored snapshot, `snapshot` the
/// one appended to history by the rollback itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollbackResponse {
    pub device: String,
    pub rollback: String,
    pub snapshot: String,
    pub hashes: FileHashes,
    pub diff: FileDiff,
}

/// Identify query
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentifyQuery {
    #[serde(default = "default_identify_minutes")]
    pub minutes: u32,
}

fn default_identify_minutes() -> u32 {
    5
}

/// Device action acknowledgement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionResponse {
    pub hostname: String,
    pub action: String,
}

/// Event stream query. `types` is a comma separated list of event types.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StreamQuery {
    pub types: Option<String>,
}

/// Error body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub detail: String,
    pub kind: String,
}
