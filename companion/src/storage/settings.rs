//! Settings file management

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::logs::LogLevel;

/// Companion settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Emit JSON formatted logs
    #[serde(default)]
    pub log_json: bool,

    /// Also write logs to a daily rolling file under the storage root
    #[serde(default)]
    pub log_to_file: bool,

    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerSettings,

    /// Storage configuration
    #[serde(default)]
    pub storage: StorageSettings,

    /// Device registry configuration
    #[serde(default)]
    pub registry: RegistrySettings,

    /// Device action configuration
    #[serde(default)]
    pub actions: ActionSettings,

    /// Event stream configuration
    #[serde(default)]
    pub events: EventSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            log_json: false,
            log_to_file: false,
            server: ServerSettings::default(),
            storage: StorageSettings::default(),
            registry: RegistrySettings::default(),
            actions: ActionSettings::default(),
            events: EventSettings::default(),
        }
    }
}

/// HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_server_host")]
    pub host: String,

    #[serde(default = "default_server_port")]
    pub port: u16,
}

fn default_server_host() -> String {
    "127.0.0.1".to_string()
}

fn default_server_port() -> u16 {
    8000
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_server_host(),
            port: default_server_port(),
        }
    }
}

/// Snapshot store backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Filesystem,
    Memory,
}

/// Storage settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageSettings {
    /// Storage root; falls back to the default layout when absent
    #[serde(default)]
    pub root: Option<PathBuf>,

    #[serde(default)]
    pub backend: StorageBackend,
}

/// Device registry settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrySettings {
    /// Number of device slots
    #[serde(default = "default_capacity")]
    pub capacity: u32,

    /// Hostname prefix used when seeding without a reservations file
    #[serde(default = "default_hostname_prefix")]
    pub hostname_prefix: String,

    /// HTTP port of slot 0
    #[serde(default = "default_http_base_port")]
    pub http_base_port: u16,

    /// Admin port of slot 0
    #[serde(default = "default_admin_base_port")]
    pub admin_base_port: u16,

    /// MQTT topic prefix
    #[serde(default = "default_topic_prefix")]
    pub topic_prefix: String,

    /// Seed hostnames from `reservations.json` instead of the prefix
    #[serde(default)]
    pub use_reservations: bool,
}

fn default_capacity() -> u32 {
    25
}

fn default_hostname_prefix() -> String {
    "esp".to_string()
}

fn default_http_base_port() -> u16 {
    8100
}

fn default_admin_base_port() -> u16 {
    8200
}

fn default_topic_prefix() -> String {
    "dashmaster/devices".to_string()
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            hostname_prefix: default_hostname_prefix(),
            http_base_port: default_http_base_port(),
            admin_base_port: default_admin_base_port(),
            topic_prefix: default_topic_prefix(),
            use_reservations: false,
        }
    }
}

/// Device action settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionSettings {
    /// Host the device ports are reachable on (the port mapper)
    #[serde(default = "default_device_host")]
    pub device_host: String,

    /// Per-attempt timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Attempts before giving up
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// First retry delay in milliseconds
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    /// Retry delay cap in milliseconds
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,
}

fn default_device_host() -> String {
    "127.0.0.1".to_string()
}

fn default_timeout_ms() -> u64 {
    5000
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_base_ms() -> u64 {
    500
}

fn default_backoff_max_ms() -> u64 {
    4000
}

impl Default for ActionSettings {
    fn default() -> Self {
        Self {
            device_host: default_device_host(),
            timeout_ms: default_timeout_ms(),
            max_attempts: default_max_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: default_backoff_max_ms(),
        }
    }
}

/// Event stream settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventSettings {
    /// Events buffered per subscriber before it is dropped
    #[serde(default = "default_subscriber_capacity")]
    pub subscriber_capacity: usize,
}

fn default_subscriber_capacity() -> usize {
    100
}

impl Default for EventSettings {
    fn default() -> Self {
        Self {
            subscriber_capacity: default_subscriber_capacity(),
        }
    }
}
