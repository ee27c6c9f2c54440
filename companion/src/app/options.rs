//! Application configuration options

use std::time::Duration;

use crate::actions::DispatchOptions;
use crate::registry::SlotLayout;
use crate::storage::layout::StorageLayout;
use crate::storage::settings::{Settings, StorageBackend};

/// Main application options
#[derive(Debug, Clone)]
pub struct AppOptions {
    /// Lifecycle configuration
    pub lifecycle: LifecycleOptions,

    /// Storage configuration
    pub storage: StorageOptions,

    /// Server configuration
    pub server: ServerOptions,

    /// Device registry configuration
    pub registry: RegistryOptions,

    /// Device action configuration
    pub actions: ActionOptions,

    /// Events buffered per subscriber
    pub subscriber_capacity: usize,
}

impl Default for AppOptions {
    fn default() -> Self {
        Self::from_settings(&Settings::default(), StorageLayout::default())
    }
}

impl AppOptions {
    /// Build runtime options from the settings file
    pub fn from_settings(settings: &Settings, layout: StorageLayout) -> Self {
        Self {
            lifecycle: LifecycleOptions::default(),
            storage: StorageOptions {
                layout,
                backend: settings.storage.backend,
            },
            server: ServerOptions {
                host: settings.server.host.clone(),
                port: settings.server.port,
            },
            registry: RegistryOptions {
                capacity: settings.registry.capacity,
                hostname_prefix: settings.registry.hostname_prefix.clone(),
                use_reservations: settings.registry.use_reservations,
                slot_layout: SlotLayout::from(&settings.registry),
            },
            actions: ActionOptions {
                device_host: settings.actions.device_host.clone(),
                dispatch: DispatchOptions::from(&settings.actions),
            },
            subscriber_capacity: settings.events.subscriber_capacity,
        }
    }
}

/// Lifecycle options for the companion
#[derive(Debug, Clone)]
pub struct LifecycleOptions {
    /// Maximum delay for graceful shutdown
    pub max_shutdown_delay: Duration,
}

impl Default for LifecycleOptions {
    fn default() -> Self {
        Self {
            max_shutdown_delay: Duration::from_secs(30),
        }
    }
}

/// Storage configuration options
#[derive(Debug, Clone)]
pub struct StorageOptions {
    /// Storage layout paths
    pub layout: StorageLayout,

    /// Snapshot store backend
    pub backend: StorageBackend,
}

/// Local HTTP server options
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
        }
    }
}

/// Device registry options
#[derive(Debug, Clone)]
pub struct RegistryOptions {
    /// Number of slots
    pub capacity: u32,

    /// Prefix of generated hostnames
    pub hostname_prefix: String,

    /// Seed from `reservations.json` instead of generated hostnames
    pub use_reservations: bool,

    /// Port and topic derivation
    pub slot_layout: SlotLayout,
}

/// Device action options
#[derive(Debug, Clone)]
pub struct ActionOptions {
    /// Host the device ports are reachable on
    pub device_host: String,

    pub dispatch: DispatchOptions,
}
