//! Application state management

use std::sync::Arc;

use tracing::{info, warn};

use crate::actions::{ActionDispatcher, DeviceTransport, HttpDeviceTransport};
use crate::app::options::AppOptions;
use crate::deploy::{DeploymentEngine, RollbackEngine};
use crate::errors::CompanionError;
use crate::events::EventBroadcaster;
use crate::registry::Registry;
use crate::storage::reservations::{generated_reservations, Reservation, Reservations};
use crate::storage::settings::StorageBackend;
use crate::storage::{ConfigStore, FsConfigStore, MemoryConfigStore};

/// Main application state
pub struct AppState {
    /// Snapshot store
    pub store: Arc<dyn ConfigStore>,

    /// Event broadcaster
    pub events: EventBroadcaster,

    /// Device registry
    pub registry: Arc<Registry>,

    /// Upload pipeline
    pub deployer: Arc<DeploymentEngine>,

    /// Rollback pipeline
    pub rollback: Arc<RollbackEngine>,

    /// Device command dispatcher
    pub dispatcher: Arc<ActionDispatcher>,
}

impl AppState {
    /// Initialize application state with the configured store and the HTTP
    /// device transport
    pub async fn init(options: &AppOptions) -> Result<Self, CompanionError> {
        info!("Initializing application state...");

        let store: Arc<dyn ConfigStore> = match options.storage.backend {
            StorageBackend::Filesystem => {
                options.storage.layout.setup().await?;
                Arc::new(FsConfigStore::new(options.storage.layout.clone()))
            }
            StorageBackend::Memory => {
                warn!("Using the in-memory snapshot store, history is lost on exit");
                Arc::new(MemoryConfigStore::new())
            }
        };

        let transport = Arc::new(HttpDeviceTransport::new(
            &options.actions.device_host,
            options.actions.dispatch.timeout,
        )?);

        let reservations = if options.registry.use_reservations {
            let file = options.storage.layout.reservations_file();
            Reservations::load(&file).await?.devices
        } else {
            generated_reservations(&options.registry.hostname_prefix, options.registry.capacity)
        };

        Self::build(options, store, transport, &reservations).await
    }

    /// Assemble the state from explicit parts, seed the registry with
    /// `reservations` and restore each device's history from the store
    pub async fn build(
        options: &AppOptions,
        store: Arc<dyn ConfigStore>,
        transport: Arc<dyn DeviceTransport>,
        reservations: &[Reservation],
    ) -> Result<Self, CompanionError> {
        let events = EventBroadcaster::new(options.subscriber_capacity);
        let registry = Arc::new(Registry::new(
            options.registry.capacity,
            options.registry.slot_layout.clone(),
            events.clone(),
        ));

        registry.seed_reservations(reservations)?;
        restore_history(&registry, store.as_ref()).await?;
        info!("Registry seeded with {} devices", reservations.len());

        let deployer = Arc::new(DeploymentEngine::new(
            registry.clone(),
            store.clone(),
            events.clone(),
        ));
        let rollback = Arc::new(RollbackEngine::new(
            registry.clone(),
            store.clone(),
            events.clone(),
        ));
        let dispatcher = Arc::new(ActionDispatcher::new(
            registry.clone(),
            transport,
            options.actions.dispatch.clone(),
        ));

        Ok(Self {
            store,
            events,
            registry,
            deployer,
            rollback,
            dispatcher,
        })
    }

    /// Shutdown application state
    pub async fn shutdown(&self) -> Result<(), CompanionError> {
        info!(
            "Shutting down application state ({} event subscribers connected)...",
            self.events.subscriber_count()
        );
        Ok(())
    }
}

async fn restore_history(
    registry: &Registry,
    store: &dyn ConfigStore,
) -> Result<(), CompanionError> {
    for device in registry.list() {
        let snapshots = store.list_snapshots(&device.hostname).await?;
        if snapshots.is_empty() {
            continue;
        }
        let lease = registry.lease(&device.hostname).await?;
        let restored = lease.restore_history(&snapshots);
        info!(
            "Restored {} snapshots for {}",
            restored.snapshot_names.len(),
            restored.hostname
        );
    }
    Ok(())
}
