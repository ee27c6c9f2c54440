//! Server state

use std::sync::Arc;

use tokio::sync::broadcast;

use crate::actions::ActionDispatcher;
use crate::app::state::AppState;
use crate::deploy::{DeploymentEngine, RollbackEngine};
use crate::events::EventBroadcaster;
use crate::registry::Registry;

/// Server state shared across handlers
pub struct ServerState {
    pub registry: Arc<Registry>,
    pub events: EventBroadcaster,
    pub deployer: Arc<DeploymentEngine>,
    pub rollback: Arc<RollbackEngine>,
    pub dispatcher: Arc<ActionDispatcher>,
    /// Fires when the server is shutting down so event streams can end
    pub shutdown: broadcast::Sender<()>,
}

impl ServerState {
    pub fn new(
        registry: Arc<Registry>,
        events: EventBroadcaster,
        deployer: Arc<DeploymentEngine>,
        rollback: Arc<RollbackEngine>,
        dispatcher: Arc<ActionDispatcher>,
        shutdown: broadcast::Sender<()>,
    ) -> Self {
        Self {
            registry,
            events,
            deployer,
            rollback,
            dispatcher,
            shutdown,
        }
    }

    pub fn from_app_state(app_state: &AppState, shutdown: broadcast::Sender<()>) -> Self {
        Self::new(
            app_state.registry.clone(),
            app_state.events.clone(),
            app_state.deployer.clone(),
            app_state.rollback.clone(),
            app_state.dispatcher.clone(),
            shutdown,
        )
    }
}
