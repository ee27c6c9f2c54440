//! HTTP server setup

use std::future::Future;
use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::app::options::ServerOptions;
use crate::errors::CompanionError;
use crate::server::handlers::{
    birth_handler, claim_handler, factory_reset_handler, health_handler, identify_handler,
    list_devices_handler, reboot_handler, release_handler, rollback_handler, snapshots_handler,
    stream_handler, upload_handler,
};
use crate::server::state::ServerState;

/// Build the companion API router
pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        // Health
        .route("/healthz", get(health_handler))
        // Devices
        .route("/api/devices", get(list_devices_handler))
        .route("/api/devices/claim", post(claim_handler))
        .route("/api/devices/{hostname}/release", post(release_handler))
        .route("/api/devices/{hostname}/birth", get(birth_handler))
        .route("/api/devices/{hostname}/snapshots", get(snapshots_handler))
        // Config packs
        .route("/api/upload/{hostname}", post(upload_handler))
        .route("/api/upload/{hostname}/rollback", post(rollback_handler))
        // Device actions
        .route("/api/devices/{hostname}/identify", post(identify_handler))
        .route("/api/devices/{hostname}/reboot", post(reboot_handler))
        .route("/api/devices/{hostname}/factory_reset", post(factory_reset_handler))
        // Events
        .route("/api/stream", get(stream_handler))
        // State and middleware
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Start the HTTP server
pub async fn serve(
    options: &ServerOptions,
    state: Arc<ServerState>,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<JoinHandle<Result<(), CompanionError>>, CompanionError> {
    let app = router(state);

    let addr = format!("{}:{}", options.host, options.port);
    info!("Starting HTTP server on {}", addr);

    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| CompanionError::ServerError(e.to_string()))?;

    let handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal)
            .await
            .map_err(|e| CompanionError::ServerError(e.to_string()))
    });

    Ok(handle)
}
