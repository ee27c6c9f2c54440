//! HTTP request handlers

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Bytes,
    extract::{rejection::QueryRejection, Path, Query, State},
    response::{
        sse::{Event as SseEvent, KeepAlive, Sse},
        IntoResponse,
    },
    Json,
};
use futures::stream::{Stream, StreamExt};
use openapi_server::models::{
    ActionResponse, DeviceBirthResponse, DeviceClaimRequest, DeviceClaimResponse, DeviceRef,
    DeviceReleaseResponse, HealthResponse, IdentifyQuery, RollbackRequest, RollbackResponse,
    SnapshotListResponse, SnapshotRef, StreamQuery, UploadRequest, UploadResponse,
};
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use crate::actions::DeviceAction;
use crate::deploy::ConfigPack;
use crate::errors::CompanionError;
use crate::events::{Event, EventFilter};
use crate::registry::Device;
use crate::server::state::ServerState;
use crate::storage::snapshots::Snapshot;
use crate::utils::version_info;

const SERVICE_NAME: &str = "dashmaster-companion";

/// Parse a JSON body that may be left empty
fn optional_json<T: DeserializeOwned + Default>(body: &Bytes) -> Result<T, CompanionError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body)
        .map_err(|e| CompanionError::ValidationError(format!("Invalid request body: {}", e)))
}

/// Unwrap a query string, reporting a malformed one as a validation error
fn query<T>(extracted: Result<Query<T>, QueryRejection>) -> Result<T, CompanionError> {
    extracted
        .map(|Query(value)| value)
        .map_err(|e| CompanionError::ValidationError(e.body_text()))
}

fn device_ref(device: Device) -> DeviceRef {
    DeviceRef {
        hostname: device.hostname,
        slot_index: device.slot_index,
        http_port: device.http_port,
        admin_port: device.admin_port,
        mqtt_topic: device.mqtt_topic,
        status: device.status.as_str().to_string(),
        profile: device.profile,
        last_seen: device.last_seen,
        last_upload_at: device.last_upload_at,
        current_hashes: device.current_hashes,
        snapshots: device.snapshot_names,
    }
}

fn snapshot_ref(snapshot: Snapshot) -> SnapshotRef {
    SnapshotRef {
        name: snapshot.name,
        created_at: snapshot.created_at,
        files: snapshot.files,
        hashes: snapshot.hashes,
        actor: snapshot.actor,
        note: snapshot.note,
    }
}

fn action_response(hostname: String, action: DeviceAction) -> Json<ActionResponse> {
    Json(ActionResponse {
        hostname,
        action: action.path().to_string(),
    })
}

/// Health check handler
pub async fn health_handler(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    let version = version_info();
    Json(HealthResponse {
        status: "ok".to_string(),
        service: SERVICE_NAME.to_string(),
        version: version.version,
        git_hash: version.git_hash,
        devices: state.registry.list().len(),
        capacity: state.registry.capacity(),
        subscribers: state.events.subscriber_count(),
    })
}

/// List devices by slot
pub async fn list_devices_handler(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    let devices: Vec<DeviceRef> = state.registry.list().into_iter().map(device_ref).collect();
    Json(devices)
}

/// Claim a requested device, or the lowest free one
pub async fn claim_handler(
    State(state): State<Arc<ServerState>>,
    body: Bytes,
) -> Result<Json<DeviceClaimResponse>, CompanionError> {
    let request: DeviceClaimRequest = optional_json(&body)?;

    let device = match request.requested_hostname.as_deref() {
        Some(hostname) => state.registry.claim(hostname, request.profile).await?,
        None => state.registry.claim_next(request.profile).await?,
    };
    if let Some(actor) = &request.actor {
        info!("{} claimed by {}", device.hostname, actor);
    }

    Ok(Json(DeviceClaimResponse {
        hostname: device.hostname,
        http_port: device.http_port,
        admin_port: device.admin_port,
        mqtt_topic: device.mqtt_topic,
        slot_index: device.slot_index,
        profile: device.profile,
    }))
}

/// Release a device
pub async fn release_handler(
    State(state): State<Arc<ServerState>>,
    Path(hostname): Path<String>,
) -> Result<Json<DeviceReleaseResponse>, CompanionError> {
    let device = state.registry.release(&hostname).await?;
    Ok(Json(DeviceReleaseResponse {
        hostname: device.hostname,
        status: device.status.as_str().to_string(),
    }))
}

/// Birth certificate of a device
pub async fn birth_handler(
    State(state): State<Arc<ServerState>>,
    Path(hostname): Path<String>,
) -> Result<Json<DeviceBirthResponse>, CompanionError> {
    let birth = state.registry.birth(&hostname)?;
    let sha256 = birth.sha256()?;
    Ok(Json(DeviceBirthResponse {
        hostname,
        birth: serde_json::to_value(&birth)?,
        sha256,
    }))
}

/// Snapshot history of a device
pub async fn snapshots_handler(
    State(state): State<Arc<ServerState>>,
    Path(hostname): Path<String>,
) -> Result<Json<SnapshotListResponse>, CompanionError> {
    let snapshots: Vec<SnapshotRef> = state
        .deployer
        .snapshots(&hostname)
        .await?
        .into_iter()
        .map(snapshot_ref)
        .collect();
    Ok(Json(SnapshotListResponse {
        hostname,
        total: snapshots.len(),
        snapshots,
    }))
}

/// Upload a config pack
pub async fn upload_handler(
    State(state): State<Arc<ServerState>>,
    Path(hostname): Path<String>,
    body: Bytes,
) -> Result<Json<UploadResponse>, CompanionError> {
    let request: UploadRequest = optional_json(&body)?;
    let pack = ConfigPack::from_base64(&request.files)?;

    let outcome = state.deployer.upload(&hostname, pack, request.actor).await?;
    Ok(Json(UploadResponse {
        device: outcome.device.hostname,
        hashes: outcome.hashes,
        diff: outcome.diff,
        snapshot: outcome.snapshot.name,
    }))
}

/// Roll a device back
pub async fn rollback_handler(
    State(state): State<Arc<ServerState>>,
    Path(hostname): Path<String>,
    body: Bytes,
) -> Result<Json<RollbackResponse>, CompanionError> {
    let request: RollbackRequest = optional_json(&body)?;

    let outcome = state
        .rollback
        .rollback(&hostname, request.snapshot.as_deref(), request.actor)
        .await?;
    Ok(Json(RollbackResponse {
        device: outcome.device.hostname,
        rollback: outcome.target,
        snapshot: outcome.snapshot.name,
        hashes: outcome.hashes,
        diff: outcome.diff,
    }))
}

/// Start identify on a device
pub async fn identify_handler(
    State(state): State<Arc<ServerState>>,
    Path(hostname): Path<String>,
    params: Result<Query<IdentifyQuery>, QueryRejection>,
) -> Result<Json<ActionResponse>, CompanionError> {
    let params = query(params)?;
    let action = state.dispatcher.identify(&hostname, params.minutes).await?;
    Ok(action_response(hostname, action))
}

/// Reboot a device
pub async fn reboot_handler(
    State(state): State<Arc<ServerState>>,
    Path(hostname): Path<String>,
) -> Result<Json<ActionResponse>, CompanionError> {
    let action = state.dispatcher.reboot(&hostname).await?;
    Ok(action_response(hostname, action))
}

/// Factory reset a device
pub async fn factory_reset_handler(
    State(state): State<Arc<ServerState>>,
    Path(hostname): Path<String>,
) -> Result<Json<ActionResponse>, CompanionError> {
    let action = state.dispatcher.factory_reset(&hostname).await?;
    Ok(action_response(hostname, action))
}

fn sse_event(event: &Event) -> SseEvent {
    let name = event.kind().as_str();
    SseEvent::default()
        .event(name)
        .json_data(event)
        .unwrap_or_else(|_| SseEvent::default().event(name).comment("unencodable event"))
}

/// Stream events as server-sent events named after the event type
pub async fn stream_handler(
    State(state): State<Arc<ServerState>>,
    params: Result<Query<StreamQuery>, QueryRejection>,
) -> Result<Sse<impl Stream<Item = Result<SseEvent, Infallible>>>, CompanionError> {
    let params = query(params)?;
    let filter = match params.types.as_deref() {
        Some(types) => EventFilter::parse(types)?,
        None => EventFilter::all(),
    };

    let subscription = state.events.subscribe(filter);
    debug!("Event stream {} opened", subscription.id());

    let mut shutdown_rx = state.shutdown.subscribe();
    let stream = subscription
        .into_stream()
        .map(|event| Ok(sse_event(&event)))
        .take_until(async move {
            let _ = shutdown_rx.recv().await;
        });

    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    ))
}
