//! Balancer endpoints: room placement and fleet metrics

use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use serde::{Deserialize, Serialize};

use roomgrid_core::models::{RoomId, ServerId, ServerRecord};

use super::{AppError, AppResult, BalancerState};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomAssignmentRequest {
    #[serde(default)]
    pub room_id: Option<String>,
    #[serde(default)]
    pub room_type: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct AssignmentMetrics {
    pub rooms: u64,
    pub peers: u64,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RoomAssignmentResponse {
    pub server_id: ServerId,
    pub url: String,
    pub metrics: AssignmentMetrics,
}

impl RoomAssignmentResponse {
    fn from_record(server: &ServerRecord, fallback_url: &str) -> Self {
        Self {
            server_id: server.id.clone(),
            url: server
                .metrics
                .url
                .clone()
                .unwrap_or_else(|| fallback_url.to_string()),
            metrics: AssignmentMetrics {
                rooms: server.metrics.rooms,
                peers: server.metrics.peers,
            },
        }
    }
}

/// POST /api/room-assignment
pub async fn assign_room(
    State(state): State<BalancerState>,
    payload: Result<Json<RoomAssignmentRequest>, JsonRejection>,
) -> AppResult<Json<RoomAssignmentResponse>> {
    let Json(request) = payload.map_err(|e| AppError::bad_request(e.body_text()))?;

    let room_id = request.room_id.filter(|s| !s.is_empty());
    let room_type = request.room_type.filter(|s| !s.is_empty());
    let (Some(room_id), Some(room_type)) = (room_id, room_type) else {
        return Err(AppError::bad_request("Missing roomId or roomType"));
    };

    let room_id = RoomId::from(room_id);
    let placement = state.placement.assign(&room_id).await?;
    tracing::debug!(
        room_id = %room_id,
        room_type = %room_type,
        server_id = %placement.server.id,
        sticky = placement.sticky,
        "Room assignment served"
    );

    Ok(Json(RoomAssignmentResponse::from_record(
        &placement.server,
        &state.fallback_url,
    )))
}

/// GET /api/servers/least-loaded
pub async fn least_loaded(State(state): State<BalancerState>) -> AppResult<Json<RoomAssignmentResponse>> {
    let server = state
        .discovery
        .least_loaded()
        .await
        .ok_or_else(|| AppError::service_unavailable("No servers available"))?;

    Ok(Json(RoomAssignmentResponse::from_record(&server, &state.fallback_url)))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ServerSummary {
    pub id: ServerId,
    pub healthy: bool,
    pub rooms: u64,
    pub peers: u64,
    pub producers: u64,
    pub consumers: u64,
    pub timestamp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct FleetTotals {
    pub rooms: u64,
    pub peers: u64,
    pub producers: u64,
    pub consumers: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FleetMetrics {
    pub servers: Vec<ServerSummary>,
    pub totals: FleetTotals,
}

/// GET /api/metrics
pub async fn fleet_metrics(State(state): State<BalancerState>) -> Json<FleetMetrics> {
    let servers = state.discovery.healthy_servers().await;

    let mut totals = FleetTotals::default();
    for server in servers.iter().filter(|s| s.healthy) {
        totals.rooms += server.metrics.rooms;
        totals.peers += server.metrics.peers;
        totals.producers += server.metrics.producers;
        totals.consumers += server.metrics.consumers;
    }

    let servers = servers
        .into_iter()
        .map(|s| ServerSummary {
            id: s.id,
            healthy: s.healthy,
            rooms: s.metrics.rooms,
            peers: s.metrics.peers,
            producers: s.metrics.producers,
            consumers: s.metrics.consumers,
            timestamp: s.metrics.timestamp,
            url: s.metrics.url,
        })
        .collect();

    Json(FleetMetrics { servers, totals })
}
