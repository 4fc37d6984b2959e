//! Health and stats endpoints for monitoring probes

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use roomgrid_cluster::sync::RoomSnapshot;

use super::{BalancerState, SignalingState};

#[derive(Debug, Serialize, Deserialize)]
pub struct BalancerHealth {
    pub status: String,
    pub servers: usize,
    pub timestamp: i64,
}

/// Balancer health: 503 while no healthy backend is known
pub async fn balancer_health(State(state): State<BalancerState>) -> impl IntoResponse {
    let servers = state.discovery.healthy_count().await;
    let (status, label) = if servers > 0 {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "unhealthy")
    };

    (
        status,
        Json(BalancerHealth {
            status: label.to_string(),
            servers,
            timestamp: Utc::now().timestamp_millis(),
        }),
    )
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SignalingHealth {
    pub status: String,
    pub connections: usize,
    pub rooms: usize,
    pub timestamp: i64,
}

pub async fn signaling_health(State(state): State<SignalingState>) -> Json<SignalingHealth> {
    Json(SignalingHealth {
        status: "healthy".to_string(),
        connections: state.hub.connection_count(),
        rooms: state.hub.room_count(),
        timestamp: Utc::now().timestamp_millis(),
    })
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalingStats {
    pub total_rooms: usize,
    pub total_peers: usize,
    pub rooms: Vec<RoomSnapshot>,
}

/// Room membership of this signaling server
pub async fn signaling_stats(State(state): State<SignalingState>) -> Json<SignalingStats> {
    let rooms = state.hub.snapshot();
    Json(SignalingStats {
        total_rooms: rooms.len(),
        total_peers: rooms.iter().map(|r| r.peers.len()).sum(),
        rooms,
    })
}
