// Module: http
// Routers for the balancer and signaling roles

pub mod assignment;
pub mod error;
pub mod health;
pub mod websocket;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use roomgrid_cluster::discovery::{RoomPlacement, ServerDiscovery};
use roomgrid_cluster::sync::{MessageHandler, RoomHub};
use roomgrid_core::config::SignalingConfig;

pub use error::{AppError, AppResult};

/// Shared state of the balancer role
#[derive(Clone)]
pub struct BalancerState {
    pub discovery: Arc<ServerDiscovery>,
    pub placement: Arc<RoomPlacement>,
    /// Returned when a server did not advertise its own URL
    pub fallback_url: Arc<str>,
}

/// Shared state of the signaling role
#[derive(Clone)]
pub struct SignalingState {
    pub hub: RoomHub,
    pub handler: MessageHandler,
    pub ping_interval: Duration,
    pub max_message_bytes: usize,
}

impl SignalingState {
    #[must_use]
    pub fn new(hub: RoomHub, config: &SignalingConfig) -> Self {
        Self {
            handler: MessageHandler::new(hub.clone()),
            hub,
            ping_interval: config.ping_interval(),
            max_message_bytes: config.max_message_bytes,
        }
    }
}

fn cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Create the balancer router
pub fn create_balancer_router(state: BalancerState) -> Router {
    Router::new()
        .route("/health", get(health::balancer_health))
        .route("/api/room-assignment", post(assignment::assign_room))
        .route("/api/metrics", get(assignment::fleet_metrics))
        .route("/api/servers/least-loaded", get(assignment::least_loaded))
        .layer(cors())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Create the signaling router
pub fn create_signaling_router(state: SignalingState) -> Router {
    Router::new()
        .route("/health", get(health::signaling_health))
        .route("/stats", get(health::signaling_stats))
        .route("/signaling", get(websocket::signaling_handler))
        .layer(cors())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
