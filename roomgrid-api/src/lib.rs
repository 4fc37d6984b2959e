//! HTTP surface of roomgrid
//!
//! Two routers share this crate: the balancer (room placement, fleet
//! metrics) and the signaling server (WebSocket relay, health, stats).

pub mod http;

pub use http::{create_balancer_router, create_signaling_router, BalancerState, SignalingState};
