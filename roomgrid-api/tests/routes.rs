//! HTTP routes of both roles, driven through the routers
//!
//! Run with: cargo test -p roomgrid-api --test routes

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

use roomgrid_api::{create_balancer_router, create_signaling_router, BalancerState, SignalingState};
use roomgrid_cluster::discovery::{
    MemoryServerRegistry, RoomPlacement, ServerDiscovery, ServerRegistry,
};
use roomgrid_cluster::sync::RoomHub;
use roomgrid_core::config::{DiscoveryConfig, SignalingConfig};
use roomgrid_core::models::{RoomId, ServerId, ServerMetrics, UserId};

async fn balancer(servers: &[(&str, ServerMetrics)]) -> (MemoryServerRegistry, Router) {
    let registry = MemoryServerRegistry::new();
    for (id, metrics) in servers {
        registry.report_server(&ServerId::from(*id), metrics).await.unwrap();
    }
    let shared: Arc<dyn ServerRegistry> = Arc::new(registry.clone());
    let discovery = Arc::new(ServerDiscovery::new(shared.clone(), &DiscoveryConfig::default()));
    discovery.refresh().await;

    let state = BalancerState {
        placement: Arc::new(RoomPlacement::new(shared, discovery.clone())),
        discovery,
        fallback_url: Arc::from("ws://localhost:3001"),
    };
    (registry, create_balancer_router(state))
}

async fn call(router: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn post_json(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_room_assignment_success() {
    let metrics = ServerMetrics::now(4, 2).with_url("ws://10.0.0.7:3001");
    let (registry, router) = balancer(&[("s1", metrics)]).await;

    let (status, body) = call(
        router,
        post_json("/api/room-assignment", r#"{"roomId":"r1","roomType":"arena"}"#),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["serverId"], "s1");
    assert_eq!(body["url"], "ws://10.0.0.7:3001");
    assert_eq!(body["metrics"], json!({"rooms": 2, "peers": 4}));
    assert_eq!(
        registry.room_assignment(&RoomId::from("r1")).await.unwrap(),
        Some(ServerId::from("s1"))
    );
}

#[tokio::test]
async fn test_room_assignment_uses_fallback_url() {
    let (_, router) = balancer(&[("s1", ServerMetrics::now(0, 0))]).await;
    let (status, body) = call(
        router,
        post_json("/api/room-assignment", r#"{"roomId":"r1","roomType":"arena"}"#),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["url"], "ws://localhost:3001");
}

#[tokio::test]
async fn test_room_assignment_missing_fields() {
    for body in [r#"{"roomId":"r1"}"#, r#"{"roomType":"arena"}"#, r#"{"roomId":"","roomType":"x"}"#, "not json"] {
        let (_, router) = balancer(&[("s1", ServerMetrics::now(0, 0))]).await;
        let (status, response) = call(router, post_json("/api/room-assignment", body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
        assert_eq!(response["status"], 400);
    }
}

#[tokio::test]
async fn test_room_assignment_without_servers() {
    let (_, router) = balancer(&[]).await;
    let (status, body) = call(
        router,
        post_json("/api/room-assignment", r#"{"roomId":"r1","roomType":"arena"}"#),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"], "No healthy servers available");
}

#[tokio::test]
async fn test_balancer_health() {
    let (_, router) = balancer(&[]).await;
    let (status, body) = call(router, get("/health")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["status"], "unhealthy");
    assert_eq!(body["servers"], 0);

    let (_, router) = balancer(&[("s1", ServerMetrics::now(0, 0))]).await;
    let (status, body) = call(router, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["servers"], 1);
}

#[tokio::test]
async fn test_fleet_metrics_totals() {
    let mut loaded = ServerMetrics::now(10, 2);
    loaded.producers = 3;
    let (_, router) = balancer(&[("s1", loaded), ("s2", ServerMetrics::now(5, 1))]).await;

    let (status, body) = call(router, get("/api/metrics")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["servers"].as_array().unwrap().len(), 2);
    assert_eq!(
        body["totals"],
        json!({"rooms": 3, "peers": 15, "producers": 3, "consumers": 0})
    );
}

#[tokio::test]
async fn test_least_loaded_endpoint() {
    let (_, router) = balancer(&[
        ("s1", ServerMetrics::now(0, 3)),
        ("s2", ServerMetrics::now(5, 0)),
    ])
    .await;
    let (status, body) = call(router, get("/api/servers/least-loaded")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["serverId"], "s2");

    let (_, router) = balancer(&[]).await;
    let (status, _) = call(router, get("/api/servers/least-loaded")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_signaling_health_and_stats() {
    let hub = RoomHub::new(16);
    let (c1, _rx1) = hub.connect();
    let (c2, _rx2) = hub.connect();
    let (_idle, _rx3) = hub.connect();
    hub.join(&c1, RoomId::from("r1"), UserId::from("u1"), Some("moderator".into()))
        .unwrap();
    hub.join(&c2, RoomId::from("r1"), UserId::from("u2"), None).unwrap();

    let router = create_signaling_router(SignalingState::new(hub.clone(), &SignalingConfig::default()));

    let (status, body) = call(router.clone(), get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["connections"], 3);
    assert_eq!(body["rooms"], 1);

    let (status, body) = call(router, get("/stats")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["totalRooms"], 1);
    assert_eq!(body["totalPeers"], 2);
    assert_eq!(body["rooms"][0]["roomId"], "r1");
    let roles: Vec<&str> = body["rooms"][0]["peers"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|p| p["role"].as_str())
        .collect();
    assert!(roles.contains(&"moderator"));
    assert!(roles.contains(&"audience"));
}
