//! Discovery and placement against the in-memory registry
//!
//! Run with: cargo test -p roomgrid-cluster --test placement_scenarios

use chrono::{Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;

use roomgrid_cluster::discovery::{
    select_by_hash, MemoryServerRegistry, RoomPlacement, ServerDiscovery, ServerRegistry,
};
use roomgrid_core::config::DiscoveryConfig;
use roomgrid_core::models::{RoomId, ServerId, ServerMetrics};

fn metrics_at(at: chrono::DateTime<Utc>) -> ServerMetrics {
    ServerMetrics {
        timestamp: at.timestamp_millis(),
        ..ServerMetrics::default()
    }
}

#[tokio::test]
async fn test_thousand_rooms_spread_over_three_servers() {
    let registry = MemoryServerRegistry::new();
    let now = Utc::now();
    for id in ["s1", "s2", "s3"] {
        registry.report_server(&ServerId::from(id), &metrics_at(now)).await.unwrap();
    }
    let discovery = ServerDiscovery::new(Arc::new(registry), &DiscoveryConfig::default());
    discovery.refresh_at(now).await;
    let healthy = discovery.healthy_servers().await;

    let mut counts: HashMap<ServerId, usize> = HashMap::new();
    for i in 0..1000 {
        let room = RoomId::from(format!("room-{i}"));
        let server = select_by_hash(&room, &healthy).unwrap();
        *counts.entry(server.id.clone()).or_default() += 1;
    }

    assert_eq!(counts.len(), 3);
    assert!(counts.values().all(|c| *c > 0 && *c <= 500), "{counts:?}");
}

#[tokio::test]
async fn test_silent_server_is_never_chosen_again_until_it_reports() {
    let registry = MemoryServerRegistry::new();
    let shared: Arc<dyn ServerRegistry> = Arc::new(registry.clone());
    let discovery = Arc::new(ServerDiscovery::new(shared.clone(), &DiscoveryConfig::default()));
    let placement = RoomPlacement::new(shared, discovery.clone());

    let start = Utc::now();
    // "quiet" is idle, so least-loaded would pick it while it is healthy
    registry.report_server(&ServerId::from("quiet"), &metrics_at(start)).await.unwrap();
    let busy = ServerMetrics {
        peers: 40,
        rooms: 4,
        ..metrics_at(start)
    };
    registry.report_server(&ServerId::from("busy"), &busy).await.unwrap();
    discovery.refresh_at(start).await;
    assert_eq!(discovery.least_loaded().await.unwrap().id, ServerId::from("quiet"));

    // Only "busy" keeps reporting past the staleness window
    let later = start + Duration::seconds(20);
    let busy_later = ServerMetrics {
        timestamp: later.timestamp_millis(),
        ..busy
    };
    registry.report_server(&ServerId::from("busy"), &busy_later).await.unwrap();
    discovery.refresh_at(later).await;

    assert_eq!(discovery.least_loaded().await.unwrap().id, ServerId::from("busy"));
    for i in 0..50 {
        let placed = placement.assign(&RoomId::from(format!("room-{i}"))).await.unwrap();
        assert_eq!(placed.server.id, ServerId::from("busy"));
    }

    // Back again once it reports
    registry.report_server(&ServerId::from("quiet"), &metrics_at(later)).await.unwrap();
    discovery.refresh_at(later).await;
    assert!(discovery.is_healthy(&ServerId::from("quiet")).await);
}

#[tokio::test]
async fn test_sticky_room_moves_only_when_its_server_dies() {
    let registry = MemoryServerRegistry::new();
    let shared: Arc<dyn ServerRegistry> = Arc::new(registry.clone());
    let discovery = Arc::new(ServerDiscovery::new(shared.clone(), &DiscoveryConfig::default()));
    let placement = RoomPlacement::new(shared, discovery.clone());

    let now = Utc::now();
    for id in ["a", "b"] {
        registry.report_server(&ServerId::from(id), &metrics_at(now)).await.unwrap();
    }
    discovery.refresh_at(now).await;

    let room = RoomId::from("standup");
    let home = placement.assign(&room).await.unwrap().server.id;

    for id in ["c", "d", "e"] {
        registry.report_server(&ServerId::from(id), &metrics_at(now)).await.unwrap();
    }
    discovery.refresh_at(now).await;
    assert_eq!(placement.assign(&room).await.unwrap().server.id, home);

    registry.remove_server(&home).await.unwrap();
    discovery.refresh_at(now).await;
    let moved = placement.assign(&room).await.unwrap();
    assert_ne!(moved.server.id, home);

    // The new home sticks in turn
    assert_eq!(placement.assign(&room).await.unwrap().server.id, moved.server.id);
    assert!(placement.assign(&room).await.unwrap().sticky);
}
