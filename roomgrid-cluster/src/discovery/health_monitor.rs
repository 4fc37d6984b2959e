//! Server discovery and health tracking
//!
//! Polls the shared registry on a fixed interval and keeps an in-memory
//! snapshot of the servers whose last report is younger than the staleness
//! window. Registry outages never fail the snapshot: the previous view is
//! kept and the failure logged.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use roomgrid_core::config::DiscoveryConfig;
use roomgrid_core::models::{ServerId, ServerMetrics, ServerRecord};

use super::server_registry::ServerRegistry;

/// Result of one discovery poll
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshReport {
    /// Servers in the snapshot after the poll
    pub healthy: usize,
    /// Servers dropped by this poll
    pub evicted: Vec<ServerId>,
    /// The registry could not be read and the previous snapshot was kept
    pub degraded: bool,
}

/// Health-aware view of the signaling fleet
pub struct ServerDiscovery {
    registry: Arc<dyn ServerRegistry>,
    refresh_interval: Duration,
    server_timeout: Duration,
    room_weight: u64,
    servers: Arc<RwLock<HashMap<ServerId, ServerRecord>>>,
    cancel_token: CancellationToken,
}

impl ServerDiscovery {
    #[must_use]
    pub fn new(registry: Arc<dyn ServerRegistry>, config: &DiscoveryConfig) -> Self {
        Self {
            registry,
            refresh_interval: config.refresh_interval(),
            server_timeout: config.server_timeout(),
            room_weight: config.room_weight,
            servers: Arc::new(RwLock::new(HashMap::new())),
            cancel_token: CancellationToken::new(),
        }
    }

    /// Start the polling loop.
    ///
    /// The first poll runs immediately. Use `shutdown()` to stop the loop.
    pub fn start(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let discovery = self.clone();
        let cancel_token = self.cancel_token.clone();
        let mut timer = interval(self.refresh_interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = cancel_token.cancelled() => {
                        tracing::info!("Server discovery shutting down");
                        return;
                    }
                    _ = timer.tick() => {
                        discovery.refresh().await;
                    }
                }
            }
        })
    }

    /// Gracefully stop the polling loop
    pub fn shutdown(&self) {
        self.cancel_token.cancel();
    }

    /// Poll the registry once using the current time
    pub async fn refresh(&self) -> RefreshReport {
        self.refresh_at(Utc::now()).await
    }

    /// Poll the registry once, aging reports against `now`
    pub async fn refresh_at(&self, now: DateTime<Utc>) -> RefreshReport {
        let entries = match self.registry.list_servers().await {
            Ok(entries) => entries,
            Err(e) => {
                let servers = self.servers.read().await;
                tracing::error!(
                    error = %e,
                    retained = servers.len(),
                    "Server discovery failed, keeping previous snapshot"
                );
                return RefreshReport {
                    healthy: servers.len(),
                    evicted: Vec::new(),
                    degraded: true,
                };
            }
        };

        let mut fresh = HashMap::with_capacity(entries.len());
        for (server_id, fields) in entries {
            let Some(record) = ServerMetrics::from_fields(&fields)
                .and_then(|metrics| ServerRecord::from_metrics(server_id.clone(), metrics))
            else {
                tracing::debug!(server_id = %server_id, "Ignoring server entry without a valid timestamp");
                continue;
            };

            if record.is_stale(now, self.server_timeout) {
                tracing::debug!(
                    server_id = %server_id,
                    age_ms = record.age(now).num_milliseconds(),
                    "Server report is stale"
                );
                continue;
            }
            fresh.insert(server_id, record);
        }

        let mut servers = self.servers.write().await;
        let mut evicted: Vec<ServerId> = servers
            .keys()
            .filter(|id| !fresh.contains_key(*id))
            .cloned()
            .collect();
        evicted.sort();

        for server_id in &evicted {
            tracing::warn!(server_id = %server_id, "Server evicted from healthy set");
        }
        for server_id in fresh.keys().filter(|id| !servers.contains_key(*id)) {
            tracing::info!(server_id = %server_id, "Server discovered");
        }

        *servers = fresh;
        tracing::debug!(active_servers = servers.len(), "Server discovery refreshed");

        RefreshReport {
            healthy: servers.len(),
            evicted,
            degraded: false,
        }
    }

    /// Healthy servers sorted by id
    pub async fn healthy_servers(&self) -> Vec<ServerRecord> {
        let servers = self.servers.read().await;
        let mut healthy: Vec<ServerRecord> =
            servers.values().filter(|s| s.healthy).cloned().collect();
        healthy.sort_by(|a, b| a.id.cmp(&b.id));
        healthy
    }

    /// A healthy server by id
    pub async fn get_server(&self, server_id: &ServerId) -> Option<ServerRecord> {
        let servers = self.servers.read().await;
        servers.get(server_id).filter(|s| s.healthy).cloned()
    }

    pub async fn is_healthy(&self, server_id: &ServerId) -> bool {
        self.get_server(server_id).await.is_some()
    }

    pub async fn healthy_count(&self) -> usize {
        let servers = self.servers.read().await;
        servers.values().filter(|s| s.healthy).count()
    }

    /// Healthy server with the lowest `peers + rooms * room_weight`.
    ///
    /// Servers are scanned in id order and the first minimum wins.
    pub async fn least_loaded(&self) -> Option<ServerRecord> {
        self.healthy_servers()
            .await
            .into_iter()
            .min_by_key(|s| s.metrics.load_score(self.room_weight))
    }
}
