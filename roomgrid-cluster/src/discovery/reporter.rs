//! Periodic self-report of a signaling server into the shared registry

use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use roomgrid_core::models::{ServerId, ServerMetrics};

use super::server_registry::ServerRegistry;
use crate::error::Result;
use crate::sync::RoomHub;

/// Writes `server:{id}` on a fixed interval so balancers see this server as
/// healthy, and deletes it on shutdown.
pub struct ServerReporter {
    registry: Arc<dyn ServerRegistry>,
    server_id: ServerId,
    advertised_url: Option<String>,
    hub: RoomHub,
    report_interval: Duration,
    cancel_token: CancellationToken,
}

impl ServerReporter {
    #[must_use]
    pub fn new(
        registry: Arc<dyn ServerRegistry>,
        server_id: ServerId,
        advertised_url: Option<String>,
        hub: RoomHub,
        report_interval: Duration,
    ) -> Self {
        Self {
            registry,
            server_id,
            advertised_url,
            hub,
            report_interval,
            cancel_token: CancellationToken::new(),
        }
    }

    #[must_use]
    pub const fn server_id(&self) -> &ServerId {
        &self.server_id
    }

    /// Current telemetry of this server
    #[must_use]
    pub fn metrics(&self) -> ServerMetrics {
        let metrics = ServerMetrics::now(self.hub.peer_count() as u64, self.hub.room_count() as u64);
        match &self.advertised_url {
            Some(url) => metrics.with_url(url.clone()),
            None => metrics,
        }
    }

    /// Write one report
    pub async fn report_once(&self) -> Result<()> {
        let metrics = self.metrics();
        self.registry.report_server(&self.server_id, &metrics).await?;
        tracing::debug!(
            server_id = %self.server_id,
            peers = metrics.peers,
            rooms = metrics.rooms,
            "Reported server metrics"
        );
        Ok(())
    }

    /// Remove this server from the registry
    pub async fn unregister(&self) -> Result<()> {
        self.registry.remove_server(&self.server_id).await?;
        tracing::info!(server_id = %self.server_id, "Server unregistered");
        Ok(())
    }

    /// Start reporting. The first report is written immediately.
    ///
    /// After `shutdown()` the loop stops and the entry is removed.
    pub fn start(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let reporter = self.clone();
        let cancel_token = self.cancel_token.clone();
        let mut timer = interval(self.report_interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            server_id = %self.server_id,
            interval_ms = self.report_interval.as_millis() as u64,
            "Starting server reporter"
        );

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = cancel_token.cancelled() => {
                        if let Err(e) = reporter.unregister().await {
                            tracing::warn!(server_id = %reporter.server_id, error = %e, "Failed to unregister server");
                        }
                        return;
                    }
                    _ = timer.tick() => {
                        if let Err(e) = reporter.report_once().await {
                            tracing::warn!(server_id = %reporter.server_id, error = %e, "Failed to report server metrics");
                        }
                    }
                }
            }
        })
    }

    pub fn shutdown(&self) {
        self.cancel_token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::MemoryServerRegistry;
    use roomgrid_core::models::{RoomId, UserId};

    #[tokio::test]
    async fn test_report_reflects_hub_load() {
        let registry = MemoryServerRegistry::new();
        let hub = RoomHub::new(8);
        let (c1, _rx1) = hub.connect();
        let (c2, _rx2) = hub.connect();
        hub.join(&c1, RoomId::from("r1"), UserId::from("u1"), None).unwrap();
        hub.join(&c2, RoomId::from("r1"), UserId::from("u2"), None).unwrap();

        let reporter = ServerReporter::new(
            Arc::new(registry.clone()),
            ServerId::from("s1"),
            Some("ws://10.0.0.5:3001".to_string()),
            hub,
            Duration::from_secs(5),
        );
        reporter.report_once().await.unwrap();

        let listed = registry.list_servers().await.unwrap();
        let fields = &listed[0].1;
        assert_eq!(fields.get("peers").map(String::as_str), Some("2"));
        assert_eq!(fields.get("rooms").map(String::as_str), Some("1"));
        assert_eq!(fields.get("url").map(String::as_str), Some("ws://10.0.0.5:3001"));
    }

    #[tokio::test]
    async fn test_shutdown_removes_entry() {
        let registry = MemoryServerRegistry::new();
        let reporter = Arc::new(ServerReporter::new(
            Arc::new(registry.clone()),
            ServerId::from("s1"),
            None,
            RoomHub::new(8),
            Duration::from_millis(10),
        ));

        let handle = reporter.start();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(registry.list_servers().await.unwrap().len(), 1);

        reporter.shutdown();
        handle.await.unwrap();
        assert!(registry.list_servers().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_report_failure_is_an_error() {
        let registry = MemoryServerRegistry::new();
        registry.set_unreachable(true);
        let reporter = ServerReporter::new(
            Arc::new(registry),
            ServerId::from("s1"),
            None,
            RoomHub::new(8),
            Duration::from_secs(5),
        );
        assert!(reporter.report_once().await.is_err());
    }
}
