use axum::Router;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use roomgrid_api::{create_balancer_router, create_signaling_router, BalancerState, SignalingState};
use roomgrid_cluster::discovery::{
    MemoryServerRegistry, RedisServerRegistry, RoomPlacement, ServerDiscovery, ServerRegistry,
    ServerReporter,
};
use roomgrid_cluster::sync::{spawn_sweeper, RoomHub};
use roomgrid_core::models::ServerId;
use roomgrid_core::Config;

/// Shared registry selected by configuration: Redis when a URL is set,
/// otherwise an in-process store for single-node runs.
fn build_registry(config: &Config) -> anyhow::Result<Arc<dyn ServerRegistry>> {
    if config.redis.url.is_empty() {
        warn!("No Redis URL configured, using in-process registry (single node only)");
        return Ok(Arc::new(MemoryServerRegistry::new()));
    }

    let registry = RedisServerRegistry::new(
        &config.redis.url,
        config.redis.key_prefix.clone(),
        config.redis.operation_timeout(),
    )?;
    info!("Using Redis server registry");
    Ok(Arc::new(registry))
}

/// Run the placement service until a shutdown signal arrives
pub async fn run_balancer(config: Config) -> anyhow::Result<()> {
    let registry = build_registry(&config)?;

    let discovery = Arc::new(ServerDiscovery::new(registry.clone(), &config.discovery));
    let discovery_handle = discovery.start();
    let placement = Arc::new(RoomPlacement::new(registry, discovery.clone()));

    let router = create_balancer_router(BalancerState {
        discovery: discovery.clone(),
        placement,
        fallback_url: Arc::from(config.balancer.fallback_url.as_str()),
    });

    let shutdown = CancellationToken::new();
    tokio::spawn(watch_shutdown_signal(shutdown.clone()));

    serve(router, &config.http_address(), shutdown).await?;

    discovery.shutdown();
    if let Err(e) = discovery_handle.await {
        error!("Discovery task failed: {}", e);
    }

    info!("Balancer shut down gracefully");
    Ok(())
}

/// Run a signaling server until a shutdown signal arrives
pub async fn run_signaling(config: Config) -> anyhow::Result<()> {
    let registry = build_registry(&config)?;
    let signaling = &config.signaling;

    let server_id = signaling
        .server_id
        .clone()
        .filter(|id| !id.is_empty())
        .map_or_else(ServerId::generate, ServerId::from);
    info!(server_id = %server_id, "Signaling server identity");

    let hub = RoomHub::new(signaling.peer_queue_capacity);

    let reporter = Arc::new(ServerReporter::new(
        registry,
        server_id,
        signaling.advertised_url.clone(),
        hub.clone(),
        signaling.report_interval(),
    ));
    let reporter_handle = reporter.start();

    let shutdown = CancellationToken::new();
    let sweeper_handle = spawn_sweeper(
        hub.clone(),
        signaling.sweep_interval(),
        signaling.peer_grace(),
        shutdown.child_token(),
    );
    tokio::spawn(watch_shutdown_signal(shutdown.clone()));

    let router = create_signaling_router(SignalingState::new(hub.clone(), signaling));

    // Unregister as soon as shutdown starts so balancers stop placing rooms here
    let unregister = {
        let reporter = reporter.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            shutdown.cancelled().await;
            reporter.shutdown();
            if let Err(e) = reporter_handle.await {
                error!("Reporter task failed: {}", e);
            }
        })
    };

    serve(router, &config.http_address(), shutdown.clone()).await?;

    shutdown.cancel();
    if let Err(e) = unregister.await {
        error!("Unregister task failed: {}", e);
    }
    if let Err(e) = sweeper_handle.await {
        error!("Sweeper task failed: {}", e);
    }

    info!(
        connections = hub.connection_count(),
        "Signaling server shut down gracefully"
    );
    Ok(())
}

async fn serve(router: Router, address: &str, shutdown: CancellationToken) -> anyhow::Result<()> {
    let addr: std::net::SocketAddr = address
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid HTTP address '{address}': {e}"))?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind HTTP address {addr}: {e}"))?;

    info!("HTTP server listening on {}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;

    info!("HTTP server shut down gracefully");
    Ok(())
}

async fn watch_shutdown_signal(shutdown: CancellationToken) {
    shutdown_signal().await;
    info!("Shutdown signal received, starting graceful shutdown...");
    shutdown.cancel();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received Ctrl+C signal");
            }
            Err(e) => {
                error!("Failed to install Ctrl+C handler: {}", e);
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
                info!("Received SIGTERM signal");
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
