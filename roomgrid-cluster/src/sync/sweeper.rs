use std::time::Duration;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::room_hub::RoomHub;

/// Spawn the background task that expires connections without traffic.
///
/// A connection is removed once nothing has been received from it for longer
/// than `grace`, which the transport keeps alive with periodic pings.
pub fn spawn_sweeper(
    hub: RoomHub,
    sweep_interval: Duration,
    grace: Duration,
    cancel_token: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = interval(sweep_interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = cancel_token.cancelled() => {
                    info!("Connection sweeper shutting down");
                    return;
                }
                _ = timer.tick() => {
                    let expired = hub.sweep_stale(Instant::now(), grace);
                    if !expired.is_empty() {
                        info!(expired = expired.len(), "Swept stale connections");
                    }
                    debug!(
                        connections = hub.connection_count(),
                        rooms = hub.room_count(),
                        "Sweep complete"
                    );
                }
            }
        }
    })
}
