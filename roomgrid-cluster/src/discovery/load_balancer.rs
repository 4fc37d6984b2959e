//! Room-to-server placement
//!
//! A room keeps its sticky assignment for as long as the assigned server
//! stays healthy (affinity over balance). Rooms without a usable assignment
//! are hashed into the current healthy set.
//!
//! The hashing is plain modulo over the live, id-sorted healthy list, not a
//! hash ring: a membership change moves most unpinned rooms. Sticky
//! assignments shield rooms that are already placed.

use std::sync::Arc;

use roomgrid_core::models::{RoomId, ServerRecord};

use super::health_monitor::ServerDiscovery;
use super::server_registry::ServerRegistry;
use crate::error::{Error, Result};

/// Outcome of a placement request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    pub server: ServerRecord,
    /// The room's existing sticky assignment was reused
    pub sticky: bool,
}

/// Assigns rooms to healthy signaling servers
pub struct RoomPlacement {
    registry: Arc<dyn ServerRegistry>,
    discovery: Arc<ServerDiscovery>,
}

impl RoomPlacement {
    #[must_use]
    pub fn new(registry: Arc<dyn ServerRegistry>, discovery: Arc<ServerDiscovery>) -> Self {
        Self {
            registry,
            discovery,
        }
    }

    /// Place a room.
    ///
    /// Registry failures while reading or writing the assignment are logged
    /// and the request still succeeds from the local snapshot. When the
    /// assignment could not be read, the hashed answer is not persisted so an
    /// existing assignment is never overwritten blindly.
    pub async fn assign(&self, room_id: &RoomId) -> Result<Placement> {
        let lookup = self.registry.room_assignment(room_id).await;
        let persist = lookup.is_ok();
        match lookup {
            Ok(Some(server_id)) => {
                if let Some(server) = self.discovery.get_server(&server_id).await {
                    tracing::debug!(room_id = %room_id, server_id = %server_id, "Reusing sticky room assignment");
                    return Ok(Placement {
                        server,
                        sticky: true,
                    });
                }
                // Peers already connected to the old server stay there until
                // they drop; new peers land on the replacement.
                tracing::warn!(
                    room_id = %room_id,
                    server_id = %server_id,
                    "Assigned server is no longer healthy, reassigning room"
                );
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(room_id = %room_id, error = %e, "Failed to read room assignment, hashing instead");
            }
        }

        let healthy = self.discovery.healthy_servers().await;
        let server = select_by_hash(room_id, &healthy)
            .cloned()
            .ok_or_else(|| Error::Unavailable("No healthy servers available".to_string()))?;

        if persist {
            if let Err(e) = self.registry.assign_room(room_id, &server.id).await {
                tracing::warn!(room_id = %room_id, server_id = %server.id, error = %e, "Failed to persist room assignment");
            }
        }

        tracing::info!(
            room_id = %room_id,
            server_id = %server.id,
            healthy_servers = healthy.len(),
            "Room assigned"
        );

        Ok(Placement {
            server,
            sticky: false,
        })
    }
}

/// Stable 32-bit hash of a room id: the first four bytes of its MD5 digest,
/// big-endian.
#[must_use]
pub fn room_hash(room_id: &RoomId) -> u32 {
    let digest = md5::compute(room_id.as_str().as_bytes());
    u32::from_be_bytes([digest.0[0], digest.0[1], digest.0[2], digest.0[3]])
}

/// Pick `healthy[hash % len]`. Callers pass the list sorted by server id.
#[must_use]
pub fn select_by_hash<'a>(room_id: &RoomId, healthy: &'a [ServerRecord]) -> Option<&'a ServerRecord> {
    if healthy.is_empty() {
        return None;
    }
    let index = room_hash(room_id) as usize % healthy.len();
    healthy.get(index)
}
