//! In-memory room registry of one signaling server
//!
//! Holds every connection and room membership behind a single lock so that
//! membership changes and the events they emit are observed in one order by
//! every peer. Outbound events go into bounded per-connection queues; a peer
//! whose queue is full or closed is evicted as if it had disconnected.

use chrono::Utc;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use roomgrid_core::models::{ConnectionId, Peer, PeerSummary, RoomId, UserId};

use super::events::{RelayKind, SignalingEvent};
use crate::error::{Error, Result};

/// Receiving half of a connection's outbound queue
pub type EventReceiver = mpsc::Receiver<SignalingEvent>;

struct Connection {
    sender: mpsc::Sender<SignalingEvent>,
    room_id: Option<RoomId>,
    last_seen: Instant,
}

#[derive(Default)]
struct Room {
    peers: HashMap<ConnectionId, Peer>,
}

/// Result of a directed relay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayOutcome {
    /// Delivered to this many peers
    Delivered(usize),
    /// The named target is not in the sender's room
    TargetAbsent,
}

/// Room membership as reported by `/stats`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSnapshot {
    pub room_id: RoomId,
    pub peers: Vec<PeerSummary>,
}

#[derive(Default)]
struct HubState {
    rooms: HashMap<RoomId, Room>,
    connections: HashMap<ConnectionId, Connection>,
}

impl HubState {
    /// Queue an event for one connection. Full or closed queues are recorded
    /// in `failed` for eviction once the current operation completes.
    fn send(&self, conn_id: &ConnectionId, event: SignalingEvent, failed: &mut Vec<ConnectionId>) -> bool {
        let Some(conn) = self.connections.get(conn_id) else {
            return false;
        };
        match conn.sender.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(event)) => {
                warn!(
                    connection_id = %conn_id,
                    event_type = event.event_type(),
                    "Outbound queue full, evicting slow peer"
                );
                failed.push(conn_id.clone());
                false
            }
            Err(TrySendError::Closed(_)) => {
                debug!(connection_id = %conn_id, "Outbound queue closed");
                failed.push(conn_id.clone());
                false
            }
        }
    }

    fn fanout(
        &self,
        room_id: &RoomId,
        event: &SignalingEvent,
        exclude: Option<&ConnectionId>,
        failed: &mut Vec<ConnectionId>,
    ) -> usize {
        let Some(room) = self.rooms.get(room_id) else {
            return 0;
        };
        room.peers
            .keys()
            .filter(|id| Some(*id) != exclude)
            .filter(|id| self.send(id, event.clone(), failed))
            .count()
    }

    /// Remove a connection from its room, notify the remaining peers and drop
    /// the room when it empties.
    fn detach(&mut self, conn_id: &ConnectionId, failed: &mut Vec<ConnectionId>) -> Option<(RoomId, Peer)> {
        let room_id = self.connections.get_mut(conn_id)?.room_id.take()?;
        let room = self.rooms.get_mut(&room_id)?;
        let peer = room.peers.remove(conn_id)?;
        let now_empty = room.peers.is_empty();

        if now_empty {
            self.rooms.remove(&room_id);
            info!(room_id = %room_id, "Cleaned up empty room");
        } else {
            let event = SignalingEvent::PeerLeft {
                client_id: conn_id.clone(),
                user_id: peer.user_id.clone(),
            };
            self.fanout(&room_id, &event, None, failed);
        }

        info!(
            room_id = %room_id,
            connection_id = %conn_id,
            user_id = %peer.user_id,
            "Peer left room"
        );
        Some((room_id, peer))
    }

    /// Drop a connection entirely
    fn remove(&mut self, conn_id: &ConnectionId, failed: &mut Vec<ConnectionId>) -> bool {
        self.detach(conn_id, failed);
        self.connections.remove(conn_id).is_some()
    }

    /// Evict failed connections. Notifying their rooms may fail further
    /// queues, so this runs until the worklist drains.
    fn evict(&mut self, mut pending: Vec<ConnectionId>) {
        while let Some(conn_id) = pending.pop() {
            if self.remove(&conn_id, &mut pending) {
                warn!(connection_id = %conn_id, "Evicted unresponsive peer");
            }
        }
    }
}

/// Connection and room registry shared by every socket on this server
#[derive(Clone)]
pub struct RoomHub {
    state: Arc<Mutex<HubState>>,
    queue_capacity: usize,
}

impl RoomHub {
    #[must_use]
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(HubState::default())),
            queue_capacity: queue_capacity.max(1),
        }
    }

    /// Register a new connection.
    ///
    /// The returned queue already holds the `connected` event.
    pub fn connect(&self) -> (ConnectionId, EventReceiver) {
        let conn_id = ConnectionId::generate();
        let (sender, receiver) = mpsc::channel(self.queue_capacity);

        let mut state = self.state.lock();
        state.connections.insert(
            conn_id.clone(),
            Connection {
                sender,
                room_id: None,
                last_seen: Instant::now(),
            },
        );
        let mut failed = Vec::new();
        state.send(
            &conn_id,
            SignalingEvent::Connected {
                client_id: conn_id.clone(),
                timestamp: Utc::now(),
            },
            &mut failed,
        );
        state.evict(failed);

        info!(connection_id = %conn_id, "Connection registered");
        (conn_id, receiver)
    }

    /// Record activity on a connection
    pub fn touch(&self, conn_id: &ConnectionId) {
        if let Some(conn) = self.state.lock().connections.get_mut(conn_id) {
            conn.last_seen = Instant::now();
        }
    }

    /// When anything was last received from a connection
    pub fn last_seen(&self, conn_id: &ConnectionId) -> Option<Instant> {
        self.state.lock().connections.get(conn_id).map(|c| c.last_seen)
    }

    /// Join a room, leaving the current one first if it differs.
    ///
    /// The joiner receives `room-joined` listing the peers already present;
    /// those peers receive `peer-joined`. Returns that list.
    pub fn join(
        &self,
        conn_id: &ConnectionId,
        room_id: RoomId,
        user_id: UserId,
        role: Option<String>,
    ) -> Result<Vec<PeerSummary>> {
        let mut state = self.state.lock();
        let mut failed = Vec::new();

        let current = state
            .connections
            .get(conn_id)
            .ok_or_else(|| Error::NotFound(format!("connection {conn_id}")))?
            .room_id
            .clone();
        if current.as_ref().is_some_and(|r| r != &room_id) {
            state.detach(conn_id, &mut failed);
        }

        let peer = Peer::new(conn_id.clone(), user_id, role);
        let room = state.rooms.entry(room_id.clone()).or_default();
        let mut existing: Vec<PeerSummary> = room
            .peers
            .values()
            .filter(|p| &p.connection_id != conn_id)
            .map(Peer::summary)
            .collect();
        existing.sort_by(|a, b| a.client_id.cmp(&b.client_id));
        room.peers.insert(conn_id.clone(), peer.clone());

        if let Some(conn) = state.connections.get_mut(conn_id) {
            conn.room_id = Some(room_id.clone());
        }

        state.send(
            conn_id,
            SignalingEvent::RoomJoined {
                room_id: room_id.clone(),
                client_id: conn_id.clone(),
                existing_clients: existing.clone(),
            },
            &mut failed,
        );
        let joined = SignalingEvent::PeerJoined {
            client_id: conn_id.clone(),
            user_id: peer.user_id.clone(),
            role: peer.role.clone(),
        };
        state.fanout(&room_id, &joined, Some(conn_id), &mut failed);
        state.evict(failed);

        info!(
            room_id = %room_id,
            connection_id = %conn_id,
            user_id = %peer.user_id,
            role = %peer.role,
            peers = existing.len() + 1,
            "Peer joined room"
        );
        Ok(existing)
    }

    /// Leave the current room. The connection stays registered.
    pub fn leave(&self, conn_id: &ConnectionId) -> Option<RoomId> {
        let mut state = self.state.lock();
        let mut failed = Vec::new();
        let left = state.detach(conn_id, &mut failed).map(|(room_id, _)| room_id);
        state.evict(failed);
        left
    }

    /// Remove a connection, leaving its room first
    pub fn disconnect(&self, conn_id: &ConnectionId) {
        let mut state = self.state.lock();
        let mut failed = Vec::new();
        if state.remove(conn_id, &mut failed) {
            info!(connection_id = %conn_id, "Connection closed");
        }
        state.evict(failed);
    }

    /// Queue an event for every peer of a room except `exclude`
    pub fn broadcast(&self, room_id: &RoomId, event: &SignalingEvent, exclude: Option<&ConnectionId>) -> usize {
        let mut state = self.state.lock();
        let mut failed = Vec::new();
        let delivered = state.fanout(room_id, event, exclude, &mut failed);
        state.evict(failed);
        delivered
    }

    /// Queue an event for one connection
    pub fn send_to(&self, conn_id: &ConnectionId, event: SignalingEvent) -> bool {
        let mut state = self.state.lock();
        let mut failed = Vec::new();
        let sent = state.send(conn_id, event, &mut failed);
        state.evict(failed);
        sent
    }

    /// Relay a negotiation message from `from` within its room.
    ///
    /// With a target the message goes to that peer only, and only if it is in
    /// the same room. Without one it goes to every other peer.
    pub fn relay(
        &self,
        from: &ConnectionId,
        kind: RelayKind,
        target: Option<&ConnectionId>,
        payload: Map<String, Value>,
    ) -> Result<RelayOutcome> {
        let mut state = self.state.lock();

        let room_id = state
            .connections
            .get(from)
            .and_then(|c| c.room_id.clone())
            .ok_or_else(|| Error::Validation("Join a room before signaling".to_string()))?;
        let room = state
            .rooms
            .get(&room_id)
            .ok_or_else(|| Error::NotFound(format!("room {room_id}")))?;
        let sender = room
            .peers
            .get(from)
            .ok_or_else(|| Error::NotFound(format!("peer {from}")))?;

        let event = SignalingEvent::relay(kind, payload, from, &sender.user_id, &sender.role);
        let mut failed = Vec::new();

        let outcome = match target {
            Some(target) if target != from => {
                if room.peers.contains_key(target) {
                    let delivered = state.send(target, event, &mut failed);
                    RelayOutcome::Delivered(usize::from(delivered))
                } else {
                    debug!(
                        room_id = %room_id,
                        from = %from,
                        target = %target,
                        message_type = kind.as_str(),
                        "Relay target not in room, dropping"
                    );
                    RelayOutcome::TargetAbsent
                }
            }
            Some(_) => RelayOutcome::Delivered(0),
            None => RelayOutcome::Delivered(state.fanout(&room_id, &event, Some(from), &mut failed)),
        };

        state.evict(failed);
        Ok(outcome)
    }

    /// Remove connections silent for longer than `grace`
    pub fn sweep_stale(&self, now: Instant, grace: Duration) -> Vec<ConnectionId> {
        let mut state = self.state.lock();
        let mut stale: Vec<ConnectionId> = state
            .connections
            .iter()
            .filter(|(_, c)| now.saturating_duration_since(c.last_seen) > grace)
            .map(|(id, _)| id.clone())
            .collect();
        stale.sort();

        let mut failed = Vec::new();
        for conn_id in &stale {
            state.remove(conn_id, &mut failed);
            info!(connection_id = %conn_id, "Expired stale connection");
        }
        state.evict(failed);
        stale
    }

    /// Room a connection is currently in
    pub fn room_of(&self, conn_id: &ConnectionId) -> Option<RoomId> {
        self.state.lock().connections.get(conn_id)?.room_id.clone()
    }

    /// Peers of a room sorted by connection id
    pub fn room_peers(&self, room_id: &RoomId) -> Vec<PeerSummary> {
        let state = self.state.lock();
        let mut peers: Vec<PeerSummary> = state
            .rooms
            .get(room_id)
            .map(|room| room.peers.values().map(Peer::summary).collect())
            .unwrap_or_default();
        peers.sort_by(|a, b| a.client_id.cmp(&b.client_id));
        peers
    }

    pub fn contains_room(&self, room_id: &RoomId) -> bool {
        self.state.lock().rooms.contains_key(room_id)
    }

    pub fn is_connected(&self, conn_id: &ConnectionId) -> bool {
        self.state.lock().connections.contains_key(conn_id)
    }

    pub fn room_count(&self) -> usize {
        self.state.lock().rooms.len()
    }

    /// Peers that are members of a room
    pub fn peer_count(&self) -> usize {
        self.state.lock().rooms.values().map(|r| r.peers.len()).sum()
    }

    /// Open connections, joined or not
    pub fn connection_count(&self) -> usize {
        self.state.lock().connections.len()
    }

    /// Every room with its peers, sorted by room id
    pub fn snapshot(&self) -> Vec<RoomSnapshot> {
        let state = self.state.lock();
        let mut rooms: Vec<RoomSnapshot> = state
            .rooms
            .iter()
            .map(|(room_id, room)| {
                let mut peers: Vec<PeerSummary> = room.peers.values().map(Peer::summary).collect();
                peers.sort_by(|a, b| a.client_id.cmp(&b.client_id));
                RoomSnapshot {
                    room_id: room_id.clone(),
                    peers,
                }
            })
            .collect();
        rooms.sort_by(|a, b| a.room_id.cmp(&b.room_id));
        rooms
    }
}
