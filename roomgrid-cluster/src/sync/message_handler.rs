//! Per-message dispatch for signaling connections

use chrono::Utc;
use tracing::{debug, warn};

use roomgrid_core::models::ConnectionId;

use super::events::{ClientMessage, SignalingEvent};
use super::room_hub::RoomHub;
use crate::error::Result;

/// Routes parsed client messages into the room hub.
///
/// Failures are reported to the sender as an `error` event and never close
/// the connection.
#[derive(Clone)]
pub struct MessageHandler {
    hub: RoomHub,
}

impl MessageHandler {
    #[must_use]
    pub const fn new(hub: RoomHub) -> Self {
        Self { hub }
    }

    #[must_use]
    pub const fn hub(&self) -> &RoomHub {
        &self.hub
    }

    /// Handle one inbound text frame
    pub fn handle_text(&self, conn_id: &ConnectionId, text: &str) {
        self.hub.touch(conn_id);

        let result = ClientMessage::parse(text).and_then(|msg| self.handle(conn_id, msg));
        if let Err(e) = result {
            warn!(connection_id = %conn_id, error = %e, "Rejected signaling message");
            let message = match e {
                crate::Error::Validation(msg) => msg,
                other => other.to_string(),
            };
            self.hub.send_to(conn_id, SignalingEvent::error(message));
        }
    }

    /// Apply one parsed message
    pub fn handle(&self, conn_id: &ConnectionId, message: ClientMessage) -> Result<()> {
        match message {
            ClientMessage::JoinRoom {
                room_id,
                user_id,
                role,
            } => {
                self.hub.join(conn_id, room_id, user_id, role)?;
            }
            ClientMessage::LeaveRoom => {
                if self.hub.leave(conn_id).is_none() {
                    debug!(connection_id = %conn_id, "Leave requested outside a room");
                }
            }
            ClientMessage::Relay {
                kind,
                target,
                payload,
            } => {
                let outcome = self.hub.relay(conn_id, kind, target.as_ref(), payload)?;
                debug!(
                    connection_id = %conn_id,
                    message_type = kind.as_str(),
                    outcome = ?outcome,
                    "Relayed signaling message"
                );
            }
            ClientMessage::Ping => {
                self.hub.send_to(
                    conn_id,
                    SignalingEvent::Pong {
                        timestamp: Utc::now(),
                    },
                );
            }
        }
        Ok(())
    }
}
