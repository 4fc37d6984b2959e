//! Signaling wire protocol
//!
//! Every frame is a JSON object `{type, data}` in both directions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use roomgrid_core::models::{ConnectionId, PeerSummary, RoomId, UserId};

use crate::error::{Error, Result};

/// Fields accepted as the target of a directed relay, in priority order
const TARGET_FIELDS: [&str; 3] = ["targetClientId", "to", "peerId"];

/// Negotiation message kinds relayed between peers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayKind {
    Offer,
    Answer,
    IceCandidate,
}

impl RelayKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Offer => "offer",
            Self::Answer => "answer",
            Self::IceCandidate => "ice-candidate",
        }
    }
}

/// Parsed client request
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    JoinRoom {
        room_id: RoomId,
        user_id: UserId,
        role: Option<String>,
    },
    LeaveRoom,
    /// Offer, answer or ICE candidate. `target` selects directed delivery;
    /// without it the message fans out to the whole room.
    Relay {
        kind: RelayKind,
        target: Option<ConnectionId>,
        payload: Map<String, Value>,
    },
    Ping,
}

#[derive(Debug, Deserialize)]
struct ClientEnvelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Value,
}

impl ClientMessage {
    /// Parse one text frame.
    ///
    /// Fails with a validation error for malformed JSON, unknown types and
    /// missing required fields.
    pub fn parse(text: &str) -> Result<Self> {
        let envelope: ClientEnvelope = serde_json::from_str(text)
            .map_err(|_| Error::Validation("Invalid JSON message".to_string()))?;

        match envelope.kind.as_str() {
            "join-room" => {
                let room_id = non_empty_str(&envelope.data, "roomId");
                let user_id = non_empty_str(&envelope.data, "userId");
                let (Some(room_id), Some(user_id)) = (room_id, user_id) else {
                    return Err(Error::Validation("Missing roomId or userId".to_string()));
                };
                Ok(Self::JoinRoom {
                    room_id: RoomId::from(room_id),
                    user_id: UserId::from(user_id),
                    role: non_empty_str(&envelope.data, "role").map(str::to_string),
                })
            }
            "leave-room" => Ok(Self::LeaveRoom),
            "ping" => Ok(Self::Ping),
            "offer" => Self::relay(RelayKind::Offer, envelope.data),
            "answer" => Self::relay(RelayKind::Answer, envelope.data),
            "ice-candidate" => Self::relay(RelayKind::IceCandidate, envelope.data),
            other => Err(Error::Validation(format!("Unknown message type: {other}"))),
        }
    }

    fn relay(kind: RelayKind, data: Value) -> Result<Self> {
        let payload = match data {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            _ => {
                return Err(Error::Validation(format!(
                    "{} data must be an object",
                    kind.as_str()
                )))
            }
        };

        let target = TARGET_FIELDS
            .iter()
            .find_map(|field| payload.get(*field).and_then(Value::as_str))
            .filter(|t| !t.is_empty())
            .map(ConnectionId::from);

        Ok(Self::Relay {
            kind,
            target,
            payload,
        })
    }
}

fn non_empty_str<'a>(data: &'a Value, field: &str) -> Option<&'a str> {
    data.get(field).and_then(Value::as_str).filter(|s| !s.is_empty())
}

/// Server-originated event
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(
    tag = "type",
    content = "data",
    rename_all = "kebab-case",
    rename_all_fields = "camelCase"
)]
pub enum SignalingEvent {
    Connected {
        client_id: ConnectionId,
        timestamp: DateTime<Utc>,
    },
    RoomJoined {
        room_id: RoomId,
        client_id: ConnectionId,
        existing_clients: Vec<PeerSummary>,
    },
    PeerJoined {
        client_id: ConnectionId,
        user_id: UserId,
        role: String,
    },
    PeerLeft {
        client_id: ConnectionId,
        user_id: UserId,
    },
    Offer(Map<String, Value>),
    Answer(Map<String, Value>),
    IceCandidate(Map<String, Value>),
    Pong {
        timestamp: DateTime<Utc>,
    },
    Error {
        message: String,
    },
}

impl SignalingEvent {
    /// Wrap an opaque payload with sender metadata.
    ///
    /// The payload's own fields pass through untouched except `from`,
    /// `fromUserId` and `fromRole`, which the server always sets.
    #[must_use]
    pub fn relay(
        kind: RelayKind,
        mut payload: Map<String, Value>,
        from: &ConnectionId,
        from_user_id: &UserId,
        from_role: &str,
    ) -> Self {
        payload.insert("from".to_string(), Value::String(from.to_string()));
        payload.insert("fromUserId".to_string(), Value::String(from_user_id.to_string()));
        payload.insert("fromRole".to_string(), Value::String(from_role.to_string()));

        match kind {
            RelayKind::Offer => Self::Offer(payload),
            RelayKind::Answer => Self::Answer(payload),
            RelayKind::IceCandidate => Self::IceCandidate(payload),
        }
    }

    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    #[must_use]
    pub const fn event_type(&self) -> &'static str {
        match self {
            Self::Connected { .. } => "connected",
            Self::RoomJoined { .. } => "room-joined",
            Self::PeerJoined { .. } => "peer-joined",
            Self::PeerLeft { .. } => "peer-left",
            Self::Offer(_) => "offer",
            Self::Answer(_) => "answer",
            Self::IceCandidate(_) => "ice-candidate",
            Self::Pong { .. } => "pong",
            Self::Error { .. } => "error",
        }
    }

    /// Encode as a JSON text frame
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_join_room() {
        let msg = ClientMessage::parse(
            r#"{"type":"join-room","data":{"roomId":"r1","userId":"u1","role":"moderator"}}"#,
        )
        .unwrap();
        assert_eq!(
            msg,
            ClientMessage::JoinRoom {
                room_id: RoomId::from("r1"),
                user_id: UserId::from("u1"),
                role: Some("moderator".to_string()),
            }
        );
    }

    #[test]
    fn test_join_room_requires_room_and_user() {
        for text in [
            r#"{"type":"join-room","data":{"roomId":"r1"}}"#,
            r#"{"type":"join-room","data":{"userId":"u1"}}"#,
            r#"{"type":"join-room","data":{"roomId":"","userId":"u1"}}"#,
            r#"{"type":"join-room"}"#,
        ] {
            let err = ClientMessage::parse(text).unwrap_err();
            assert!(matches!(err, Error::Validation(_)), "{text}");
        }
    }

    #[test]
    fn test_invalid_json_and_unknown_type() {
        let err = ClientMessage::parse("{not json").unwrap_err();
        assert_eq!(err.to_string(), "Validation error: Invalid JSON message");

        let err = ClientMessage::parse(r#"{"type":"dance"}"#).unwrap_err();
        assert!(err.to_string().contains("Unknown message type: dance"));
    }

    #[test]
    fn test_relay_target_aliases() {
        for field in ["targetClientId", "to", "peerId"] {
            let text = json!({"type": "offer", "data": {field: "client_b", "sdp": "v=0"}}).to_string();
            let ClientMessage::Relay { kind, target, payload } = ClientMessage::parse(&text).unwrap() else {
                panic!("expected relay");
            };
            assert_eq!(kind, RelayKind::Offer);
            assert_eq!(target, Some(ConnectionId::from("client_b")));
            assert_eq!(payload.get("sdp"), Some(&json!("v=0")));
        }
    }

    #[test]
    fn test_relay_without_target_is_fanout() {
        let msg = ClientMessage::parse(r#"{"type":"ice-candidate","data":{"candidate":{"sdpMid":"0"}}}"#)
            .unwrap();
        assert!(matches!(
            msg,
            ClientMessage::Relay { kind: RelayKind::IceCandidate, target: None, .. }
        ));
    }

    #[test]
    fn test_relay_rejects_non_object_data() {
        assert!(ClientMessage::parse(r#"{"type":"answer","data":"sdp"}"#).is_err());
    }

    #[test]
    fn test_event_envelope_shape() {
        let event = SignalingEvent::PeerJoined {
            client_id: ConnectionId::from("c2"),
            user_id: UserId::from("u2"),
            role: "audience".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({"type": "peer-joined", "data": {"clientId": "c2", "userId": "u2", "role": "audience"}})
        );

        let event = SignalingEvent::error("boom");
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({"type": "error", "data": {"message": "boom"}})
        );
    }

    #[test]
    fn test_relay_event_keeps_payload_and_overrides_sender_fields() {
        let payload = json!({"sdp": {"type": "offer", "sdp": "v=0"}, "from": "spoofed"});
        let Value::Object(payload) = payload else { unreachable!() };

        let event = SignalingEvent::relay(
            RelayKind::Offer,
            payload,
            &ConnectionId::from("c1"),
            &UserId::from("u1"),
            "moderator",
        );

        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({
                "type": "offer",
                "data": {
                    "sdp": {"type": "offer", "sdp": "v=0"},
                    "from": "c1",
                    "fromUserId": "u1",
                    "fromRole": "moderator"
                }
            })
        );
    }
}
