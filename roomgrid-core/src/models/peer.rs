use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::id::{ConnectionId, UserId};

/// Role assumed when a join request does not name one
pub const DEFAULT_ROLE: &str = "audience";

/// One connected participant of a room
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Peer {
    pub connection_id: ConnectionId,
    pub user_id: UserId,
    pub role: String,
    pub joined_at: DateTime<Utc>,
}

impl Peer {
    #[must_use]
    pub fn new(connection_id: ConnectionId, user_id: UserId, role: Option<String>) -> Self {
        Self {
            connection_id,
            user_id,
            role: role
                .filter(|r| !r.is_empty())
                .unwrap_or_else(|| DEFAULT_ROLE.to_string()),
            joined_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn summary(&self) -> PeerSummary {
        PeerSummary {
            client_id: self.connection_id.clone(),
            user_id: self.user_id.clone(),
            role: self.role.clone(),
        }
    }
}

/// Client-facing view of a peer (`existingClients` entries, `/stats`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerSummary {
    pub client_id: ConnectionId,
    pub user_id: UserId,
    pub role: String,
}
