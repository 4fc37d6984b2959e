//! Server health telemetry as stored in the shared registry

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use super::id::ServerId;

/// Hash field names of a `server:{id}` entry
pub mod fields {
    pub const TIMESTAMP: &str = "timestamp";
    pub const PEERS: &str = "peers";
    pub const ROOMS: &str = "rooms";
    pub const PRODUCERS: &str = "producers";
    pub const CONSUMERS: &str = "consumers";
    pub const URL: &str = "url";

    /// Field of a `room:{roomId}` entry holding the assigned server
    pub const ROOM_SERVER_ID: &str = "serverId";
}

/// Load telemetry a signaling server reports about itself
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerMetrics {
    /// Report time in milliseconds since the Unix epoch
    pub timestamp: i64,
    pub peers: u64,
    pub rooms: u64,
    pub producers: u64,
    pub consumers: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl ServerMetrics {
    /// Metrics stamped with the current time
    #[must_use]
    pub fn now(peers: u64, rooms: u64) -> Self {
        Self {
            timestamp: Utc::now().timestamp_millis(),
            peers,
            rooms,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Encode as registry hash fields
    #[must_use]
    pub fn to_fields(&self) -> Vec<(&'static str, String)> {
        let mut out = vec![
            (fields::TIMESTAMP, self.timestamp.to_string()),
            (fields::PEERS, self.peers.to_string()),
            (fields::ROOMS, self.rooms.to_string()),
            (fields::PRODUCERS, self.producers.to_string()),
            (fields::CONSUMERS, self.consumers.to_string()),
        ];
        if let Some(url) = &self.url {
            out.push((fields::URL, url.clone()));
        }
        out
    }

    /// Decode registry hash fields.
    ///
    /// Returns `None` when the timestamp is missing or unparseable; such an
    /// entry cannot be aged and is ignored by discovery. Counters that are
    /// missing or malformed read as zero.
    #[must_use]
    pub fn from_fields(map: &HashMap<String, String>) -> Option<Self> {
        let timestamp = map.get(fields::TIMESTAMP)?.trim().parse::<i64>().ok()?;
        let counter = |name: &str| {
            map.get(name)
                .and_then(|v| v.trim().parse::<u64>().ok())
                .unwrap_or(0)
        };

        Some(Self {
            timestamp,
            peers: counter(fields::PEERS),
            rooms: counter(fields::ROOMS),
            producers: counter(fields::PRODUCERS),
            consumers: counter(fields::CONSUMERS),
            url: map.get(fields::URL).filter(|u| !u.is_empty()).cloned(),
        })
    }

    /// Report time as a UTC instant
    #[must_use]
    pub fn reported_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.timestamp)
    }

    /// `peers + rooms * room_weight`
    #[must_use]
    pub const fn load_score(&self, room_weight: u64) -> u64 {
        self.peers
            .saturating_add(self.rooms.saturating_mul(room_weight))
    }
}

/// A server as seen by discovery
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerRecord {
    pub id: ServerId,
    pub last_seen: DateTime<Utc>,
    pub metrics: ServerMetrics,
    pub healthy: bool,
}

impl ServerRecord {
    /// Build a record from decoded metrics; `None` if the timestamp is out of range
    #[must_use]
    pub fn from_metrics(id: ServerId, metrics: ServerMetrics) -> Option<Self> {
        let last_seen = metrics.reported_at()?;
        Some(Self {
            id,
            last_seen,
            metrics,
            healthy: true,
        })
    }

    /// Age of the last report relative to `now`
    #[must_use]
    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now.signed_duration_since(self.last_seen)
    }

    /// Whether the last report is older than `timeout`
    #[must_use]
    pub fn is_stale(&self, now: DateTime<Utc>, timeout: Duration) -> bool {
        let timeout = chrono::Duration::from_std(timeout).unwrap_or(chrono::Duration::MAX);
        self.age(now) > timeout
    }
}
