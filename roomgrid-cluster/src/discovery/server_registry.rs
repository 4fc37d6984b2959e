//! Shared server registry
//!
//! The registry is an external key-value store this crate reads and writes
//! but does not own. Layout:
//!
//! - `server:{id}` → hash `{timestamp, peers, rooms, producers, consumers, url}`
//! - `room:{roomId}` → hash `{serverId}`
//!
//! Staleness is judged by comparing `timestamp` with the local clock, never
//! by native key expiry.

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::timeout;

use roomgrid_core::models::server::fields;
use roomgrid_core::models::{RoomId, ServerId, ServerMetrics};

use crate::error::{Error, Result};

/// Raw `server:{id}` entry as listed from the registry
pub type RawServerEntry = (ServerId, HashMap<String, String>);

/// Registry abstraction so placement and discovery run without Redis in tests
#[async_trait]
pub trait ServerRegistry: Send + Sync {
    /// List every `server:*` entry with its hash fields
    async fn list_servers(&self) -> Result<Vec<RawServerEntry>>;

    /// Write this server's telemetry
    async fn report_server(&self, server_id: &ServerId, metrics: &ServerMetrics) -> Result<()>;

    /// Delete a server entry (graceful shutdown)
    async fn remove_server(&self, server_id: &ServerId) -> Result<()>;

    /// Read the sticky assignment of a room
    async fn room_assignment(&self, room_id: &RoomId) -> Result<Option<ServerId>>;

    /// Persist the sticky assignment of a room
    async fn assign_room(&self, room_id: &RoomId, server_id: &ServerId) -> Result<()>;
}

pub(crate) const SERVER_KEY_PREFIX: &str = "server:";
pub(crate) const ROOM_KEY_PREFIX: &str = "room:";

/// Redis-backed registry
pub struct RedisServerRegistry {
    client: redis::Client,
    key_prefix: String,
    op_timeout: Duration,
}

impl RedisServerRegistry {
    /// Create a registry client. No connection is made until first use.
    pub fn new(redis_url: &str, key_prefix: impl Into<String>, op_timeout: Duration) -> Result<Self> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| Error::Configuration(format!("Invalid Redis URL: {e}")))?;

        Ok(Self {
            client,
            key_prefix: key_prefix.into(),
            op_timeout,
        })
    }

    fn server_key(&self, server_id: &ServerId) -> String {
        format!("{}{SERVER_KEY_PREFIX}{server_id}", self.key_prefix)
    }

    fn room_key(&self, room_id: &RoomId) -> String {
        format!("{}{ROOM_KEY_PREFIX}{room_id}", self.key_prefix)
    }

    fn server_id_from_key(&self, key: &str) -> Option<ServerId> {
        key.strip_prefix(self.key_prefix.as_str())?
            .strip_prefix(SERVER_KEY_PREFIX)
            .filter(|id| !id.is_empty())
            .map(ServerId::from)
    }

    async fn connection(&self) -> Result<MultiplexedConnection> {
        timeout(self.op_timeout, self.client.get_multiplexed_async_connection())
            .await
            .map_err(|_| Error::Timeout("Redis connection timed out".to_string()))?
            .map_err(|e| Error::Transport(format!("Redis connection failed: {e}")))
    }

    async fn query<T: redis::FromRedisValue>(
        &self,
        conn: &mut MultiplexedConnection,
        cmd: &redis::Cmd,
        op: &str,
    ) -> Result<T> {
        timeout(self.op_timeout, cmd.query_async(conn))
            .await
            .map_err(|_| Error::Timeout(format!("Redis {op} timed out")))?
            .map_err(|e| Error::Transport(format!("Redis {op} failed: {e}")))
    }
}

#[async_trait]
impl ServerRegistry for RedisServerRegistry {
    async fn list_servers(&self) -> Result<Vec<RawServerEntry>> {
        let mut conn = self.connection().await?;

        // SCAN rather than KEYS so a large keyspace does not block Redis
        let pattern = format!("{}{SERVER_KEY_PREFIX}*", self.key_prefix);
        let mut keys = Vec::new();
        let mut cursor: u64 = 0;
        loop {
            let mut cmd = redis::cmd("SCAN");
            cmd.arg(cursor).arg("MATCH").arg(&pattern).arg("COUNT").arg(100);
            let (next, batch): (u64, Vec<String>) = self.query(&mut conn, &cmd, "SCAN").await?;
            keys.extend(batch);
            cursor = next;
            if cursor == 0 {
                break;
            }
        }

        let mut servers = Vec::with_capacity(keys.len());
        for key in keys {
            let Some(server_id) = self.server_id_from_key(&key) else {
                continue;
            };

            let mut cmd = redis::cmd("HGETALL");
            cmd.arg(&key);
            match self.query::<HashMap<String, String>>(&mut conn, &cmd, "HGETALL").await {
                Ok(hash) if !hash.is_empty() => servers.push((server_id, hash)),
                Ok(_) => {}
                Err(Error::Transport(msg)) if msg.contains("WRONGTYPE") => {
                    tracing::warn!(key = %key, "Skipping non-hash server entry");
                }
                Err(e) => return Err(e),
            }
        }

        Ok(servers)
    }

    async fn report_server(&self, server_id: &ServerId, metrics: &ServerMetrics) -> Result<()> {
        let mut conn = self.connection().await?;

        let mut cmd = redis::cmd("HSET");
        cmd.arg(self.server_key(server_id));
        for (field, value) in metrics.to_fields() {
            cmd.arg(field).arg(value);
        }
        self.query::<()>(&mut conn, &cmd, "HSET").await
    }

    async fn remove_server(&self, server_id: &ServerId) -> Result<()> {
        let mut conn = self.connection().await?;

        let mut cmd = redis::cmd("DEL");
        cmd.arg(self.server_key(server_id));
        self.query::<()>(&mut conn, &cmd, "DEL").await
    }

    async fn room_assignment(&self, room_id: &RoomId) -> Result<Option<ServerId>> {
        let mut conn = self.connection().await?;

        let mut cmd = redis::cmd("HGET");
        cmd.arg(self.room_key(room_id)).arg(fields::ROOM_SERVER_ID);
        let server_id: Option<String> = self.query(&mut conn, &cmd, "HGET").await?;
        Ok(server_id.filter(|id| !id.is_empty()).map(ServerId::from))
    }

    async fn assign_room(&self, room_id: &RoomId, server_id: &ServerId) -> Result<()> {
        let mut conn = self.connection().await?;

        let mut cmd = redis::cmd("HSET");
        cmd.arg(self.room_key(room_id))
            .arg(fields::ROOM_SERVER_ID)
            .arg(server_id.as_str());
        self.query::<()>(&mut conn, &cmd, "HSET").await
    }
}
