//! In-process registry for single-node mode and tests

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use roomgrid_core::models::{RoomId, ServerId, ServerMetrics};

use super::server_registry::{RawServerEntry, ServerRegistry};
use crate::error::{Error, Result};

/// Registry kept in process memory.
///
/// Clones share the same storage. [`MemoryServerRegistry::set_unreachable`]
/// makes every call fail with a transport error, which is how tests model
/// a registry outage.
#[derive(Debug, Clone, Default)]
pub struct MemoryServerRegistry {
    servers: Arc<Mutex<HashMap<ServerId, HashMap<String, String>>>>,
    rooms: Arc<Mutex<HashMap<RoomId, ServerId>>>,
    unreachable: Arc<AtomicBool>,
}

impl MemoryServerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Toggle simulated unreachability
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    /// Store raw hash fields for a server, bypassing encoding
    pub fn insert_raw(&self, server_id: ServerId, fields: HashMap<String, String>) {
        self.servers.lock().insert(server_id, fields);
    }

    fn check_reachable(&self) -> Result<()> {
        if self.unreachable.load(Ordering::SeqCst) {
            Err(Error::Transport("registry unreachable".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ServerRegistry for MemoryServerRegistry {
    async fn list_servers(&self) -> Result<Vec<RawServerEntry>> {
        self.check_reachable()?;
        Ok(self
            .servers
            .lock()
            .iter()
            .map(|(id, fields)| (id.clone(), fields.clone()))
            .collect())
    }

    async fn report_server(&self, server_id: &ServerId, metrics: &ServerMetrics) -> Result<()> {
        self.check_reachable()?;
        let mut servers = self.servers.lock();
        let entry = servers.entry(server_id.clone()).or_default();
        for (field, value) in metrics.to_fields() {
            entry.insert(field.to_string(), value);
        }
        Ok(())
    }

    async fn remove_server(&self, server_id: &ServerId) -> Result<()> {
        self.check_reachable()?;
        self.servers.lock().remove(server_id);
        Ok(())
    }

    async fn room_assignment(&self, room_id: &RoomId) -> Result<Option<ServerId>> {
        self.check_reachable()?;
        Ok(self.rooms.lock().get(room_id).cloned())
    }

    async fn assign_room(&self, room_id: &RoomId, server_id: &ServerId) -> Result<()> {
        self.check_reachable()?;
        self.rooms.lock().insert(room_id.clone(), server_id.clone());
        Ok(())
    }
}
