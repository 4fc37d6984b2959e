//! Server registry, health tracking and room placement

pub mod health_monitor;
pub mod load_balancer;
pub mod memory_registry;
pub mod reporter;
pub mod server_registry;

pub use health_monitor::{RefreshReport, ServerDiscovery};
pub use load_balancer::{room_hash, select_by_hash, Placement, RoomPlacement};
pub use memory_registry::MemoryServerRegistry;
pub use reporter::ServerReporter;
pub use server_registry::{RawServerEntry, RedisServerRegistry, ServerRegistry};
