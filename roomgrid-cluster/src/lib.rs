//! Cluster coordination for roomgrid
//!
//! - `discovery`: shared server registry, health snapshot and room placement
//! - `sync`: per-server room state and signaling relay

pub mod discovery;
pub mod error;
pub mod sync;

pub use error::{Error, Result};
pub use discovery::{
    MemoryServerRegistry, RedisServerRegistry, RoomPlacement, ServerDiscovery, ServerRegistry,
    ServerReporter,
};
pub use sync::{MessageHandler, RoomHub, SignalingEvent};
