pub mod id;
pub mod peer;
pub mod server;

pub use id::{ConnectionId, RoomId, ServerId, UserId};
pub use peer::{Peer, PeerSummary, DEFAULT_ROLE};
pub use server::{ServerMetrics, ServerRecord};
