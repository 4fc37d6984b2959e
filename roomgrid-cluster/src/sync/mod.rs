//! Signaling state of one server: rooms, peers and message relay

pub mod events;
pub mod message_handler;
pub mod room_hub;
pub mod sweeper;

pub use events::{ClientMessage, RelayKind, SignalingEvent};
pub use message_handler::MessageHandler;
pub use room_hub::{EventReceiver, RelayOutcome, RoomHub, RoomSnapshot};
pub use sweeper::spawn_sweeper;
