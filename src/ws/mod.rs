//! Real-time push layer: connection registry, liveness monitor, broadcast
//! router, and the WebSocket endpoint that feeds them.

pub mod actor;
pub mod broadcast;
pub mod events;
pub mod handler;
pub mod liveness;
pub mod protocol;
pub mod registry;

pub use registry::{CancelSignal, ConnectionId, ConnectionRegistry, ConnectionSender, Scope};
