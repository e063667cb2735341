//! Channel transports

pub mod memory;
pub mod websocket;

pub use memory::{MemoryServer, MemoryTransport};
pub use websocket::WebSocketTransport;
