//! Real-time call-event engine
//!
//! Keeps a live registry of active calls in sync with the PBX backend over a
//! single bidirectional channel, and sends call-control commands back over
//! the same channel.
//!
//! - [`ChannelManager`]: connection lifecycle, handshake timeout, backoff
//! - [`EventReconciler`]: folds call events into the active-call registry
//! - [`CommandDispatcher`]: validated call-control commands
//! - [`SubscriptionHub`]: typed observer fan-out
//! - [`CallEngine`]: facade wiring the above together

pub mod backoff;
pub mod channel;
pub mod dispatcher;
pub mod engine;
pub mod hub;
mod outbox;
pub mod reconciler;
mod router;
mod status;
pub mod transport;

pub use backoff::ReconnectPolicy;
pub use channel::ChannelManager;
pub use dispatcher::CommandDispatcher;
pub use engine::CallEngine;
pub use hub::{Callback, EventKind, Listener, SubscriptionHub};
pub use reconciler::{EventReconciler, Transition};
pub use transport::{MemoryServer, MemoryTransport, WebSocketTransport};
