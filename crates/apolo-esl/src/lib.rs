//! FreeSWITCH Event Socket Layer (ESL) transport for the live-call engine
//!
//! Lets the engine talk to FreeSWITCH directly instead of through the
//! backend's WebSocket relay.
//!
//! # Architecture
//!
//! ```text
//! FreeSWITCH ESL Server
//!         |
//!         v
//!  Framed<TcpStream, EslCodec>
//!         |
//!         v
//!    EslEvent (Parser)
//!         |
//!         v
//!  mapping (ESL <-> channel protocol)
//!         |
//!         v
//!  EslTransport -> ChannelLink
//! ```
//!
//! # Example Usage
//!
//! ```rust,ignore
//! use apolo_core::config::EslConfig;
//! use apolo_esl::EslTransport;
//! use apolo_realtime::CallEngine;
//! use std::sync::Arc;
//!
//! let transport = Arc::new(EslTransport::new(EslConfig::default()));
//! let engine = CallEngine::new(transport, &config.channel);
//! ```

pub mod codec;
pub mod event;
pub mod mapping;
pub mod transport;

pub use codec::EslCodec;
pub use event::EslEvent;
pub use transport::EslTransport;

/// ESL protocol constants
pub mod constants {
    /// Default ESL password (FreeSWITCH default)
    pub const DEFAULT_PASSWORD: &str = "ClueCon";

    /// Command/Reply content type
    pub const CONTENT_TYPE_REPLY: &str = "command/reply";

    /// API response content type
    pub const CONTENT_TYPE_API: &str = "api/response";

    /// Event plain content type
    pub const CONTENT_TYPE_EVENT: &str = "text/event-plain";

    /// Authentication request content type
    pub const CONTENT_TYPE_AUTH: &str = "auth/request";

    /// Sent by FreeSWITCH right before it drops the socket
    pub const CONTENT_TYPE_DISCONNECT: &str = "text/disconnect-notice";
}

/// ESL events we subscribe to
pub mod events {
    /// Channel created (call initiated)
    pub const CHANNEL_CREATE: &str = "CHANNEL_CREATE";

    /// Channel answered (call connected)
    pub const CHANNEL_ANSWER: &str = "CHANNEL_ANSWER";

    /// Channel bridge (two channels connected)
    pub const CHANNEL_BRIDGE: &str = "CHANNEL_BRIDGE";

    /// Channel unbridge (channels disconnected)
    pub const CHANNEL_UNBRIDGE: &str = "CHANNEL_UNBRIDGE";

    /// Channel hangup complete (call ended)
    pub const CHANNEL_HANGUP_COMPLETE: &str = "CHANNEL_HANGUP_COMPLETE";

    /// Heartbeat event
    pub const HEARTBEAT: &str = "HEARTBEAT";

    /// Everything the transport maps onto the channel protocol
    pub const SUBSCRIBED: &[&str] = &[
        CHANNEL_CREATE,
        CHANNEL_ANSWER,
        CHANNEL_BRIDGE,
        CHANNEL_UNBRIDGE,
        CHANNEL_HANGUP_COMPLETE,
        HEARTBEAT,
    ];
}
