//! Common traits for channel transports
//!
//! The engine treats its link to the PBX backend as an abstract
//! bidirectional message channel: a handshake that yields an inbound stream
//! of `ServerMessage`s and an outbound sink of `ClientMessage`s.

use crate::error::AppError;
use crate::models::{ClientMessage, Credential, ServerMessage};
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::Sink;
use std::pin::Pin;

/// Inbound half of an open link
///
/// Ends (`None`) when the server closes the link; an `Err` item means the
/// link broke and the session is over.
pub type InboundStream = BoxStream<'static, Result<ServerMessage, AppError>>;

/// Outbound half of an open link
pub type OutboundSink = Pin<Box<dyn Sink<ClientMessage, Error = AppError> + Send>>;

/// An established link, returned once the handshake succeeded
pub struct ChannelLink {
    /// Human-readable remote identifier for logs
    pub peer: String,
    pub inbound: InboundStream,
    pub outbound: OutboundSink,
}

impl ChannelLink {
    pub fn new(peer: impl Into<String>, inbound: InboundStream, outbound: OutboundSink) -> Self {
        Self {
            peer: peer.into(),
            inbound,
            outbound,
        }
    }
}

impl std::fmt::Debug for ChannelLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelLink").field("peer", &self.peer).finish()
    }
}

/// Opens links to the call-event backend
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Short name used in logs ("websocket", "esl", ...)
    fn name(&self) -> &str;

    /// Perform the handshake with `credential` attached
    ///
    /// Resolves once the backend accepted the link. Callers bound this with
    /// their own handshake timeout.
    async fn open(&self, credential: &Credential) -> Result<ChannelLink, AppError>;
}
