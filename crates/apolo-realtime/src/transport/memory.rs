//! In-process transport
//!
//! Each successful `open` hands the test (or demo) a [`MemoryServer`] that
//! plays the backend side of the link.

use apolo_core::error::AppError;
use apolo_core::models::{CallEvent, ClientMessage, Credential, ServerMessage};
use apolo_core::traits::{ChannelLink, Transport};
use async_trait::async_trait;
use futures::channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::time::Duration;
use tokio::time::timeout;

#[derive(Default)]
struct Script {
    refuse: u32,
    stall: bool,
    opened: u32,
    credentials: Vec<Credential>,
}

/// Transport whose backend lives in the same process
pub struct MemoryTransport {
    script: Mutex<Script>,
    accepted_tx: UnboundedSender<MemoryServer>,
    accepted_rx: tokio::sync::Mutex<UnboundedReceiver<MemoryServer>>,
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTransport {
    pub fn new() -> Self {
        let (accepted_tx, accepted_rx) = unbounded();
        Self {
            script: Mutex::new(Script::default()),
            accepted_tx,
            accepted_rx: tokio::sync::Mutex::new(accepted_rx),
        }
    }

    /// Fail the next `count` handshakes
    pub fn refuse_next(&self, count: u32) {
        self.script.lock().refuse = count;
    }

    /// Make handshakes hang until the caller's timeout fires
    pub fn stall_handshakes(&self, stall: bool) {
        self.script.lock().stall = stall;
    }

    /// Handshake attempts so far, refused ones included
    pub fn open_count(&self) -> u32 {
        self.script.lock().opened
    }

    /// Credentials presented, in order
    pub fn credentials(&self) -> Vec<Credential> {
        self.script.lock().credentials.clone()
    }

    /// Wait for the next accepted link
    pub async fn accept(&self, within: Duration) -> Option<MemoryServer> {
        let mut accepted = self.accepted_rx.lock().await;
        timeout(within, accepted.next()).await.ok().flatten()
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    fn name(&self) -> &str {
        "memory"
    }

    async fn open(&self, credential: &Credential) -> Result<ChannelLink, AppError> {
        let (refuse, stall, link_no) = {
            let mut script = self.script.lock();
            script.opened += 1;
            script.credentials.push(credential.clone());
            let refuse = script.refuse > 0;
            if refuse {
                script.refuse -= 1;
            }
            (refuse, script.stall, script.opened)
        };

        if refuse {
            return Err(AppError::Handshake("refused by memory server".to_string()));
        }
        if stall {
            futures::future::pending::<()>().await;
        }

        let (to_client, inbound) = unbounded::<Result<ServerMessage, AppError>>();
        let (outbound, from_client) = unbounded::<ClientMessage>();
        let peer = format!("memory#{}", link_no);

        self.accepted_tx
            .unbounded_send(MemoryServer {
                peer: peer.clone(),
                credential: credential.clone(),
                to_client,
                from_client,
            })
            .map_err(|e| AppError::Transport(e.to_string()))?;

        let outbound = outbound.sink_map_err(|e| AppError::Transport(e.to_string()));
        Ok(ChannelLink::new(peer, inbound.boxed(), Box::pin(outbound)))
    }
}

/// Backend end of one in-memory link
///
/// Dropping it closes the link as a server close would.
pub struct MemoryServer {
    peer: String,
    credential: Credential,
    to_client: UnboundedSender<Result<ServerMessage, AppError>>,
    from_client: UnboundedReceiver<ClientMessage>,
}

impl MemoryServer {
    pub fn peer(&self) -> &str {
        &self.peer
    }

    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    /// Push a message to the client; false once the client is gone
    pub fn push(&self, message: ServerMessage) -> bool {
        self.to_client.unbounded_send(Ok(message)).is_ok()
    }

    pub fn push_event(&self, event: CallEvent) -> bool {
        self.push(ServerMessage::CallEvent(event))
    }

    /// Break the link with a transport error
    pub fn fail(&self, error: AppError) -> bool {
        self.to_client.unbounded_send(Err(error)).is_ok()
    }

    /// Next message the client sent, if one arrives in time
    pub async fn recv(&mut self, within: Duration) -> Option<ClientMessage> {
        timeout(within, self.from_client.next()).await.ok().flatten()
    }

    /// Read until a message matching `pred` arrives
    pub async fn recv_matching(
        &mut self,
        within: Duration,
        pred: impl Fn(&ClientMessage) -> bool,
    ) -> Option<ClientMessage> {
        let deadline = tokio::time::Instant::now() + within;
        loop {
            let left = deadline.saturating_duration_since(tokio::time::Instant::now());
            let message = self.recv(left).await?;
            if pred(&message) {
                return Some(message);
            }
        }
    }

    pub fn close(self) {}
}
