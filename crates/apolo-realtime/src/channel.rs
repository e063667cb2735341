//! Channel lifecycle
//!
//! `ChannelManager` owns the single live link to the backend. One background
//! task per session pumps inbound frames into the router, drains the
//! outbound queue into the link, and runs the reconnect loop when the link
//! drops.
//!
//! ```text
//! Disconnected --connect--> Connecting --ok--> Connected
//!      ^                        |                  |
//!      |                      error         close / error
//!      |                        v                  v
//!      +-----(exhausted)--- backoff <---- (auto_reconnect)
//! ```

use crate::backoff::ReconnectPolicy;
use crate::outbox::Outbox;
use crate::router::InboundRouter;
use crate::status::StatusCell;
use apolo_core::config::ChannelConfig;
use apolo_core::error::AppError;
use apolo_core::models::{ClientMessage, ConnectionState, Credential, ErrorNotice};
use apolo_core::traits::{ChannelLink, Transport};
use apolo_core::AppResult;
use futures::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

struct Session {
    id: Uuid,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

enum SessionEnd {
    Cancelled,
    Closed,
    Failed(AppError),
}

type OpenLink = (ChannelLink, mpsc::Receiver<ClientMessage>);

/// Manages the connection to the call-event backend
pub struct ChannelManager {
    transport: Arc<dyn Transport>,
    handshake_timeout: Duration,
    policy: ReconnectPolicy,
    outbound_buffer: usize,
    router: Arc<InboundRouter>,
    status: Arc<StatusCell>,
    outbox: Arc<Outbox>,
    auto_reconnect: Arc<AtomicBool>,
    pending_cancel: parking_lot::Mutex<Option<CancellationToken>>,
    session: tokio::sync::Mutex<Option<Session>>,
}

impl ChannelManager {
    pub(crate) fn new(
        transport: Arc<dyn Transport>,
        config: &ChannelConfig,
        router: Arc<InboundRouter>,
        status: Arc<StatusCell>,
        outbox: Arc<Outbox>,
    ) -> Self {
        Self {
            transport,
            handshake_timeout: config.handshake_timeout(),
            policy: ReconnectPolicy::from_config(config),
            outbound_buffer: config.outbound_buffer,
            router,
            status,
            outbox,
            auto_reconnect: Arc::new(AtomicBool::new(false)),
            pending_cancel: parking_lot::Mutex::new(None),
            session: tokio::sync::Mutex::new(None),
        }
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.status.state()
    }

    pub fn is_connected(&self) -> bool {
        self.outbox.is_open()
    }

    /// Open the channel with `credential`
    ///
    /// Any existing session is torn down first. On handshake failure the
    /// error is returned and, with auto-reconnect on, the backoff loop keeps
    /// trying in the background with the same credential.
    ///
    /// # Errors
    ///
    /// * `AppError::HandshakeTimeout` - no answer within the handshake timeout
    /// * `AppError::Handshake` / `AppError::Transport` - the backend refused
    ///   or the link could not be opened
    pub async fn connect(&self, credential: Credential) -> AppResult<()> {
        let cancel = CancellationToken::new();
        if let Some(previous) = self.pending_cancel.lock().replace(cancel.clone()) {
            previous.cancel();
        }

        let mut session = self.session.lock().await;
        if let Some(previous) = session.take() {
            info!(session_id = %previous.id, "Tearing down previous channel");
            stop(previous).await;
            self.outbox.clear();
        }
        if cancel.is_cancelled() {
            return Err(AppError::Handshake("superseded before the handshake started".to_string()));
        }

        self.auto_reconnect.store(true, Ordering::SeqCst);
        let worker = Worker {
            session_id: Uuid::new_v4(),
            transport: self.transport.clone(),
            credential,
            handshake_timeout: self.handshake_timeout,
            policy: self.policy,
            outbound_buffer: self.outbound_buffer,
            router: self.router.clone(),
            status: self.status.clone(),
            outbox: self.outbox.clone(),
            auto_reconnect: self.auto_reconnect.clone(),
            cancel,
        };

        let max_attempts = self.policy.max_attempts;
        self.status.update(|s| {
            s.connected = false;
            s.state = ConnectionState::Connecting;
            s.reconnect_attempts = 0;
            s.max_reconnect_attempts = max_attempts;
            s.clear_error();
            s.reason = None;
        });
        info!(
            session_id = %worker.session_id,
            transport = self.transport.name(),
            guest = worker.credential.is_guest(),
            "Opening channel"
        );

        let handshake = tokio::select! {
            _ = worker.cancel.cancelled() => {
                Err(AppError::Handshake("cancelled by disconnect".to_string()))
            }
            result = worker.handshake() => result,
        };

        let (first, outcome) = match handshake {
            Ok(link) => {
                let rx = worker.on_connected(&link);
                (Some((link, rx)), Ok(()))
            }
            Err(e) => {
                error!(session_id = %worker.session_id, error = %e, "Channel handshake failed");
                worker.status.update(|s| {
                    s.connected = false;
                    s.state = ConnectionState::Disconnected;
                    s.set_error(&e);
                    s.reason = Some("handshake failed".to_string());
                });
                if worker.cancel.is_cancelled() {
                    return Err(e);
                }
                (None, Err(e))
            }
        };

        let id = worker.session_id;
        let cancel = worker.cancel.clone();
        let task = tokio::spawn(worker.run(first));
        *session = Some(Session { id, cancel, task });
        outcome
    }

    /// Close the channel and stop reconnecting
    ///
    /// Cancels a pending reconnect or handshake and waits for the session
    /// task to finish. The call registry is left as it was.
    pub async fn disconnect(&self) {
        self.auto_reconnect.store(false, Ordering::SeqCst);
        if let Some(pending) = self.pending_cancel.lock().take() {
            pending.cancel();
        }

        let mut session = self.session.lock().await;
        if let Some(previous) = session.take() {
            self.status.update(|s| s.state = ConnectionState::Disconnecting);
            let id = previous.id;
            stop(previous).await;
            info!(session_id = %id, "Channel disconnected");
        }
        self.outbox.clear();
        self.status.update(|s| {
            s.connected = false;
            s.state = ConnectionState::Disconnected;
            s.reason = Some("client disconnect".to_string());
        });
    }
}

impl Drop for ChannelManager {
    fn drop(&mut self) {
        self.auto_reconnect.store(false, Ordering::SeqCst);
        if let Some(pending) = self.pending_cancel.lock().take() {
            pending.cancel();
        }
    }
}

async fn stop(session: Session) {
    session.cancel.cancel();
    if let Err(e) = session.task.await {
        if e.is_panic() {
            error!(session_id = %session.id, "Channel task panicked");
        }
    }
}

/// State owned by one session's background task
struct Worker {
    session_id: Uuid,
    transport: Arc<dyn Transport>,
    credential: Credential,
    handshake_timeout: Duration,
    policy: ReconnectPolicy,
    outbound_buffer: usize,
    router: Arc<InboundRouter>,
    status: Arc<StatusCell>,
    outbox: Arc<Outbox>,
    auto_reconnect: Arc<AtomicBool>,
    cancel: CancellationToken,
}

impl Worker {
    async fn handshake(&self) -> AppResult<ChannelLink> {
        match timeout(self.handshake_timeout, self.transport.open(&self.credential)).await {
            Ok(result) => result,
            Err(_) => Err(AppError::HandshakeTimeout(self.handshake_timeout)),
        }
    }

    fn on_connected(&self, link: &ChannelLink) -> mpsc::Receiver<ClientMessage> {
        // Room for the two resync requests
        let (tx, rx) = mpsc::channel(self.outbound_buffer.max(2));
        self.outbox.install(tx);
        self.status.update(|s| {
            s.connected = true;
            s.state = ConnectionState::Connected;
            s.reconnect_attempts = 0;
            s.clear_error();
            s.reason = None;
        });
        info!(session_id = %self.session_id, peer = %link.peer, "Channel connected");

        for request in [ClientMessage::GetActiveCalls, ClientMessage::GetSystemStatus] {
            if let Err(e) = self.outbox.send(request) {
                warn!(session_id = %self.session_id, error = %e, "Resync request not queued");
            }
        }
        rx
    }

    async fn run(self, first: Option<OpenLink>) {
        let mut next = first;
        loop {
            if let Some((link, rx)) = next.take() {
                let end = self.pump(link, rx).await;
                self.outbox.clear();
                match end {
                    SessionEnd::Cancelled => return,
                    SessionEnd::Closed => {
                        info!(session_id = %self.session_id, "Channel closed by server");
                        self.status.update(|s| {
                            s.connected = false;
                            s.state = ConnectionState::Disconnected;
                            s.reason = Some("closed by server".to_string());
                        });
                    }
                    SessionEnd::Failed(e) => {
                        warn!(session_id = %self.session_id, error = %e, "Channel lost");
                        self.status.update(|s| {
                            s.connected = false;
                            s.state = ConnectionState::Disconnected;
                            s.reason = Some("connection lost".to_string());
                            s.set_error(&e);
                        });
                    }
                }
            }

            if self.cancel.is_cancelled() || !self.auto_reconnect.load(Ordering::SeqCst) {
                return;
            }
            match self.reconnect().await {
                Some(open) => next = Some(open),
                None => return,
            }
        }
    }

    async fn pump(&self, link: ChannelLink, mut rx: mpsc::Receiver<ClientMessage>) -> SessionEnd {
        let ChannelLink {
            mut inbound,
            mut outbound,
            ..
        } = link;

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    match timeout(CLOSE_TIMEOUT, outbound.close()).await {
                        Ok(Err(e)) => debug!(error = %e, "Error while closing link"),
                        Err(_) => debug!("Link close timed out"),
                        Ok(Ok(())) => {}
                    }
                    return SessionEnd::Cancelled;
                }
                frame = inbound.next() => match frame {
                    Some(Ok(message)) => self.router.route(message),
                    Some(Err(e)) => return SessionEnd::Failed(e),
                    None => return SessionEnd::Closed,
                },
                Some(message) = rx.recv() => {
                    debug!(kind = message.kind(), "Outbound message");
                    if let Err(e) = outbound.send(message).await {
                        return SessionEnd::Failed(e);
                    }
                }
            }
        }
    }

    async fn reconnect(&self) -> Option<OpenLink> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let Some(delay) = self.policy.delay_for(attempt) else {
                let err = AppError::ReconnectExhausted {
                    attempts: attempt - 1,
                };
                error!(session_id = %self.session_id, attempts = attempt - 1, "Reconnection abandoned");
                self.status.update(|s| {
                    s.connected = false;
                    s.state = ConnectionState::Disconnected;
                    s.set_error(&err);
                });
                self.router.hub.emit_error(&ErrorNotice::from(&err));
                return None;
            };

            self.status.update(|s| {
                s.state = ConnectionState::Connecting;
                s.reconnect_attempts = attempt;
            });
            warn!(
                session_id = %self.session_id,
                attempt,
                max_attempts = self.policy.max_attempts,
                delay_ms = delay.as_millis() as u64,
                "Scheduling reconnect"
            );

            tokio::select! {
                _ = self.cancel.cancelled() => return None,
                _ = sleep(delay) => {}
            }
            if !self.auto_reconnect.load(Ordering::SeqCst) {
                return None;
            }

            let result = tokio::select! {
                _ = self.cancel.cancelled() => return None,
                result = self.handshake() => result,
            };
            match result {
                Ok(link) => {
                    let rx = self.on_connected(&link);
                    return Some((link, rx));
                }
                Err(e) => {
                    warn!(session_id = %self.session_id, attempt, error = %e, "Reconnect attempt failed");
                    self.status.update(|s| s.set_error(&e));
                }
            }
        }
    }
}
