//! Engine facade
//!
//! Wires the hub, reconciler, dispatcher and channel manager together and
//! exposes the operations a UI or service layer needs.

use crate::channel::ChannelManager;
use crate::dispatcher::CommandDispatcher;
use crate::hub::{Listener, SubscriptionHub};
use crate::outbox::Outbox;
use crate::reconciler::EventReconciler;
use crate::router::InboundRouter;
use crate::status::StatusCell;
use apolo_auth::{TokenProvider, TokenStatus};
use apolo_core::config::ChannelConfig;
use apolo_core::error::AppError;
use apolo_core::models::{
    ActiveCall, CallAction, CommandParams, ConnectionState, ConnectionStatus, Credential,
};
use apolo_core::traits::Transport;
use apolo_core::AppResult;
use std::sync::Arc;
use tracing::info;

/// Live-call engine
///
/// # Examples
///
/// ```no_run
/// use apolo_core::config::ChannelConfig;
/// use apolo_core::models::Credential;
/// use apolo_realtime::{CallEngine, Listener, WebSocketTransport};
/// use std::sync::Arc;
///
/// # async fn run() -> apolo_core::AppResult<()> {
/// let config = ChannelConfig::default();
/// let engine = CallEngine::new(Arc::new(WebSocketTransport::new(config.url.clone())), &config);
///
/// engine.on(&Listener::active_calls(|calls| println!("{} calls up", calls.len())));
/// engine.connect(Credential::Guest("guest".to_string())).await?;
/// # Ok(())
/// # }
/// ```
pub struct CallEngine {
    hub: Arc<SubscriptionHub>,
    status: Arc<StatusCell>,
    reconciler: Arc<EventReconciler>,
    dispatcher: Arc<CommandDispatcher>,
    channel: ChannelManager,
    tokens: Option<TokenProvider>,
}

impl CallEngine {
    pub fn new(transport: Arc<dyn Transport>, config: &ChannelConfig) -> Self {
        let hub = Arc::new(SubscriptionHub::new());
        let status = Arc::new(StatusCell::new(config.max_reconnect_attempts, hub.clone()));
        let outbox = Arc::new(Outbox::default());
        let reconciler = Arc::new(EventReconciler::new(hub.clone()));
        let dispatcher = Arc::new(CommandDispatcher::new(outbox.clone(), hub.clone()));

        let router = Arc::new(InboundRouter {
            reconciler: reconciler.clone(),
            dispatcher: dispatcher.clone(),
            hub: hub.clone(),
        });
        let channel = ChannelManager::new(transport, config, router, status.clone(), outbox);

        Self {
            hub,
            status,
            reconciler,
            dispatcher,
            channel,
            tokens: None,
        }
    }

    /// Attach the token provider used by [`CallEngine::start`]
    ///
    /// Its token status is mirrored into the connection status.
    pub fn with_token_provider(mut self, provider: TokenProvider) -> Self {
        let status = self.status.clone();
        let provider = provider.with_status_listener(Arc::new(move |token: &TokenStatus| {
            status.merge_token_status(token)
        }));
        self.tokens = Some(provider);
        self
    }

    /// Resolve a credential and connect
    ///
    /// Token failures never block the connect: the provider falls back to
    /// the guest credential and reports the failure in the status.
    pub async fn start(&self, is_authenticated: bool) -> AppResult<Credential> {
        let provider = self
            .tokens
            .as_ref()
            .ok_or_else(|| AppError::Config("no token provider configured".to_string()))?;

        let credential = provider.resolve_credential(is_authenticated).await;
        info!(guest = credential.is_guest(), "Credential resolved");
        self.channel.connect(credential.clone()).await?;
        Ok(credential)
    }

    pub async fn connect(&self, credential: Credential) -> AppResult<()> {
        self.channel.connect(credential).await
    }

    pub async fn disconnect(&self) {
        self.channel.disconnect().await
    }

    /// Queue a call-control command; see [`CommandDispatcher::send`]
    pub fn send(
        &self,
        action: CallAction,
        call_id: &str,
        params: Option<CommandParams>,
    ) -> AppResult<()> {
        self.dispatcher.send(action, call_id, params)
    }

    pub fn commands(&self) -> &CommandDispatcher {
        &self.dispatcher
    }

    pub fn request_active_calls(&self) -> AppResult<()> {
        self.dispatcher.request_active_calls()
    }

    pub fn request_system_status(&self) -> AppResult<()> {
        self.dispatcher.request_system_status()
    }

    pub fn on(&self, listener: &Listener) -> bool {
        self.hub.on(listener)
    }

    pub fn off(&self, listener: &Listener) -> bool {
        self.hub.off(listener)
    }

    pub fn hub(&self) -> &Arc<SubscriptionHub> {
        &self.hub
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.channel.connection_state()
    }

    pub fn connection_status(&self) -> ConnectionStatus {
        self.status.get()
    }

    pub fn is_connected(&self) -> bool {
        self.channel.is_connected()
    }

    /// Registry snapshot, newest call first
    pub fn active_calls(&self) -> Vec<ActiveCall> {
        self.reconciler.snapshot()
    }

    pub fn active_call(&self, call_id: &str) -> Option<ActiveCall> {
        self.reconciler.get(call_id)
    }
}
