//! Shared connection status

use crate::hub::SubscriptionHub;
use apolo_auth::TokenStatus;
use apolo_core::models::{ConnectionState, ConnectionStatus};
use parking_lot::Mutex;
use std::sync::Arc;

/// Single source of truth for `ConnectionStatus`
///
/// Every update is published on the `connection-status` topic after the
/// lock is released, so observers may read the status back.
pub(crate) struct StatusCell {
    status: Mutex<ConnectionStatus>,
    hub: Arc<SubscriptionHub>,
}

impl StatusCell {
    pub fn new(max_reconnect_attempts: u32, hub: Arc<SubscriptionHub>) -> Self {
        Self {
            status: Mutex::new(ConnectionStatus::new(max_reconnect_attempts)),
            hub,
        }
    }

    pub fn get(&self) -> ConnectionStatus {
        self.status.lock().clone()
    }

    pub fn state(&self) -> ConnectionState {
        self.status.lock().state
    }

    /// Mutate and publish
    pub fn update(&self, f: impl FnOnce(&mut ConnectionStatus)) -> ConnectionStatus {
        let snapshot = {
            let mut status = self.status.lock();
            f(&mut status);
            status.clone()
        };
        self.hub.emit_connection_status(&snapshot);
        snapshot
    }

    pub fn merge_token_status(&self, token: &TokenStatus) {
        self.update(|s| {
            s.token_error = token.token_error.clone();
            s.is_retrying_token = token.is_retrying_token;
            s.guest_mode = token.guest_mode;
        });
    }
}
