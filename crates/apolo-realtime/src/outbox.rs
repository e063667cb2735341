//! Outbound queue handle shared by the dispatcher and the channel task

use apolo_core::error::AppError;
use apolo_core::models::ClientMessage;
use apolo_core::AppResult;
use parking_lot::Mutex;
use tokio::sync::mpsc::{self, error::TrySendError};

/// Sender side of the current session's outbound queue
///
/// Empty while the channel is down, so sends fail fast with
/// `AppError::NotConnected` instead of queueing for a later session.
#[derive(Default)]
pub(crate) struct Outbox {
    sender: Mutex<Option<mpsc::Sender<ClientMessage>>>,
}

impl Outbox {
    pub fn install(&self, sender: mpsc::Sender<ClientMessage>) {
        *self.sender.lock() = Some(sender);
    }

    pub fn clear(&self) {
        self.sender.lock().take();
    }

    pub fn is_open(&self) -> bool {
        self.sender.lock().as_ref().is_some_and(|tx| !tx.is_closed())
    }

    /// Queue without waiting
    pub fn send(&self, message: ClientMessage) -> AppResult<()> {
        let sender = self.sender.lock();
        let Some(tx) = sender.as_ref() else {
            return Err(AppError::NotConnected);
        };
        tx.try_send(message).map_err(|e| match e {
            TrySendError::Full(_) => AppError::Transport("outbound queue is full".to_string()),
            TrySendError::Closed(_) => AppError::NotConnected,
        })
    }
}
