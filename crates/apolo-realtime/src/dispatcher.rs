//! Outbound call-control commands

use crate::hub::SubscriptionHub;
use crate::outbox::Outbox;
use apolo_core::error::AppError;
use apolo_core::models::{CallAction, ClientMessage, CommandParams, CommandRequest, CommandResponse};
use apolo_core::AppResult;
use std::sync::Arc;
use tracing::{info, warn};
use validator::Validate;

/// Validates and sends call-control commands, broadcasts their responses
///
/// `send` only queues the command; the outcome arrives later as a
/// `call-control-response` event.
pub struct CommandDispatcher {
    outbox: Arc<Outbox>,
    hub: Arc<SubscriptionHub>,
}

impl CommandDispatcher {
    pub(crate) fn new(outbox: Arc<Outbox>, hub: Arc<SubscriptionHub>) -> Self {
        Self { outbox, hub }
    }

    /// Queue a call-control command
    ///
    /// # Errors
    ///
    /// * `AppError::Validation` - empty call id, or a transfer without a
    ///   destination; nothing is sent
    /// * `AppError::NotConnected` - the channel is down
    pub fn send(
        &self,
        action: CallAction,
        call_id: &str,
        params: Option<CommandParams>,
    ) -> AppResult<()> {
        let request = CommandRequest {
            action,
            call_id: call_id.to_string(),
            params,
        };

        if let Err(e) = request.validate() {
            let err = AppError::from(e);
            warn!(action = %action, call_id, error = %err, "Rejected invalid command");
            return Err(err);
        }

        self.outbox
            .send(ClientMessage::CallControl(request))
            .inspect_err(|e| warn!(action = %action, call_id, error = %e, "Command not sent"))?;

        info!(action = %action, call_id, "Command sent");
        Ok(())
    }

    pub fn hangup(&self, call_id: &str) -> AppResult<()> {
        self.send(CallAction::Hangup, call_id, None)
    }

    pub fn hold(&self, call_id: &str) -> AppResult<()> {
        self.send(CallAction::Hold, call_id, None)
    }

    pub fn unhold(&self, call_id: &str) -> AppResult<()> {
        self.send(CallAction::Unhold, call_id, None)
    }

    pub fn park(&self, call_id: &str) -> AppResult<()> {
        self.send(CallAction::Park, call_id, None)
    }

    pub fn transfer(&self, call_id: &str, destination: &str) -> AppResult<()> {
        self.send(
            CallAction::Transfer,
            call_id,
            Some(CommandParams::transfer_to(destination)),
        )
    }

    pub fn start_recording(&self, call_id: &str) -> AppResult<()> {
        self.send(CallAction::StartRecording, call_id, None)
    }

    pub fn stop_recording(&self, call_id: &str) -> AppResult<()> {
        self.send(CallAction::StopRecording, call_id, None)
    }

    /// Ask the backend for a full active-calls snapshot
    pub fn request_active_calls(&self) -> AppResult<()> {
        self.outbox.send(ClientMessage::GetActiveCalls)
    }

    /// Ask the backend for a system-status push
    pub fn request_system_status(&self) -> AppResult<()> {
        self.outbox.send(ClientMessage::GetSystemStatus)
    }

    /// Broadcast a command response to `call-control-response` observers
    pub(crate) fn handle_response(&self, response: &CommandResponse) {
        match response.as_error() {
            None => info!(action = %response.action, call_id = %response.call_id, "Command succeeded"),
            Some(err) => warn!(error = %err, "Command failed"),
        }
        self.hub.emit_command_response(response);
    }
}
