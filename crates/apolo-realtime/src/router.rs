//! Inbound message demultiplexing

use crate::dispatcher::CommandDispatcher;
use crate::hub::SubscriptionHub;
use crate::reconciler::EventReconciler;
use apolo_core::models::ServerMessage;
use std::sync::Arc;
use tracing::{debug, warn};

/// Routes each decoded server message to its consumer
pub(crate) struct InboundRouter {
    pub reconciler: Arc<EventReconciler>,
    pub dispatcher: Arc<CommandDispatcher>,
    pub hub: Arc<SubscriptionHub>,
}

impl InboundRouter {
    pub fn route(&self, message: ServerMessage) {
        debug!(kind = message.kind(), "Inbound message");
        match message {
            ServerMessage::CallEvent(event) => {
                self.hub.emit_call_event(&event);
                self.reconciler.apply_event(&event);
            }
            ServerMessage::ActiveCalls(calls) => self.reconciler.replace_all(calls),
            ServerMessage::SystemStatus(status) => {
                self.hub.emit_system_status(&status);
            }
            ServerMessage::CallControlResponse(response) => {
                self.reconciler.apply_command_response(&response);
                self.dispatcher.handle_response(&response);
            }
            ServerMessage::Error(notice) => {
                warn!(code = %notice.code, message = %notice.message, "Backend reported an error");
                self.hub.emit_error(&notice);
            }
        }
    }
}
