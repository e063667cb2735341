//! Active-call registry
//!
//! Folds the raw call-event stream into the set of calls currently up.
//!
//! ```text
//! state \ event   CREATE   ANSWER    BRIDGE    UNBRIDGE   HANGUP
//! (absent)        insert   -         -         -          -
//! ringing         -        answered  bridged   -          remove
//! answered        -        -         bridged   -          remove
//! bridged         -        -         -         answered   remove
//! hold            -        -         -         -          remove
//! ```
//!
//! Hold, unhold and recording changes come from successful
//! call-control responses, not from the event stream.

use crate::hub::SubscriptionHub;
use apolo_core::models::{
    ActiveCall, CallAction, CallEvent, CallEventType, CallStatus, CommandResponse,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Result of applying one event to the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Inserted,
    Updated { from: CallStatus, to: CallStatus },
    Removed,
    Ignored,
}

impl Transition {
    pub fn is_mutation(&self) -> bool {
        !matches!(self, Transition::Ignored)
    }
}

/// Apply `event` to `registry` following the transition table
fn transition(registry: &mut HashMap<String, ActiveCall>, event: &CallEvent) -> Transition {
    let Some(call) = registry.get_mut(&event.call_id) else {
        if event.event_type == CallEventType::Create {
            registry.insert(event.call_id.clone(), ActiveCall::from_create(event));
            return Transition::Inserted;
        }
        return Transition::Ignored;
    };

    let from = call.status;
    let to = match (from, event.event_type) {
        (_, CallEventType::Hangup) => {
            registry.remove(&event.call_id);
            return Transition::Removed;
        }
        (CallStatus::Ringing, CallEventType::Answer) => {
            call.answer_time = Some(event.timestamp);
            CallStatus::Answered
        }
        (CallStatus::Ringing | CallStatus::Answered, CallEventType::Bridge) => {
            // A bridge without a prior ANSWER still means the call is up
            call.answer_time.get_or_insert(event.timestamp);
            CallStatus::Bridged
        }
        (CallStatus::Bridged, CallEventType::Unbridge) => CallStatus::Answered,
        _ => return Transition::Ignored,
    };

    call.status = to;
    Transition::Updated { from, to }
}

fn sorted(registry: &HashMap<String, ActiveCall>) -> Vec<ActiveCall> {
    let mut calls: Vec<ActiveCall> = registry.values().cloned().collect();
    // Newest first, like the live-calls view
    calls.sort_by(|a, b| {
        b.start_time
            .cmp(&a.start_time)
            .then_with(|| a.call_id.cmp(&b.call_id))
    });
    calls
}

/// Owns the call registry and publishes `active-calls` after every mutation
pub struct EventReconciler {
    registry: Mutex<HashMap<String, ActiveCall>>,
    hub: Arc<SubscriptionHub>,
}

impl EventReconciler {
    pub fn new(hub: Arc<SubscriptionHub>) -> Self {
        Self {
            registry: Mutex::new(HashMap::new()),
            hub,
        }
    }

    /// Apply one lifecycle event
    ///
    /// Events that do not match the table are ignored without error and
    /// do not publish a snapshot.
    pub fn apply_event(&self, event: &CallEvent) -> Transition {
        let (outcome, snapshot) = {
            let mut registry = self.registry.lock();
            let outcome = transition(&mut registry, event);
            let snapshot = outcome.is_mutation().then(|| sorted(&registry));
            (outcome, snapshot)
        };

        match outcome {
            Transition::Ignored => {
                debug!(
                    call_id = %event.call_id,
                    event_type = %event.event_type,
                    "Ignoring event with no transition"
                );
            }
            Transition::Inserted => {
                info!(call_id = %event.call_id, caller = %event.caller_number, callee = %event.callee_number, "Call created");
            }
            Transition::Updated { from, to } => {
                debug!(call_id = %event.call_id, %from, %to, "Call status changed");
            }
            Transition::Removed => {
                info!(call_id = %event.call_id, "Call ended");
            }
        }

        if let Some(calls) = snapshot {
            self.hub.emit_active_calls(&calls);
        }
        outcome
    }

    /// Apply the registry side effect of a call-control response
    ///
    /// Only successful hold, unhold and recording commands touch the
    /// registry. Returns whether a snapshot was published.
    pub fn apply_command_response(&self, response: &CommandResponse) -> bool {
        if !response.success {
            return false;
        }

        let snapshot = {
            let mut registry = self.registry.lock();
            let Some(call) = registry.get_mut(&response.call_id) else {
                return false;
            };

            let changed = match response.action {
                CallAction::Hold if call.status != CallStatus::Hold => {
                    call.resume_status = Some(call.status);
                    call.status = CallStatus::Hold;
                    true
                }
                CallAction::Unhold if call.status == CallStatus::Hold => {
                    call.status = call.resume_status.take().unwrap_or(CallStatus::Answered);
                    true
                }
                CallAction::StartRecording if !call.recording => {
                    call.recording = true;
                    true
                }
                CallAction::StopRecording if call.recording => {
                    call.recording = false;
                    true
                }
                _ => false,
            };

            if !changed {
                return false;
            }
            debug!(call_id = %response.call_id, action = %response.action, status = %call.status, "Call updated by command");
            sorted(&registry)
        };

        self.hub.emit_active_calls(&snapshot);
        true
    }

    /// Replace the whole registry with a server snapshot
    ///
    /// Duplicate ids collapse with the last entry winning. Always publishes,
    /// so observers resync even when nothing changed.
    pub fn replace_all(&self, calls: Vec<ActiveCall>) {
        let snapshot = {
            let mut registry = self.registry.lock();
            registry.clear();
            for call in calls {
                registry.insert(call.call_id.clone(), call);
            }
            sorted(&registry)
        };
        info!(active_calls = snapshot.len(), "Active calls resynchronized");
        self.hub.emit_active_calls(&snapshot);
    }

    /// Current registry, newest call first
    pub fn snapshot(&self) -> Vec<ActiveCall> {
        sorted(&self.registry.lock())
    }

    pub fn get(&self, call_id: &str) -> Option<ActiveCall> {
        self.registry.lock().get(call_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.registry.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.lock().is_empty()
    }
}
