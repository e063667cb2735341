//! Call lifecycle models
//!
//! `CallEvent` is the immutable notification pushed by the PBX backend.
//! `ActiveCall` is the mutable aggregate the reconciler derives from those
//! events, keyed by `call_id`.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Call lifecycle event type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CallEventType {
    /// Channel created, the call is ringing
    Create,
    /// Far end answered
    Answer,
    /// Two legs connected
    Bridge,
    /// Legs disconnected, call still up
    Unbridge,
    /// Call ended
    Hangup,
}

impl fmt::Display for CallEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl CallEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallEventType::Create => "CREATE",
            CallEventType::Answer => "ANSWER",
            CallEventType::Bridge => "BRIDGE",
            CallEventType::Unbridge => "UNBRIDGE",
            CallEventType::Hangup => "HANGUP",
        }
    }

    /// Parse from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "CREATE" => Some(CallEventType::Create),
            "ANSWER" => Some(CallEventType::Answer),
            "BRIDGE" => Some(CallEventType::Bridge),
            "UNBRIDGE" => Some(CallEventType::Unbridge),
            "HANGUP" => Some(CallEventType::Hangup),
            _ => None,
        }
    }
}

/// Call direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CallDirection {
    Inbound,
    #[default]
    Outbound,
}

impl fmt::Display for CallDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallDirection::Inbound => write!(f, "inbound"),
            CallDirection::Outbound => write!(f, "outbound"),
        }
    }
}

impl CallDirection {
    /// Lenient parse used for PBX headers; anything not inbound is outbound
    pub fn from_header(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("inbound") {
            CallDirection::Inbound
        } else {
            CallDirection::Outbound
        }
    }
}

/// Inbound call lifecycle notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallEvent {
    /// Lifecycle step
    pub event_type: CallEventType,

    /// Opaque call identifier
    #[serde(alias = "call_uuid")]
    pub call_id: String,

    /// Caller number
    #[serde(default)]
    pub caller_number: String,

    /// Callee number
    #[serde(default)]
    pub callee_number: String,

    /// Call direction
    #[serde(default)]
    pub direction: CallDirection,

    /// When the backend observed the event
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,

    /// Backend-specific extras
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, serde_json::Value>>,
}

impl CallEvent {
    pub fn new(event_type: CallEventType, call_id: impl Into<String>) -> Self {
        Self {
            event_type,
            call_id: call_id.into(),
            caller_number: String::new(),
            callee_number: String::new(),
            direction: CallDirection::default(),
            timestamp: Utc::now(),
            metadata: None,
        }
    }

    pub fn with_parties(mut self, caller: impl Into<String>, callee: impl Into<String>) -> Self {
        self.caller_number = caller.into();
        self.callee_number = callee.into();
        self
    }

    pub fn with_direction(mut self, direction: CallDirection) -> Self {
        self.direction = direction;
        self
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata
            .get_or_insert_with(HashMap::new)
            .insert(key.into(), value);
        self
    }
}

/// Live call status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CallStatus {
    /// Created, not yet answered
    #[default]
    #[serde(alias = "dialing")]
    Ringing,
    /// Answered
    Answered,
    /// Connected to another leg
    Bridged,
    /// Placed on hold by a call-control command
    #[serde(alias = "held")]
    Hold,
}

impl fmt::Display for CallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallStatus::Ringing => write!(f, "ringing"),
            CallStatus::Answered => write!(f, "answered"),
            CallStatus::Bridged => write!(f, "bridged"),
            CallStatus::Hold => write!(f, "hold"),
        }
    }
}

/// Active call entity
///
/// Exists only while the call is up; a hangup removes it outright.
/// Duration is never stored, it is derived from `start_time` on read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveCall {
    /// Call unique identifier
    #[serde(alias = "call_uuid")]
    pub call_id: String,

    /// Caller number
    #[serde(default)]
    pub caller_number: String,

    /// Callee number
    #[serde(default)]
    pub callee_number: String,

    /// Call direction
    #[serde(default)]
    pub direction: CallDirection,

    /// Current status
    #[serde(default)]
    pub status: CallStatus,

    /// Call start timestamp
    pub start_time: DateTime<Utc>,

    /// Call answer timestamp
    #[serde(default)]
    pub answer_time: Option<DateTime<Utc>>,

    /// Whether a recording is running
    #[serde(default)]
    pub recording: bool,

    /// Status to return to when the hold is released
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resume_status: Option<CallStatus>,
}

impl ActiveCall {
    /// Build the ringing entry for a CREATE event
    pub fn from_create(event: &CallEvent) -> Self {
        Self {
            call_id: event.call_id.clone(),
            caller_number: event.caller_number.clone(),
            callee_number: event.callee_number.clone(),
            direction: event.direction,
            status: CallStatus::Ringing,
            start_time: event.timestamp,
            answer_time: None,
            recording: false,
            resume_status: None,
        }
    }

    /// Elapsed time since the call started
    pub fn duration(&self) -> Duration {
        self.duration_at(Utc::now())
    }

    /// Elapsed time at `now`, clamped at zero for backend clock skew
    pub fn duration_at(&self, now: DateTime<Utc>) -> Duration {
        (now - self.start_time).max(Duration::zero())
    }

    pub fn duration_seconds(&self) -> i64 {
        self.duration().num_seconds()
    }

    pub fn is_answered(&self) -> bool {
        self.answer_time.is_some()
    }

    pub fn is_on_hold(&self) -> bool {
        self.status == CallStatus::Hold
    }
}
