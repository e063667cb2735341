//! Channel wire protocol
//!
//! Every frame is a JSON envelope `{"type": <kind>, "data": <payload>}`:
//!
//! ```text
//! S→C  call-event              CallEvent
//! S→C  active-calls            [ActiveCall]
//! S→C  system-status           SystemStatus
//! S→C  call-control-response   CommandResponse
//! S→C  error                   ErrorNotice
//! C→S  call-control            CommandRequest
//! C→S  get-active-calls        (no data)
//! C→S  get-system-status       (no data)
//! ```

use crate::error::AppError;
use crate::models::{ActiveCall, CallEvent, CommandRequest, CommandResponse, ErrorNotice, SystemStatus};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

pub mod kinds {
    pub const CALL_EVENT: &str = "call-event";
    pub const ACTIVE_CALLS: &str = "active-calls";
    pub const SYSTEM_STATUS: &str = "system-status";
    pub const CALL_CONTROL_RESPONSE: &str = "call-control-response";
    pub const ERROR: &str = "error";
    pub const CALL_CONTROL: &str = "call-control";
    pub const GET_ACTIVE_CALLS: &str = "get-active-calls";
    pub const GET_SYSTEM_STATUS: &str = "get-system-status";
}

/// Server→client message
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "kebab-case")]
pub enum ServerMessage {
    CallEvent(CallEvent),
    ActiveCalls(Vec<ActiveCall>),
    SystemStatus(SystemStatus),
    CallControlResponse(CommandResponse),
    Error(ErrorNotice),
}

#[derive(Deserialize)]
struct RawEnvelope {
    #[serde(rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    data: serde_json::Value,
}

fn payload<T: DeserializeOwned>(kind: &str, data: serde_json::Value) -> Result<T, AppError> {
    serde_json::from_value(data)
        .map_err(|e| AppError::Serialization(format!("invalid {} payload: {}", kind, e)))
}

impl ServerMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            ServerMessage::CallEvent(_) => kinds::CALL_EVENT,
            ServerMessage::ActiveCalls(_) => kinds::ACTIVE_CALLS,
            ServerMessage::SystemStatus(_) => kinds::SYSTEM_STATUS,
            ServerMessage::CallControlResponse(_) => kinds::CALL_CONTROL_RESPONSE,
            ServerMessage::Error(_) => kinds::ERROR,
        }
    }

    /// Decode a text frame
    ///
    /// Returns `Ok(None)` for well-formed envelopes of a kind this engine
    /// does not handle, so newer backends can add kinds without breaking us.
    pub fn decode(text: &str) -> Result<Option<Self>, AppError> {
        let raw: RawEnvelope = serde_json::from_str(text)?;
        let kind = raw.kind.ok_or_else(|| AppError::MissingField("type".to_string()))?;
        let message = match kind.as_str() {
            kinds::CALL_EVENT => ServerMessage::CallEvent(payload(&kind, raw.data)?),
            kinds::ACTIVE_CALLS => ServerMessage::ActiveCalls(payload(&kind, raw.data)?),
            kinds::SYSTEM_STATUS => ServerMessage::SystemStatus(payload(&kind, raw.data)?),
            kinds::CALL_CONTROL_RESPONSE => {
                ServerMessage::CallControlResponse(payload(&kind, raw.data)?)
            }
            kinds::ERROR => ServerMessage::Error(payload(&kind, raw.data)?),
            _ => return Ok(None),
        };
        Ok(Some(message))
    }

    pub fn encode(&self) -> Result<String, AppError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Client→server message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "kebab-case")]
pub enum ClientMessage {
    CallControl(CommandRequest),
    GetActiveCalls,
    GetSystemStatus,
}

impl ClientMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            ClientMessage::CallControl(_) => kinds::CALL_CONTROL,
            ClientMessage::GetActiveCalls => kinds::GET_ACTIVE_CALLS,
            ClientMessage::GetSystemStatus => kinds::GET_SYSTEM_STATUS,
        }
    }

    pub fn encode(&self) -> Result<String, AppError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn decode(text: &str) -> Result<Self, AppError> {
        Ok(serde_json::from_str(text)?)
    }
}
