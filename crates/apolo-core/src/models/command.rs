//! Call-control commands and their responses
//!
//! The backend carries no request id, so a response can only be matched
//! to a command by `(action, call_id)`.

use crate::error::AppError;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use validator::{Validate, ValidationError};

/// Call-control action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CallAction {
    Hangup,
    Hold,
    Unhold,
    Park,
    /// Requires `params.destination`
    Transfer,
    StartRecording,
    StopRecording,
}

impl fmt::Display for CallAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl CallAction {
    pub const ALL: [CallAction; 7] = [
        CallAction::Hangup,
        CallAction::Hold,
        CallAction::Unhold,
        CallAction::Park,
        CallAction::Transfer,
        CallAction::StartRecording,
        CallAction::StopRecording,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CallAction::Hangup => "hangup",
            CallAction::Hold => "hold",
            CallAction::Unhold => "unhold",
            CallAction::Park => "park",
            CallAction::Transfer => "transfer",
            CallAction::StartRecording => "start-recording",
            CallAction::StopRecording => "stop-recording",
        }
    }

    /// Parse from string
    pub fn from_str(s: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|action| action.as_str().eq_ignore_ascii_case(s.trim()))
    }

    pub fn requires_destination(&self) -> bool {
        matches!(self, CallAction::Transfer)
    }
}

/// Optional command parameters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommandParams {
    /// Transfer target
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,

    /// Backend-specific extras passed through untouched
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl CommandParams {
    pub fn transfer_to(destination: impl Into<String>) -> Self {
        Self {
            destination: Some(destination.into()),
            extra: serde_json::Map::new(),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    /// Destination with surrounding whitespace removed, if any is left
    pub fn destination(&self) -> Option<&str> {
        self.destination
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
    }
}

/// Outbound call-control command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_command_params"))]
pub struct CommandRequest {
    pub action: CallAction,

    #[validate(length(min = 1, message = "call_id is required"))]
    pub call_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<CommandParams>,
}

/// Whether `value` can travel as a single command-line argument
fn is_single_token(value: &str) -> bool {
    !value.is_empty() && !value.chars().any(|c| c.is_whitespace() || c.is_control())
}

fn invalid(code: &'static str, message: &'static str) -> ValidationError {
    let mut err = ValidationError::new(code);
    err.message = Some(Cow::Borrowed(message));
    err
}

fn validate_command_params(request: &CommandRequest) -> Result<(), ValidationError> {
    if request.call_id.trim().is_empty() {
        return Err(invalid("call_id_required", "call_id is required"));
    }
    if !is_single_token(&request.call_id) {
        return Err(invalid(
            "call_id_malformed",
            "call_id must not contain whitespace or control characters",
        ));
    }

    match request.destination() {
        None if request.action.requires_destination() => Err(invalid(
            "destination_required",
            "transfer requires a non-empty destination",
        )),
        Some(destination) if !is_single_token(destination) => Err(invalid(
            "destination_malformed",
            "destination must not contain whitespace or control characters",
        )),
        _ => Ok(()),
    }
}

impl CommandRequest {
    pub fn new(action: CallAction, call_id: impl Into<String>) -> Self {
        Self {
            action,
            call_id: call_id.into(),
            params: None,
        }
    }

    pub fn with_params(mut self, params: CommandParams) -> Self {
        self.params = Some(params);
        self
    }

    pub fn destination(&self) -> Option<&str> {
        self.params.as_ref().and_then(|p| p.destination())
    }
}

/// Backend answer to a call-control command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandResponse {
    pub success: bool,

    pub action: CallAction,

    #[serde(alias = "call_uuid")]
    pub call_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CommandResponse {
    pub fn ok(action: CallAction, call_id: impl Into<String>) -> Self {
        Self {
            success: true,
            action,
            call_id: call_id.into(),
            error: None,
        }
    }

    pub fn failed(action: CallAction, call_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            action,
            call_id: call_id.into(),
            error: Some(error.into()),
        }
    }

    /// The backend-reported failure, `None` for a successful command
    pub fn as_error(&self) -> Option<AppError> {
        if self.success {
            return None;
        }
        Some(AppError::CommandFailed {
            action: self.action.to_string(),
            call_id: self.call_id.clone(),
            message: self.error.clone().unwrap_or_else(|| "unknown".to_string()),
        })
    }

    /// Best-effort correlation: same call and same action
    pub fn matches(&self, call_id: &str, action: CallAction) -> bool {
        self.call_id == call_id && self.action == action
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_wire_names() {
        assert_eq!(
            serde_json::to_string(&CallAction::StartRecording).unwrap(),
            "\"start-recording\""
        );
        assert_eq!(CallAction::from_str("stop-recording"), Some(CallAction::StopRecording));
        assert_eq!(CallAction::from_str("HOLD"), Some(CallAction::Hold));
        assert_eq!(CallAction::from_str("mute"), None);
    }

    #[test]
    fn test_transfer_without_destination_is_invalid() {
        let req = CommandRequest::new(CallAction::Transfer, "A");
        assert!(req.validate().is_err());

        let req = CommandRequest::new(CallAction::Transfer, "A").with_params(CommandParams::default());
        assert!(req.validate().is_err());

        let req = CommandRequest::new(CallAction::Transfer, "A")
            .with_params(CommandParams::transfer_to("   "));
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_transfer_with_destination_is_valid() {
        let req = CommandRequest::new(CallAction::Transfer, "A")
            .with_params(CommandParams::transfer_to("1002"));
        assert!(req.validate().is_ok());
        assert_eq!(req.destination(), Some("1002"));
    }

    #[test]
    fn test_other_actions_need_no_params() {
        for action in CallAction::ALL.iter().filter(|a| !a.requires_destination()) {
            assert!(CommandRequest::new(*action, "A").validate().is_ok());
        }
    }

    #[test]
    fn test_empty_call_id_is_invalid() {
        assert!(CommandRequest::new(CallAction::Hangup, "").validate().is_err());
        assert!(CommandRequest::new(CallAction::Hangup, "   ").validate().is_err());
    }

    #[test]
    fn test_arguments_must_be_single_tokens() {
        assert!(CommandRequest::new(CallAction::Hangup, "A B").validate().is_err());
        assert!(CommandRequest::new(CallAction::Hangup, "A\nContent-Type: x").validate().is_err());

        let transfer = |dest: &str| {
            CommandRequest::new(CallAction::Transfer, "A")
                .with_params(CommandParams::transfer_to(dest))
                .validate()
        };
        assert!(transfer("1002 XML evil").is_err());
        assert!(transfer("1002\napi status").is_err());
        assert!(transfer("1002\t").is_ok());
        assert!(transfer(" 1002 ").is_ok());
    }

    #[test]
    fn test_request_serialization_skips_empty_params() {
        let json = serde_json::to_value(CommandRequest::new(CallAction::Hold, "A")).unwrap();
        assert_eq!(json, serde_json::json!({"action": "hold", "call_id": "A"}));

        let json = serde_json::to_value(
            CommandRequest::new(CallAction::Transfer, "A")
                .with_params(CommandParams::transfer_to("1002").with("context", "default".into())),
        )
        .unwrap();
        assert_eq!(json["params"]["destination"], "1002");
        assert_eq!(json["params"]["context"], "default");
    }

    #[test]
    fn test_response_matching() {
        let resp = CommandResponse::failed(CallAction::Hold, "A", "no such channel");
        assert!(resp.matches("A", CallAction::Hold));
        assert!(!resp.matches("A", CallAction::Unhold));
        assert!(!resp.matches("B", CallAction::Hold));
        assert!(!resp.success);
    }

    #[test]
    fn test_failed_response_as_error() {
        assert_eq!(CommandResponse::ok(CallAction::Hangup, "A").as_error(), None);

        let err = CommandResponse::failed(CallAction::Hold, "A", "no such channel")
            .as_error()
            .unwrap();
        assert_eq!(err.error_code(), "command_failed");
        assert_eq!(err.to_string(), "Command hold failed for call A: no such channel");
    }
}
