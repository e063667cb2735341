//! Connection and backend health status

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Channel lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
            ConnectionState::Disconnecting => write!(f, "disconnecting"),
        }
    }
}

/// Process-wide channel health as shown to observers
///
/// A UI renders "reconnecting", "guest mode" or "disconnected" from these
/// fields alone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ConnectionStatus {
    pub connected: bool,

    pub state: ConnectionState,

    pub reconnect_attempts: u32,

    pub max_reconnect_attempts: u32,

    /// Last connection error, cleared on successful connect
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Stable code of `error`, see `AppError::error_code`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,

    /// Why the channel last went down
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Advisory token failure; the channel runs in guest mode meanwhile
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_error: Option<String>,

    pub is_retrying_token: bool,

    pub guest_mode: bool,
}

impl ConnectionStatus {
    pub fn new(max_reconnect_attempts: u32) -> Self {
        Self {
            max_reconnect_attempts,
            ..Self::default()
        }
    }

    /// Reconnect loop still has attempts left
    pub fn is_reconnecting(&self) -> bool {
        !self.connected
            && self.state == ConnectionState::Connecting
            && self.reconnect_attempts > 0
    }

    pub fn set_error(&mut self, err: &crate::AppError) {
        self.error = Some(err.to_string());
        self.error_code = Some(err.error_code().to_string());
    }

    pub fn clear_error(&mut self) {
        self.error = None;
        self.error_code = None;
    }

    /// Reconnect loop gave up; only a new `connect()` leaves this state
    pub fn is_exhausted(&self) -> bool {
        !self.connected
            && self.state == ConnectionState::Disconnected
            && self.error_code.as_deref() == Some("reconnect_exhausted")
    }
}

/// Backend health summary pushed as `system-status`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemStatus {
    #[serde(default = "unknown")]
    pub freeswitch: String,

    #[serde(default = "unknown")]
    pub database: String,

    #[serde(default)]
    pub active_calls: i64,

    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

fn unknown() -> String {
    "unknown".to_string()
}

impl SystemStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self.freeswitch.as_str(), "up" | "connected" | "ok")
            && matches!(self.database.as_str(), "up" | "connected" | "ok" | "unknown")
    }
}

/// Payload of the `error` topic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorNotice {
    #[serde(default = "unknown")]
    pub code: String,

    pub message: String,
}

impl ErrorNotice {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

impl From<&crate::AppError> for ErrorNotice {
    fn from(err: &crate::AppError) -> Self {
        Self::new(err.error_code(), err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_status_is_disconnected() {
        let status = ConnectionStatus::new(5);
        assert!(!status.connected);
        assert_eq!(status.state, ConnectionState::Disconnected);
        assert_eq!(status.reconnect_attempts, 0);
        assert_eq!(status.max_reconnect_attempts, 5);
        assert!(!status.is_exhausted());
    }

    #[test]
    fn test_exhausted_status() {
        let mut status = ConnectionStatus {
            reconnect_attempts: 5,
            ..ConnectionStatus::new(5)
        };
        assert!(!status.is_exhausted());

        status.set_error(&crate::AppError::ReconnectExhausted { attempts: 5 });
        assert!(status.is_exhausted());
        assert!(!status.is_reconnecting());

        status.clear_error();
        assert!(!status.is_exhausted());
    }

    #[test]
    fn test_exhausted_without_any_attempt() {
        let mut status = ConnectionStatus::new(0);
        status.set_error(&crate::AppError::ReconnectExhausted { attempts: 0 });
        assert!(status.is_exhausted());
        assert_eq!(status.error_code.as_deref(), Some("reconnect_exhausted"));
    }

    #[test]
    fn test_plain_failure_is_not_exhaustion() {
        let mut status = ConnectionStatus::new(3);
        status.set_error(&crate::AppError::Transport("connection reset".to_string()));
        assert!(!status.is_exhausted());
        assert_eq!(status.error_code.as_deref(), Some("transport_error"));
    }

    #[test]
    fn test_system_status_defaults() {
        let status: SystemStatus = serde_json::from_str(r#"{"freeswitch": "up"}"#).unwrap();
        assert_eq!(status.database, "unknown");
        assert_eq!(status.active_calls, 0);
        assert!(status.is_healthy());
    }

    #[test]
    fn test_error_notice_from_app_error() {
        let notice = ErrorNotice::from(&crate::AppError::NotConnected);
        assert_eq!(notice.code, "not_connected");
    }
}
