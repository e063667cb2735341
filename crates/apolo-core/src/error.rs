//! Unified error handling for the live-call engine
//!
//! Every failure the engine can observe maps onto one `AppError` variant.
//! Connection-level errors feed the reconnect loop; validation and command
//! errors are surfaced to the caller and never retried.

use std::time::Duration;
use thiserror::Error;

/// Main engine error type
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AppError {
    // ==================== Connection Errors ====================
    #[error("Handshake failed: {0}")]
    Handshake(String),

    #[error("Handshake timed out after {}s", .0.as_secs())]
    HandshakeTimeout(Duration),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Channel is not connected")]
    NotConnected,

    #[error("Reconnection abandoned after {attempts} attempts")]
    ReconnectExhausted { attempts: u32 },

    // ==================== Token Errors ====================
    #[error("Token resolution failed: {0}")]
    TokenResolution(String),

    #[error("Invalid token: {0}")]
    InvalidToken(String),

    // ==================== Validation Errors ====================
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    // ==================== Command Errors ====================
    #[error("Command {action} failed for call {call_id}: {message}")]
    CommandFailed {
        action: String,
        call_id: String,
        message: String,
    },

    // ==================== Internal Errors ====================
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("ESL protocol error: {0}")]
    EslProtocol(String),
}

impl AppError {
    /// Returns the stable error code used in status payloads
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::Handshake(_) => "handshake_failed",
            AppError::HandshakeTimeout(_) => "handshake_timeout",
            AppError::Transport(_) => "transport_error",
            AppError::NotConnected => "not_connected",
            AppError::ReconnectExhausted { .. } => "reconnect_exhausted",
            AppError::TokenResolution(_) => "token_resolution_failed",
            AppError::InvalidToken(_) => "invalid_token",
            AppError::Validation(_) => "validation_error",
            AppError::MissingField(_) => "missing_field",
            AppError::CommandFailed { .. } => "command_failed",
            AppError::Serialization(_) => "serialization_error",
            AppError::Config(_) => "config_error",
            AppError::EslProtocol(_) => "esl_protocol_error",
        }
    }

    /// Errors that end a channel session and hand control to the reconnect loop
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            AppError::Handshake(_)
                | AppError::HandshakeTimeout(_)
                | AppError::Transport(_)
                | AppError::EslProtocol(_)
        )
    }

    /// Errors raised locally before anything reaches the channel
    pub fn is_validation_error(&self) -> bool {
        matches!(self, AppError::Validation(_) | AppError::MissingField(_))
    }
}

// ==================== From implementations ====================

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Transport(err.to_string())
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::Validation(err.to_string())
    }
}
