//! Application configuration
//!
//! This module provides centralized configuration management using the `config` crate.
//! Configuration can be loaded from environment variables and config files.

use crate::error::AppError;
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::time::Duration;
use tracing::debug;

/// Main application configuration
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    #[serde(default)]
    pub channel: ChannelConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub esl: EslConfig,
}

/// Which link the channel manager opens
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    #[default]
    Websocket,
    Esl,
}

/// Event channel configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ChannelConfig {
    /// Link type
    #[serde(default)]
    pub transport: TransportKind,

    /// WebSocket endpoint pushing call events
    #[serde(default = "default_channel_url")]
    pub url: String,

    /// Handshake timeout in seconds
    #[serde(default = "default_handshake_timeout")]
    pub handshake_timeout_secs: u64,

    /// Delay before the first reconnect attempt, doubled on every further attempt
    #[serde(default = "default_reconnect_base_delay")]
    pub reconnect_base_delay_ms: u64,

    /// Upper bound for a single reconnect delay
    #[serde(default = "default_max_reconnect_delay")]
    pub max_reconnect_delay_ms: u64,

    /// Reconnect attempts before giving up
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,

    /// Capacity of the outbound command queue
    #[serde(default = "default_outbound_buffer")]
    pub outbound_buffer: usize,
}

fn default_channel_url() -> String {
    "ws://127.0.0.1:9001/ws/calls".to_string()
}

fn default_handshake_timeout() -> u64 {
    10
}

fn default_reconnect_base_delay() -> u64 {
    1000
}

fn default_max_reconnect_delay() -> u64 {
    60000
}

fn default_max_reconnect_attempts() -> u32 {
    5
}

fn default_outbound_buffer() -> usize {
    256
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            transport: TransportKind::default(),
            url: default_channel_url(),
            handshake_timeout_secs: default_handshake_timeout(),
            reconnect_base_delay_ms: default_reconnect_base_delay(),
            max_reconnect_delay_ms: default_max_reconnect_delay(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
            outbound_buffer: default_outbound_buffer(),
        }
    }
}

impl ChannelConfig {
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout_secs)
    }

    pub fn reconnect_base_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_base_delay_ms)
    }

    pub fn max_reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.max_reconnect_delay_ms)
    }

    /// Reject settings the reconnect loop cannot work with
    pub fn validate(&self) -> Result<(), AppError> {
        if self.reconnect_base_delay_ms == 0 {
            return Err(AppError::Config(
                "channel.reconnect_base_delay_ms must be greater than zero".to_string(),
            ));
        }
        if self.max_reconnect_delay_ms < self.reconnect_base_delay_ms {
            return Err(AppError::Config(
                "channel.max_reconnect_delay_ms must not be below the base delay".to_string(),
            ));
        }
        if self.handshake_timeout_secs == 0 {
            return Err(AppError::Config(
                "channel.handshake_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.outbound_buffer == 0 {
            return Err(AppError::Config(
                "channel.outbound_buffer must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Channel token configuration
#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    /// Token issuance endpoint
    pub token_url: Option<String>,

    /// Session bearer presented to the token endpoint
    pub session_token: Option<String>,

    /// Credential used when no channel token can be obtained
    #[serde(default = "default_guest_credential")]
    pub guest_credential: String,

    /// Extra fetch attempts before falling back to guest
    #[serde(default = "default_token_retries")]
    pub token_retries: u32,

    /// Pause between token fetch attempts in milliseconds
    #[serde(default = "default_token_retry_delay")]
    pub token_retry_delay_ms: u64,

    /// HTTP request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Cached tokens expiring within this margin are fetched again
    #[serde(default = "default_refresh_margin")]
    pub refresh_margin_secs: i64,
}

fn default_guest_credential() -> String {
    "guest".to_string()
}

fn default_token_retries() -> u32 {
    1
}

fn default_token_retry_delay() -> u64 {
    500
}

fn default_request_timeout() -> u64 {
    10
}

fn default_refresh_margin() -> i64 {
    30
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_url: None,
            session_token: None,
            guest_credential: default_guest_credential(),
            token_retries: default_token_retries(),
            token_retry_delay_ms: default_token_retry_delay(),
            request_timeout_secs: default_request_timeout(),
            refresh_margin_secs: default_refresh_margin(),
        }
    }
}

impl AuthConfig {
    /// A session bearer is what makes the caller "authenticated"
    pub fn is_authenticated(&self) -> bool {
        self.session_token
            .as_deref()
            .map(|t| !t.trim().is_empty())
            .unwrap_or(false)
    }
}

/// FreeSWITCH ESL link configuration
#[derive(Debug, Deserialize, Clone)]
pub struct EslConfig {
    /// Server hostname or IP
    #[serde(default = "default_esl_host")]
    pub host: String,

    /// ESL port
    #[serde(default = "default_esl_port")]
    pub port: u16,

    /// ESL password
    #[serde(default = "default_esl_password")]
    pub password: String,

    /// Directory passed to uuid_record when recording starts
    #[serde(default = "default_recordings_dir")]
    pub recordings_dir: String,
}

fn default_esl_host() -> String {
    "127.0.0.1".to_string()
}

fn default_esl_port() -> u16 {
    8021
}

fn default_esl_password() -> String {
    "ClueCon".to_string()
}

fn default_recordings_dir() -> String {
    "/var/lib/freeswitch/recordings".to_string()
}

impl Default for EslConfig {
    fn default() -> Self {
        Self {
            host: default_esl_host(),
            port: default_esl_port(),
            password: default_esl_password(),
            recordings_dir: default_recordings_dir(),
        }
    }
}

impl EslConfig {
    pub fn server_id(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl AppConfig {
    /// Load configuration from environment and optional config file
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string());
        debug!(run_mode = %run_mode, "Loading configuration");

        let config = Config::builder()
            // Start with default values
            .set_default("channel.transport", "websocket")?
            .set_default("channel.url", default_channel_url())?
            .set_default("channel.handshake_timeout_secs", default_handshake_timeout() as i64)?
            .set_default("channel.reconnect_base_delay_ms", default_reconnect_base_delay() as i64)?
            .set_default("channel.max_reconnect_delay_ms", default_max_reconnect_delay() as i64)?
            .set_default("channel.max_reconnect_attempts", default_max_reconnect_attempts() as i64)?
            .set_default("channel.outbound_buffer", default_outbound_buffer() as i64)?
            .set_default("auth.guest_credential", default_guest_credential())?
            .set_default("auth.token_retries", default_token_retries() as i64)?
            .set_default("auth.token_retry_delay_ms", default_token_retry_delay() as i64)?
            .set_default("auth.request_timeout_secs", default_request_timeout() as i64)?
            .set_default("auth.refresh_margin_secs", default_refresh_margin())?
            .set_default("esl.host", default_esl_host())?
            .set_default("esl.port", default_esl_port() as i64)?
            .set_default("esl.password", default_esl_password())?
            .set_default("esl.recordings_dir", default_recordings_dir())?
            // Load config file if exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // Load from environment variables with APOLO_ prefix
            .add_source(
                Environment::with_prefix("APOLO")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Load and check the settings the engine depends on
    pub fn load_validated() -> Result<Self, AppError> {
        let config = Self::load()?;
        config.channel.validate()?;
        Ok(config)
    }
}
