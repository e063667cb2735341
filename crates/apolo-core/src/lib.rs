//! ApoloBilling live-call core library
//!
//! This crate provides the foundational types shared by the real-time call
//! engine and its transports. It includes:
//!
//! - Call domain models (`CallEvent`, `ActiveCall`, commands, status)
//! - The channel wire protocol (`ServerMessage`, `ClientMessage`)
//! - The `Transport` seam implemented by WebSocket and ESL links
//! - Unified error handling
//! - Application configuration

pub mod config;
pub mod error;
pub mod models;
pub mod traits;

pub use config::AppConfig;
pub use error::AppError;

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;
