//! Channel credential resolution for the live-call engine
//!
//! Before the event channel opens, the engine needs a credential to attach
//! to the handshake. This crate resolves it:
//!
//! - Authenticated sessions exchange their session bearer for a short-lived
//!   channel token at the backend's token endpoint
//! - Any failure (network, non-2xx, malformed payload) falls back to the
//!   well-known guest credential instead of failing the connection
//! - Unauthenticated callers go straight to guest
//!
//! Token failures are advisory: they surface through [`TokenStatus`] so a UI
//! can show "guest mode", but never block connection establishment.
//!
//! # Example
//!
//! ```no_run
//! use apolo_auth::{HttpTokenSource, TokenProvider};
//! use apolo_core::config::AuthConfig;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), apolo_core::AppError> {
//! let config = AuthConfig {
//!     token_url: Some("https://pbx.example.com/api/v1/ws-token".to_string()),
//!     session_token: Some("session-bearer".to_string()),
//!     ..AuthConfig::default()
//! };
//! let source = HttpTokenSource::from_config(&config)?;
//! let provider = TokenProvider::new(Arc::new(source), &config);
//!
//! let credential = provider.resolve_credential(config.is_authenticated()).await;
//! println!("guest mode: {}", credential.is_guest());
//! # Ok(())
//! # }
//! ```

pub mod claims;
pub mod provider;
pub mod source;

pub use claims::{peek_expiry, ChannelClaims};
pub use provider::{TokenProvider, TokenStatus, TokenStatusListener};
pub use source::{HttpTokenSource, TokenSource};
