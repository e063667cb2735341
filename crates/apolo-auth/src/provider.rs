//! Credential resolution with guest fallback
//!
//! `TokenProvider::resolve_credential` never fails: every token problem
//! degrades to the guest credential and is reported through `TokenStatus`.

use crate::claims::peek_expiry;
use crate::source::TokenSource;
use apolo_core::config::AuthConfig;
use apolo_core::error::AppError;
use apolo_core::models::Credential;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Token side of the connection status
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TokenStatus {
    /// Last token failure, `None` once a token was obtained
    pub token_error: Option<String>,

    /// A fetch retry is in progress
    pub is_retrying_token: bool,

    /// The channel will open with the guest credential
    pub guest_mode: bool,
}

/// Callback notified on every token status change
pub type TokenStatusListener = Arc<dyn Fn(&TokenStatus) + Send + Sync>;

#[derive(Debug, Clone)]
struct CachedToken {
    token: String,
    expires_at: DateTime<Utc>,
}

/// Resolves the channel credential
///
/// Holds the last issued token and reuses it while its `exp` claim is far
/// enough away, so reconnect storms do not hammer the token endpoint.
pub struct TokenProvider {
    source: Arc<dyn TokenSource>,
    guest_credential: String,
    retries: u32,
    retry_delay: Duration,
    refresh_margin: ChronoDuration,
    cached: Mutex<Option<CachedToken>>,
    status: Mutex<TokenStatus>,
    listener: Option<TokenStatusListener>,
}

impl TokenProvider {
    /// Create a new provider
    ///
    /// # Arguments
    ///
    /// * `source` - Where channel tokens come from
    /// * `config` - Guest credential, retry and cache settings
    pub fn new(source: Arc<dyn TokenSource>, config: &AuthConfig) -> Self {
        Self {
            source,
            guest_credential: config.guest_credential.clone(),
            retries: config.token_retries,
            retry_delay: Duration::from_millis(config.token_retry_delay_ms),
            refresh_margin: ChronoDuration::seconds(config.refresh_margin_secs),
            cached: Mutex::new(None),
            status: Mutex::new(TokenStatus::default()),
            listener: None,
        }
    }

    /// Register the callback that mirrors token status into the connection status
    pub fn with_status_listener(mut self, listener: TokenStatusListener) -> Self {
        self.listener = Some(listener);
        self
    }

    /// Current token status snapshot
    pub fn status(&self) -> TokenStatus {
        self.status.lock().clone()
    }

    pub fn guest(&self) -> Credential {
        Credential::Guest(self.guest_credential.clone())
    }

    /// Resolve the credential for the next handshake
    ///
    /// # Arguments
    ///
    /// * `is_authenticated` - Whether the caller holds a session that can be
    ///   exchanged for a channel token
    ///
    /// Unauthenticated callers get the guest credential without a fetch.
    /// Authenticated callers get a cached or freshly fetched token; after
    /// `1 + retries` failed fetches they get the guest credential and the
    /// failure is published as `token_error`.
    pub async fn resolve_credential(&self, is_authenticated: bool) -> Credential {
        if !is_authenticated {
            debug!("Not authenticated, using guest credential");
            self.publish(TokenStatus {
                token_error: None,
                is_retrying_token: false,
                guest_mode: true,
            });
            return self.guest();
        }

        if let Some(token) = self.cached_token() {
            debug!("Reusing cached channel token");
            self.publish(TokenStatus::default());
            return Credential::Token(token);
        }

        let attempts = self.retries.saturating_add(1);
        let mut last_error = AppError::TokenResolution("no attempt made".to_string());

        for attempt in 1..=attempts {
            if attempt > 1 {
                self.publish(TokenStatus {
                    token_error: Some(last_error.to_string()),
                    is_retrying_token: true,
                    guest_mode: false,
                });
                sleep(self.retry_delay).await;
            }

            match self.source.fetch_token().await {
                Ok(token) => {
                    info!(attempt, "Channel token obtained");
                    self.store(&token);
                    self.publish(TokenStatus::default());
                    return Credential::Token(token);
                }
                Err(e) => {
                    warn!(attempt, max_attempts = attempts, error = %e, "Channel token fetch failed");
                    last_error = e;
                }
            }
        }

        warn!(error = %last_error, "Falling back to guest credential");
        self.publish(TokenStatus {
            token_error: Some(last_error.to_string()),
            is_retrying_token: false,
            guest_mode: true,
        });
        self.guest()
    }

    /// Drop the cached token, e.g. after the backend rejected it
    pub fn invalidate(&self) {
        self.cached.lock().take();
    }

    fn cached_token(&self) -> Option<String> {
        let mut cached = self.cached.lock();
        match cached.as_ref() {
            Some(entry) if entry.expires_at - self.refresh_margin > Utc::now() => {
                Some(entry.token.clone())
            }
            Some(_) => {
                cached.take();
                None
            }
            None => None,
        }
    }

    // Tokens without a readable exp are not cached
    fn store(&self, token: &str) {
        let entry = peek_expiry(token).map(|expires_at| CachedToken {
            token: token.to_string(),
            expires_at,
        });
        *self.cached.lock() = entry;
    }

    fn publish(&self, status: TokenStatus) {
        {
            let mut current = self.status.lock();
            if *current == status {
                return;
            }
            *current = status.clone();
        }
        if let Some(listener) = &self.listener {
            listener(&status);
        }
    }
}
