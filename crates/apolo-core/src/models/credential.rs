//! Channel credential attached at handshake time

use std::fmt;

/// Credential presented when the channel opens
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    /// Short-lived channel token issued for an authenticated session
    Token(String),
    /// Well-known reduced-capability credential
    Guest(String),
}

impl Credential {
    pub fn is_guest(&self) -> bool {
        matches!(self, Credential::Guest(_))
    }

    /// Value for the `Authorization` handshake header
    pub fn authorization_header(&self) -> String {
        match self {
            Credential::Token(t) => format!("Bearer {}", t),
            Credential::Guest(g) => format!("Guest {}", g),
        }
    }
}

// Tokens never reach the logs
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credential::Token(_) => f.write_str("Credential::Token([REDACTED])"),
            Credential::Guest(g) => write!(f, "Credential::Guest({})", g),
        }
    }
}
