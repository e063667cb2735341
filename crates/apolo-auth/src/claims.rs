//! Channel token claims
//!
//! The engine never verifies channel tokens (the backend does that at
//! handshake); it only reads the expiry to decide whether a cached token can
//! be reused on reconnect.

use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

/// Claims the engine cares about in a channel token
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChannelClaims {
    /// Subject (username)
    #[serde(default)]
    pub sub: Option<String>,

    /// Expiration time (Unix timestamp)
    #[serde(default)]
    pub exp: Option<i64>,
}

/// Read the `exp` claim without checking the signature
///
/// Returns `None` for anything that is not a decodable JWT or has no `exp`.
///
/// # Examples
///
/// ```
/// use apolo_auth::peek_expiry;
///
/// assert!(peek_expiry("not-a-jwt").is_none());
/// ```
pub fn peek_expiry(token: &str) -> Option<DateTime<Utc>> {
    let mut validation = Validation::default();
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    let data = decode::<ChannelClaims>(token, &DecodingKey::from_secret(&[]), &validation).ok()?;
    DateTime::from_timestamp(data.claims.exp?, 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use jsonwebtoken::{encode, EncodingKey, Header};

    fn token_with(claims: &ChannelClaims) -> String {
        encode(
            &Header::default(),
            claims,
            &EncodingKey::from_secret(b"server-side-secret"),
        )
        .unwrap()
    }

    #[test]
    fn test_peek_expiry_reads_exp_without_secret() {
        let exp = (Utc::now() + Duration::minutes(5)).timestamp();
        let token = token_with(&ChannelClaims {
            sub: Some("operator".to_string()),
            exp: Some(exp),
        });
        assert_eq!(peek_expiry(&token).map(|d| d.timestamp()), Some(exp));
    }

    #[test]
    fn test_peek_expiry_without_exp() {
        let token = token_with(&ChannelClaims {
            sub: Some("operator".to_string()),
            exp: None,
        });
        assert!(peek_expiry(&token).is_none());
    }

    #[test]
    fn test_peek_expiry_opaque_token() {
        assert!(peek_expiry("opaque-session-token").is_none());
        assert!(peek_expiry("").is_none());
    }
}
