//! Token issuance endpoint client

use apolo_core::config::AuthConfig;
use apolo_core::error::AppError;
use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, error};

/// Fetches a short-lived channel token
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn fetch_token(&self) -> Result<String, AppError>;
}

#[derive(Debug, Deserialize)]
struct TokenPayload {
    token: String,
}

/// Token source backed by the backend's HTTP token endpoint
///
/// Sends `GET <token_url>` with the session bearer and expects
/// `{"token": "<channel token>"}`.
#[derive(Clone)]
pub struct HttpTokenSource {
    client: reqwest::Client,
    token_url: String,
    session_token: Option<String>,
}

impl HttpTokenSource {
    /// Create a new token source
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if no `token_url` is configured or the
    /// HTTP client cannot be built
    pub fn from_config(config: &AuthConfig) -> Result<Self, AppError> {
        let token_url = config
            .token_url
            .clone()
            .ok_or_else(|| AppError::Config("auth.token_url is not set".to_string()))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| AppError::Config(format!("HTTP client: {}", e)))?;

        Ok(Self {
            client,
            token_url,
            session_token: config.session_token.clone(),
        })
    }

    pub fn token_url(&self) -> &str {
        &self.token_url
    }
}

impl std::fmt::Debug for HttpTokenSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTokenSource")
            .field("token_url", &self.token_url)
            .field("session_token", &self.session_token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

#[async_trait]
impl TokenSource for HttpTokenSource {
    async fn fetch_token(&self) -> Result<String, AppError> {
        debug!(url = %self.token_url, "Requesting channel token");

        let mut request = self.client.get(&self.token_url);
        if let Some(session) = &self.session_token {
            request = request.header(AUTHORIZATION, format!("Bearer {}", session));
        }

        let response = request.send().await.map_err(|e| {
            error!(error = %e, "Token endpoint unreachable");
            AppError::TokenResolution(format!("request failed: {}", e))
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::TokenResolution(format!(
                "token endpoint returned {}",
                status
            )));
        }

        let payload: TokenPayload = response
            .json()
            .await
            .map_err(|e| AppError::TokenResolution(format!("malformed token payload: {}", e)))?;

        let token = payload.token.trim().to_string();
        if token.is_empty() {
            return Err(AppError::InvalidToken("token endpoint returned an empty token".to_string()));
        }

        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config_requires_url() {
        let err = HttpTokenSource::from_config(&AuthConfig::default()).unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }

    #[test]
    fn test_debug_hides_session() {
        let config = AuthConfig {
            token_url: Some("http://localhost:9001/api/v1/ws-token".to_string()),
            session_token: Some("very-secret".to_string()),
            ..AuthConfig::default()
        };
        let source = HttpTokenSource::from_config(&config).unwrap();
        let debug = format!("{:?}", source);
        assert!(!debug.contains("very-secret"));
        assert_eq!(source.token_url(), "http://localhost:9001/api/v1/ws-token");
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_token_error() {
        let config = AuthConfig {
            // Reserved port, nothing listens there
            token_url: Some("http://127.0.0.1:9/token".to_string()),
            request_timeout_secs: 2,
            ..AuthConfig::default()
        };
        let source = HttpTokenSource::from_config(&config).unwrap();
        let err = source.fetch_token().await.unwrap_err();
        assert!(matches!(err, AppError::TokenResolution(_)));
    }

    /// Scripted token endpoint answering a single request
    ///
    /// Returns the endpoint URL and a handle yielding the raw request.
    async fn token_endpoint(
        status_line: &'static str,
        body: &'static str,
    ) -> (String, tokio::task::JoinHandle<String>) {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        use tokio::net::TcpListener;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/api/v1/ws-token", listener.local_addr().unwrap());

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }
            let response = format!(
                "{}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status_line,
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
            String::from_utf8_lossy(&request).into_owned()
        });

        (url, server)
    }

    fn source_for(url: String) -> HttpTokenSource {
        HttpTokenSource::from_config(&AuthConfig {
            token_url: Some(url),
            session_token: Some("session-abc".to_string()),
            request_timeout_secs: 5,
            ..AuthConfig::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_token_is_fetched_with_session_bearer() {
        let (url, server) = token_endpoint("HTTP/1.1 200 OK", r#"{"token":" chan-123 "}"#).await;

        let token = source_for(url).fetch_token().await.unwrap();
        assert_eq!(token, "chan-123");

        let request = server.await.unwrap().to_ascii_lowercase();
        assert!(request.starts_with("get /api/v1/ws-token"));
        assert!(request.contains("authorization: bearer session-abc"));
    }

    #[tokio::test]
    async fn test_non_success_status_is_token_error() {
        let (url, _server) =
            token_endpoint("HTTP/1.1 500 Internal Server Error", r#"{"error":"boom"}"#).await;

        let err = source_for(url).fetch_token().await.unwrap_err();
        assert!(matches!(err, AppError::TokenResolution(_)));
        assert!(err.to_string().contains("500"));
    }

    #[tokio::test]
    async fn test_malformed_payload_is_token_error() {
        let (url, _server) = token_endpoint("HTTP/1.1 200 OK", r#"{"tok":1}"#).await;

        let err = source_for(url).fetch_token().await.unwrap_err();
        assert!(matches!(err, AppError::TokenResolution(_)));
    }

    #[tokio::test]
    async fn test_blank_token_is_invalid() {
        let (url, _server) = token_endpoint("HTTP/1.1 200 OK", r#"{"token":"  "}"#).await;

        let err = source_for(url).fetch_token().await.unwrap_err();
        assert!(matches!(err, AppError::InvalidToken(_)));
    }

    #[tokio::test]
    async fn test_endpoint_failures_fall_back_to_guest() {
        use crate::provider::TokenProvider;
        use std::sync::Arc;

        let failures = [
            ("HTTP/1.1 503 Service Unavailable", ""),
            ("HTTP/1.1 200 OK", r#"{"tok":1}"#),
            ("HTTP/1.1 200 OK", r#"{"token":"  "}"#),
        ];
        for (status_line, body) in failures {
            let (url, _server) = token_endpoint(status_line, body).await;
            let config = AuthConfig {
                token_retries: 0,
                ..AuthConfig::default()
            };
            let provider = TokenProvider::new(Arc::new(source_for(url)), &config);

            let credential = provider.resolve_credential(true).await;
            assert!(credential.is_guest(), "{} {} did not fall back", status_line, body);
            let status = provider.status();
            assert!(status.guest_mode);
            assert!(status.token_error.is_some());
        }
    }
}
