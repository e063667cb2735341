//! ApoloBilling live-call monitor
//!
//! Keeps a live view of active calls in sync with the PBX backend and logs
//! every change. Runs until Ctrl-C.

use anyhow::Context;
use apolo_auth::{HttpTokenSource, TokenProvider};
use apolo_core::config::{AppConfig, TransportKind};
use apolo_core::models::Credential;
use apolo_core::traits::Transport;
use apolo_esl::EslTransport;
use apolo_realtime::{CallEngine, Listener, WebSocketTransport};
use std::env;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize tracing/logging
fn init_tracing() {
    let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "apolo_live={},apolo_realtime={},apolo_auth={},apolo_esl={}",
            log_level, log_level, log_level, log_level
        ))
    });

    let registry = tracing_subscriber::registry().with(env_filter);
    if env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json")) {
        registry.with(fmt::layer().json().with_target(true)).init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_file(true)
                    .with_line_number(true),
            )
            .init();
    }
}

fn build_transport(config: &AppConfig) -> Arc<dyn Transport> {
    match config.channel.transport {
        TransportKind::Websocket => {
            info!("Channel transport: WebSocket {}", config.channel.url);
            Arc::new(WebSocketTransport::new(config.channel.url.clone()))
        }
        TransportKind::Esl => {
            info!("Channel transport: FreeSWITCH ESL {}", config.esl.server_id());
            Arc::new(EslTransport::new(config.esl.clone()))
        }
    }
}

/// Log-only observers
fn register_observers(engine: &CallEngine) {
    engine.on(&Listener::active_calls(|calls| {
        info!(active_calls = calls.len(), "Active calls updated");
    }));
    engine.on(&Listener::system_status(|status| {
        info!(
            freeswitch = %status.freeswitch,
            database = %status.database,
            active_calls = status.active_calls,
            "System status"
        );
    }));
    engine.on(&Listener::command_response(|response| {
        if let Some(err) = response.as_error() {
            warn!(code = err.error_code(), error = %err, "Call-control command failed");
        }
    }));
    engine.on(&Listener::connection_status(|status| {
        if status.is_exhausted() {
            error!(
                attempts = status.reconnect_attempts,
                "Gave up reconnecting; restart the monitor once the backend is back"
            );
        } else if status.token_error.is_some() {
            warn!(
                token_error = status.token_error.as_deref().unwrap_or_default(),
                "Running in guest mode"
            );
        }
    }));
    engine.on(&Listener::error(|notice| {
        warn!(code = %notice.code, message = %notice.message, "Engine error");
    }));
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize logging
    init_tracing();

    info!(
        "Starting ApoloBilling live-call monitor v{}",
        env!("CARGO_PKG_VERSION")
    );

    let config = AppConfig::load_validated().context("loading configuration")?;

    let mut engine = CallEngine::new(build_transport(&config), &config.channel);
    let use_tokens = config.auth.token_url.is_some();
    if use_tokens {
        let source = HttpTokenSource::from_config(&config.auth)?;
        info!("Channel tokens from {}", source.token_url());
        engine = engine.with_token_provider(TokenProvider::new(Arc::new(source), &config.auth));
    }
    register_observers(&engine);

    let connected = if use_tokens {
        engine.start(config.auth.is_authenticated()).await.map(|_| ())
    } else {
        engine
            .connect(Credential::Guest(config.auth.guest_credential.clone()))
            .await
    };
    if let Err(e) = connected {
        // The reconnect loop keeps trying in the background
        warn!(error = %e, "Initial connect failed");
    }

    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;

    info!("Shutting down");
    engine.disconnect().await;
    info!(
        active_calls = engine.active_calls().len(),
        "Live-call monitor stopped"
    );

    Ok(())
}
