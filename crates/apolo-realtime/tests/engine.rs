//! End-to-end engine behaviour over the in-memory transport

use apolo_auth::{TokenProvider, TokenSource};
use apolo_core::config::{AuthConfig, ChannelConfig};
use apolo_core::error::AppError;
use apolo_core::models::{
    ActiveCall, CallAction, CallEvent, CallEventType, CallStatus, ClientMessage, CommandResponse,
    ConnectionState, ConnectionStatus, Credential, ErrorNotice, ServerMessage, SystemStatus,
};
use apolo_realtime::{CallEngine, Listener, MemoryServer, MemoryTransport};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(2);

fn fast_config(max_attempts: u32) -> ChannelConfig {
    ChannelConfig {
        handshake_timeout_secs: 1,
        reconnect_base_delay_ms: 10,
        max_reconnect_delay_ms: 40,
        max_reconnect_attempts: max_attempts,
        ..ChannelConfig::default()
    }
}

fn guest() -> Credential {
    Credential::Guest("guest".to_string())
}

async fn wait_until(cond: impl Fn() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + WAIT;
    while tokio::time::Instant::now() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    cond()
}

async fn connected(max_attempts: u32) -> (CallEngine, Arc<MemoryTransport>, MemoryServer) {
    let transport = Arc::new(MemoryTransport::new());
    let engine = CallEngine::new(transport.clone(), &fast_config(max_attempts));
    engine.connect(guest()).await.unwrap();
    let server = transport.accept(WAIT).await.expect("link accepted");
    (engine, transport, server)
}

/// Drain the two requests every handshake is followed by
async fn expect_resync(server: &mut MemoryServer) {
    assert_eq!(server.recv(WAIT).await, Some(ClientMessage::GetActiveCalls));
    assert_eq!(server.recv(WAIT).await, Some(ClientMessage::GetSystemStatus));
}

#[tokio::test]
async fn test_connect_requests_resync() {
    let (engine, _transport, mut server) = connected(3).await;

    assert_eq!(engine.connection_state(), ConnectionState::Connected);
    assert!(engine.is_connected());
    expect_resync(&mut server).await;

    let status = engine.connection_status();
    assert!(status.connected);
    assert_eq!(status.reconnect_attempts, 0);
    assert_eq!(status.max_reconnect_attempts, 3);
}

#[tokio::test]
async fn test_call_lifecycle_reaches_observers() {
    let (engine, _transport, server) = connected(3).await;
    let snapshots: Arc<Mutex<Vec<Vec<ActiveCall>>>> = Arc::new(Mutex::new(Vec::new()));
    let snapshots_clone = snapshots.clone();
    engine.on(&Listener::active_calls(move |calls| {
        snapshots_clone.lock().push(calls.to_vec())
    }));

    server.push_event(CallEvent::new(CallEventType::Create, "A").with_parties("1001", "5551234"));
    server.push_event(CallEvent::new(CallEventType::Answer, "A"));
    assert!(wait_until(|| engine.active_call("A").map(|c| c.status) == Some(CallStatus::Answered)).await);

    server.push_event(CallEvent::new(CallEventType::Hangup, "A"));
    assert!(wait_until(|| engine.active_calls().is_empty()).await);

    let snapshots = snapshots.lock();
    assert_eq!(snapshots.len(), 3);
    assert_eq!(snapshots[0][0].status, CallStatus::Ringing);
    assert!(snapshots[2].is_empty());
}

#[tokio::test]
async fn test_out_of_order_events_are_ignored() {
    let (engine, _transport, server) = connected(3).await;
    let published = Arc::new(Mutex::new(0usize));
    let published_clone = published.clone();
    engine.on(&Listener::active_calls(move |_| *published_clone.lock() += 1));

    let raw = Arc::new(Mutex::new(0usize));
    let raw_clone = raw.clone();
    engine.on(&Listener::call_event(move |_| *raw_clone.lock() += 1));

    server.push_event(CallEvent::new(CallEventType::Answer, "B"));
    server.push_event(CallEvent::new(CallEventType::Hangup, "B"));
    assert!(wait_until(|| *raw.lock() == 2).await);

    assert!(engine.active_calls().is_empty());
    assert_eq!(*published.lock(), 0);
}

#[tokio::test]
async fn test_snapshot_replaces_registry() {
    let (engine, _transport, server) = connected(3).await;
    server.push_event(CallEvent::new(CallEventType::Create, "stale"));
    assert!(wait_until(|| engine.active_call("stale").is_some()).await);

    let fresh = ActiveCall::from_create(&CallEvent::new(CallEventType::Create, "fresh"));
    server.push(ServerMessage::ActiveCalls(vec![fresh]));

    assert!(wait_until(|| engine.active_call("fresh").is_some()).await);
    assert!(engine.active_call("stale").is_none());
}

#[tokio::test]
async fn test_hold_round_trip() {
    let (engine, _transport, mut server) = connected(3).await;
    expect_resync(&mut server).await;

    server.push_event(CallEvent::new(CallEventType::Create, "A"));
    server.push_event(CallEvent::new(CallEventType::Answer, "A"));
    assert!(wait_until(|| engine.active_call("A").is_some_and(|c| c.is_answered())).await);

    let responses = Arc::new(Mutex::new(Vec::new()));
    let responses_clone = responses.clone();
    engine
        .hub()
        .on_command_response_for("A", CallAction::Hold, move |r| {
            responses_clone.lock().push(r.clone())
        });

    engine.commands().hold("A").unwrap();
    let sent = server
        .recv_matching(WAIT, |m| matches!(m, ClientMessage::CallControl(_)))
        .await;
    match sent {
        Some(ClientMessage::CallControl(request)) => {
            assert_eq!(request.action, CallAction::Hold);
            assert_eq!(request.call_id, "A");
        }
        other => panic!("expected call-control, got {:?}", other),
    }

    server.push(ServerMessage::CallControlResponse(CommandResponse::ok(CallAction::Hold, "A")));
    assert!(wait_until(|| engine.active_call("A").is_some_and(|c| c.is_on_hold())).await);
    assert_eq!(responses.lock().len(), 1);
}

#[tokio::test]
async fn test_failed_command_is_broadcast() {
    let (engine, _transport, mut server) = connected(3).await;
    expect_resync(&mut server).await;

    let failures = Arc::new(Mutex::new(Vec::new()));
    let failures_clone = failures.clone();
    engine.on(&Listener::command_response(move |r| {
        if !r.success {
            failures_clone.lock().push(r.error.clone());
        }
    }));

    engine.send(CallAction::Hangup, "ghost", None).unwrap();
    server.push(ServerMessage::CallControlResponse(CommandResponse::failed(
        CallAction::Hangup,
        "ghost",
        "no such channel",
    )));

    assert!(wait_until(|| failures.lock().len() == 1).await);
    assert_eq!(failures.lock()[0].as_deref(), Some("no such channel"));
}

#[tokio::test]
async fn test_transfer_without_destination_is_never_sent() {
    let (engine, _transport, mut server) = connected(3).await;
    expect_resync(&mut server).await;

    let err = engine.send(CallAction::Transfer, "A", None).unwrap_err();
    assert!(err.is_validation_error());
    assert_eq!(server.recv(Duration::from_millis(100)).await, None);
}

#[tokio::test]
async fn test_system_status_and_errors_are_forwarded() {
    let (engine, _transport, server) = connected(3).await;
    let statuses = Arc::new(Mutex::new(Vec::<SystemStatus>::new()));
    let statuses_clone = statuses.clone();
    engine.on(&Listener::system_status(move |s| statuses_clone.lock().push(s.clone())));
    let errors = Arc::new(Mutex::new(Vec::<ErrorNotice>::new()));
    let errors_clone = errors.clone();
    engine.on(&Listener::error(move |e| errors_clone.lock().push(e.clone())));

    server.push(ServerMessage::SystemStatus(SystemStatus {
        freeswitch: "connected".to_string(),
        database: "connected".to_string(),
        active_calls: 4,
        timestamp: chrono::Utc::now(),
    }));
    server.push(ServerMessage::Error(ErrorNotice::new("backend_busy", "try later")));

    assert!(wait_until(|| statuses.lock().len() == 1 && errors.lock().len() == 1).await);
    assert_eq!(statuses.lock()[0].active_calls, 4);
    assert_eq!(errors.lock()[0].code, "backend_busy");
}

#[tokio::test]
async fn test_handshake_timeout() {
    let transport = Arc::new(MemoryTransport::new());
    transport.stall_handshakes(true);
    let engine = CallEngine::new(transport.clone(), &fast_config(0));

    let err = engine.connect(guest()).await.unwrap_err();
    assert_eq!(err, AppError::HandshakeTimeout(Duration::from_secs(1)));
    assert!(err.is_connection_error());
    assert!(wait_until(|| engine.connection_state() == ConnectionState::Disconnected).await);
    assert!(engine.connection_status().error.is_some());
}

#[tokio::test]
async fn test_initial_failure_keeps_retrying() {
    let transport = Arc::new(MemoryTransport::new());
    transport.refuse_next(1);
    let engine = CallEngine::new(transport.clone(), &fast_config(3));

    assert!(engine.connect(guest()).await.is_err());
    let mut server = transport.accept(WAIT).await.expect("reconnected in background");
    expect_resync(&mut server).await;
    assert!(wait_until(|| engine.connection_state() == ConnectionState::Connected).await);
    assert_eq!(engine.connection_status().reconnect_attempts, 0);
}

#[tokio::test]
async fn test_reconnect_after_server_close_reuses_credential() {
    let (engine, transport, server) = connected(3).await;
    server.close();

    let mut server = transport.accept(WAIT).await.expect("reconnected");
    expect_resync(&mut server).await;
    assert!(wait_until(|| engine.connection_state() == ConnectionState::Connected).await);

    let status = engine.connection_status();
    assert_eq!(status.reconnect_attempts, 0);
    assert!(status.error.is_none());
    assert_eq!(transport.credentials(), vec![guest(), guest()]);
}

#[tokio::test]
async fn test_reconnect_gives_up_after_max_attempts() {
    let (engine, transport, server) = connected(2).await;
    let history = Arc::new(Mutex::new(Vec::<ConnectionStatus>::new()));
    let history_clone = history.clone();
    engine.on(&Listener::connection_status(move |s| history_clone.lock().push(s.clone())));
    let errors = Arc::new(Mutex::new(Vec::<ErrorNotice>::new()));
    let errors_clone = errors.clone();
    engine.on(&Listener::error(move |e| errors_clone.lock().push(e.clone())));

    transport.refuse_next(u32::MAX);
    server.fail(AppError::Transport("connection reset".to_string()));

    assert!(wait_until(|| engine.connection_status().is_exhausted()).await);
    // One initial open plus two reconnect attempts
    assert_eq!(transport.open_count(), 3);
    assert_eq!(errors.lock()[0].code, "reconnect_exhausted");

    let mut attempts: Vec<u32> = history
        .lock()
        .iter()
        .filter(|s| s.state == ConnectionState::Connecting)
        .map(|s| s.reconnect_attempts)
        .collect();
    attempts.dedup();
    assert_eq!(attempts, vec![1, 2]);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(transport.open_count(), 3);
}

#[tokio::test]
async fn test_zero_attempts_reports_exhaustion_at_once() {
    let (engine, transport, server) = connected(0).await;
    server.close();

    assert!(wait_until(|| engine.connection_status().is_exhausted()).await);
    let status = engine.connection_status();
    assert_eq!(status.reconnect_attempts, 0);
    assert_eq!(status.error_code.as_deref(), Some("reconnect_exhausted"));

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(transport.open_count(), 1);
}

#[tokio::test]
async fn test_disconnect_stops_reconnects_and_keeps_registry() {
    let (engine, transport, server) = connected(5).await;
    server.push_event(CallEvent::new(CallEventType::Create, "A"));
    assert!(wait_until(|| engine.active_call("A").is_some()).await);

    engine.disconnect().await;
    assert_eq!(engine.connection_state(), ConnectionState::Disconnected);
    assert!(!engine.is_connected());
    assert_eq!(engine.commands().hangup("A"), Err(AppError::NotConnected));
    assert_eq!(engine.request_active_calls(), Err(AppError::NotConnected));
    assert!(engine.active_call("A").is_some());

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(transport.open_count(), 1);
    assert_eq!(
        engine.connection_status().reason.as_deref(),
        Some("client disconnect")
    );
}

#[tokio::test]
async fn test_connect_replaces_existing_session() {
    let (engine, transport, mut first) = connected(3).await;
    expect_resync(&mut first).await;

    engine.connect(guest()).await.unwrap();
    let mut second = transport.accept(WAIT).await.expect("second link");
    expect_resync(&mut second).await;

    // The first link was closed by the client, not reopened
    assert_eq!(first.recv(Duration::from_millis(100)).await, None);
    assert_eq!(transport.open_count(), 2);
}

#[tokio::test]
async fn test_panicking_observer_does_not_stop_the_engine() {
    let (engine, _transport, server) = connected(3).await;
    engine.on(&Listener::call_event(|_| panic!("observer bug")));
    let seen = Arc::new(Mutex::new(0usize));
    let seen_clone = seen.clone();
    engine.on(&Listener::call_event(move |_| *seen_clone.lock() += 1));

    server.push_event(CallEvent::new(CallEventType::Create, "A"));
    server.push_event(CallEvent::new(CallEventType::Create, "B"));

    assert!(wait_until(|| engine.active_calls().len() == 2).await);
    assert_eq!(*seen.lock(), 2);
}

struct FailingSource;

#[async_trait]
impl TokenSource for FailingSource {
    async fn fetch_token(&self) -> Result<String, AppError> {
        Err(AppError::TokenResolution("token endpoint returned 500".to_string()))
    }
}

#[tokio::test]
async fn test_start_falls_back_to_guest() {
    let transport = Arc::new(MemoryTransport::new());
    let auth = AuthConfig {
        token_retries: 1,
        token_retry_delay_ms: 1,
        ..AuthConfig::default()
    };
    let engine = CallEngine::new(transport.clone(), &fast_config(3))
        .with_token_provider(TokenProvider::new(Arc::new(FailingSource), &auth));

    let credential = engine.start(true).await.unwrap();
    assert!(credential.is_guest());
    assert!(transport.accept(WAIT).await.is_some());

    let status = engine.connection_status();
    assert!(status.connected);
    assert!(status.guest_mode);
    assert!(status.token_error.unwrap().contains("500"));
}

#[tokio::test]
async fn test_start_without_provider_is_config_error() {
    let engine = CallEngine::new(Arc::new(MemoryTransport::new()), &fast_config(3));
    assert!(matches!(engine.start(false).await, Err(AppError::Config(_))));
}
