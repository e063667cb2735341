//! ESL-backed channel transport
//!
//! Connects straight to FreeSWITCH's event socket: events arrive as
//! `text/event-plain` frames, commands go out as synchronous `api` calls
//! whose `api/response` replies come back in request order.

use crate::codec::EslCodec;
use crate::event::EslEvent;
use crate::events;
use crate::mapping;
use apolo_core::config::EslConfig;
use apolo_core::error::AppError;
use apolo_core::models::{ClientMessage, CommandRequest, Credential, ServerMessage};
use apolo_core::traits::{ChannelLink, Transport};
use async_trait::async_trait;
use futures::{future, SinkExt, StreamExt};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio_util::codec::Framed;
use tracing::{debug, info, warn};

/// What an outstanding `api/response` answers
#[derive(Debug, Clone, PartialEq)]
enum Pending {
    Command(CommandRequest),
    ActiveCalls,
    SystemStatus,
}

type PendingQueue = Arc<Mutex<VecDeque<Pending>>>;

pub struct EslTransport {
    config: EslConfig,
}

impl EslTransport {
    pub fn new(config: EslConfig) -> Self {
        Self { config }
    }

    pub fn server_id(&self) -> String {
        self.config.server_id()
    }
}

async fn next_frame(framed: &mut Framed<TcpStream, EslCodec>) -> Result<EslEvent, AppError> {
    match framed.next().await {
        Some(frame) => frame,
        None => Err(AppError::Handshake(
            "connection closed during handshake".to_string(),
        )),
    }
}

async fn next_reply(framed: &mut Framed<TcpStream, EslCodec>) -> Result<EslEvent, AppError> {
    loop {
        let frame = next_frame(framed).await?;
        if frame.is_command_reply() {
            return Ok(frame);
        }
        debug!(frame = %frame, "Skipping frame while waiting for command reply");
    }
}

fn encode_request(
    message: ClientMessage,
    recordings_dir: &str,
) -> Result<(String, Pending), AppError> {
    match message {
        ClientMessage::CallControl(request) => {
            let command = mapping::api_command(&request, recordings_dir)?;
            Ok((command, Pending::Command(request)))
        }
        ClientMessage::GetActiveCalls => {
            Ok(("api show calls as json".to_string(), Pending::ActiveCalls))
        }
        ClientMessage::GetSystemStatus => Ok(("api status".to_string(), Pending::SystemStatus)),
    }
}

fn route_frame(
    frame: Result<EslEvent, AppError>,
    pending: &PendingQueue,
) -> Option<Result<ServerMessage, AppError>> {
    let frame = match frame {
        Ok(frame) => frame,
        Err(e) => return Some(Err(e)),
    };

    if frame.is_event() {
        return frame
            .inner_event()
            .and_then(|event| mapping::server_message(&event))
            .map(Ok);
    }

    if frame.is_api_response() {
        let body = frame.body().unwrap_or_default();
        let Some(request) = pending.lock().pop_front() else {
            warn!("api/response with no outstanding request");
            return None;
        };
        return match request {
            Pending::Command(request) => Some(Ok(ServerMessage::CallControlResponse(
                mapping::command_response(&request, body),
            ))),
            Pending::ActiveCalls => match mapping::active_calls(body) {
                Ok(calls) => Some(Ok(ServerMessage::ActiveCalls(calls))),
                Err(e) => {
                    warn!(error = %e, "Discarding active calls reply");
                    None
                }
            },
            Pending::SystemStatus => Some(Ok(ServerMessage::SystemStatus(
                mapping::system_status(body),
            ))),
        };
    }

    if frame.is_disconnect_notice() {
        warn!("FreeSWITCH sent a disconnect notice");
        return Some(Err(AppError::Transport(
            "disconnect notice from FreeSWITCH".to_string(),
        )));
    }

    debug!(frame = %frame, "Ignoring ESL frame");
    None
}

#[async_trait]
impl Transport for EslTransport {
    fn name(&self) -> &str {
        "esl"
    }

    async fn open(&self, credential: &Credential) -> Result<ChannelLink, AppError> {
        let server_id = self.config.server_id();
        info!("Connecting to FreeSWITCH ESL: {}", server_id);
        // The event socket authenticates with its own password
        debug!(guest = credential.is_guest(), "Channel credential not forwarded to ESL");

        let stream = TcpStream::connect((self.config.host.as_str(), self.config.port))
            .await
            .map_err(|e| AppError::Transport(format!("{}: {}", server_id, e)))?;
        let mut framed = Framed::new(stream, EslCodec);

        let greeting = next_frame(&mut framed).await?;
        if !greeting.is_auth_request() {
            return Err(AppError::Handshake(format!(
                "invalid greeting from {}",
                server_id
            )));
        }

        framed.send(format!("auth {}", self.config.password)).await?;
        let reply = next_reply(&mut framed).await?;
        if !reply.is_ok() {
            return Err(AppError::Handshake(format!(
                "authentication rejected by {}: {}",
                server_id,
                reply.error_message().unwrap_or_else(|| "no reply text".to_string())
            )));
        }
        info!("✅ Authenticated to FreeSWITCH: {}", server_id);

        framed
            .send(format!("event plain {}", events::SUBSCRIBED.join(" ")))
            .await?;
        let reply = next_reply(&mut framed).await?;
        if !reply.is_ok() {
            return Err(AppError::Handshake(format!(
                "event subscription rejected by {}",
                server_id
            )));
        }
        info!("✅ Subscribed to events: {}", server_id);

        let pending: PendingQueue = Arc::default();
        let (sink, stream) = framed.split();

        let recordings_dir = self.config.recordings_dir.clone();
        let outstanding = pending.clone();
        let outbound = sink.with(move |message: ClientMessage| {
            let command = encode_request(message, &recordings_dir).map(|(command, request)| {
                outstanding.lock().push_back(request);
                command
            });
            future::ready(command)
        });

        let inbound = stream
            .filter_map(move |frame| future::ready(route_frame(frame, &pending)))
            .boxed();

        Ok(ChannelLink::new(server_id, inbound, Box::pin(outbound)))
    }
}
