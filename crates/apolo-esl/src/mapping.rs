//! Translation between ESL and the channel protocol

use crate::event::EslEvent;
use crate::events;
use apolo_core::error::AppError;
use apolo_core::models::{
    ActiveCall, CallAction, CallDirection, CallEvent, CallEventType, CallStatus, CommandRequest,
    CommandResponse, ServerMessage, SystemStatus,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use validator::Validate;
use tracing::debug;

/// Map a plain-text ESL event to a server message
///
/// Returns `None` for events the engine does not consume.
pub fn server_message(event: &EslEvent) -> Option<ServerMessage> {
    let name = event.event_name()?;

    if name == events::HEARTBEAT {
        return Some(ServerMessage::SystemStatus(SystemStatus {
            freeswitch: "up".to_string(),
            database: "unknown".to_string(),
            active_calls: event.session_count().unwrap_or(0),
            timestamp: event.timestamp().unwrap_or_else(Utc::now),
        }));
    }

    let event_type = match name {
        events::CHANNEL_CREATE => CallEventType::Create,
        events::CHANNEL_ANSWER => CallEventType::Answer,
        events::CHANNEL_BRIDGE => CallEventType::Bridge,
        events::CHANNEL_UNBRIDGE => CallEventType::Unbridge,
        events::CHANNEL_HANGUP_COMPLETE => CallEventType::Hangup,
        other => {
            debug!(event_name = other, "Ignoring unsubscribed ESL event");
            return None;
        }
    };

    let Some(call_id) = event.unique_id() else {
        debug!(event_name = name, "ESL event without Unique-ID");
        return None;
    };

    let mut call_event = CallEvent::new(event_type, call_id)
        .with_parties(
            event.caller_number().unwrap_or_default(),
            event.destination_number().unwrap_or_default(),
        )
        .with_direction(
            event
                .direction()
                .map(CallDirection::from_header)
                .unwrap_or_default(),
        )
        .at(event.timestamp().unwrap_or_else(Utc::now));

    if event_type == CallEventType::Hangup {
        if let Some(cause) = event.hangup_cause() {
            call_event = call_event.with_metadata("hangup_cause", cause.into());
        }
    }

    Some(ServerMessage::CallEvent(call_event))
}

/// The `api` command line for a call-control request
///
/// # Errors
///
/// Returns `AppError::Validation` for a transfer without a destination or
/// for a call id or destination that would not stay a single argument
pub fn api_command(request: &CommandRequest, recordings_dir: &str) -> Result<String, AppError> {
    request.validate()?;
    let id = &request.call_id;
    let command = match request.action {
        CallAction::Hangup => format!("api uuid_kill {}", id),
        CallAction::Hold => format!("api uuid_hold {}", id),
        CallAction::Unhold => format!("api uuid_hold off {}", id),
        CallAction::Park => format!("api uuid_park {}", id),
        CallAction::Transfer => {
            let destination = request.destination().ok_or_else(|| {
                AppError::Validation("transfer requires a non-empty destination".to_string())
            })?;
            format!("api uuid_transfer {} {}", id, destination)
        }
        CallAction::StartRecording => format!(
            "api uuid_record {} start {}/{}.wav",
            id,
            recordings_dir.trim_end_matches('/'),
            id
        ),
        CallAction::StopRecording => format!("api uuid_record {} stop all", id),
    };
    Ok(command)
}

/// Interpret an `api/response` body for a call-control request
pub fn command_response(request: &CommandRequest, body: &str) -> CommandResponse {
    let reply = body.trim();
    if reply.starts_with("+OK") {
        return CommandResponse::ok(request.action, &request.call_id);
    }

    let message = reply.strip_prefix("-ERR").unwrap_or(reply).trim();
    let message = if message.is_empty() { "empty reply" } else { message };
    CommandResponse::failed(request.action, &request.call_id, message)
}

#[derive(Debug, Deserialize)]
struct ShowCalls {
    #[serde(default)]
    rows: Vec<CallRow>,
}

#[derive(Debug, Deserialize)]
struct CallRow {
    uuid: String,
    #[serde(default)]
    direction: String,
    #[serde(default)]
    created_epoch: String,
    #[serde(default)]
    cid_num: String,
    #[serde(default)]
    dest: String,
    #[serde(default)]
    callstate: String,
    #[serde(default)]
    b_uuid: String,
}

impl CallRow {
    fn into_active_call(self) -> ActiveCall {
        let status = match self.callstate.as_str() {
            "HELD" => CallStatus::Hold,
            "ACTIVE" if !self.b_uuid.is_empty() => CallStatus::Bridged,
            "ACTIVE" => CallStatus::Answered,
            _ => CallStatus::Ringing,
        };
        let start_time = self
            .created_epoch
            .parse::<i64>()
            .ok()
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .unwrap_or_else(Utc::now);

        ActiveCall {
            call_id: self.uuid,
            caller_number: self.cid_num,
            callee_number: self.dest,
            direction: CallDirection::from_header(&self.direction),
            status,
            start_time,
            answer_time: None,
            recording: false,
            resume_status: None,
        }
    }
}

/// Parse `show calls as json`
///
/// FreeSWITCH omits `rows` entirely when no call is up.
pub fn active_calls(body: &str) -> Result<Vec<ActiveCall>, AppError> {
    let parsed: ShowCalls = serde_json::from_str(body.trim())
        .map_err(|e| AppError::EslProtocol(format!("unexpected show calls output: {}", e)))?;
    Ok(parsed.rows.into_iter().map(CallRow::into_active_call).collect())
}

/// Parse `status` output into a system status
pub fn system_status(body: &str) -> SystemStatus {
    let freeswitch = if body.trim_start().starts_with("UP") {
        "up"
    } else {
        "down"
    };

    // "3 session(s) - peak 12, last 5min 4"
    let active_calls = body
        .lines()
        .find(|line| line.contains("session(s) -"))
        .and_then(|line| line.split_whitespace().next())
        .and_then(|n| n.parse().ok())
        .unwrap_or(0);

    SystemStatus {
        freeswitch: freeswitch.to_string(),
        database: "unknown".to_string(),
        active_calls,
        timestamp: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use apolo_core::models::CommandParams;

    fn event(raw: &str) -> EslEvent {
        EslEvent::parse(raw)
    }

    #[test]
    fn test_channel_events_map_to_call_events() {
        let cases = [
            ("CHANNEL_CREATE", CallEventType::Create),
            ("CHANNEL_ANSWER", CallEventType::Answer),
            ("CHANNEL_BRIDGE", CallEventType::Bridge),
            ("CHANNEL_UNBRIDGE", CallEventType::Unbridge),
            ("CHANNEL_HANGUP_COMPLETE", CallEventType::Hangup),
        ];
        for (name, expected) in cases {
            let raw = format!(
                "Event-Name: {}\nUnique-ID: A\nCaller-Caller-ID-Number: 1001\nCaller-Destination-Number: 5551234\nCall-Direction: inbound\n",
                name
            );
            match server_message(&event(&raw)) {
                Some(ServerMessage::CallEvent(e)) => {
                    assert_eq!(e.event_type, expected);
                    assert_eq!(e.call_id, "A");
                    assert_eq!(e.caller_number, "1001");
                    assert_eq!(e.callee_number, "5551234");
                    assert_eq!(e.direction, CallDirection::Inbound);
                }
                other => panic!("{} mapped to {:?}", name, other),
            }
        }
    }

    #[test]
    fn test_hangup_carries_cause() {
        let raw = "Event-Name: CHANNEL_HANGUP_COMPLETE\nUnique-ID: A\nHangup-Cause: NORMAL_CLEARING\n";
        let Some(ServerMessage::CallEvent(e)) = server_message(&event(raw)) else {
            panic!("expected call event");
        };
        let cause = e.metadata.unwrap().get("hangup_cause").cloned();
        assert_eq!(cause, Some(serde_json::json!("NORMAL_CLEARING")));
    }

    #[test]
    fn test_heartbeat_is_system_status() {
        let raw = "Event-Name: HEARTBEAT\nSession-Count: 12\n";
        match server_message(&event(raw)) {
            Some(ServerMessage::SystemStatus(s)) => {
                assert_eq!(s.active_calls, 12);
                assert_eq!(s.freeswitch, "up");
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_unmapped_events_are_dropped() {
        assert!(server_message(&event("Event-Name: CHANNEL_STATE\nUnique-ID: A\n")).is_none());
        assert!(server_message(&event("Event-Name: CHANNEL_CREATE\n")).is_none());
        assert!(server_message(&event("Content-Type: command/reply\n")).is_none());
    }

    #[test]
    fn test_api_commands() {
        let dir = "/recordings/";
        let cmd = |action| api_command(&CommandRequest::new(action, "A"), dir).unwrap();

        assert_eq!(cmd(CallAction::Hangup), "api uuid_kill A");
        assert_eq!(cmd(CallAction::Hold), "api uuid_hold A");
        assert_eq!(cmd(CallAction::Unhold), "api uuid_hold off A");
        assert_eq!(cmd(CallAction::Park), "api uuid_park A");
        assert_eq!(cmd(CallAction::StartRecording), "api uuid_record A start /recordings/A.wav");
        assert_eq!(cmd(CallAction::StopRecording), "api uuid_record A stop all");

        let transfer = CommandRequest::new(CallAction::Transfer, "A")
            .with_params(CommandParams::transfer_to("1002"));
        assert_eq!(api_command(&transfer, dir).unwrap(), "api uuid_transfer A 1002");

        let bare = CommandRequest::new(CallAction::Transfer, "A");
        assert!(api_command(&bare, dir).unwrap_err().is_validation_error());
    }

    #[test]
    fn test_api_command_rejects_extra_arguments() {
        let dir = "/recordings";
        let smuggled = CommandRequest::new(CallAction::Transfer, "A")
            .with_params(CommandParams::transfer_to("1002 XML evil"));
        assert!(api_command(&smuggled, dir).unwrap_err().is_validation_error());

        let header = CommandRequest::new(CallAction::Hangup, "A\nevent plain ALL");
        assert!(api_command(&header, dir).unwrap_err().is_validation_error());

        let padded = CommandRequest::new(CallAction::Transfer, "A")
            .with_params(CommandParams::transfer_to(" 1002 "));
        assert_eq!(api_command(&padded, dir).unwrap(), "api uuid_transfer A 1002");
    }

    #[test]
    fn test_command_response_parsing() {
        let request = CommandRequest::new(CallAction::Hold, "A");
        assert!(command_response(&request, "+OK\n").success);

        let failed = command_response(&request, "-ERR No such channel!\n");
        assert!(!failed.success);
        assert_eq!(failed.error.as_deref(), Some("No such channel!"));
        assert_eq!(failed.call_id, "A");

        assert_eq!(command_response(&request, "").error.as_deref(), Some("empty reply"));
    }

    #[test]
    fn test_show_calls_json() {
        let body = r#"{"row_count":2,"rows":[
            {"uuid":"A","direction":"inbound","created_epoch":"1700000000","cid_num":"1001","dest":"5551234","callstate":"ACTIVE","b_uuid":"B"},
            {"uuid":"C","direction":"outbound","created_epoch":"1700000100","cid_num":"1002","dest":"100","callstate":"RINGING","b_uuid":""}
        ]}"#;
        let calls = active_calls(body).unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].status, CallStatus::Bridged);
        assert_eq!(calls[0].start_time.timestamp(), 1_700_000_000);
        assert_eq!(calls[0].direction, CallDirection::Inbound);
        assert_eq!(calls[1].status, CallStatus::Ringing);

        assert!(active_calls(r#"{"row_count":0}"#).unwrap().is_empty());
        assert!(active_calls("-ERR no reply").is_err());
    }

    #[test]
    fn test_status_output() {
        let body = "UP 0 years, 0 days, 1 hour, 2 minutes\n\
                    1 session(s) since startup\n\
                    3 session(s) - peak 12, last 5min 4\n\
                    0 session(s) per Sec out of max 30, peak 2, last 5min 1\n";
        let status = system_status(body);
        assert_eq!(status.freeswitch, "up");
        assert_eq!(status.active_calls, 3);

        assert_eq!(system_status("").freeswitch, "down");
    }
}
