//! ESL frame parsing
//!
//! Both the outer envelope (`Content-Type`, `Reply-Text`, ...) and the
//! plain-text event carried in a `text/event-plain` body use the same
//! `Header: value` layout, so one type covers both.

use crate::constants::{
    CONTENT_TYPE_API, CONTENT_TYPE_AUTH, CONTENT_TYPE_DISCONNECT, CONTENT_TYPE_EVENT,
    CONTENT_TYPE_REPLY,
};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fmt;

/// Parsed ESL header block with optional body
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EslEvent {
    headers: HashMap<String, String>,
    body: Option<String>,
}

impl EslEvent {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a header block, optionally followed by a blank line and a body
    ///
    /// ```text
    /// Header-Name: value
    /// Another-Header: another%20value
    ///
    /// Optional body content
    /// ```
    ///
    /// Header values are URL-decoded; undecodable values are kept verbatim.
    pub fn parse(raw: &str) -> Self {
        let mut headers = HashMap::new();
        let mut body_lines = Vec::new();
        let mut in_body = false;

        for line in raw.lines() {
            if in_body {
                body_lines.push(line);
                continue;
            }

            let line = line.trim_end_matches('\r');
            if line.trim().is_empty() {
                in_body = true;
                continue;
            }

            if let Some((key, value)) = line.split_once(':') {
                let value = value.trim();
                let decoded = urlencoding::decode(value)
                    .map(|v| v.into_owned())
                    .unwrap_or_else(|_| value.to_string());
                headers.insert(key.trim().to_string(), decoded);
            }
        }

        let body = (!body_lines.is_empty()).then(|| body_lines.join("\n"));
        Self { headers, body }
    }

    /// Build from an already split envelope
    pub fn with_body(mut self, body: Option<String>) -> Self {
        self.body = body;
        self
    }

    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(|s| s.as_str())
    }

    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    pub fn body(&self) -> Option<&str> {
        self.body.as_deref()
    }

    pub fn set_header(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.headers.insert(key.into(), value.into());
    }

    // Envelope

    pub fn content_type(&self) -> Option<&str> {
        self.get_header("Content-Type")
    }

    pub fn content_length(&self) -> Option<usize> {
        self.get_header("Content-Length").and_then(|s| s.parse().ok())
    }

    pub fn reply_text(&self) -> Option<&str> {
        self.get_header("Reply-Text")
    }

    pub fn is_auth_request(&self) -> bool {
        self.content_type() == Some(CONTENT_TYPE_AUTH)
    }

    pub fn is_command_reply(&self) -> bool {
        self.content_type() == Some(CONTENT_TYPE_REPLY)
    }

    pub fn is_api_response(&self) -> bool {
        self.content_type() == Some(CONTENT_TYPE_API)
    }

    pub fn is_event(&self) -> bool {
        self.content_type() == Some(CONTENT_TYPE_EVENT)
    }

    pub fn is_disconnect_notice(&self) -> bool {
        self.content_type() == Some(CONTENT_TYPE_DISCONNECT)
    }

    /// Command reply starting with `+OK`
    pub fn is_ok(&self) -> bool {
        self.reply_text().is_some_and(|t| t.starts_with("+OK"))
    }

    pub fn is_error(&self) -> bool {
        self.reply_text().is_some_and(|t| t.starts_with("-ERR"))
    }

    pub fn error_message(&self) -> Option<String> {
        if !self.is_error() {
            return None;
        }
        self.reply_text()
            .map(|t| t.strip_prefix("-ERR").unwrap_or(t).trim().to_string())
    }

    /// The event carried in a `text/event-plain` body
    pub fn inner_event(&self) -> Option<EslEvent> {
        if !self.is_event() {
            return None;
        }
        self.body().map(EslEvent::parse)
    }

    // Event headers

    pub fn event_name(&self) -> Option<&str> {
        self.get_header("Event-Name")
    }

    pub fn unique_id(&self) -> Option<&str> {
        self.get_header("Unique-ID")
            .or_else(|| self.get_header("Channel-Call-UUID"))
    }

    pub fn caller_number(&self) -> Option<&str> {
        self.get_header("Caller-ANI")
            .or_else(|| self.get_header("Caller-Caller-ID-Number"))
            .or_else(|| self.get_header("variable_sip_from_user"))
    }

    pub fn destination_number(&self) -> Option<&str> {
        self.get_header("Caller-Destination-Number")
            .or_else(|| self.get_header("variable_sip_to_user"))
    }

    pub fn direction(&self) -> Option<&str> {
        self.get_header("Call-Direction")
            .or_else(|| self.get_header("variable_direction"))
    }

    pub fn hangup_cause(&self) -> Option<&str> {
        self.get_header("Hangup-Cause")
            .or_else(|| self.get_header("variable_hangup_cause"))
    }

    /// `Event-Date-Timestamp` (microseconds since the epoch)
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        let micros: i64 = self.get_header("Event-Date-Timestamp")?.parse().ok()?;
        DateTime::from_timestamp(
            micros.div_euclid(1_000_000),
            (micros.rem_euclid(1_000_000) * 1_000) as u32,
        )
    }

    /// Live session count carried by HEARTBEAT
    pub fn session_count(&self) -> Option<i64> {
        self.get_header("Session-Count").and_then(|s| s.parse().ok())
    }

    pub fn get_variable(&self, name: &str) -> Option<&str> {
        self.get_header(&format!("variable_{}", name))
    }
}

impl fmt::Display for EslEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EslEvent {{")?;
        if let Some(content_type) = self.content_type() {
            write!(f, " Content-Type: {}", content_type)?;
        }
        if let Some(event_name) = self.event_name() {
            write!(f, " Event-Name: {}", event_name)?;
        }
        if let Some(uuid) = self.unique_id() {
            write!(f, ", UUID: {}", uuid)?;
        }
        write!(f, ", Headers: {} }}", self.headers.len())
    }
}
