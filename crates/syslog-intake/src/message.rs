// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Domain message produced from a frame.
//!
//! Full RFC 3164 / RFC 5424 parsing happens downstream of the process buffer. The intake
//! only validates that a frame is usable text and lifts the `<PRI>` header, if any, so that
//! facility and severity are available for routing.

use std::fmt;
use std::net::SocketAddr;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;

use crate::errors::ParseError;
use crate::frame_decoder::Frame;

// RFC 5424: PRI = facility * 8 + severity, facility <= 23.
const MAX_PRIORITY: u8 = 191;

/// Where a frame came from: the configured input and the remote peer.
#[derive(Debug, Clone)]
pub struct MessageSource {
    pub input_id: String,
    pub peer: SocketAddr,
}

impl fmt::Display for MessageSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.input_id, self.peer)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Priority {
    pub facility: u8,
    pub severity: u8,
}

impl Priority {
    pub fn from_value(value: u8) -> Option<Self> {
        (value <= MAX_PRIORITY).then_some(Self {
            facility: value / 8,
            severity: value % 8,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyslogMessage {
    pub input_id: String,
    pub source: SocketAddr,
    /// Milliseconds since the Unix epoch at which the frame was parsed.
    pub received_at_ms: u64,
    pub priority: Option<Priority>,
    /// The complete frame text, header included.
    pub message: String,
}

/// Converts frames into messages. Implementations must be cheap to share across
/// connections.
pub trait MessageParser: Send + Sync {
    fn parse(&self, frame: &Frame, source: &MessageSource) -> Result<SyslogMessage, ParseError>;
}

/// Default parser: accepts any non-blank UTF-8 frame and extracts a leading `<PRI>`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawSyslogParser;

impl MessageParser for RawSyslogParser {
    fn parse(&self, frame: &Frame, source: &MessageSource) -> Result<SyslogMessage, ParseError> {
        let text = std::str::from_utf8(frame.as_bytes()).map_err(|_| ParseError::InvalidUtf8)?;
        if text.trim().is_empty() {
            return Err(ParseError::Empty);
        }
        let priority = parse_priority(text)?;

        Ok(SyslogMessage {
            input_id: source.input_id.clone(),
            source: source.peer,
            received_at_ms: now_millis(),
            priority,
            message: text.to_string(),
        })
    }
}

fn parse_priority(text: &str) -> Result<Option<Priority>, ParseError> {
    let Some(rest) = text.strip_prefix('<') else {
        return Ok(None);
    };
    let Some(end) = rest.find('>') else {
        return Err(ParseError::InvalidPriority("missing '>'".to_string()));
    };
    let digits = &rest[..end];
    if digits.is_empty() || digits.len() > 3 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ParseError::InvalidPriority(format!("'{digits}'")));
    }
    digits
        .parse::<u8>()
        .ok()
        .and_then(Priority::from_value)
        .map(Some)
        .ok_or_else(|| ParseError::InvalidPriority(format!("{digits} is out of range")))
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
