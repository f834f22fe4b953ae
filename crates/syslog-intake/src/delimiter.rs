// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Frame boundary detection for syslog over TCP.
//!
//! Syslog senders terminate each message with either a line terminator (`\n` or `\r\n`) or a
//! single NUL byte. Which one is in use is a per-input setting that never changes for the
//! lifetime of a connection.

use std::fmt;
use std::str::FromStr;

use crate::errors::Creation;

/// Location of the first frame boundary in a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Boundary {
    /// Number of payload bytes preceding the delimiter.
    pub frame_len: usize,
    /// Number of delimiter bytes that follow the payload and must be discarded.
    pub delimiter_len: usize,
}

impl Boundary {
    /// Total number of bytes consumed by the frame and its delimiter.
    pub fn consumed(&self) -> usize {
        self.frame_len + self.delimiter_len
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DelimiterStrategy {
    /// `\n`, with an immediately preceding `\r` treated as part of the delimiter.
    #[default]
    LineTerminator,
    /// A single `\0` byte.
    NullByte,
}

impl DelimiterStrategy {
    pub fn from_null_flag(use_null_delimiter: bool) -> Self {
        if use_null_delimiter {
            Self::NullByte
        } else {
            Self::LineTerminator
        }
    }

    /// Byte searched for when scanning. For line terminators the optional `\r` is resolved
    /// after the `\n` is found.
    fn terminator(self) -> u8 {
        match self {
            Self::LineTerminator => b'\n',
            Self::NullByte => b'\0',
        }
    }

    /// Finds the first boundary in `buf`, starting the scan at `offset`.
    ///
    /// `offset` lets callers skip bytes already known not to contain a terminator. The
    /// returned lengths are always relative to the start of `buf`.
    pub fn find_boundary_from(self, buf: &[u8], offset: usize) -> Option<Boundary> {
        let terminator = self.terminator();
        let start = offset.min(buf.len());
        let index = buf[start..].iter().position(|b| *b == terminator)? + start;

        let boundary = match self {
            Self::LineTerminator if index > 0 && buf[index - 1] == b'\r' => Boundary {
                frame_len: index - 1,
                delimiter_len: 2,
            },
            _ => Boundary {
                frame_len: index,
                delimiter_len: 1,
            },
        };
        Some(boundary)
    }

    pub fn find_boundary(self, buf: &[u8]) -> Option<Boundary> {
        self.find_boundary_from(buf, 0)
    }

    /// Payload length of an unterminated buffer. A trailing `\r` may start a `\r\n` split
    /// across reads, so it is not counted for line terminators.
    pub fn unterminated_len(self, buf: &[u8]) -> usize {
        match self {
            Self::LineTerminator if buf.last() == Some(&b'\r') => buf.len() - 1,
            _ => buf.len(),
        }
    }
}

impl FromStr for DelimiterStrategy {
    type Err = Creation;

    fn from_str(mode: &str) -> Result<Self, Self::Err> {
        match mode.trim().to_ascii_lowercase().as_str() {
            "line" | "newline" => Ok(Self::LineTerminator),
            "null" | "nul" => Ok(Self::NullByte),
            _ => Err(Creation::UnknownDelimiter(mode.to_string())),
        }
    }
}

impl fmt::Display for DelimiterStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LineTerminator => write!(f, "line"),
            Self::NullByte => write!(f, "null"),
        }
    }
}
