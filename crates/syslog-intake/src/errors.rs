// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

/// Error type for pipeline and buffer construction.
#[derive(Debug, thiserror::Error)]
pub enum Creation {
    #[error("unrecognized delimiter mode '{0}', expected 'line' or 'null'")]
    UnknownDelimiter(String),
    #[error("unrecognized oversized frame policy '{0}', expected 'disconnect' or 'discard'")]
    UnknownOversizedFramePolicy(String),
    #[error("max frame size must be greater than 0")]
    InvalidMaxFrameSize,
    #[error("process buffer capacity must be greater than 0")]
    InvalidBufferCapacity,
}

/// Errors raised while framing a connection's byte stream.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// Unterminated data grew beyond the configured bound. The connection must be closed.
    #[error("frame of {size} bytes exceeds the maximum frame size of {max} bytes")]
    FrameTooLarge { size: usize, max: usize },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Per-frame parse failures. These never terminate a connection.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("empty message")]
    Empty,
    #[error("message is not valid UTF-8")]
    InvalidUtf8,
    #[error("invalid priority header: {0}")]
    InvalidPriority(String),
}

/// Failures writing into the process buffer.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum BufferError {
    #[error("process buffer is closed")]
    Closed,
    #[error("process buffer write timed out after {0:?}")]
    Timeout(std::time::Duration),
}

/// Terminal outcome of a connection that did not end with a clean EOF.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error("process buffer closed while dispatching")]
    BufferClosed,
}
