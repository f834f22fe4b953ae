// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Delimiter based framing of a syslog TCP stream.
//!
//! A [`FrameDecoder`] owns the framing state of exactly one connection. It accumulates bytes
//! across reads, splits them at the configured delimiter and enforces an upper bound on the
//! size of a single frame. Frames never include the delimiter and a partial frame is never
//! emitted: an oversized run of bytes is either fatal for the connection or discarded up to
//! the next delimiter, depending on the [`OversizedFramePolicy`].

use std::fmt;
use std::str::FromStr;

use bytes::{Buf, Bytes, BytesMut};
use tokio_util::codec::Decoder;
use tracing::{debug, warn};

use crate::delimiter::DelimiterStrategy;
use crate::errors::{Creation, FrameError};

/// Default upper bound for a single frame, 2 MiB.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 2 * 1024 * 1024;

/// One complete message extracted from the stream, without its delimiter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame(Bytes);

impl Frame {
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_bytes(self) -> Bytes {
        self.0
    }
}

impl AsRef<[u8]> for Frame {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// What to do when a frame grows past the configured maximum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OversizedFramePolicy {
    /// Fail with [`FrameError::FrameTooLarge`]; the caller closes the connection.
    #[default]
    Disconnect,
    /// Drop everything up to and including the next delimiter and keep framing.
    Discard,
}

impl FromStr for OversizedFramePolicy {
    type Err = Creation;

    fn from_str(policy: &str) -> Result<Self, Self::Err> {
        match policy.trim().to_ascii_lowercase().as_str() {
            "disconnect" | "reset" => Ok(Self::Disconnect),
            "discard" | "skip" => Ok(Self::Discard),
            _ => Err(Creation::UnknownOversizedFramePolicy(policy.to_string())),
        }
    }
}

impl fmt::Display for OversizedFramePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnect => write!(f, "disconnect"),
            Self::Discard => write!(f, "discard"),
        }
    }
}

/// Per-connection framing state.
#[derive(Debug)]
pub struct FrameDecoder {
    strategy: DelimiterStrategy,
    max_frame_size: usize,
    policy: OversizedFramePolicy,
    // Bytes before this offset are known not to hold a terminator.
    scan_offset: usize,
    // Set while skipping the remainder of an oversized frame.
    discarding: bool,
    discarded_frames: u64,
    // Only used by `feed`; the `Decoder` impl works on the caller's buffer.
    pending: BytesMut,
}

impl FrameDecoder {
    pub fn new(
        strategy: DelimiterStrategy,
        max_frame_size: usize,
        policy: OversizedFramePolicy,
    ) -> Self {
        Self {
            strategy,
            max_frame_size,
            policy,
            scan_offset: 0,
            discarding: false,
            discarded_frames: 0,
            pending: BytesMut::new(),
        }
    }

    pub fn strategy(&self) -> DelimiterStrategy {
        self.strategy
    }

    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }

    /// Number of oversized frames dropped under [`OversizedFramePolicy::Discard`].
    pub fn discarded_frames(&self) -> u64 {
        self.discarded_frames
    }

    /// Appends `bytes` to the internal buffer and returns a lazy iterator over the frames
    /// that became complete.
    ///
    /// The iterator stops after the first error. Bytes not consumed when the iterator is
    /// dropped stay buffered for the next call.
    pub fn feed(&mut self, bytes: &[u8]) -> Frames<'_> {
        self.pending.extend_from_slice(bytes);
        Frames {
            decoder: self,
            done: false,
        }
    }

    /// Bytes buffered by `feed` that are not yet part of a complete frame.
    pub fn buffered_len(&self) -> usize {
        self.pending.len()
    }

    fn exceeds_limit(&self, unterminated: &[u8]) -> bool {
        self.strategy.unterminated_len(unterminated) > self.max_frame_size
    }

    fn too_large(&mut self, src: &mut BytesMut, size: usize) -> FrameError {
        // Nothing from an oversized frame may reach the dispatcher.
        src.clear();
        self.scan_offset = 0;
        FrameError::FrameTooLarge {
            size,
            max: self.max_frame_size,
        }
    }

    fn record_discard(&mut self, size: usize) {
        self.discarded_frames += 1;
        warn!(
            "Discarded oversized frame of at least {} bytes (max {})",
            size, self.max_frame_size
        );
    }
}

impl Decoder for FrameDecoder {
    type Item = Frame;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, FrameError> {
        loop {
            if self.discarding {
                match self.strategy.find_boundary(src) {
                    Some(boundary) => {
                        src.advance(boundary.consumed());
                        self.discarding = false;
                        debug!("Resynchronized after oversized frame");
                        continue;
                    }
                    None => {
                        src.clear();
                        return Ok(None);
                    }
                }
            }

            match self.strategy.find_boundary_from(src, self.scan_offset) {
                Some(boundary) => {
                    self.scan_offset = 0;
                    if boundary.frame_len > self.max_frame_size {
                        match self.policy {
                            OversizedFramePolicy::Disconnect => {
                                return Err(self.too_large(src, boundary.frame_len));
                            }
                            OversizedFramePolicy::Discard => {
                                src.advance(boundary.consumed());
                                self.record_discard(boundary.frame_len);
                                continue;
                            }
                        }
                    }
                    let frame = src.split_to(boundary.frame_len).freeze();
                    src.advance(boundary.delimiter_len);
                    return Ok(Some(Frame(frame)));
                }
                None if self.exceeds_limit(src) => match self.policy {
                    OversizedFramePolicy::Disconnect => {
                        let size = src.len();
                        return Err(self.too_large(src, size));
                    }
                    OversizedFramePolicy::Discard => {
                        self.record_discard(src.len());
                        src.clear();
                        self.scan_offset = 0;
                        self.discarding = true;
                        return Ok(None);
                    }
                },
                None => {
                    self.scan_offset = src.len();
                    return Ok(None);
                }
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, FrameError> {
        if let Some(frame) = self.decode(src)? {
            return Ok(Some(frame));
        }
        if !src.is_empty() {
            debug!("Dropping {} unterminated bytes at end of stream", src.len());
            src.clear();
        }
        self.scan_offset = 0;
        self.discarding = false;
        Ok(None)
    }
}

/// Lazy sequence of frames produced by [`FrameDecoder::feed`].
pub struct Frames<'a> {
    decoder: &'a mut FrameDecoder,
    done: bool,
}

impl Iterator for Frames<'_> {
    type Item = Result<Frame, FrameError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let mut pending = std::mem::take(&mut self.decoder.pending);
        let result = self.decoder.decode(&mut pending);
        self.decoder.pending = pending;

        match result {
            Ok(Some(frame)) => Some(Ok(frame)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
