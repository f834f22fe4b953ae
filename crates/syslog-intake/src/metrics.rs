// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Registry of the counters shared by every connection of one input.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::connection_counter::ConnectionCounter;
use crate::dispatcher::DispatchCounters;
use crate::process_buffer::BufferCounters;
use crate::throughput_counter::ThroughputCounter;

#[derive(Debug, Clone, Default)]
pub struct InputMetrics {
    pub connections: Arc<ConnectionCounter>,
    pub throughput: Arc<ThroughputCounter>,
    pub dispatch: Arc<DispatchCounters>,
    pub buffer: Arc<BufferCounters>,
}

impl InputMetrics {
    /// Shares `buffer` so the snapshot reports the counters of the buffer actually in use.
    pub fn with_buffer(buffer: Arc<BufferCounters>) -> Self {
        Self {
            buffer,
            ..Default::default()
        }
    }

    pub fn snapshot(&self) -> InputMetricsSnapshot {
        let buffer = self.buffer.snapshot();
        InputMetricsSnapshot {
            open_connections: self.connections.connection_count(),
            total_connections: self.connections.total_connections(),
            frame_bytes: self.throughput.frame_bytes(),
            frames: self.throughput.frames(),
            oversized_frames: self.throughput.oversized_frames(),
            dispatched: self.dispatch.dispatched(),
            parse_failures: self.dispatch.parse_failures(),
            dropped: self.dispatch.dropped(),
            buffer_blocked_writes: buffer.blocked_writes,
            buffer_blocked_duration: buffer.blocked_duration,
        }
    }
}

/// Plain data representation of [`InputMetrics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputMetricsSnapshot {
    pub open_connections: usize,
    pub total_connections: u64,
    pub frame_bytes: u64,
    pub frames: u64,
    pub oversized_frames: u64,
    pub dispatched: u64,
    pub parse_failures: u64,
    pub dropped: u64,
    pub buffer_blocked_writes: u64,
    pub buffer_blocked_duration: Duration,
}

impl fmt::Display for InputMetricsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "open_connections={}, total_connections={}, frame_bytes={}, frames={}, oversized_frames={}, dispatched={}, parse_failures={}, dropped={}, buffer_blocked_writes={}, buffer_blocked_ms={}",
            self.open_connections,
            self.total_connections,
            self.frame_bytes,
            self.frames,
            self.oversized_frames,
            self.dispatched,
            self.parse_failures,
            self.dropped,
            self.buffer_blocked_writes,
            self.buffer_blocked_duration.as_millis()
        )
    }
}
