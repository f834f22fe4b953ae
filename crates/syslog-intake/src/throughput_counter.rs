// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Byte and frame throughput observed after framing.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::frame_decoder::Frame;

/// Throughput counters (all values use relaxed atomics). Updates wrap on overflow instead
/// of failing, so metering can never interfere with delivery.
#[derive(Debug, Default)]
pub struct ThroughputCounter {
    frame_bytes: AtomicU64,
    frames: AtomicU64,
    oversized_frames: AtomicU64,
}

impl ThroughputCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_frame(&self, frame: &Frame) {
        self.frame_bytes.fetch_add(frame.len() as u64, Ordering::Relaxed);
        self.frames.fetch_add(1, Ordering::Relaxed);
    }

    /// Oversized frames never reach `on_frame`; they are tallied separately.
    pub fn on_oversized(&self, count: u64) {
        self.oversized_frames.fetch_add(count, Ordering::Relaxed);
    }

    /// Payload bytes of delivered frames. Delimiters and discarded data are not counted.
    pub fn frame_bytes(&self) -> u64 {
        self.frame_bytes.load(Ordering::Relaxed)
    }

    pub fn frames(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }

    pub fn oversized_frames(&self) -> u64 {
        self.oversized_frames.load(Ordering::Relaxed)
    }
}
