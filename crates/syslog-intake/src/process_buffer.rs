// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Bounded buffer between ingestion and downstream processing.
//!
//! The buffer is a bounded MPSC channel. Every connection holds a cloned
//! [`ProcessBufferHandle`]; a single [`ProcessBufferReceiver`] feeds downstream consumers.
//!
//! ```text
//!    ┌──────────────┐
//!    │ Connections  │ (one handle clone each)
//!    └──────┬───────┘
//!           │ write().await, parks when full
//!           v
//!    ┌──────────────┐
//!    │ bounded mpsc │ (capacity N)
//!    └──────┬───────┘
//!           │ recv().await
//!           v
//!    ┌──────────────┐
//!    │  Receiver    │ (downstream processing)
//!    └──────────────┘
//! ```
//!
//! A full buffer parks the writing connection task, which stops reading its socket and lets
//! TCP flow control push back on the sender. With a write timeout configured, a write that
//! stays parked longer than the timeout drops the message instead.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

use crate::errors::{BufferError, Creation};
use crate::message::SyslogMessage;

/// Default number of messages the buffer can hold.
pub const DEFAULT_CAPACITY: usize = 1024;

/// Buffer counters (all values use relaxed atomics).
#[derive(Debug, Default)]
pub struct BufferCounters {
    written: AtomicU64,
    blocked_writes: AtomicU64,
    blocked_nanos: AtomicU64,
    timed_out: AtomicU64,
}

impl BufferCounters {
    pub fn snapshot(&self) -> BufferSnapshot {
        BufferSnapshot {
            written: self.written.load(Ordering::Relaxed),
            blocked_writes: self.blocked_writes.load(Ordering::Relaxed),
            blocked_duration: Duration::from_nanos(self.blocked_nanos.load(Ordering::Relaxed)),
            timed_out: self.timed_out.load(Ordering::Relaxed),
        }
    }

    fn record_blocked_time(&self, elapsed: Duration) {
        let nanos = u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX);
        self.blocked_nanos.fetch_add(nanos, Ordering::Relaxed);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferSnapshot {
    /// Messages accepted by the buffer.
    pub written: u64,
    /// Writes that found the buffer full and had to wait.
    pub blocked_writes: u64,
    /// Total time spent waiting by blocked writes.
    pub blocked_duration: Duration,
    /// Messages dropped because the write timeout elapsed.
    pub timed_out: u64,
}

#[derive(Debug, Clone)]
pub struct ProcessBufferHandle {
    tx: mpsc::Sender<SyslogMessage>,
    write_timeout: Option<Duration>,
    counters: Arc<BufferCounters>,
}

impl ProcessBufferHandle {
    /// Writes a message, waiting for capacity when the buffer is full.
    pub async fn write(&self, message: SyslogMessage) -> Result<(), BufferError> {
        let message = match self.tx.try_send(message) {
            Ok(()) => {
                self.counters.written.fetch_add(1, Ordering::Relaxed);
                return Ok(());
            }
            Err(TrySendError::Closed(_)) => return Err(BufferError::Closed),
            Err(TrySendError::Full(message)) => message,
        };

        debug!("Process buffer full, waiting for capacity");
        self.counters.blocked_writes.fetch_add(1, Ordering::Relaxed);
        let started = Instant::now();
        let result = match self.write_timeout {
            Some(limit) => match tokio::time::timeout(limit, self.tx.send(message)).await {
                Ok(sent) => sent.map_err(|_| BufferError::Closed),
                Err(_) => {
                    self.counters.timed_out.fetch_add(1, Ordering::Relaxed);
                    warn!("Dropped message after waiting {:?} for process buffer", limit);
                    Err(BufferError::Timeout(limit))
                }
            },
            None => self.tx.send(message).await.map_err(|_| BufferError::Closed),
        };
        self.counters.record_blocked_time(started.elapsed());

        if result.is_ok() {
            self.counters.written.fetch_add(1, Ordering::Relaxed);
        }
        result
    }

    pub fn counters(&self) -> Arc<BufferCounters> {
        Arc::clone(&self.counters)
    }

    /// Free slots at the time of the call.
    pub fn remaining_capacity(&self) -> usize {
        self.tx.capacity()
    }
}

#[derive(Debug)]
pub struct ProcessBufferReceiver {
    rx: mpsc::Receiver<SyslogMessage>,
}

impl ProcessBufferReceiver {
    /// Returns `None` once every handle has been dropped and the buffer is drained.
    pub async fn recv(&mut self) -> Option<SyslogMessage> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<SyslogMessage> {
        self.rx.try_recv().ok()
    }

    /// Stops accepting writes; buffered messages can still be received.
    pub fn close(&mut self) {
        self.rx.close();
    }
}

pub struct ProcessBuffer;

impl ProcessBuffer {
    pub fn new(
        capacity: usize,
        write_timeout: Option<Duration>,
    ) -> Result<(ProcessBufferReceiver, ProcessBufferHandle), Creation> {
        if capacity == 0 {
            return Err(Creation::InvalidBufferCapacity);
        }
        let (tx, rx) = mpsc::channel(capacity);
        let handle = ProcessBufferHandle {
            tx,
            write_timeout,
            counters: Arc::new(BufferCounters::default()),
        };
        Ok((ProcessBufferReceiver { rx }, handle))
    }
}
