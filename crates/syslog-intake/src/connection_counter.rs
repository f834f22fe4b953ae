// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Process wide accounting of open TCP connections.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use tracing::trace;

/// Counts open and total accepted connections (all values use relaxed atomics).
#[derive(Debug, Default)]
pub struct ConnectionCounter {
    active: AtomicUsize,
    total: AtomicU64,
}

impl ConnectionCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_connect(&self) {
        self.active.fetch_add(1, Ordering::Relaxed);
        self.total.fetch_add(1, Ordering::Relaxed);
    }

    /// Saturates at zero so an unbalanced disconnect cannot wrap the counter.
    pub fn on_disconnect(&self) {
        let _ = self
            .active
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1));
    }

    /// Records a connect and returns a guard that records the matching disconnect when
    /// dropped, whatever way the connection ends.
    pub fn track(self: &Arc<Self>) -> ConnectionGuard {
        self.on_connect();
        trace!("Connection opened, {} active", self.connection_count());
        ConnectionGuard {
            counter: Arc::clone(self),
        }
    }

    pub fn connection_count(&self) -> usize {
        self.active.load(Ordering::Relaxed)
    }

    pub fn total_connections(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }
}

#[derive(Debug)]
pub struct ConnectionGuard {
    counter: Arc<ConnectionCounter>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.counter.on_disconnect();
        trace!(
            "Connection closed, {} active",
            self.counter.connection_count()
        );
    }
}
