// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The system job contract.
//!
//! A system job is a unit of background maintenance work that runs synchronously on one
//! thread while any other thread may poll its progress or request cancellation. The shared
//! state lives in [`JobProgress`], which uses atomics only, so polling never waits on a
//! long running operation inside `execute`.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use serde::Serialize;

use crate::errors::JobError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct JobId(pub u64);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How a successful `execute` ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Completed,
    /// Stopped early on request; work done so far is kept.
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Created,
    Running,
    Completed,
    Cancelled,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Failed)
    }

    pub(crate) fn as_u8(self) -> u8 {
        match self {
            Self::Created => 0,
            Self::Running => 1,
            Self::Completed => 2,
            Self::Cancelled => 3,
            Self::Failed => 4,
        }
    }

    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Created,
            1 => Self::Running,
            2 => Self::Completed,
            3 => Self::Cancelled,
            _ => Self::Failed,
        }
    }
}

impl From<JobOutcome> for JobStatus {
    fn from(outcome: JobOutcome) -> Self {
        match outcome {
            JobOutcome::Completed => Self::Completed,
            JobOutcome::Cancelled => Self::Cancelled,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = match self {
            Self::Created => "created",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
        };
        write!(f, "{status}")
    }
}

/// A cancellable, progress reporting unit of background work.
///
/// `execute` runs on a single thread; every other method may be called concurrently from
/// any thread and must not block.
pub trait SystemJob: Send + Sync {
    /// Runs the job to completion. Per-item failures are handled inside; an `Err` means the
    /// whole job failed.
    fn execute(&self) -> Result<JobOutcome, JobError>;

    /// Idempotent. Observed by `execute` at its next checkpoint.
    fn request_cancel(&self);

    /// Percentage in `0..=100`.
    fn progress(&self) -> u8;

    /// Maximum number of concurrently running jobs of this class. Enforced by the scheduler.
    fn max_concurrency(&self) -> usize;

    fn provides_progress(&self) -> bool;

    fn is_cancelable(&self) -> bool;

    fn description(&self) -> &str;

    /// Stable identifier of the job class.
    fn class_name(&self) -> &'static str;
}

/// Cancel flag and progress counters shared between `execute` and observers.
///
/// `total` and `processed` are written by the executing thread only; the cancel flag may be
/// set from anywhere and never resets.
#[derive(Debug, Default)]
pub struct JobProgress {
    cancel_requested: AtomicBool,
    total: AtomicU64,
    processed: AtomicU64,
}

impl JobProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_cancel(&self) {
        self.cancel_requested.store(true, Ordering::Release);
    }

    pub fn is_cancel_requested(&self) -> bool {
        self.cancel_requested.load(Ordering::Acquire)
    }

    /// Starts a pass over `total` items.
    pub fn start(&self, total: u64) {
        self.processed.store(0, Ordering::Relaxed);
        self.total.store(total, Ordering::Relaxed);
    }

    pub fn increment_processed(&self) {
        self.processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    /// `floor(processed / total * 100)`, or 0 while `total` is 0.
    pub fn percent(&self) -> u8 {
        let total = self.total();
        if total == 0 {
            return 0;
        }
        let processed = self.processed().min(total);
        let percent = u128::from(processed) * 100 / u128::from(total);
        u8::try_from(percent).unwrap_or(100)
    }
}
