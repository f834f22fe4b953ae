// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Runs system jobs on the blocking thread pool.
//!
//! The manager enforces each job class's `max_concurrency` at submission time: a job is
//! admitted only while fewer jobs of the same class are created or running. Finished jobs
//! stay listed with their terminal status until [`SystemJobManager::remove_finished`] is
//! called.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tracing::{error, info, warn};

use crate::errors::JobError;
use crate::job::{JobId, JobStatus, SystemJob};

/// Serializable view of a tracked job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobSummary {
    pub id: JobId,
    pub class_name: &'static str,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
    pub cancelable: bool,
    pub status: JobStatus,
}

struct TrackedJob {
    id: JobId,
    job: Arc<dyn SystemJob>,
    status: AtomicU8,
}

impl TrackedJob {
    fn new(id: JobId, job: Arc<dyn SystemJob>) -> Self {
        Self {
            id,
            job,
            status: AtomicU8::new(JobStatus::Created.as_u8()),
        }
    }

    fn status(&self) -> JobStatus {
        JobStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    fn set_status(&self, status: JobStatus) {
        self.status.store(status.as_u8(), Ordering::Release);
    }

    fn summary(&self) -> JobSummary {
        JobSummary {
            id: self.id,
            class_name: self.job.class_name(),
            description: self.job.description().to_string(),
            progress: self
                .job
                .provides_progress()
                .then(|| self.job.progress()),
            cancelable: self.job.is_cancelable(),
            status: self.status(),
        }
    }

    fn run(&self) -> JobStatus {
        self.set_status(JobStatus::Running);
        info!("Starting job {} [{}]", self.id, self.job.class_name());

        let status = match catch_unwind(AssertUnwindSafe(|| self.job.execute())) {
            Ok(Ok(outcome)) => JobStatus::from(outcome),
            Ok(Err(e)) => {
                error!("Job {} [{}] failed: {}", self.id, self.job.class_name(), e);
                JobStatus::Failed
            }
            Err(_) => {
                error!("Job {} [{}] panicked", self.id, self.job.class_name());
                JobStatus::Failed
            }
        };

        self.set_status(status);
        info!(
            "Job {} [{}] finished with status {}",
            self.id,
            self.job.class_name(),
            status
        );
        status
    }
}

/// Completion handle returned by [`SystemJobManager::submit`].
#[derive(Debug)]
pub struct JobHandle {
    id: JobId,
    done: oneshot::Receiver<JobStatus>,
}

impl JobHandle {
    pub fn id(&self) -> JobId {
        self.id
    }

    /// Waits for the job to reach a terminal status.
    pub async fn wait(self) -> JobStatus {
        self.done.await.unwrap_or(JobStatus::Failed)
    }
}

#[derive(Default)]
pub struct SystemJobManager {
    jobs: Mutex<HashMap<JobId, Arc<TrackedJob>>>,
    next_id: AtomicU64,
}

impl SystemJobManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_jobs(&self) -> MutexGuard<'_, HashMap<JobId, Arc<TrackedJob>>> {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Admits `job` and starts it on the blocking pool of the current Tokio runtime.
    pub fn submit(&self, job: Arc<dyn SystemJob>) -> Result<JobHandle, JobError> {
        let class = job.class_name();
        let max = job.max_concurrency();
        let runtime = Handle::try_current().map_err(|e| JobError::NoRuntime(e.to_string()))?;

        let tracked = {
            let mut jobs = self.lock_jobs();
            let active = jobs
                .values()
                .filter(|t| t.job.class_name() == class && !t.status().is_terminal())
                .count();
            if active >= max {
                warn!(
                    "Not starting job of class {}: {} of {} allowed already active",
                    class, active, max
                );
                return Err(JobError::AdmissionDenied { class, max });
            }

            let id = JobId(self.next_id.fetch_add(1, Ordering::Relaxed));
            let tracked = Arc::new(TrackedJob::new(id, job));
            jobs.insert(id, Arc::clone(&tracked));
            tracked
        };

        let id = tracked.id;
        let (tx, done) = oneshot::channel();
        runtime.spawn_blocking(move || {
            let status = tracked.run();
            // The handle may have been dropped; the status stays visible through the manager.
            let _ = tx.send(status);
        });

        Ok(JobHandle { id, done })
    }

    pub fn request_cancel(&self, id: JobId) -> Result<(), JobError> {
        let tracked = self
            .lock_jobs()
            .get(&id)
            .cloned()
            .ok_or(JobError::NotFound(id))?;
        if !tracked.job.is_cancelable() {
            return Err(JobError::NotCancelable(id));
        }
        info!("Cancel requested for job {} [{}]", id, tracked.job.class_name());
        tracked.job.request_cancel();
        Ok(())
    }

    /// Requests cancellation of every active cancelable job and returns how many were asked.
    pub fn request_cancel_all(&self) -> usize {
        let active: Vec<Arc<TrackedJob>> = self
            .lock_jobs()
            .values()
            .filter(|t| t.job.is_cancelable() && !t.status().is_terminal())
            .cloned()
            .collect();
        for tracked in &active {
            info!(
                "Cancel requested for job {} [{}]",
                tracked.id,
                tracked.job.class_name()
            );
            tracked.job.request_cancel();
        }
        active.len()
    }

    pub fn status(&self, id: JobId) -> Option<JobStatus> {
        self.lock_jobs().get(&id).map(|t| t.status())
    }

    /// Summaries of all tracked jobs, ordered by id.
    pub fn list(&self) -> Vec<JobSummary> {
        let mut summaries: Vec<JobSummary> =
            self.lock_jobs().values().map(|t| t.summary()).collect();
        summaries.sort_by_key(|s| s.id);
        summaries
    }

    /// Number of created or running jobs of `class_name`.
    pub fn active_count(&self, class_name: &str) -> usize {
        self.lock_jobs()
            .values()
            .filter(|t| t.job.class_name() == class_name && !t.status().is_terminal())
            .count()
    }

    /// Forgets jobs in a terminal status and returns how many were removed.
    pub fn remove_finished(&self) -> usize {
        let mut jobs = self.lock_jobs();
        let before = jobs.len();
        jobs.retain(|_, t| !t.status().is_terminal());
        before - jobs.len()
    }
}
