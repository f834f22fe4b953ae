// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::job::JobId;

/// Failures reported by the indexing subsystem.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IndicesError {
    /// The template to delete does not exist. Callers deleting templates treat this as done.
    #[error("index template <{0}> does not exist")]
    TemplateMissing(String),
    #[error("{0}")]
    Other(String),
}

/// Job and scheduler errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JobError {
    /// Raised from `execute` for a failure that aborts the whole job.
    #[error("job execution failed: {0}")]
    Execution(String),
    #[error("maximum concurrency of {max} reached for job class {class}")]
    AdmissionDenied { class: &'static str, max: usize },
    #[error("no job with id {0}")]
    NotFound(JobId),
    #[error("job {0} cannot be cancelled")]
    NotCancelable(JobId),
    #[error("no Tokio runtime to run the job on: {0}")]
    NoRuntime(String),
}
