// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Deletes an index set: its index template first, then every managed index.
//!
//! The list of indices is taken once when the job starts. Individual deletion failures are
//! logged and skipped; only successful deletions count towards progress, so a job with
//! failures finishes below 100%.

use std::sync::Arc;

use tracing::{debug, error, info};

use crate::errors::{IndicesError, JobError};
use crate::index_set::IndexSet;
use crate::indices::Indices;
use crate::job::{JobOutcome, JobProgress, SystemJob};

pub const MAX_CONCURRENCY: usize = 1_000;

const DESCRIPTION: &str = "Deletes all indices in an index set.";

pub struct IndexSetCleanupJob {
    indices: Arc<dyn Indices>,
    index_set: Arc<dyn IndexSet>,
    progress: JobProgress,
}

impl IndexSetCleanupJob {
    pub fn new(indices: Arc<dyn Indices>, index_set: Arc<dyn IndexSet>) -> Self {
        Self {
            indices,
            index_set,
            progress: JobProgress::new(),
        }
    }

    pub fn total(&self) -> u64 {
        self.progress.total()
    }

    pub fn processed(&self) -> u64 {
        self.progress.processed()
    }

    fn delete_template(&self) {
        let config = self.index_set.config();
        info!(
            "Deleting index template <{}> from Elasticsearch",
            config.index_template_name
        );
        match self.indices.delete_index_template(config) {
            Ok(()) => {}
            Err(IndicesError::TemplateMissing(_)) => debug!(
                "Unable to delete index template <{}> because it does not exist.",
                config.index_template_name
            ),
            Err(e) => error!(
                "Unable to delete index template <{}>: {}",
                config.index_template_name, e
            ),
        }
    }
}

impl SystemJob for IndexSetCleanupJob {
    fn execute(&self) -> Result<JobOutcome, JobError> {
        let config = self.index_set.config();
        let index_names = self.index_set.managed_indices_names();
        let total = index_names.len() as u64;
        self.progress.start(total);

        self.delete_template();

        for index_name in &index_names {
            if self.progress.is_cancel_requested() {
                info!(
                    "Cancel requested. Deleted <{}> of <{}> indices.",
                    self.progress.processed(),
                    total
                );
                return Ok(JobOutcome::Cancelled);
            }

            info!(
                "Deleting index <{}> in index set <{}> ({})",
                index_name, config.id, config.title
            );
            match self.indices.delete(index_name) {
                Ok(()) => self.progress.increment_processed(),
                Err(e) => error!("Unable to delete index <{}>: {}", index_name, e),
            }
        }

        Ok(JobOutcome::Completed)
    }

    fn request_cancel(&self) {
        self.progress.request_cancel();
    }

    fn progress(&self) -> u8 {
        self.progress.percent()
    }

    fn max_concurrency(&self) -> usize {
        MAX_CONCURRENCY
    }

    fn provides_progress(&self) -> bool {
        true
    }

    fn is_cancelable(&self) -> bool {
        true
    }

    fn description(&self) -> &str {
        DESCRIPTION
    }

    fn class_name(&self) -> &'static str {
        "IndexSetCleanupJob"
    }
}

/// Builds cleanup jobs sharing one [`Indices`] backend.
#[derive(Clone)]
pub struct IndexSetCleanupJobFactory {
    indices: Arc<dyn Indices>,
}

impl IndexSetCleanupJobFactory {
    pub fn new(indices: Arc<dyn Indices>) -> Self {
        Self { indices }
    }

    pub fn create(&self, index_set: Arc<dyn IndexSet>) -> IndexSetCleanupJob {
        IndexSetCleanupJob::new(Arc::clone(&self.indices), index_set)
    }
}
