// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Mock index backends and jobs for testing

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use system_jobs::{
    errors::{IndicesError, JobError},
    index_set::{IndexSetConfig, ManagedIndexSet},
    indices::Indices,
    job::{JobOutcome, JobProgress, SystemJob},
};

const GATE_TIMEOUT: Duration = Duration::from_secs(5);

/// Build an index set named `graylog` with indices `graylog_0..count`
pub fn index_set(count: usize) -> Arc<ManagedIndexSet> {
    let config = IndexSetConfig {
        id: "graylog-default".to_string(),
        title: "Default index set".to_string(),
        index_template_name: "graylog-template".to_string(),
    };
    let names = (0..count).map(|i| format!("graylog_{i}")).collect();
    Arc::new(ManagedIndexSet::new(config, names))
}

/// Indices backend with scripted failures
#[derive(Default)]
pub struct ScriptedIndices {
    pub template_missing: bool,
    pub failing: HashSet<String>,
    pub deleted: Mutex<Vec<String>>,
}

impl ScriptedIndices {
    pub fn failing(names: &[&str]) -> Self {
        Self {
            failing: names.iter().map(|n| n.to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn template_missing() -> Self {
        Self {
            template_missing: true,
            ..Default::default()
        }
    }

    pub fn deleted(&self) -> Vec<String> {
        self.deleted.lock().expect("lock poisoned").clone()
    }
}

impl Indices for ScriptedIndices {
    fn delete_index_template(&self, config: &IndexSetConfig) -> Result<(), IndicesError> {
        if self.template_missing {
            return Err(IndicesError::TemplateMissing(
                config.index_template_name.clone(),
            ));
        }
        Ok(())
    }

    fn delete(&self, index_name: &str) -> Result<(), IndicesError> {
        if self.failing.contains(index_name) {
            return Err(IndicesError::Other(format!("failed to delete {index_name}")));
        }
        self.deleted
            .lock()
            .expect("lock poisoned")
            .push(index_name.to_string());
        Ok(())
    }
}

/// Rendezvous between a job thread and the test
pub struct Gate {
    paused_tx: Mutex<Sender<()>>,
    paused_rx: Mutex<Receiver<()>>,
    release_tx: Mutex<Sender<()>>,
    release_rx: Mutex<Receiver<()>>,
}

impl Default for Gate {
    fn default() -> Self {
        let (paused_tx, paused_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        Self {
            paused_tx: Mutex::new(paused_tx),
            paused_rx: Mutex::new(paused_rx),
            release_tx: Mutex::new(release_tx),
            release_rx: Mutex::new(release_rx),
        }
    }
}

impl Gate {
    /// Called from the job thread: signal the test and block until released
    pub fn pause(&self) {
        let _ = self.paused_tx.lock().expect("lock poisoned").send(());
        let _ = self
            .release_rx
            .lock()
            .expect("lock poisoned")
            .recv_timeout(GATE_TIMEOUT);
    }

    pub fn wait_until_paused(&self) {
        self.paused_rx
            .lock()
            .expect("lock poisoned")
            .recv_timeout(GATE_TIMEOUT)
            .expect("job never reached the gate");
    }

    pub fn release(&self) {
        let _ = self.release_tx.lock().expect("lock poisoned").send(());
    }
}

/// Indices backend that pauses inside the `pause_on`-th (1-based) index deletion
pub struct GatedIndices {
    pub pause_on: usize,
    pub gate: Gate,
    calls: AtomicUsize,
    deleted: Mutex<Vec<String>>,
}

impl GatedIndices {
    pub fn new(pause_on: usize) -> Self {
        Self {
            pause_on,
            gate: Gate::default(),
            calls: AtomicUsize::new(0),
            deleted: Mutex::new(Vec::new()),
        }
    }

    pub fn deleted(&self) -> Vec<String> {
        self.deleted.lock().expect("lock poisoned").clone()
    }
}

impl Indices for GatedIndices {
    fn delete_index_template(&self, _config: &IndexSetConfig) -> Result<(), IndicesError> {
        Ok(())
    }

    fn delete(&self, index_name: &str) -> Result<(), IndicesError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call == self.pause_on {
            self.gate.pause();
        }
        self.deleted
            .lock()
            .expect("lock poisoned")
            .push(index_name.to_string());
        Ok(())
    }
}

/// Job that blocks in `execute` until its gate is released, limited to one at a time
#[derive(Default)]
pub struct GatedJob {
    pub gate: Gate,
    progress: JobProgress,
}

impl SystemJob for GatedJob {
    fn execute(&self) -> Result<JobOutcome, JobError> {
        self.progress.start(1);
        self.gate.pause();
        self.progress.increment_processed();
        Ok(JobOutcome::Completed)
    }

    fn request_cancel(&self) {
        self.progress.request_cancel();
    }

    fn progress(&self) -> u8 {
        self.progress.percent()
    }

    fn max_concurrency(&self) -> usize {
        1
    }

    fn provides_progress(&self) -> bool {
        false
    }

    fn is_cancelable(&self) -> bool {
        false
    }

    fn description(&self) -> &str {
        "Waits for the test to release it."
    }

    fn class_name(&self) -> &'static str {
        "GatedJob"
    }
}
