// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

mod config;

use std::{env, sync::Arc};
use tokio::time::{interval, Duration};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use syslog_intake::{
    message::RawSyslogParser,
    metrics::InputMetrics,
    pipeline::PipelineFactory,
    process_buffer::{ProcessBuffer, ProcessBufferReceiver},
    server::SyslogTcpServer,
};
use system_jobs::manager::SystemJobManager;

use crate::config::ServerConfig;

const METRICS_LOG_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
pub async fn main() {
    let log_level = env::var("LOG_LEVEL")
        .map(|val| val.to_lowercase())
        .unwrap_or("info".to_string());

    #[allow(clippy::expect_used)]
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_new(log_level).expect("could not parse log level in configuration"),
        )
        .with_level(true)
        .with_thread_names(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .with_file(false)
        .with_target(true)
        .without_time()
        .finish();

    #[allow(clippy::expect_used)]
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    debug!("Logging subsystem enabled");

    let config = match ServerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration, shutting down: {}", e);
            return;
        }
    };

    let pipeline_config = match config.pipeline_config() {
        Ok(pipeline_config) => pipeline_config,
        Err(e) => {
            error!("Invalid pipeline configuration, shutting down: {}", e);
            return;
        }
    };

    let (buffer_rx, buffer_handle) =
        match ProcessBuffer::new(config.process_buffer_size, config.process_buffer_timeout()) {
            Ok(buffer) => buffer,
            Err(e) => {
                error!("Unable to create process buffer: {}", e);
                return;
            }
        };
    let metrics = InputMetrics::with_buffer(buffer_handle.counters());

    let factory = match PipelineFactory::new(
        pipeline_config,
        config.input_id.clone(),
        Arc::new(RawSyslogParser),
        buffer_handle,
        metrics.clone(),
    ) {
        Ok(factory) => factory,
        Err(e) => {
            error!("Unable to create syslog pipeline: {}", e);
            return;
        }
    };

    let cancel_token = CancellationToken::new();
    let server =
        match SyslogTcpServer::bind(&config.tcp_config(), factory, cancel_token.clone()).await {
            Ok(server) => server,
            Err(e) => {
                error!(
                    "Unable to bind syslog listener on {}:{}: {}",
                    config.host, config.port, e
                );
                return;
            }
        };

    info!(
        "Starting syslog TCP input {} (delimiter: {}, max frame size: {} bytes)",
        config.input_id, config.delimiter_mode, config.max_frame_size
    );

    let job_manager = SystemJobManager::new();

    let server_handle = tokio::spawn(server.spin());
    let drain_handle = tokio::spawn(drain_process_buffer(buffer_rx));

    let mut metrics_interval = interval(METRICS_LOG_INTERVAL);
    metrics_interval.tick().await;

    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    error!("Unable to listen for shutdown signal: {}", e);
                }
                info!("Shutting down syslog TCP input {}", config.input_id);
                cancel_token.cancel();
                let cancelled = job_manager.request_cancel_all();
                if cancelled > 0 {
                    info!("Requested cancellation of {} system jobs", cancelled);
                }
                break;
            }
            _ = metrics_interval.tick() => {
                info!("{}: {}", config.input_id, metrics.snapshot());
                log_system_jobs(&job_manager);
                job_manager.remove_finished();
            }
        }
    }

    if let Err(e) = server_handle.await {
        error!("Syslog server task failed: {}", e);
    }
    // The drain task ends once every connection has released its buffer handle.
    if let Err(e) = drain_handle.await {
        error!("Process buffer drain task failed: {}", e);
    }
    info!("Final metrics for {}: {}", config.input_id, metrics.snapshot());
    log_system_jobs(&job_manager);
}

fn log_system_jobs(job_manager: &SystemJobManager) {
    let jobs = job_manager.list();
    if jobs.is_empty() {
        return;
    }
    match serde_json::to_string(&jobs) {
        Ok(json) => info!("System jobs: {}", json),
        Err(e) => error!("Unable to serialize system job list: {}", e),
    }
}

async fn drain_process_buffer(mut buffer_rx: ProcessBufferReceiver) {
    while let Some(message) = buffer_rx.recv().await {
        match serde_json::to_string(&message) {
            Ok(json) => debug!("{}", json),
            Err(e) => error!("Unable to serialize message from {}: {}", message.source, e),
        }
    }
    debug!("Process buffer closed");
}
