// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Syslog TCP server: accepts connections and runs one pipeline per connection.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::time::{sleep, Duration};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::errors::{ConnectionError, FrameError};
use crate::pipeline::PipelineFactory;

// Pause after a failed accept, e.g. when the process is out of file descriptors.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(50);

/// Configuration for the syslog TCP server
pub struct SyslogTcpConfig {
    /// Host to bind the listener to (e.g., "0.0.0.0")
    pub host: String,
    /// Port to bind the listener to (e.g., 5140), 0 picks an ephemeral port
    pub port: u16,
}

pub struct SyslogTcpServer {
    cancel_token: CancellationToken,
    listener: TcpListener,
    factory: Arc<PipelineFactory>,
}

impl SyslogTcpServer {
    /// Binds the listening socket. Pipeline settings were validated when `factory` was
    /// built, so a bind failure is the only error left at this point.
    pub async fn bind(
        config: &SyslogTcpConfig,
        factory: PipelineFactory,
        cancel_token: CancellationToken,
    ) -> std::io::Result<SyslogTcpServer> {
        let addr = format!("{}:{}", config.host, config.port);
        let listener = TcpListener::bind(addr).await?;
        Ok(SyslogTcpServer {
            cancel_token,
            listener,
            factory: Arc::new(factory),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn factory(&self) -> Arc<PipelineFactory> {
        Arc::clone(&self.factory)
    }

    /// Accept loop. Returns once the cancel token fires.
    pub async fn spin(self) {
        if let Ok(addr) = self.local_addr() {
            info!("syslog-tcp: listening on {}", addr);
        }
        loop {
            tokio::select! {
                _ = self.cancel_token.cancelled() => {
                    debug!("syslog-tcp: shutting down listener");
                    break;
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => self.spawn_connection(stream, peer),
                    Err(e) => {
                        error!("Failed to accept syslog connection: {}", e);
                        sleep(ACCEPT_ERROR_BACKOFF).await;
                    }
                },
            }
        }
    }

    fn spawn_connection(&self, stream: TcpStream, peer: SocketAddr) {
        debug!("Accepted syslog connection from {}", peer);
        let pipeline = self.factory.build(peer);
        let cancel_token = self.cancel_token.clone();

        // The stream is dropped, and so closed, whichever branch completes.
        tokio::spawn(async move {
            tokio::select! {
                result = pipeline.run(stream) => match result {
                    Ok(()) => debug!("Syslog connection from {} closed by peer", peer),
                    Err(ConnectionError::Frame(e @ FrameError::FrameTooLarge { .. })) => {
                        warn!("Closing syslog connection from {}: {}", peer, e);
                    }
                    Err(e) => error!("Syslog connection from {} failed: {}", peer, e),
                },
                _ = cancel_token.cancelled() => {
                    debug!("Closing syslog connection from {} on shutdown", peer);
                }
            }
        });
    }
}
