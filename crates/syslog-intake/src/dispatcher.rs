// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::{debug, trace, warn};

use crate::errors::{BufferError, ParseError};
use crate::frame_decoder::Frame;
use crate::message::{MessageParser, MessageSource};
use crate::process_buffer::ProcessBufferHandle;

/// Dispatch outcome counters (all values use relaxed atomics).
#[derive(Debug, Default)]
pub struct DispatchCounters {
    dispatched: AtomicU64,
    parse_failures: AtomicU64,
    dropped: AtomicU64,
}

impl DispatchCounters {
    pub fn dispatched(&self) -> u64 {
        self.dispatched.load(Ordering::Relaxed)
    }

    pub fn parse_failures(&self) -> u64 {
        self.parse_failures.load(Ordering::Relaxed)
    }

    /// Messages that parsed but were not accepted by the process buffer.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Turns frames into messages and writes them to the process buffer. One per connection.
pub struct MessageDispatcher {
    parser: Arc<dyn MessageParser>,
    buffer: ProcessBufferHandle,
    source: MessageSource,
    counters: Arc<DispatchCounters>,
}

impl MessageDispatcher {
    pub fn new(
        parser: Arc<dyn MessageParser>,
        buffer: ProcessBufferHandle,
        source: MessageSource,
        counters: Arc<DispatchCounters>,
    ) -> Self {
        Self {
            parser,
            buffer,
            source,
            counters,
        }
    }

    /// Parses `frame` and writes the message to the buffer.
    ///
    /// Parse failures and write timeouts drop the frame and return `Ok`. Only a closed
    /// buffer is reported, since nothing further from this connection can be delivered.
    pub async fn dispatch(&self, frame: Frame) -> Result<(), BufferError> {
        let message = match self.parser.parse(&frame, &self.source) {
            Ok(message) => message,
            Err(e) => {
                self.counters.parse_failures.fetch_add(1, Ordering::Relaxed);
                match e {
                    // Keep-alive blank lines are common, don't spam.
                    ParseError::Empty => debug!("Dropping empty frame from {}", self.source),
                    _ => warn!(
                        "Failed to parse syslog message from {}: {}",
                        self.source, e
                    ),
                }
                return Ok(());
            }
        };

        trace!("Dispatching message from {}: {}", self.source, message.message);
        match self.buffer.write(message).await {
            Ok(()) => {
                self.counters.dispatched.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(BufferError::Timeout(_)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(BufferError::Closed) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                Err(BufferError::Closed)
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::message::RawSyslogParser;
    use crate::process_buffer::{ProcessBuffer, ProcessBufferReceiver};
    use std::net::{IpAddr, Ipv4Addr, SocketAddr};
    use std::time::Duration;
    use tracing_test::traced_test;

    fn setup(
        capacity: usize,
        timeout: Option<Duration>,
    ) -> (MessageDispatcher, ProcessBufferReceiver, Arc<DispatchCounters>) {
        let (rx, handle) = ProcessBuffer::new(capacity, timeout).unwrap();
        let counters = Arc::new(DispatchCounters::default());
        let dispatcher = MessageDispatcher::new(
            Arc::new(RawSyslogParser),
            handle,
            MessageSource {
                input_id: "syslog-tcp".to_string(),
                peer: SocketAddr::new(IpAddr::V4(Ipv4Addr::new(192, 168, 1, 9)), 40000),
            },
            Arc::clone(&counters),
        );
        (dispatcher, rx, counters)
    }

    #[tokio::test]
    async fn test_dispatch_writes_to_buffer() {
        let (dispatcher, mut rx, counters) = setup(4, None);
        dispatcher
            .dispatch(Frame::new(&b"<13>hello"[..]))
            .await
            .unwrap();

        let message = rx.recv().await.unwrap();
        assert_eq!(message.message, "<13>hello");
        assert_eq!(message.source.port(), 40000);
        assert_eq!(counters.dispatched(), 1);
    }

    #[tokio::test]
    #[traced_test]
    async fn test_parse_failure_is_dropped_and_logged() {
        let (dispatcher, mut rx, counters) = setup(4, None);
        dispatcher
            .dispatch(Frame::new(&b"<999>broken"[..]))
            .await
            .unwrap();

        assert!(rx.try_recv().is_none());
        assert_eq!(counters.parse_failures(), 1);
        assert_eq!(counters.dispatched(), 0);
        assert!(logs_contain("Failed to parse syslog message"));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_empty_frame_is_quietly_dropped() {
        let (dispatcher, _rx, counters) = setup(4, None);
        dispatcher.dispatch(Frame::new(&b""[..])).await.unwrap();

        assert_eq!(counters.parse_failures(), 1);
        assert!(!logs_contain("Failed to parse syslog message"));
        assert!(logs_contain("Dropping empty frame"));
    }

    #[tokio::test]
    async fn test_timeout_drops_without_error() {
        let (dispatcher, _rx, counters) = setup(1, Some(Duration::from_millis(10)));
        dispatcher.dispatch(Frame::new(&b"one"[..])).await.unwrap();
        dispatcher.dispatch(Frame::new(&b"two"[..])).await.unwrap();

        assert_eq!(counters.dispatched(), 1);
        assert_eq!(counters.dropped(), 1);
    }

    #[tokio::test]
    async fn test_closed_buffer_is_reported() {
        let (dispatcher, mut rx, counters) = setup(1, None);
        rx.close();
        let result = dispatcher.dispatch(Frame::new(&b"late"[..])).await;
        assert_eq!(result, Err(BufferError::Closed));
        assert_eq!(counters.dropped(), 1);
    }
}
