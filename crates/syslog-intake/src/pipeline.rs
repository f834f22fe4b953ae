// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Per-connection processing chain for syslog over TCP.
//!
//! A [`PipelineFactory`] is validated once from static settings and then builds one
//! [`Pipeline`] per accepted connection. The stage order is fixed:
//!
//! ```text
//!   socket bytes
//!        │
//!        v
//!   packet-meta-dumper   trace raw reads
//!        │
//!   connection-counter   open/close accounting, independent of decode outcome
//!        │
//!   framer               bytes -> frames, enforces the max frame size
//!        │
//!   traffic-counter      sees well formed frames only
//!        │
//!   handler              frame -> message -> process buffer (may park)
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::codec::Decoder;
use tracing::debug;

use crate::connection_counter::ConnectionCounter;
use crate::delimiter::DelimiterStrategy;
use crate::dispatcher::MessageDispatcher;
use crate::errors::{ConnectionError, Creation, FrameError};
use crate::frame_decoder::{Frame, FrameDecoder, OversizedFramePolicy, DEFAULT_MAX_FRAME_SIZE};
use crate::message::{MessageParser, MessageSource};
use crate::metrics::InputMetrics;
use crate::packet_dumper::PacketInformationDumper;
use crate::process_buffer::ProcessBufferHandle;
use crate::throughput_counter::ThroughputCounter;

const READ_BUFFER_SIZE: usize = 8192;

/// Stage names in processing order.
pub const STAGES: [&str; 5] = [
    "packet-meta-dumper",
    "connection-counter",
    "framer",
    "traffic-counter",
    "handler",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineConfig {
    pub use_null_delimiter: bool,
    pub max_frame_size: usize,
    pub oversized_frame_policy: OversizedFramePolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            use_null_delimiter: false,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            oversized_frame_policy: OversizedFramePolicy::default(),
        }
    }
}

impl PipelineConfig {
    /// Builds a config from a textual delimiter mode (`line` or `null`).
    pub fn from_mode(
        delimiter_mode: &str,
        max_frame_size: usize,
        oversized_frame_policy: OversizedFramePolicy,
    ) -> Result<Self, Creation> {
        let strategy: DelimiterStrategy = delimiter_mode.parse()?;
        let config = Self {
            use_null_delimiter: strategy == DelimiterStrategy::NullByte,
            max_frame_size,
            oversized_frame_policy,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn delimiter(&self) -> DelimiterStrategy {
        DelimiterStrategy::from_null_flag(self.use_null_delimiter)
    }

    pub fn validate(&self) -> Result<(), Creation> {
        if self.max_frame_size == 0 {
            return Err(Creation::InvalidMaxFrameSize);
        }
        Ok(())
    }
}

/// Builds per-connection pipelines that share one input's parser, buffer and metrics.
pub struct PipelineFactory {
    config: PipelineConfig,
    input_id: String,
    parser: Arc<dyn MessageParser>,
    buffer: ProcessBufferHandle,
    metrics: InputMetrics,
}

impl PipelineFactory {
    /// Fails if `config` is invalid; nothing is built in that case.
    pub fn new(
        config: PipelineConfig,
        input_id: impl Into<String>,
        parser: Arc<dyn MessageParser>,
        buffer: ProcessBufferHandle,
        metrics: InputMetrics,
    ) -> Result<Self, Creation> {
        config.validate()?;
        Ok(Self {
            config,
            input_id: input_id.into(),
            parser,
            buffer,
            metrics,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn metrics(&self) -> &InputMetrics {
        &self.metrics
    }

    pub fn build(&self, peer: SocketAddr) -> Pipeline {
        let source = MessageSource {
            input_id: self.input_id.clone(),
            peer,
        };
        Pipeline {
            dumper: PacketInformationDumper::new(source.clone()),
            connections: Arc::clone(&self.metrics.connections),
            decoder: FrameDecoder::new(
                self.config.delimiter(),
                self.config.max_frame_size,
                self.config.oversized_frame_policy,
            ),
            throughput: Arc::clone(&self.metrics.throughput),
            reported_discards: 0,
            dispatcher: MessageDispatcher::new(
                Arc::clone(&self.parser),
                self.buffer.clone(),
                source,
                Arc::clone(&self.metrics.dispatch),
            ),
        }
    }
}

/// The stage chain of one connection. Fields are declared in stage order.
pub struct Pipeline {
    dumper: PacketInformationDumper,
    connections: Arc<ConnectionCounter>,
    decoder: FrameDecoder,
    throughput: Arc<ThroughputCounter>,
    // Decoder discards already added to the throughput counter.
    reported_discards: u64,
    dispatcher: MessageDispatcher,
}

impl Pipeline {
    pub fn stage_names(&self) -> &'static [&'static str] {
        &STAGES
    }

    /// Drives the connection until EOF or a fatal error.
    ///
    /// `Ok` means the peer closed the stream. An error means the caller must drop the
    /// connection; no partial frame has been dispatched.
    pub async fn run<R>(mut self, mut reader: R) -> Result<(), ConnectionError>
    where
        R: AsyncRead + Unpin,
    {
        self.dumper.on_connect();
        let _connection = self.connections.track();

        let result = self.process(&mut reader).await;
        self.dumper.on_disconnect();
        result
    }

    async fn process<R>(&mut self, reader: &mut R) -> Result<(), ConnectionError>
    where
        R: AsyncRead + Unpin,
    {
        let mut buf = BytesMut::with_capacity(READ_BUFFER_SIZE);
        loop {
            buf.reserve(READ_BUFFER_SIZE);
            let read = reader.read_buf(&mut buf).await.map_err(FrameError::from)?;
            if read == 0 {
                while let Some(frame) = self.next_frame(&mut buf, true)? {
                    self.deliver(frame).await?;
                }
                debug!("End of stream");
                return Ok(());
            }

            self.dumper.on_read(&buf[buf.len() - read..]);
            while let Some(frame) = self.next_frame(&mut buf, false)? {
                self.deliver(frame).await?;
            }
        }
    }

    /// Decodes the next frame and meters oversized frames as soon as the decoder drops them.
    fn next_frame(
        &mut self,
        buf: &mut BytesMut,
        eof: bool,
    ) -> Result<Option<Frame>, FrameError> {
        let result = if eof {
            self.decoder.decode_eof(buf)
        } else {
            self.decoder.decode(buf)
        };

        let discarded = self.decoder.discarded_frames();
        if discarded > self.reported_discards {
            self.throughput.on_oversized(discarded - self.reported_discards);
            self.reported_discards = discarded;
        }
        if let Err(FrameError::FrameTooLarge { .. }) = &result {
            self.throughput.on_oversized(1);
        }
        result
    }

    async fn deliver(&self, frame: Frame) -> Result<(), ConnectionError> {
        self.throughput.on_frame(&frame);
        self.dispatcher
            .dispatch(frame)
            .await
            .map_err(|_| ConnectionError::BufferClosed)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::message::RawSyslogParser;
    use crate::process_buffer::{ProcessBuffer, ProcessBufferReceiver};
    use std::net::{IpAddr, Ipv4Addr};
    use tokio::io::AsyncWriteExt;

    fn peer() -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::new(172, 16, 0, 3)), 51000)
    }

    fn factory(config: PipelineConfig) -> (PipelineFactory, ProcessBufferReceiver) {
        let (rx, handle) = ProcessBuffer::new(64, None).unwrap();
        let metrics = InputMetrics::with_buffer(handle.counters());
        let factory =
            PipelineFactory::new(config, "syslog-tcp", Arc::new(RawSyslogParser), handle, metrics)
                .unwrap();
        (factory, rx)
    }

    fn drain(rx: &mut ProcessBufferReceiver) -> Vec<String> {
        std::iter::from_fn(|| rx.try_recv())
            .map(|m| m.message)
            .collect()
    }

    #[test]
    fn test_stage_order() {
        let (factory, _rx) = factory(PipelineConfig::default());
        let pipeline = factory.build(peer());
        assert_eq!(
            pipeline.stage_names(),
            &[
                "packet-meta-dumper",
                "connection-counter",
                "framer",
                "traffic-counter",
                "handler"
            ]
        );
    }

    #[test]
    fn test_config_from_mode() {
        let config =
            PipelineConfig::from_mode("null", 1024, OversizedFramePolicy::Discard).unwrap();
        assert!(config.use_null_delimiter);
        assert_eq!(config.delimiter(), DelimiterStrategy::NullByte);

        assert!(matches!(
            PipelineConfig::from_mode("crlf-only", 1024, OversizedFramePolicy::Disconnect),
            Err(Creation::UnknownDelimiter(_))
        ));
        assert!(matches!(
            PipelineConfig::from_mode("line", 0, OversizedFramePolicy::Disconnect),
            Err(Creation::InvalidMaxFrameSize)
        ));
    }

    #[test]
    fn test_factory_rejects_invalid_config() {
        let (_rx, handle) = ProcessBuffer::new(1, None).unwrap();
        let result = PipelineFactory::new(
            PipelineConfig {
                max_frame_size: 0,
                ..Default::default()
            },
            "syslog-tcp",
            Arc::new(RawSyslogParser),
            handle,
            InputMetrics::default(),
        );
        assert!(matches!(result, Err(Creation::InvalidMaxFrameSize)));
    }

    #[tokio::test]
    async fn test_run_dispatches_frames_and_counts() {
        let (factory, mut rx) = factory(PipelineConfig::default());
        let input: &[u8] = b"<13>first\r\n<14>second\n\nnot terminated";

        factory.build(peer()).run(input).await.unwrap();

        assert_eq!(drain(&mut rx), vec!["<13>first", "<14>second"]);
        let snapshot = factory.metrics().snapshot();
        assert_eq!(snapshot.frames, 3);
        assert_eq!(snapshot.frame_bytes, 9 + 10);
        assert_eq!(snapshot.dispatched, 2);
        assert_eq!(snapshot.parse_failures, 1);
        assert_eq!(snapshot.open_connections, 0);
        assert_eq!(snapshot.total_connections, 1);
    }

    #[tokio::test]
    async fn test_null_delimited_stream() {
        let (factory, mut rx) = factory(PipelineConfig {
            use_null_delimiter: true,
            ..Default::default()
        });
        let input: &[u8] = b"<13>line one\nstill one\0<13>two\0";

        factory.build(peer()).run(input).await.unwrap();

        assert_eq!(drain(&mut rx), vec!["<13>line one\nstill one", "<13>two"]);
    }

    #[tokio::test]
    async fn test_oversized_frame_disconnects() {
        let (factory, mut rx) = factory(PipelineConfig {
            max_frame_size: 8,
            ..Default::default()
        });
        let input: &[u8] = b"<13>ok\n0123456789abcdef\n<13>never\n";

        let result = factory.build(peer()).run(input).await;

        assert!(matches!(
            result,
            Err(ConnectionError::Frame(FrameError::FrameTooLarge { max: 8, .. }))
        ));
        assert_eq!(drain(&mut rx), vec!["<13>ok"]);
        let snapshot = factory.metrics().snapshot();
        assert_eq!(snapshot.oversized_frames, 1);
        assert_eq!(snapshot.frames, 1);
        assert_eq!(snapshot.open_connections, 0);
    }

    #[tokio::test]
    async fn test_oversized_frame_discarded() {
        let (factory, mut rx) = factory(PipelineConfig {
            max_frame_size: 8,
            oversized_frame_policy: OversizedFramePolicy::Discard,
            ..Default::default()
        });
        let input: &[u8] = b"<13>ok\n0123456789abcdef\n<13>next\n";

        factory.build(peer()).run(input).await.unwrap();

        assert_eq!(drain(&mut rx), vec!["<13>ok", "<13>next"]);
        let snapshot = factory.metrics().snapshot();
        assert_eq!(snapshot.oversized_frames, 1);
        assert_eq!(snapshot.frames, 2);
    }

    #[tokio::test]
    async fn test_discarded_frames_are_counted_while_connected() {
        let (factory, mut rx) = factory(PipelineConfig {
            max_frame_size: 8,
            oversized_frame_policy: OversizedFramePolicy::Discard,
            ..Default::default()
        });
        let (mut client, server) = tokio::io::duplex(256);
        let connection = tokio::spawn(factory.build(peer()).run(server));

        client
            .write_all(b"0123456789abcdef\n<13>next\n")
            .await
            .unwrap();
        let message = rx.recv().await.unwrap();
        assert_eq!(message.message, "<13>next");

        let snapshot = factory.metrics().snapshot();
        assert_eq!(snapshot.oversized_frames, 1);
        assert_eq!(snapshot.open_connections, 1);

        drop(client);
        connection.await.unwrap().unwrap();
        assert_eq!(factory.metrics().snapshot().oversized_frames, 1);
    }

    #[tokio::test]
    async fn test_closed_buffer_ends_connection() {
        let (factory, mut rx) = factory(PipelineConfig::default());
        rx.close();
        let input: &[u8] = b"<13>one\n<13>two\n";

        let result = factory.build(peer()).run(input).await;

        assert!(matches!(result, Err(ConnectionError::BufferClosed)));
        assert_eq!(factory.metrics().snapshot().open_connections, 0);
    }
}
