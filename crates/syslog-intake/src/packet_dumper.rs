// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use tracing::{enabled, trace, Level};

use crate::message::MessageSource;

/// First pipeline stage: traces raw connection events before any other stage sees them.
#[derive(Debug, Clone)]
pub struct PacketInformationDumper {
    source: MessageSource,
}

impl PacketInformationDumper {
    pub fn new(source: MessageSource) -> Self {
        Self { source }
    }

    pub fn on_connect(&self) {
        trace!("Connection from {}", self.source);
    }

    pub fn on_read(&self, bytes: &[u8]) {
        if !enabled!(Level::TRACE) {
            return;
        }
        trace!(
            "Read {} bytes from {}: {:?}",
            bytes.len(),
            self.source,
            String::from_utf8_lossy(bytes)
        );
    }

    pub fn on_disconnect(&self) {
        trace!("Connection from {} closed", self.source);
    }
}
