// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Syslog over TCP intake.
//!
//! Turns raw TCP byte streams into framed syslog messages and hands them to a bounded
//! process buffer. See [`pipeline`] for the per-connection stage chain and [`server`] for the
//! accept loop.

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod connection_counter;
pub mod delimiter;
pub mod dispatcher;
pub mod errors;
pub mod frame_decoder;
pub mod message;
pub mod metrics;
pub mod packet_dumper;
pub mod pipeline;
pub mod process_buffer;
pub mod server;
pub mod throughput_counter;
