// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # ddsperf - DDS latency and throughput harness
//!
//! Measures round-trip latency and one-way throughput of any middleware that
//! implements the [`dds`] collaborator traits. The participant is injected,
//! so the same harness drives a real DDS stack or the in-process
//! [`loopback`] bus used by the tests.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ddsperf::{HarnessConfig, LatencyParams, LatencyStats, LatencyTest, LoopbackDomain};
//!
//! fn main() -> ddsperf::Result<()> {
//!     let domain = LoopbackDomain::new(0);
//!
//!     let mut test = LatencyTest::new(HarnessConfig::default());
//!     test.initialize(domain.create_participant(), LatencyParams::new(4, 1000, 256))?;
//!     test.run()?;
//!
//!     let stats = LatencyStats::from_samples(test.latencies());
//!     println!("p99 = {:.3} ms", stats.p99);
//!
//!     test.finalize()
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +-------------------------------------------------------------+
//! |  LatencyTest / ThroughputTest    (perf)                     |
//! |    initialize -> run* -> finalize                           |
//! +-------------------------------------------------------------+
//! |  EntitySet: publisher, subscriber, topic, writer, reader,   |
//! |             wait-set, read condition, guard condition       |
//! +-------------------------------------------------------------+
//! |  dds traits  <-- implemented by a real stack or `loopback`  |
//! +-------------------------------------------------------------+
//! ```
//!
//! ## Modules Overview
//!
//! - [`perf`] - the two harnesses and their setup helpers
//! - [`dds`] - collaborator contract (entities, QoS, conditions)
//! - [`loopback`] - in-process implementation of the contract
//! - [`config`] - timing knobs and discovery policy
//! - [`stats`] / [`export`] - result summaries and flat export

pub mod config;
pub mod dds;
pub mod error;
pub mod export;
pub mod loopback;
pub mod perf;
pub mod stats;

pub use config::{DiscoveryPolicy, HarnessConfig};
pub use error::{Error, Result};
pub use export::{decode_latencies, encode_latencies};
pub use loopback::{LoopbackDomain, LoopbackFaults};
pub use perf::{LatencyParams, LatencyTest, ThroughputParams, ThroughputTest};
pub use stats::LatencyStats;
