// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Latency and throughput harnesses.
//!
//! Both harnesses follow the same lifecycle: `initialize` creates every
//! entity on the injected participant and waits for discovery, `run`
//! measures on two worker threads, `finalize` deletes every entity in
//! reverse dependency order.

pub(crate) mod entities;
pub mod latency;
mod session;
pub mod setup;
pub mod throughput;

pub use latency::{LatencyParams, LatencyTest};
pub use throughput::{ThroughputParams, ThroughputTest};
