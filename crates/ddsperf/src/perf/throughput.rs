// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Throughput harness
//!
//! The writer publishes `total_samples` fixed-key samples back to back while
//! the reader drains in batches. When the writer is done it lowers the
//! expected total by the number of failed writes and raises the guard
//! condition so the reader's unbounded wait cannot outlive lost samples.

use super::entities::EntitySet;
use super::session::Lifecycle;
use super::setup;
use crate::config::HarnessConfig;
use crate::dds::{
    is_active, DomainParticipant, InstanceHandle, KeyedOctets, ReturnCode, StateFilter,
    LENGTH_UNLIMITED,
};
use crate::error::{Error, Result};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

/// Key of every throughput sample.
pub const THROUGHPUT_KEY: &str = "1";

/// Session parameters of a throughput run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThroughputParams {
    pub total_samples: usize,
    pub payload_size: usize,
}

impl ThroughputParams {
    pub fn new(total_samples: usize, payload_size: usize) -> Self {
        Self {
            total_samples,
            payload_size,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.total_samples == 0 {
            return Err(Error::InvalidParameter(
                "total_samples must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

struct ThroughputSession {
    entities: EntitySet,
    params: ThroughputParams,
    sample: KeyedOctets,
}

/// Throughput harness.
pub struct ThroughputTest {
    config: HarnessConfig,
    state: Lifecycle<ThroughputSession>,
}

impl ThroughputTest {
    pub fn new(config: HarnessConfig) -> Self {
        Self {
            config,
            state: Lifecycle::Idle,
        }
    }

    pub fn initialize(
        &mut self,
        participant: Arc<dyn DomainParticipant>,
        params: ThroughputParams,
    ) -> Result<()> {
        self.state.check_idle()?;
        params.validate()?;

        let entities = EntitySet::build(participant, &self.config, "throughput")?;
        let sample = KeyedOctets::new(THROUGHPUT_KEY, setup::random_payload(params.payload_size));

        log::info!(
            "[throughput] initialized: {} samples, {} bytes",
            params.total_samples,
            params.payload_size
        );
        self.state = Lifecycle::Ready(ThroughputSession {
            entities,
            params,
            sample,
        });
        Ok(())
    }

    /// Publish every sample and return how many the reader received.
    ///
    /// Meant to be called once per `initialize`; a second call measures
    /// again from a zeroed counter.
    pub fn run(&mut self) -> Result<usize> {
        let session = self.state.session()?;
        let received = AtomicUsize::new(0);
        let expected = AtomicUsize::new(session.params.total_samples);
        session.entities.guard.set_trigger_value(false);

        let received_ref = &received;
        let expected_ref = &expected;
        let started = Instant::now();

        let (write_result, read_result) = thread::scope(|scope| -> Result<_> {
            let reader = thread::Builder::new()
                .name("ddsperf-throughput-rx".to_string())
                .spawn_scoped(scope, move || {
                    read_loop(&session.entities, received_ref, expected_ref)
                })?;

            let writer = thread::Builder::new()
                .name("ddsperf-throughput-tx".to_string())
                .spawn_scoped(scope, move || write_loop(session, expected_ref));
            let writer = match writer {
                Ok(handle) => handle,
                Err(e) => {
                    // No writer: release the reader with nothing expected.
                    expected_ref.store(0, Ordering::SeqCst);
                    session.entities.guard.set_trigger_value(true);
                    return Err(e.into());
                }
            };

            let write_result = writer
                .join()
                .map_err(|_| Error::WorkerPanicked("throughput writer"));
            let read_result = reader
                .join()
                .map_err(|_| Error::WorkerPanicked("throughput reader"));
            Ok((write_result, read_result))
        })?;

        let failed = write_result?;
        read_result?;

        let count = received.load(Ordering::SeqCst);
        let elapsed = started.elapsed();
        log::info!(
            "[throughput] received {}/{} samples in {:?} ({} write failures)",
            count,
            session.params.total_samples,
            elapsed,
            failed
        );
        Ok(count)
    }

    pub fn topic_name(&self) -> Option<&str> {
        self.state.session().ok().map(|s| s.entities.topic_name())
    }

    pub fn is_initialized(&self) -> bool {
        self.state.is_ready()
    }

    pub fn finalize(&mut self) -> Result<()> {
        let session = self.state.finish()?;
        session.entities.teardown()?;
        log::info!("[throughput] finalized");
        Ok(())
    }
}

/// Returns the number of failed writes.
fn write_loop(session: &ThroughputSession, expected: &AtomicUsize) -> usize {
    let entities = &session.entities;
    let mut failed = 0usize;

    for idx in 0..session.params.total_samples {
        if let Err(code) = entities.writer.write(&session.sample, InstanceHandle::NIL) {
            failed += 1;
            log::debug!("[throughput] write {} failed: {}", idx, code);
        }
    }

    expected.fetch_sub(failed, Ordering::SeqCst);
    entities.guard.set_trigger_value(true);
    failed
}

fn read_loop(entities: &EntitySet, received: &AtomicUsize, expected: &AtomicUsize) {
    while received.load(Ordering::SeqCst) < expected.load(Ordering::SeqCst) {
        let active = match entities.waitset.wait(None) {
            Ok(active) => active,
            Err(code) => {
                log::warn!("[throughput] wait failed: {}", code);
                continue;
            }
        };

        if is_active(&active, &*entities.guard_condition) {
            entities.guard.set_trigger_value(false);
        }
        if !is_active(&active, &*entities.read_condition) {
            continue;
        }

        match entities.reader.take(LENGTH_UNLIMITED, StateFilter::ANY) {
            Ok(loan) => {
                received.fetch_add(loan.len(), Ordering::SeqCst);
                if let Err(code) = entities.reader.return_loan(loan) {
                    log::warn!("[throughput] return_loan failed: {}", code);
                }
            }
            Err(ReturnCode::NoData) => {}
            Err(code) => log::warn!("[throughput] take failed: {}", code),
        }
    }
}
