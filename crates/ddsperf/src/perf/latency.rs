// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Round-trip latency harness
//!
//! Strict ping/ack alternation between two threads sharing one entity set:
//!
//! ```text
//! sender                                receiver
//!   | start = now, write(key = i)         |
//!   |-----------------------------------> | wait-set wakes, take()
//!   |                                     | received += 1, return_loan
//!   | <---------------- ack (channel) --- |
//!   | push(start.elapsed())               |
//! ```
//!
//! The handshake is a `crossbeam` channel of capacity one. Acks following a
//! successful drain are blocking sends; liveness acks after a wait timeout or
//! a wait/take error use `try_send` so a pending token is never duplicated.
//! A liveness ack releases the sender without producing a measurement.
//! Dropping either end unblocks the other role.
//!
//! When the sender has gone through every pair it raises the guard. A
//! receiver still short of the expected total then fails the run with
//! [`Error::SamplesLost`] instead of waiting for samples that will not come.

use super::entities::EntitySet;
use super::session::Lifecycle;
use super::setup;
use crate::config::HarnessConfig;
use crate::dds::{
    is_active, DomainParticipant, InstanceHandle, KeyedOctets, ReturnCode, StateFilter,
    LENGTH_UNLIMITED,
};
use crate::error::{Error, Result};
use crossbeam::channel::{self, Receiver, Sender, TrySendError};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Session parameters of a latency run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LatencyParams {
    /// Distinct keys, `"1"..="total_instances"`.
    pub total_instances: usize,
    /// Round trips per key.
    pub total_samples: usize,
    /// Payload bytes per sample.
    pub payload_size: usize,
}

impl LatencyParams {
    pub fn new(total_instances: usize, total_samples: usize, payload_size: usize) -> Self {
        Self {
            total_instances,
            total_samples,
            payload_size,
        }
    }

    /// Number of round trips one run performs.
    pub fn total_pairs(&self) -> usize {
        self.total_instances.saturating_mul(self.total_samples)
    }

    fn validate(&self) -> Result<()> {
        if self.total_instances == 0 {
            return Err(Error::InvalidParameter(
                "total_instances must be greater than 0".to_string(),
            ));
        }
        if self.total_samples == 0 {
            return Err(Error::InvalidParameter(
                "total_samples must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

struct LatencySession {
    entities: EntitySet,
    params: LatencyParams,
    /// One pre-built sample per instance, index `i - 1` holds key `i`.
    samples: Vec<KeyedOctets>,
}

/// Counters shared by both roles during one run.
struct RunShared {
    received: AtomicUsize,
    /// Lowered by the sender for every pair it skips.
    expected: AtomicUsize,
    /// Set by the sender when it stops early.
    abort: AtomicBool,
    /// Set by the sender once every pair has been written and acknowledged.
    sender_done: AtomicBool,
}

/// Token passed from the receiver back to the sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Ack {
    /// The pending sample was taken.
    Delivered,
    /// Nothing was taken; the pair produces no measurement.
    Idle,
}

/// Latency harness.
///
/// ```no_run
/// use ddsperf::{LatencyParams, LatencyTest, LoopbackDomain, HarnessConfig};
///
/// let domain = LoopbackDomain::new(0);
/// let mut test = LatencyTest::new(HarnessConfig::default());
/// test.initialize(domain.create_participant(), LatencyParams::new(2, 100, 64))?;
/// test.run()?;
/// println!("{} round trips", test.latencies().len());
/// test.finalize()?;
/// # Ok::<(), ddsperf::Error>(())
/// ```
pub struct LatencyTest {
    config: HarnessConfig,
    state: Lifecycle<LatencySession>,
    latencies: Vec<f64>,
}

impl LatencyTest {
    pub fn new(config: HarnessConfig) -> Self {
        Self {
            config,
            state: Lifecycle::Idle,
            latencies: Vec::new(),
        }
    }

    /// Build the entity graph on `participant` and wait for discovery.
    pub fn initialize(
        &mut self,
        participant: Arc<dyn DomainParticipant>,
        params: LatencyParams,
    ) -> Result<()> {
        self.state.check_idle()?;
        params.validate()?;

        let entities = EntitySet::build(participant, &self.config, "latency")?;
        let payload = setup::random_payload(params.payload_size);
        let samples = (1..=params.total_instances)
            .map(|instance| KeyedOctets::new(instance.to_string(), payload.clone()))
            .collect();

        log::info!(
            "[latency] initialized: {} instances x {} samples, {} bytes",
            params.total_instances,
            params.total_samples,
            params.payload_size
        );
        self.state = Lifecycle::Ready(LatencySession {
            entities,
            params,
            samples,
        });
        Ok(())
    }

    /// Perform `total_samples x total_instances` round trips.
    ///
    /// Measurements from a previous run are discarded first. Pairs whose
    /// write fails are skipped and produce no measurement. Pairs released by
    /// a receive timeout produce none either, and the run then ends with
    /// [`Error::SamplesLost`]; the measurements taken so far stay available.
    pub fn run(&mut self) -> Result<()> {
        let session = self.state.session()?;
        self.latencies.clear();
        self.latencies.reserve(session.params.total_pairs());

        let shared = RunShared {
            received: AtomicUsize::new(0),
            expected: AtomicUsize::new(session.params.total_pairs()),
            abort: AtomicBool::new(false),
            sender_done: AtomicBool::new(false),
        };
        session.entities.guard.set_trigger_value(false);

        let (ack_tx, ack_rx) = channel::bounded::<Ack>(1);
        let receive_timeout = self.config.receive_timeout();
        let latencies = &mut self.latencies;
        let shared = &shared;

        let started = Instant::now();
        let (recv_result, send_result) = thread::scope(|scope| -> Result<_> {
            let receiver = thread::Builder::new()
                .name("ddsperf-latency-rx".to_string())
                .spawn_scoped(scope, move || {
                    receive_loop(&session.entities, shared, ack_tx, receive_timeout)
                })?;

            let sender = thread::Builder::new()
                .name("ddsperf-latency-tx".to_string())
                .spawn_scoped(scope, move || {
                    let result = send_loop(session, shared, ack_rx, latencies);
                    if result.is_err() {
                        stop_receiver(&session.entities, shared);
                    }
                    result
                });
            let sender = match sender {
                Ok(handle) => handle,
                Err(e) => {
                    stop_receiver(&session.entities, shared);
                    return Err(e.into());
                }
            };

            let send_result = sender
                .join()
                .map_err(|_| Error::WorkerPanicked("latency sender"))
                .and_then(|r| r);
            let recv_result = receiver
                .join()
                .map_err(|_| Error::WorkerPanicked("latency receiver"))
                .and_then(|r| r);
            Ok((recv_result, send_result))
        })?;

        log::info!(
            "[latency] run finished: {} measurements in {:?}",
            self.latencies.len(),
            started.elapsed()
        );
        match (recv_result, send_result) {
            (_, Err(e @ Error::WorkerPanicked(_))) => Err(e),
            (recv, send) => recv.and(send),
        }
    }

    /// Measurements of the last run in milliseconds, in send order.
    pub fn latencies(&self) -> &[f64] {
        &self.latencies
    }

    /// Topic of the live session.
    pub fn topic_name(&self) -> Option<&str> {
        self.state.session().ok().map(|s| s.entities.topic_name())
    }

    pub fn is_initialized(&self) -> bool {
        self.state.is_ready()
    }

    /// Tear every entity down. The harness is unusable afterwards.
    pub fn finalize(&mut self) -> Result<()> {
        let session = self.state.finish()?;
        session.entities.teardown()?;
        log::info!("[latency] finalized");
        Ok(())
    }
}

fn stop_receiver(entities: &EntitySet, shared: &RunShared) {
    shared.abort.store(true, Ordering::SeqCst);
    entities.guard.set_trigger_value(true);
}

/// Sender role: sample index outer, instance index inner.
fn send_loop(
    session: &LatencySession,
    shared: &RunShared,
    acks: Receiver<Ack>,
    latencies: &mut Vec<f64>,
) -> Result<()> {
    let entities = &session.entities;

    for sample_idx in 1..=session.params.total_samples {
        for sample in &session.samples {
            let start = Instant::now();
            if let Err(code) = entities.writer.write(sample, InstanceHandle::NIL) {
                log::warn!(
                    "[latency] write failed (sample {}, key {}): {}",
                    sample_idx,
                    sample.key,
                    code
                );
                shared.expected.fetch_sub(1, Ordering::SeqCst);
                entities.guard.set_trigger_value(true);
                continue;
            }

            match acks.recv() {
                Ok(Ack::Delivered) => latencies.push(start.elapsed().as_secs_f64() * 1000.0),
                Ok(Ack::Idle) => log::debug!(
                    "[latency] no delivery for sample {}, key {}",
                    sample_idx,
                    sample.key
                ),
                Err(_) => {
                    log::debug!("[latency] receiver hung up at sample {}", sample_idx);
                    return Err(Error::WorkerDisconnected("latency receiver"));
                }
            }
        }
    }

    shared.sender_done.store(true, Ordering::SeqCst);
    entities.guard.set_trigger_value(true);
    Ok(())
}

/// Receiver role: drain one sample per wake and acknowledge it.
fn receive_loop(
    entities: &EntitySet,
    shared: &RunShared,
    acks: Sender<Ack>,
    timeout: Duration,
) -> Result<()> {
    while shared.received.load(Ordering::SeqCst) < shared.expected.load(Ordering::SeqCst) {
        if shared.abort.load(Ordering::SeqCst) {
            log::debug!("[latency] sender stopped, receiver exiting");
            return Ok(());
        }
        if shared.sender_done.load(Ordering::SeqCst) {
            return sender_finished(shared);
        }

        let active = match entities.waitset.wait(Some(timeout)) {
            Ok(active) => active,
            Err(ReturnCode::Timeout) => {
                log::warn!("[latency] no sample within {:?}", timeout);
                liveness_ack(&acks, shared)?;
                continue;
            }
            Err(code) => {
                log::warn!("[latency] wait failed: {}", code);
                liveness_ack(&acks, shared)?;
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
                let count = loan.len();
                if let Err(code) = entities.reader.return_loan(loan) {
                    log::warn!("[latency] return_loan failed: {}", code);
                }
                if count > 1 {
                    log::error!(
                        "[latency] {} samples available, expected exactly one",
                        count
                    );
                    return Err(Error::UnexpectedSampleCount { count });
                }

                shared.received.fetch_add(count, Ordering::SeqCst);
                if acks.send(Ack::Delivered).is_err() {
                    return disconnected(shared);
                }
            }
            Err(ReturnCode::NoData) => {
                log::debug!("[latency] woke without data");
                liveness_ack(&acks, shared)?;
            }
            Err(code) => {
                log::warn!("[latency] take failed: {}", code);
                liveness_ack(&acks, shared)?;
            }
        }
    }
    Ok(())
}

/// Release the sender after a failed wait or take without stacking tokens.
fn liveness_ack(acks: &Sender<Ack>, shared: &RunShared) -> Result<()> {
    match acks.try_send(Ack::Idle) {
        Ok(()) | Err(TrySendError::Full(_)) => Ok(()),
        Err(TrySendError::Disconnected(_)) => disconnected(shared),
    }
}

fn disconnected(shared: &RunShared) -> Result<()> {
    if shared.abort.load(Ordering::SeqCst) {
        Ok(())
    } else if shared.sender_done.load(Ordering::SeqCst) {
        sender_finished(shared)
    } else {
        Err(Error::WorkerDisconnected("latency sender"))
    }
}

/// The sender will write nothing more: succeed only if nothing is missing.
fn sender_finished(shared: &RunShared) -> Result<()> {
    let received = shared.received.load(Ordering::SeqCst);
    let expected = shared.expected.load(Ordering::SeqCst);
    if received >= expected {
        return Ok(());
    }
    log::error!(
        "[latency] sender done with {} of {} samples received",
        received,
        expected
    );
    Err(Error::SamplesLost { received, expected })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loopback::LoopbackDomain;

    fn fast_config() -> HarnessConfig {
        HarnessConfig::default()
            .with_discovery_timeout(Duration::from_secs(2))
            .with_poll_interval(Duration::from_millis(1))
    }

    #[test]
    fn test_params_validation() {
        assert!(LatencyParams::new(1, 1, 0).validate().is_ok());
        assert!(matches!(
            LatencyParams::new(0, 1, 8).validate(),
            Err(Error::InvalidParameter(_))
        ));
        assert!(matches!(
            LatencyParams::new(1, 0, 8).validate(),
            Err(Error::InvalidParameter(_))
        ));
        assert_eq!(LatencyParams::new(3, 4, 0).total_pairs(), 12);
    }

    #[test]
    fn test_run_before_initialize() {
        let mut test = LatencyTest::new(fast_config());
        assert!(matches!(test.run(), Err(Error::NotInitialized)));
        assert!(matches!(test.finalize(), Err(Error::NotInitialized)));
        assert!(test.topic_name().is_none());
    }

    #[test]
    fn test_invalid_params_leave_harness_idle() {
        let domain = LoopbackDomain::new(0);
        let mut test = LatencyTest::new(fast_config());
        let err = test
            .initialize(domain.create_participant(), LatencyParams::new(0, 5, 8))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidParameter(_)));
        assert!(!test.is_initialized());
        assert!(domain.topic_names().is_empty());
    }

    #[test]
    fn test_double_initialize_rejected() {
        let domain = LoopbackDomain::new(0);
        let mut test = LatencyTest::new(fast_config());
        test.initialize(domain.create_participant(), LatencyParams::new(1, 1, 8))
            .expect("initialize");
        let err = test
            .initialize(domain.create_participant(), LatencyParams::new(1, 1, 8))
            .unwrap_err();
        assert!(matches!(err, Error::AlreadyInitialized));
        test.finalize().expect("finalize");
    }

    fn shared(received: usize, expected: usize) -> RunShared {
        RunShared {
            received: AtomicUsize::new(received),
            expected: AtomicUsize::new(expected),
            abort: AtomicBool::new(false),
            sender_done: AtomicBool::new(false),
        }
    }

    #[test]
    fn test_liveness_ack_never_stacks() {
        let (tx, rx) = channel::bounded::<Ack>(1);
        let shared = shared(0, 1);
        liveness_ack(&tx, &shared).expect("first");
        liveness_ack(&tx, &shared).expect("second");
        assert_eq!(rx.len(), 1);
        assert_eq!(rx.try_recv(), Ok(Ack::Idle));
        liveness_ack(&tx, &shared).expect("third");

        drop(rx);
        assert!(matches!(
            liveness_ack(&tx, &shared),
            Err(Error::WorkerDisconnected(_))
        ));
        shared.abort.store(true, Ordering::SeqCst);
        assert!(liveness_ack(&tx, &shared).is_ok());
    }

    #[test]
    fn test_finished_sender_reports_missing_samples() {
        let (tx, rx) = channel::bounded::<Ack>(1);
        drop(rx);

        let lost = shared(1, 3);
        lost.sender_done.store(true, Ordering::SeqCst);
        assert!(matches!(
            liveness_ack(&tx, &lost),
            Err(Error::SamplesLost {
                received: 1,
                expected: 3
            })
        ));

        let complete = shared(3, 3);
        complete.sender_done.store(true, Ordering::SeqCst);
        assert!(liveness_ack(&tx, &complete).is_ok());
    }
}
