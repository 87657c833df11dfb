// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Condition-variable backed wait-set, guard and read conditions.

use super::endpoint::LoopbackReader;
use crate::dds::{Condition, DdsResult, GuardCondition, ReturnCode, StateFilter, WaitSet, WaitsetSignal};
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

static NEXT_CONDITION_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_SIGNAL_ID: AtomicU64 = AtomicU64::new(1);

fn next_condition_id() -> u64 {
    NEXT_CONDITION_ID.fetch_add(1, Ordering::Relaxed)
}

struct WaitsetHook {
    id: u64,
    signal: Weak<dyn WaitsetSignal>,
}

/// Wait-set signals registered on one condition.
#[derive(Default)]
pub(crate) struct SignalHooks {
    hooks: Mutex<Vec<WaitsetHook>>,
}

impl SignalHooks {
    fn add(&self, signal: &Arc<dyn WaitsetSignal>) {
        let mut hooks = self.hooks.lock();
        hooks.retain(|hook| hook.signal.upgrade().is_some());
        hooks.push(WaitsetHook {
            id: signal.id(),
            signal: Arc::downgrade(signal),
        });
    }

    fn remove(&self, signal_id: u64) {
        self.hooks.lock().retain(|hook| hook.id != signal_id);
    }

    pub(crate) fn notify(&self) {
        self.hooks.lock().retain(|hook| {
            if let Some(signal) = hook.signal.upgrade() {
                signal.signal();
                true
            } else {
                false
            }
        });
    }
}

struct WaitsetWake {
    id: u64,
    pending: Mutex<bool>,
    cv: Condvar,
}

impl WaitsetSignal for WaitsetWake {
    fn signal(&self) {
        *self.pending.lock() = true;
        self.cv.notify_all();
    }

    fn id(&self) -> u64 {
        self.id
    }
}

/// Wait-set blocking on a condition variable until an attached condition
/// signals.
pub struct LoopbackWaitSet {
    entries: Mutex<Vec<Arc<dyn Condition>>>,
    wake: Arc<WaitsetWake>,
}

impl LoopbackWaitSet {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            wake: Arc::new(WaitsetWake {
                id: NEXT_SIGNAL_ID.fetch_add(1, Ordering::Relaxed),
                pending: Mutex::new(false),
                cv: Condvar::new(),
            }),
        }
    }

    fn triggered(&self) -> Vec<Arc<dyn Condition>> {
        let entries = self.entries.lock().clone();
        entries
            .into_iter()
            .filter(|cond| cond.trigger_value())
            .collect()
    }
}

impl Default for LoopbackWaitSet {
    fn default() -> Self {
        Self::new()
    }
}

impl WaitSet for LoopbackWaitSet {
    fn attach_condition(&self, condition: Arc<dyn Condition>) -> DdsResult<()> {
        {
            let mut entries = self.entries.lock();
            let id = condition.condition_id();
            if entries.iter().any(|c| c.condition_id() == id) {
                return Err(ReturnCode::PreconditionNotMet);
            }
            entries.push(Arc::clone(&condition));
        }

        let signal: Arc<dyn WaitsetSignal> = self.wake.clone();
        condition.add_waitset_signal(signal);
        Ok(())
    }

    fn detach_condition(&self, condition: &dyn Condition) -> DdsResult<()> {
        let id = condition.condition_id();
        let removed = {
            let mut entries = self.entries.lock();
            let pos = entries
                .iter()
                .position(|c| c.condition_id() == id)
                .ok_or(ReturnCode::PreconditionNotMet)?;
            entries.remove(pos)
        };
        removed.remove_waitset_signal(self.wake.id);
        Ok(())
    }

    fn wait(&self, timeout: Option<Duration>) -> DdsResult<Vec<Arc<dyn Condition>>> {
        let deadline = timeout.map(|t| Instant::now() + t);

        loop {
            // Clear before evaluating so a signal racing the evaluation is kept.
            *self.wake.pending.lock() = false;

            let triggered = self.triggered();
            if !triggered.is_empty() {
                return Ok(triggered);
            }

            let mut pending = self.wake.pending.lock();
            while !*pending {
                match deadline {
                    Some(deadline) => {
                        if self.wake.cv.wait_until(&mut pending, deadline).timed_out() {
                            drop(pending);
                            let triggered = self.triggered();
                            if triggered.is_empty() {
                                return Err(ReturnCode::Timeout);
                            }
                            return Ok(triggered);
                        }
                    }
                    None => self.wake.cv.wait(&mut pending),
                }
            }
        }
    }

    fn conditions(&self) -> Vec<Arc<dyn Condition>> {
        self.entries.lock().clone()
    }
}

/// Application-controlled condition.
pub struct LoopbackGuardCondition {
    id: u64,
    trigger_value: AtomicBool,
    hooks: SignalHooks,
}

impl LoopbackGuardCondition {
    pub fn new() -> Self {
        Self {
            id: next_condition_id(),
            trigger_value: AtomicBool::new(false),
            hooks: SignalHooks::default(),
        }
    }
}

impl Default for LoopbackGuardCondition {
    fn default() -> Self {
        Self::new()
    }
}

impl Condition for LoopbackGuardCondition {
    fn trigger_value(&self) -> bool {
        self.trigger_value.load(Ordering::Acquire)
    }

    fn condition_id(&self) -> u64 {
        self.id
    }

    fn add_waitset_signal(&self, signal: Arc<dyn WaitsetSignal>) {
        self.hooks.add(&signal);
        if self.trigger_value() {
            signal.signal();
        }
    }

    fn remove_waitset_signal(&self, signal_id: u64) {
        self.hooks.remove(signal_id);
    }
}

impl GuardCondition for LoopbackGuardCondition {
    fn set_trigger_value(&self, value: bool) {
        self.trigger_value.store(value, Ordering::Release);
        if value {
            self.hooks.notify();
        }
    }

    fn as_condition(self: Arc<Self>) -> Arc<dyn Condition> {
        self
    }
}

/// Condition that holds while the owning reader caches a sample matching
/// its state filter.
pub struct LoopbackReadCondition {
    id: u64,
    filter: StateFilter,
    reader: Weak<LoopbackReader>,
    hooks: SignalHooks,
}

impl LoopbackReadCondition {
    pub(crate) fn new(filter: StateFilter, reader: Weak<LoopbackReader>) -> Self {
        Self {
            id: next_condition_id(),
            filter,
            reader,
            hooks: SignalHooks::default(),
        }
    }

    pub fn filter(&self) -> StateFilter {
        self.filter
    }

    pub(crate) fn notify(&self) {
        self.hooks.notify();
    }
}

impl Condition for LoopbackReadCondition {
    fn trigger_value(&self) -> bool {
        self.reader
            .upgrade()
            .is_some_and(|reader| reader.has_matching(self.filter))
    }

    fn condition_id(&self) -> u64 {
        self.id
    }

    fn add_waitset_signal(&self, signal: Arc<dyn WaitsetSignal>) {
        self.hooks.add(&signal);
        if self.trigger_value() {
            signal.signal();
        }
    }

    fn remove_waitset_signal(&self, signal_id: u64) {
        self.hooks.remove(signal_id);
    }
}
