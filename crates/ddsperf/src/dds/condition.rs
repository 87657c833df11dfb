// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Conditions and wait-sets
//!
//! A [`Condition`] is a boolean predicate attached to a [`WaitSet`]. When a
//! condition is attached, the wait-set registers a [`WaitsetSignal`] on it so
//! the condition can wake blocked waiters as soon as its trigger value flips
//! to `true`.

use super::DdsResult;
use std::sync::Arc;
use std::time::Duration;

/// Wake-up hook a wait-set hands to every attached condition.
pub trait WaitsetSignal: Send + Sync {
    /// Notify the wait-set that a condition may have become active.
    fn signal(&self);

    /// Stable identifier for this signal (per wait-set).
    fn id(&self) -> u64;
}

/// Condition trait - base interface for all conditions
pub trait Condition: Send + Sync {
    /// Current trigger value of this condition
    fn trigger_value(&self) -> bool;

    /// Unique identifier for this condition (for comparison)
    fn condition_id(&self) -> u64;

    /// Register a wait-set signal so this condition can wake blocked waiters.
    fn add_waitset_signal(&self, signal: Arc<dyn WaitsetSignal>);

    /// Remove a previously registered wait-set signal.
    fn remove_waitset_signal(&self, signal_id: u64);
}

/// Condition whose trigger value is under the control of the application.
pub trait GuardCondition: Condition {
    /// Set the trigger value. `true` wakes every wait-set this condition is
    /// attached to.
    fn set_trigger_value(&self, value: bool);

    /// View this guard as a plain condition for attach/detach.
    fn as_condition(self: Arc<Self>) -> Arc<dyn Condition>;
}

/// WaitSet - block until at least one attached condition triggers.
pub trait WaitSet: Send + Sync {
    /// Attach a condition. Attaching the same condition twice is
    /// `PreconditionNotMet`.
    fn attach_condition(&self, condition: Arc<dyn Condition>) -> DdsResult<()>;

    /// Detach a condition previously attached.
    fn detach_condition(&self, condition: &dyn Condition) -> DdsResult<()>;

    /// Wait until at least one condition triggers and return the triggered
    /// ones. `None` waits without bound; an elapsed timeout is
    /// `ReturnCode::Timeout`.
    fn wait(&self, timeout: Option<Duration>) -> DdsResult<Vec<Arc<dyn Condition>>>;

    /// All attached conditions.
    fn conditions(&self) -> Vec<Arc<dyn Condition>>;
}

/// Check whether `condition` is among the conditions returned by `wait`.
pub fn is_active(active: &[Arc<dyn Condition>], condition: &dyn Condition) -> bool {
    let id = condition.condition_id();
    active.iter().any(|c| c.condition_id() == id)
}
