// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! In-process loopback bus
//!
//! Implements the [`crate::dds`] collaborator contract without any network:
//! writers copy samples straight into the caches of matched readers living in
//! the same process.
//!
//! # Architecture
//!
//! ```text
//! LoopbackDomain
//! +-- topics: DashMap<topic name, Arc<TopicBus>>
//!
//! TopicBus (one per topic name, shared by all participants)
//! +-- writers: RwLock<Vec<Arc<LoopbackWriter>>>
//! +-- readers: RwLock<Vec<Arc<LoopbackReader>>>
//! +-- bindings: live LoopbackTopic handles; the bus is dropped at zero
//! +-- journal: keys of accepted writes, kept only when recording is on
//! ```
//!
//! # Matching
//!
//! A writer and a reader on the same topic match once both are enabled, the
//! writer's reliability satisfies the reader's, and the configured discovery
//! delay has elapsed since the later of the two was enabled.
//!
//! # Fault injection
//!
//! [`LoopbackFaults`] lets tests break the bus on purpose: deliver every
//! sample twice, fail chosen write ordinals (counted domain-wide from 1) or
//! refuse to create data readers.
//! [`LoopbackDomainBuilder::record_writes`] keeps the key of every accepted
//! write so tests can check publish order. It is off by default to keep the
//! write path free of bookkeeping.

mod endpoint;
mod participant;
mod waitset;

#[cfg(test)]
mod tests;

pub use endpoint::{LoopbackPublisher, LoopbackReader, LoopbackSubscriber, LoopbackWriter};
pub use participant::{LoopbackParticipant, LoopbackTopic};
pub use waitset::{LoopbackGuardCondition, LoopbackReadCondition, LoopbackWaitSet};

use crate::dds::InstanceHandle;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Faults the loopback bus injects on demand.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoopbackFaults {
    /// Deliver two copies of every sample, atomically.
    pub duplicate_delivery: bool,
    /// 1-based domain-wide write ordinals that fail with `RETCODE_ERROR`.
    pub failing_writes: Vec<usize>,
    /// `create_datareader` returns nil.
    pub reject_datareaders: bool,
}

impl LoopbackFaults {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn duplicate_delivery() -> Self {
        Self {
            duplicate_delivery: true,
            ..Self::default()
        }
    }

    pub fn reject_datareaders() -> Self {
        Self {
            reject_datareaders: true,
            ..Self::default()
        }
    }

    pub fn fail_writes(ordinals: impl IntoIterator<Item = usize>) -> Self {
        Self {
            failing_writes: ordinals.into_iter().collect(),
            ..Self::default()
        }
    }
}

/// Builder for [`LoopbackDomain`].
#[derive(Debug, Clone, Default)]
pub struct LoopbackDomainBuilder {
    domain_id: u32,
    discovery_delay: Duration,
    faults: LoopbackFaults,
    record_writes: bool,
}

impl LoopbackDomainBuilder {
    /// Delay between enabling both endpoints and reporting them matched.
    pub fn discovery_delay(mut self, delay: Duration) -> Self {
        self.discovery_delay = delay;
        self
    }

    pub fn faults(mut self, faults: LoopbackFaults) -> Self {
        self.faults = faults;
        self
    }

    /// Keep the key of every accepted write, see [`LoopbackDomain::written_keys`].
    pub fn record_writes(mut self, enabled: bool) -> Self {
        self.record_writes = enabled;
        self
    }

    pub fn build(self) -> LoopbackDomain {
        log::debug!(
            "[loopback] domain {} created (discovery_delay={:?}, record_writes={})",
            self.domain_id,
            self.discovery_delay,
            self.record_writes
        );
        LoopbackDomain {
            inner: Arc::new(DomainInner {
                domain_id: self.domain_id,
                topics: DashMap::new(),
                next_handle: AtomicU64::new(1),
                write_ordinal: AtomicUsize::new(0),
                discovery_delay: self.discovery_delay,
                faults: Mutex::new(self.faults),
                record_writes: self.record_writes,
            }),
        }
    }
}

/// One in-process DDS domain. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct LoopbackDomain {
    inner: Arc<DomainInner>,
}

impl LoopbackDomain {
    /// Domain with immediate discovery and no faults.
    pub fn new(domain_id: u32) -> Self {
        Self::builder(domain_id).build()
    }

    pub fn builder(domain_id: u32) -> LoopbackDomainBuilder {
        LoopbackDomainBuilder {
            domain_id,
            ..LoopbackDomainBuilder::default()
        }
    }

    pub fn domain_id(&self) -> u32 {
        self.inner.domain_id
    }

    /// Create a participant attached to this domain.
    pub fn create_participant(&self) -> Arc<LoopbackParticipant> {
        LoopbackParticipant::new(Arc::clone(&self.inner))
    }

    /// Replace the active fault set.
    pub fn set_faults(&self, faults: LoopbackFaults) {
        *self.inner.faults.lock() = faults;
    }

    /// Keys of every accepted write on `topic`, in write order.
    ///
    /// Empty unless the domain was built with `record_writes(true)`, and
    /// forgotten once the last participant deletes the topic.
    pub fn written_keys(&self, topic: &str) -> Vec<String> {
        self.inner
            .topics
            .get(topic)
            .map(|bus| bus.journal.lock().clone())
            .unwrap_or_default()
    }

    /// Names of the topics currently bound by at least one participant.
    pub fn topic_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.topics.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Total writes attempted in this domain.
    pub fn write_count(&self) -> usize {
        self.inner.write_ordinal.load(Ordering::Relaxed)
    }
}

pub(crate) struct DomainInner {
    domain_id: u32,
    topics: DashMap<String, Arc<TopicBus>>,
    next_handle: AtomicU64,
    write_ordinal: AtomicUsize,
    discovery_delay: Duration,
    faults: Mutex<LoopbackFaults>,
    record_writes: bool,
}

impl DomainInner {
    pub(crate) fn next_handle(&self) -> InstanceHandle {
        InstanceHandle::new(self.next_handle.fetch_add(1, Ordering::Relaxed))
    }

    /// Bind `name` to `type_name`, creating the bus on first use.
    pub(crate) fn bind_topic(&self, name: &str, type_name: &str) -> Option<Arc<TopicBus>> {
        let bus = self
            .topics
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(TopicBus::new(name, type_name)));

        if bus.type_name != type_name {
            log::warn!(
                "[loopback] topic '{}' already bound to type '{}', refusing '{}'",
                name,
                bus.type_name,
                type_name
            );
            return None;
        }
        // Counted under the shard lock so a concurrent unbind cannot drop
        // the bus in between.
        bus.bindings.fetch_add(1, Ordering::AcqRel);
        Some(Arc::clone(&*bus))
    }

    /// Release one binding of `name`, dropping the bus with the last one.
    pub(crate) fn unbind_topic(&self, name: &str) {
        let removed = self
            .topics
            .remove_if(name, |_, bus| bus.bindings.fetch_sub(1, Ordering::AcqRel) == 1);
        if removed.is_some() {
            log::debug!("[loopback] topic '{}' unbound", name);
        }
    }

    /// Returns how many copies to deliver, or `None` when this write fails.
    pub(crate) fn admit_write(&self) -> Option<usize> {
        let ordinal = self.write_ordinal.fetch_add(1, Ordering::Relaxed) + 1;
        let faults = self.faults.lock();
        if faults.failing_writes.contains(&ordinal) {
            log::debug!("[loopback] injected failure on write #{}", ordinal);
            return None;
        }
        Some(if faults.duplicate_delivery { 2 } else { 1 })
    }

    pub(crate) fn rejects_datareaders(&self) -> bool {
        self.faults.lock().reject_datareaders
    }

    pub(crate) fn discovery_delay(&self) -> Duration {
        self.discovery_delay
    }

    pub(crate) fn records_writes(&self) -> bool {
        self.record_writes
    }
}

/// Shared data path of one topic name.
pub(crate) struct TopicBus {
    name: String,
    type_name: String,
    writers: RwLock<Vec<Arc<LoopbackWriter>>>,
    readers: RwLock<Vec<Arc<LoopbackReader>>>,
    bindings: AtomicUsize,
    journal: Mutex<Vec<String>>,
}

impl TopicBus {
    fn new(name: &str, type_name: &str) -> Self {
        Self {
            name: name.to_string(),
            type_name: type_name.to_string(),
            writers: RwLock::new(Vec::new()),
            readers: RwLock::new(Vec::new()),
            bindings: AtomicUsize::new(0),
            journal: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn type_name(&self) -> &str {
        &self.type_name
    }

    pub(crate) fn add_writer(&self, writer: Arc<LoopbackWriter>) {
        self.writers.write().push(writer);
    }

    pub(crate) fn remove_writer(&self, handle: InstanceHandle) {
        self.writers.write().retain(|w| w.handle() != handle);
    }

    pub(crate) fn add_reader(&self, reader: Arc<LoopbackReader>) {
        self.readers.write().push(reader);
    }

    pub(crate) fn remove_reader(&self, handle: InstanceHandle) {
        self.readers.write().retain(|r| r.handle() != handle);
    }

    pub(crate) fn writers(&self) -> Vec<Arc<LoopbackWriter>> {
        self.writers.read().clone()
    }

    pub(crate) fn readers(&self) -> Vec<Arc<LoopbackReader>> {
        self.readers.read().clone()
    }

    pub(crate) fn record_write(&self, key: &str) {
        self.journal.lock().push(key.to_string());
    }
}

/// Writer/reader match rule shared by both directions.
pub(crate) fn endpoints_matched(
    writer: &LoopbackWriter,
    reader: &LoopbackReader,
    discovery_delay: Duration,
) -> bool {
    let (Some(w_since), Some(r_since)) = (writer.enabled_at(), reader.enabled_at()) else {
        return false;
    };
    if !writer.qos().reliability.satisfies(&reader.qos().reliability) {
        return false;
    }
    let since: Instant = w_since.max(r_since);
    since.elapsed() >= discovery_delay
}
