// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Loopback publishers, subscribers, writers and readers.

use super::participant::{LoopbackParticipant, LoopbackTopic};
use super::waitset::LoopbackReadCondition;
use super::{endpoints_matched, DomainInner};
use crate::dds::{
    Condition, DataReader, DataWriter, DdsResult, Entity, History, InstanceHandle,
    InstanceStateMask, KeyedOctets, LoanedSamples, Publisher, QoS, Reliability, ReturnCode,
    SampleInfo, SampleStateMask, StateFilter, Subscriber, Topic, ViewStateMask,
};
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant, SystemTime};

/// Bookkeeping of deleted child handles, so a second delete reports
/// `AlreadyDeleted` instead of `PreconditionNotMet`.
#[derive(Default)]
pub(crate) struct Retired {
    handles: Mutex<HashSet<InstanceHandle>>,
}

impl Retired {
    pub(crate) fn insert(&self, handle: InstanceHandle) {
        self.handles.lock().insert(handle);
    }

    pub(crate) fn missing(&self, handle: InstanceHandle) -> ReturnCode {
        if self.handles.lock().contains(&handle) {
            ReturnCode::AlreadyDeleted
        } else {
            ReturnCode::PreconditionNotMet
        }
    }
}

// ============================================================================
// Publisher
// ============================================================================

pub struct LoopbackPublisher {
    handle: InstanceHandle,
    participant: Weak<LoopbackParticipant>,
    domain: Arc<DomainInner>,
    qos: QoS,
    writers: Mutex<Vec<Arc<LoopbackWriter>>>,
    retired: Retired,
}

impl LoopbackPublisher {
    pub(crate) fn new(
        participant: Weak<LoopbackParticipant>,
        domain: Arc<DomainInner>,
        qos: QoS,
    ) -> Self {
        Self {
            handle: domain.next_handle(),
            participant,
            domain,
            qos,
            writers: Mutex::new(Vec::new()),
            retired: Retired::default(),
        }
    }

    pub(crate) fn handle(&self) -> InstanceHandle {
        self.handle
    }

    pub(crate) fn writer_count(&self) -> usize {
        self.writers.lock().len()
    }
}

impl Entity for LoopbackPublisher {
    fn instance_handle(&self) -> InstanceHandle {
        self.handle
    }

    fn enable(&self) -> DdsResult<()> {
        Ok(())
    }

    fn is_enabled(&self) -> bool {
        true
    }
}

impl Publisher for LoopbackPublisher {
    fn create_datawriter(&self, topic: &dyn Topic, qos: &QoS) -> Option<Arc<dyn DataWriter>> {
        let participant = self.participant.upgrade()?;
        let topic = participant.find_topic(topic.instance_handle())?;

        let writer = Arc::new(LoopbackWriter {
            handle: self.domain.next_handle(),
            topic: Arc::clone(&topic),
            domain: Arc::clone(&self.domain),
            qos: qos.clone(),
            enabled_at: Mutex::new(None),
            deleted: AtomicBool::new(false),
        });
        if self.qos.entity_factory.is_auto_enable() {
            *writer.enabled_at.lock() = Some(Instant::now());
        }

        topic.acquire();
        topic.bus().add_writer(Arc::clone(&writer));
        self.writers.lock().push(Arc::clone(&writer));
        log::debug!(
            "[loopback] writer {} created on '{}'",
            writer.handle,
            topic.bus().name()
        );
        Some(writer)
    }

    fn delete_datawriter(&self, writer: &dyn DataWriter) -> DdsResult<()> {
        let handle = writer.instance_handle();
        let removed = {
            let mut writers = self.writers.lock();
            let pos = writers
                .iter()
                .position(|w| w.handle == handle)
                .ok_or_else(|| self.retired.missing(handle))?;
            writers.remove(pos)
        };
        removed.retire();
        self.retired.insert(handle);
        Ok(())
    }

    fn delete_contained_entities(&self) -> DdsResult<()> {
        let writers: Vec<_> = self.writers.lock().drain(..).collect();
        for writer in writers {
            writer.retire();
            self.retired.insert(writer.handle);
        }
        Ok(())
    }
}

// ============================================================================
// Subscriber
// ============================================================================

pub struct LoopbackSubscriber {
    handle: InstanceHandle,
    participant: Weak<LoopbackParticipant>,
    domain: Arc<DomainInner>,
    qos: QoS,
    readers: Mutex<Vec<Arc<LoopbackReader>>>,
    retired: Retired,
}

impl LoopbackSubscriber {
    pub(crate) fn new(
        participant: Weak<LoopbackParticipant>,
        domain: Arc<DomainInner>,
        qos: QoS,
    ) -> Self {
        Self {
            handle: domain.next_handle(),
            participant,
            domain,
            qos,
            readers: Mutex::new(Vec::new()),
            retired: Retired::default(),
        }
    }

    pub(crate) fn handle(&self) -> InstanceHandle {
        self.handle
    }

    pub(crate) fn reader_count(&self) -> usize {
        self.readers.lock().len()
    }

    /// Drop every reader regardless of conditions or loans.
    pub(crate) fn force_clear(&self) {
        let readers: Vec<_> = self.readers.lock().drain(..).collect();
        for reader in readers {
            reader.clear_conditions();
            reader.retire();
            self.retired.insert(reader.handle);
        }
    }
}

impl Entity for LoopbackSubscriber {
    fn instance_handle(&self) -> InstanceHandle {
        self.handle
    }

    fn enable(&self) -> DdsResult<()> {
        Ok(())
    }

    fn is_enabled(&self) -> bool {
        true
    }
}

impl Subscriber for LoopbackSubscriber {
    fn create_datareader(&self, topic: &dyn Topic, qos: &QoS) -> Option<Arc<dyn DataReader>> {
        if self.domain.rejects_datareaders() {
            log::debug!("[loopback] injected datareader creation failure");
            return None;
        }
        let participant = self.participant.upgrade()?;
        let topic = participant.find_topic(topic.instance_handle())?;

        let reader = Arc::new_cyclic(|self_ref| LoopbackReader {
            handle: self.domain.next_handle(),
            self_ref: self_ref.clone(),
            topic: Arc::clone(&topic),
            domain: Arc::clone(&self.domain),
            qos: qos.clone(),
            enabled_at: Mutex::new(None),
            deleted: AtomicBool::new(false),
            cache: Mutex::new(ReaderCache::default()),
            space: Condvar::new(),
            conditions: Mutex::new(Vec::new()),
        });
        if self.qos.entity_factory.is_auto_enable() {
            *reader.enabled_at.lock() = Some(Instant::now());
        }

        topic.acquire();
        topic.bus().add_reader(Arc::clone(&reader));
        self.readers.lock().push(Arc::clone(&reader));
        log::debug!(
            "[loopback] reader {} created on '{}'",
            reader.handle,
            topic.bus().name()
        );
        Some(reader)
    }

    fn delete_datareader(&self, reader: &dyn DataReader) -> DdsResult<()> {
        let handle = reader.instance_handle();
        let removed = {
            let mut readers = self.readers.lock();
            let pos = readers
                .iter()
                .position(|r| r.handle == handle)
                .ok_or_else(|| self.retired.missing(handle))?;
            let candidate = &readers[pos];
            if !candidate.conditions.lock().is_empty() || !candidate.cache.lock().loans.is_empty()
            {
                log::debug!(
                    "[loopback] reader {} still owns conditions or loans",
                    handle
                );
                return Err(ReturnCode::PreconditionNotMet);
            }
            readers.remove(pos)
        };
        removed.retire();
        self.retired.insert(handle);
        Ok(())
    }

    fn delete_contained_entities(&self) -> DdsResult<()> {
        self.force_clear();
        Ok(())
    }
}

// ============================================================================
// DataWriter
// ============================================================================

pub struct LoopbackWriter {
    handle: InstanceHandle,
    topic: Arc<LoopbackTopic>,
    domain: Arc<DomainInner>,
    qos: QoS,
    enabled_at: Mutex<Option<Instant>>,
    deleted: AtomicBool,
}

impl LoopbackWriter {
    pub(crate) fn handle(&self) -> InstanceHandle {
        self.handle
    }

    pub(crate) fn qos(&self) -> &QoS {
        &self.qos
    }

    pub(crate) fn enabled_at(&self) -> Option<Instant> {
        *self.enabled_at.lock()
    }

    fn retire(&self) {
        self.deleted.store(true, Ordering::Release);
        self.topic.bus().remove_writer(self.handle);
        self.topic.release();
        log::debug!("[loopback] writer {} deleted", self.handle);
    }

    fn check_usable(&self) -> DdsResult<()> {
        if self.deleted.load(Ordering::Acquire) {
            return Err(ReturnCode::AlreadyDeleted);
        }
        if self.enabled_at().is_none() {
            return Err(ReturnCode::NotEnabled);
        }
        Ok(())
    }
}

impl Entity for LoopbackWriter {
    fn instance_handle(&self) -> InstanceHandle {
        self.handle
    }

    fn enable(&self) -> DdsResult<()> {
        if self.deleted.load(Ordering::Acquire) {
            return Err(ReturnCode::AlreadyDeleted);
        }
        self.enabled_at.lock().get_or_insert_with(Instant::now);
        Ok(())
    }

    fn is_enabled(&self) -> bool {
        self.enabled_at().is_some()
    }
}

impl DataWriter for LoopbackWriter {
    fn write(&self, sample: &KeyedOctets, _handle: InstanceHandle) -> DdsResult<()> {
        self.check_usable()?;

        let copies = self.domain.admit_write().ok_or(ReturnCode::Error)?;
        let bus = self.topic.bus();
        if self.domain.records_writes() {
            bus.record_write(&sample.key);
        }

        let delay = self.domain.discovery_delay();
        for reader in bus.readers() {
            if endpoints_matched(self, &reader, delay) {
                reader.deliver(sample, self.handle, self.qos.reliability, copies)?;
            }
        }
        Ok(())
    }

    fn matched_subscriptions(&self) -> DdsResult<Vec<InstanceHandle>> {
        self.check_usable()?;
        let delay = self.domain.discovery_delay();
        Ok(self
            .topic
            .bus()
            .readers()
            .iter()
            .filter(|reader| endpoints_matched(self, reader, delay))
            .map(|reader| reader.handle)
            .collect())
    }
}

// ============================================================================
// DataReader
// ============================================================================

struct CachedSample {
    data: KeyedOctets,
    instance: InstanceHandle,
    publication: InstanceHandle,
    received_at: SystemTime,
}

struct InstanceRecord {
    handle: InstanceHandle,
    viewed: bool,
}

#[derive(Default)]
struct ReaderCache {
    samples: VecDeque<CachedSample>,
    instances: HashMap<String, InstanceRecord>,
    loans: HashSet<u64>,
    next_loan: u64,
}

impl ReaderCache {
    fn view_state(&self, key: &str) -> ViewStateMask {
        match self.instances.get(key) {
            Some(record) if record.viewed => ViewStateMask::NOT_NEW,
            _ => ViewStateMask::NEW,
        }
    }

    fn matches(&self, sample: &CachedSample, filter: StateFilter) -> bool {
        filter.matches(
            SampleStateMask::NOT_READ,
            self.view_state(&sample.data.key),
            InstanceStateMask::ALIVE,
        )
    }

    fn evict_oldest_of(&mut self, key: &str) {
        if let Some(pos) = self.samples.iter().position(|s| s.data.key == key) {
            self.samples.remove(pos);
        }
    }
}

pub struct LoopbackReader {
    handle: InstanceHandle,
    self_ref: Weak<LoopbackReader>,
    topic: Arc<LoopbackTopic>,
    domain: Arc<DomainInner>,
    qos: QoS,
    enabled_at: Mutex<Option<Instant>>,
    deleted: AtomicBool,
    cache: Mutex<ReaderCache>,
    /// Signalled whenever cache space frees up.
    space: Condvar,
    conditions: Mutex<Vec<Arc<LoopbackReadCondition>>>,
}

impl LoopbackReader {
    pub(crate) fn handle(&self) -> InstanceHandle {
        self.handle
    }

    pub(crate) fn qos(&self) -> &QoS {
        &self.qos
    }

    pub(crate) fn enabled_at(&self) -> Option<Instant> {
        *self.enabled_at.lock()
    }

    /// Number of samples waiting in the cache.
    pub fn cached_len(&self) -> usize {
        self.cache.lock().samples.len()
    }

    pub(crate) fn has_matching(&self, filter: StateFilter) -> bool {
        let cache = self.cache.lock();
        cache.samples.iter().any(|s| cache.matches(s, filter))
    }

    fn retire(&self) {
        self.deleted.store(true, Ordering::Release);
        self.topic.bus().remove_reader(self.handle);
        self.topic.release();
        // Release writers blocked on a full cache.
        self.space.notify_all();
        log::debug!("[loopback] reader {} deleted", self.handle);
    }

    fn clear_conditions(&self) {
        self.conditions.lock().clear();
    }

    fn check_usable(&self) -> DdsResult<()> {
        if self.deleted.load(Ordering::Acquire) {
            return Err(ReturnCode::AlreadyDeleted);
        }
        if self.enabled_at().is_none() {
            return Err(ReturnCode::NotEnabled);
        }
        Ok(())
    }

    /// Copy `sample` into the cache `copies` times under one lock, applying
    /// history and resource limits, then wake attached conditions.
    pub(crate) fn deliver(
        &self,
        sample: &KeyedOctets,
        publication: InstanceHandle,
        reliability: Reliability,
        copies: usize,
    ) -> DdsResult<()> {
        let mut cache = self.cache.lock();

        for _ in 0..copies {
            if let Some(max) = self.qos.resource_limits.max_samples {
                if cache.samples.len() >= max {
                    match (self.qos.history, reliability) {
                        (History::KeepLast(_), _) => {
                            cache.samples.pop_front();
                        }
                        (History::KeepAll, Reliability::BestEffort) => {
                            log::trace!("[loopback] reader {} full, sample dropped", self.handle);
                            continue;
                        }
                        (History::KeepAll, Reliability::Reliable { max_blocking_time }) => {
                            self.wait_for_space(&mut cache, max, max_blocking_time)?;
                        }
                    }
                }
            }
            if self.deleted.load(Ordering::Acquire) {
                return Ok(());
            }

            if let History::KeepLast(depth) = self.qos.history {
                let depth = depth.max(1) as usize;
                while cache
                    .samples
                    .iter()
                    .filter(|s| s.data.key == sample.key)
                    .count()
                    >= depth
                {
                    cache.evict_oldest_of(&sample.key);
                }
            }

            let domain = &self.domain;
            let instance = cache
                .instances
                .entry(sample.key.clone())
                .or_insert_with(|| InstanceRecord {
                    handle: domain.next_handle(),
                    viewed: false,
                })
                .handle;

            cache.samples.push_back(CachedSample {
                data: sample.clone(),
                instance,
                publication,
                received_at: SystemTime::now(),
            });
        }
        drop(cache);

        self.notify_conditions();
        Ok(())
    }

    fn wait_for_space(
        &self,
        cache: &mut MutexGuard<'_, ReaderCache>,
        max: usize,
        max_blocking_time: Option<Duration>,
    ) -> DdsResult<()> {
        let deadline = max_blocking_time.map(|t| Instant::now() + t);
        while cache.samples.len() >= max && !self.deleted.load(Ordering::Acquire) {
            match deadline {
                Some(deadline) => {
                    if self.space.wait_until(cache, deadline).timed_out()
                        && cache.samples.len() >= max
                    {
                        log::debug!(
                            "[loopback] reader {} full, write blocked past max_blocking_time",
                            self.handle
                        );
                        return Err(ReturnCode::Timeout);
                    }
                }
                None => self.space.wait(cache),
            }
        }
        Ok(())
    }

    fn notify_conditions(&self) {
        let conditions = self.conditions.lock().clone();
        for condition in conditions {
            condition.notify();
        }
    }
}

impl Entity for LoopbackReader {
    fn instance_handle(&self) -> InstanceHandle {
        self.handle
    }

    fn enable(&self) -> DdsResult<()> {
        if self.deleted.load(Ordering::Acquire) {
            return Err(ReturnCode::AlreadyDeleted);
        }
        self.enabled_at.lock().get_or_insert_with(Instant::now);
        Ok(())
    }

    fn is_enabled(&self) -> bool {
        self.enabled_at().is_some()
    }
}

impl DataReader for LoopbackReader {
    fn create_readcondition(&self, filter: StateFilter) -> Option<Arc<dyn Condition>> {
        if self.deleted.load(Ordering::Acquire) {
            return None;
        }
        let condition = Arc::new(LoopbackReadCondition::new(filter, self.self_ref.clone()));
        self.conditions.lock().push(Arc::clone(&condition));
        Some(condition)
    }

    fn delete_readcondition(&self, condition: &dyn Condition) -> DdsResult<()> {
        let id = condition.condition_id();
        let mut conditions = self.conditions.lock();
        let pos = conditions
            .iter()
            .position(|c| c.condition_id() == id)
            .ok_or(ReturnCode::PreconditionNotMet)?;
        conditions.remove(pos);
        Ok(())
    }

    fn take(&self, max_samples: usize, filter: StateFilter) -> DdsResult<LoanedSamples> {
        self.check_usable()?;
        if max_samples == 0 {
            return Err(ReturnCode::BadParameter);
        }

        let mut cache = self.cache.lock();
        let mut samples = Vec::new();
        let mut infos = Vec::new();
        let mut idx = 0;

        while idx < cache.samples.len() && samples.len() < max_samples {
            let view_state = cache.view_state(&cache.samples[idx].data.key);
            if !cache.matches(&cache.samples[idx], filter) {
                idx += 1;
                continue;
            }
            let Some(taken) = cache.samples.remove(idx) else {
                break;
            };
            infos.push(SampleInfo {
                sample_state: SampleStateMask::NOT_READ,
                view_state,
                instance_state: InstanceStateMask::ALIVE,
                instance_handle: taken.instance,
                publication_handle: taken.publication,
                source_timestamp: taken.received_at,
                valid_data: true,
            });
            samples.push(taken.data);
        }

        if samples.is_empty() {
            return Err(ReturnCode::NoData);
        }

        for sample in &samples {
            if let Some(record) = cache.instances.get_mut(&sample.key) {
                record.viewed = true;
            }
        }

        cache.next_loan += 1;
        let loan_id = cache.next_loan;
        cache.loans.insert(loan_id);
        drop(cache);

        self.space.notify_all();
        Ok(LoanedSamples::new(loan_id, samples, infos))
    }

    fn return_loan(&self, loan: LoanedSamples) -> DdsResult<()> {
        if self.cache.lock().loans.remove(&loan.loan_id()) {
            Ok(())
        } else {
            Err(ReturnCode::PreconditionNotMet)
        }
    }

    fn matched_publications(&self) -> DdsResult<Vec<InstanceHandle>> {
        self.check_usable()?;
        let delay = self.domain.discovery_delay();
        Ok(self
            .topic
            .bus()
            .writers()
            .iter()
            .filter(|writer| endpoints_matched(writer, self, delay))
            .map(|writer| writer.handle())
            .collect())
    }

    fn delete_contained_entities(&self) -> DdsResult<()> {
        self.clear_conditions();
        Ok(())
    }
}
