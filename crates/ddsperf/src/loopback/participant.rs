// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Loopback participant and topic entities.

use super::endpoint::{LoopbackPublisher, LoopbackSubscriber, Retired};
use super::waitset::{LoopbackGuardCondition, LoopbackWaitSet};
use super::{DomainInner, TopicBus};
use crate::dds::{
    DdsResult, DomainParticipant, Entity, GuardCondition, InstanceHandle, Publisher, QoS,
    ReturnCode, Subscriber, Topic, WaitSet,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

/// Participant-local view of a topic bus.
pub struct LoopbackTopic {
    handle: InstanceHandle,
    bus: Arc<TopicBus>,
    /// Writers and readers created on this topic and not yet deleted.
    users: AtomicUsize,
}

impl LoopbackTopic {
    pub(crate) fn bus(&self) -> &Arc<TopicBus> {
        &self.bus
    }

    pub(crate) fn acquire(&self) {
        self.users.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn release(&self) {
        self.users.fetch_sub(1, Ordering::AcqRel);
    }

    fn in_use(&self) -> bool {
        self.users.load(Ordering::Acquire) > 0
    }
}

impl Entity for LoopbackTopic {
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

impl Topic for LoopbackTopic {
    fn name(&self) -> &str {
        self.bus.name()
    }

    fn type_name(&self) -> &str {
        self.bus.type_name()
    }
}

pub struct LoopbackParticipant {
    handle: InstanceHandle,
    self_ref: Weak<LoopbackParticipant>,
    domain: Arc<DomainInner>,
    topics: Mutex<Vec<Arc<LoopbackTopic>>>,
    publishers: Mutex<Vec<Arc<LoopbackPublisher>>>,
    subscribers: Mutex<Vec<Arc<LoopbackSubscriber>>>,
    retired: Retired,
}

impl LoopbackParticipant {
    pub(crate) fn new(domain: Arc<DomainInner>) -> Arc<Self> {
        Arc::new_cyclic(|self_ref| Self {
            handle: domain.next_handle(),
            self_ref: self_ref.clone(),
            domain,
            topics: Mutex::new(Vec::new()),
            publishers: Mutex::new(Vec::new()),
            subscribers: Mutex::new(Vec::new()),
            retired: Retired::default(),
        })
    }

    pub fn instance_handle(&self) -> InstanceHandle {
        self.handle
    }

    pub(crate) fn find_topic(&self, handle: InstanceHandle) -> Option<Arc<LoopbackTopic>> {
        self.topics
            .lock()
            .iter()
            .find(|t| t.handle == handle)
            .cloned()
    }

    /// Number of publishers, subscribers and topics currently owned.
    pub fn entity_count(&self) -> usize {
        self.topics.lock().len() + self.publishers.lock().len() + self.subscribers.lock().len()
    }
}

impl DomainParticipant for LoopbackParticipant {
    fn domain_id(&self) -> u32 {
        self.domain.domain_id
    }

    fn create_publisher(&self, qos: &QoS) -> Option<Arc<dyn Publisher>> {
        let publisher = Arc::new(LoopbackPublisher::new(
            self.self_ref.clone(),
            Arc::clone(&self.domain),
            qos.clone(),
        ));
        self.publishers.lock().push(Arc::clone(&publisher));
        Some(publisher)
    }

    fn create_subscriber(&self, qos: &QoS) -> Option<Arc<dyn Subscriber>> {
        let subscriber = Arc::new(LoopbackSubscriber::new(
            self.self_ref.clone(),
            Arc::clone(&self.domain),
            qos.clone(),
        ));
        self.subscribers.lock().push(Arc::clone(&subscriber));
        Some(subscriber)
    }

    fn create_topic(&self, name: &str, type_name: &str) -> Option<Arc<dyn Topic>> {
        if name.is_empty() {
            return None;
        }
        let bus = self.domain.bind_topic(name, type_name)?;
        let topic = Arc::new(LoopbackTopic {
            handle: self.domain.next_handle(),
            bus,
            users: AtomicUsize::new(0),
        });
        self.topics.lock().push(Arc::clone(&topic));
        log::debug!("[loopback] topic '{}' ({}) created", name, type_name);
        Some(topic)
    }

    fn create_waitset(&self) -> Option<Arc<dyn WaitSet>> {
        Some(Arc::new(LoopbackWaitSet::new()))
    }

    fn create_guard_condition(&self) -> Option<Arc<dyn GuardCondition>> {
        Some(Arc::new(LoopbackGuardCondition::new()))
    }

    fn delete_publisher(&self, publisher: &dyn Publisher) -> DdsResult<()> {
        let handle = publisher.instance_handle();
        let mut publishers = self.publishers.lock();
        let pos = publishers
            .iter()
            .position(|p| p.handle() == handle)
            .ok_or_else(|| self.retired.missing(handle))?;
        if publishers[pos].writer_count() > 0 {
            return Err(ReturnCode::PreconditionNotMet);
        }
        publishers.remove(pos);
        self.retired.insert(handle);
        Ok(())
    }

    fn delete_subscriber(&self, subscriber: &dyn Subscriber) -> DdsResult<()> {
        let handle = subscriber.instance_handle();
        let mut subscribers = self.subscribers.lock();
        let pos = subscribers
            .iter()
            .position(|s| s.handle() == handle)
            .ok_or_else(|| self.retired.missing(handle))?;
        if subscribers[pos].reader_count() > 0 {
            return Err(ReturnCode::PreconditionNotMet);
        }
        subscribers.remove(pos);
        self.retired.insert(handle);
        Ok(())
    }

    fn delete_topic(&self, topic: &dyn Topic) -> DdsResult<()> {
        let handle = topic.instance_handle();
        let mut topics = self.topics.lock();
        let pos = topics
            .iter()
            .position(|t| t.handle == handle)
            .ok_or_else(|| self.retired.missing(handle))?;
        if topics[pos].in_use() {
            return Err(ReturnCode::PreconditionNotMet);
        }
        let topic = topics.remove(pos);
        self.retired.insert(handle);
        self.domain.unbind_topic(topic.bus().name());
        Ok(())
    }

    fn delete_contained_entities(&self) -> DdsResult<()> {
        let publishers: Vec<_> = self.publishers.lock().drain(..).collect();
        for publisher in publishers {
            publisher.delete_contained_entities()?;
            self.retired.insert(publisher.handle());
        }

        let subscribers: Vec<_> = self.subscribers.lock().drain(..).collect();
        for subscriber in subscribers {
            subscriber.force_clear();
            self.retired.insert(subscriber.handle());
        }

        let topics: Vec<_> = self.topics.lock().drain(..).collect();
        for topic in topics {
            self.retired.insert(topic.handle);
            self.domain.unbind_topic(topic.bus().name());
        }
        Ok(())
    }
}
