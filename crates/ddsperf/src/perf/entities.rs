// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Entity set owned by a harness between `initialize` and `finalize`.

use super::setup;
use crate::config::{DiscoveryPolicy, HarnessConfig};
use crate::dds::{
    Condition, DataReader, DataWriter, DdsResult, DomainParticipant, GuardCondition, Publisher,
    StateFilter, Subscriber, Topic, WaitSet,
};
use crate::error::{Error, Result};
use std::sync::Arc;

/// Every pub/sub entity one harness instance uses.
pub(crate) struct EntitySet {
    pub participant: Arc<dyn DomainParticipant>,
    pub publisher: Arc<dyn Publisher>,
    pub subscriber: Arc<dyn Subscriber>,
    pub topic: Arc<dyn Topic>,
    pub writer: Arc<dyn DataWriter>,
    pub reader: Arc<dyn DataReader>,
    pub waitset: Arc<dyn WaitSet>,
    pub read_condition: Arc<dyn Condition>,
    /// Raised by the sending role when the expected total changes.
    pub guard: Arc<dyn GuardCondition>,
    pub guard_condition: Arc<dyn Condition>,
}

impl EntitySet {
    /// Create, wire and enable the entity graph, then wait for discovery.
    ///
    /// Order: publisher/subscriber, topic, writer/reader (all disabled),
    /// read + guard conditions attached to the wait-set, then writer and
    /// reader enabled. On any failure the entities created so far are
    /// deleted again before the error is returned.
    pub fn build(
        participant: Arc<dyn DomainParticipant>,
        config: &HarnessConfig,
        kind: &str,
    ) -> Result<Self> {
        let mut partial = Partial::default();
        if let Err(e) = Self::assemble(&participant, config, kind, &mut partial) {
            partial.release(&*participant, kind);
            return Err(e);
        }
        let set = partial
            .into_set(participant)
            .ok_or(Error::EntityCreation("entity set"))?;

        if let Err(e) = set.await_discovery(config) {
            if let Err(cleanup) = set.teardown() {
                log::warn!("[{}] cleanup after failed discovery: {}", kind, cleanup);
            }
            return Err(e);
        }

        log::info!("[{}] entities ready on topic '{}'", kind, set.topic_name());
        Ok(set)
    }

    /// Every entity is recorded in `partial` as soon as it exists, so a
    /// half-built graph can be undone.
    fn assemble(
        participant: &Arc<dyn DomainParticipant>,
        config: &HarnessConfig,
        kind: &str,
        partial: &mut Partial,
    ) -> Result<()> {
        let publisher = Arc::clone(
            partial
                .publisher
                .insert(setup::create_publisher(&**participant)?),
        );
        let subscriber = Arc::clone(
            partial
                .subscriber
                .insert(setup::create_subscriber(&**participant)?),
        );

        let prefix = if config.topic_prefix.is_empty() {
            kind.to_string()
        } else {
            format!("{}_{}", config.topic_prefix, kind)
        };
        let topic_name = setup::random_topic_name(&prefix);
        let topic = Arc::clone(
            partial
                .topic
                .insert(setup::create_topic(&**participant, &topic_name)?),
        );

        let writer = Arc::clone(
            partial
                .writer
                .insert(setup::create_datawriter(&*publisher, &*topic)?),
        );
        let reader = Arc::clone(
            partial
                .reader
                .insert(setup::create_datareader(&*subscriber, &*topic)?),
        );

        let waitset = Arc::clone(
            partial.waitset.insert(
                participant
                    .create_waitset()
                    .ok_or(Error::EntityCreation("waitset"))?,
            ),
        );
        let read_condition = Arc::clone(
            partial.read_condition.insert(
                reader
                    .create_readcondition(StateFilter::ANY)
                    .ok_or(Error::EntityCreation("readcondition"))?,
            ),
        );
        setup::check_setup(
            "attach_condition",
            waitset.attach_condition(Arc::clone(&read_condition)),
        )?;
        partial.read_attached = true;

        let guard = Arc::clone(
            partial.guard.insert(
                participant
                    .create_guard_condition()
                    .ok_or(Error::EntityCreation("guardcondition"))?,
            ),
        );
        let guard_condition = Arc::clone(
            partial
                .guard_condition
                .insert(Arc::clone(&guard).as_condition()),
        );
        setup::check_setup(
            "attach_guard_condition",
            waitset.attach_condition(guard_condition),
        )?;
        partial.guard_attached = true;

        setup::enable("enable_datawriter", &*writer)?;
        setup::enable("enable_datareader", &*reader)?;
        Ok(())
    }

    fn await_discovery(&self, config: &HarnessConfig) -> Result<()> {
        let timeout = config.discovery_timeout();
        let poll = config.poll_interval();

        let matched = setup::wait_for_publications(&*self.reader, 1, timeout, poll);
        discovery_outcome("datareader", matched, config)?;

        let matched = setup::wait_for_subscriptions(&*self.writer, 1, timeout, poll);
        discovery_outcome("datawriter", matched, config)
    }

    pub fn topic_name(&self) -> &str {
        self.topic.name()
    }

    /// Delete every entity in reverse dependency order, stopping at the first
    /// non-OK status.
    pub fn teardown(self) -> Result<()> {
        step(
            "delete_datawriter",
            self.publisher.delete_datawriter(&*self.writer),
        )?;
        step(
            "publisher.delete_contained_entities",
            self.publisher.delete_contained_entities(),
        )?;
        step(
            "delete_publisher",
            self.participant.delete_publisher(&*self.publisher),
        )?;

        step(
            "detach_condition",
            self.waitset.detach_condition(&*self.read_condition),
        )?;
        step(
            "detach_guard_condition",
            self.waitset.detach_condition(&*self.guard_condition),
        )?;
        step(
            "datareader.delete_contained_entities",
            self.reader.delete_contained_entities(),
        )?;
        step(
            "delete_datareader",
            self.subscriber.delete_datareader(&*self.reader),
        )?;
        step(
            "subscriber.delete_contained_entities",
            self.subscriber.delete_contained_entities(),
        )?;
        step(
            "delete_subscriber",
            self.participant.delete_subscriber(&*self.subscriber),
        )?;

        step("delete_topic", self.participant.delete_topic(&*self.topic))?;
        log::debug!("[teardown] all entities deleted");
        Ok(())
    }
}

/// Entities created so far by [`EntitySet::build`].
#[derive(Default)]
struct Partial {
    publisher: Option<Arc<dyn Publisher>>,
    subscriber: Option<Arc<dyn Subscriber>>,
    topic: Option<Arc<dyn Topic>>,
    writer: Option<Arc<dyn DataWriter>>,
    reader: Option<Arc<dyn DataReader>>,
    waitset: Option<Arc<dyn WaitSet>>,
    read_condition: Option<Arc<dyn Condition>>,
    read_attached: bool,
    guard: Option<Arc<dyn GuardCondition>>,
    guard_condition: Option<Arc<dyn Condition>>,
    guard_attached: bool,
}

impl Partial {
    fn into_set(self, participant: Arc<dyn DomainParticipant>) -> Option<EntitySet> {
        let Partial {
            publisher: Some(publisher),
            subscriber: Some(subscriber),
            topic: Some(topic),
            writer: Some(writer),
            reader: Some(reader),
            waitset: Some(waitset),
            read_condition: Some(read_condition),
            guard: Some(guard),
            guard_condition: Some(guard_condition),
            ..
        } = self
        else {
            return None;
        };
        Some(EntitySet {
            participant,
            publisher,
            subscriber,
            topic,
            writer,
            reader,
            waitset,
            read_condition,
            guard,
            guard_condition,
        })
    }

    /// Best-effort deletion of whatever exists, in teardown order. Failures
    /// are logged and do not stop the remaining steps.
    fn release(self, participant: &dyn DomainParticipant, kind: &str) {
        let mut steps: Vec<(&str, DdsResult<()>)> = Vec::new();

        if let Some(waitset) = &self.waitset {
            if let (Some(condition), true) = (&self.read_condition, self.read_attached) {
                steps.push(("detach_condition", waitset.detach_condition(&**condition)));
            }
            if let (Some(condition), true) = (&self.guard_condition, self.guard_attached) {
                steps.push((
                    "detach_guard_condition",
                    waitset.detach_condition(&**condition),
                ));
            }
        }
        if let (Some(publisher), Some(writer)) = (&self.publisher, &self.writer) {
            steps.push(("delete_datawriter", publisher.delete_datawriter(&**writer)));
        }
        if let Some(reader) = &self.reader {
            steps.push((
                "datareader.delete_contained_entities",
                reader.delete_contained_entities(),
            ));
        }
        if let (Some(subscriber), Some(reader)) = (&self.subscriber, &self.reader) {
            steps.push(("delete_datareader", subscriber.delete_datareader(&**reader)));
        }
        if let Some(publisher) = &self.publisher {
            steps.push(("delete_publisher", participant.delete_publisher(&**publisher)));
        }
        if let Some(subscriber) = &self.subscriber {
            steps.push((
                "delete_subscriber",
                participant.delete_subscriber(&**subscriber),
            ));
        }
        if let Some(topic) = &self.topic {
            steps.push(("delete_topic", participant.delete_topic(&**topic)));
        }

        for (op, status) in steps {
            if let Err(code) = status {
                log::warn!("[{}] cleanup after failed setup: {} failed: {}", kind, op, code);
            }
        }
        log::debug!("[{}] partial entity set released", kind);
    }
}

fn discovery_outcome(endpoint: &'static str, matched: bool, config: &HarnessConfig) -> Result<()> {
    if matched {
        return Ok(());
    }
    match config.discovery_policy {
        DiscoveryPolicy::FailFast => {
            log::error!(
                "[setup] {} discovery timed out after {:?}",
                endpoint,
                config.discovery_timeout()
            );
            Err(Error::DiscoveryTimeout { endpoint })
        }
        DiscoveryPolicy::Proceed => {
            log::warn!(
                "[setup] {} discovery timed out after {:?}, proceeding",
                endpoint,
                config.discovery_timeout()
            );
            Ok(())
        }
    }
}

fn step(op: &'static str, status: DdsResult<()>) -> Result<()> {
    status.map_err(|code| {
        log::error!("[teardown] {} failed: {}", op, code);
        Error::Teardown { op, code }
    })
}
