// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Entity factory, discovery-wait and payload helpers shared by both
//! harnesses.
//!
//! Every entity is created with auto-enable turned off on its factory so the
//! harness can attach the wait-set before discovery starts.

use crate::dds::{
    DataReader, DataWriter, DdsResult, DomainParticipant, Entity, Publisher, QoS, Subscriber,
    Topic, KEYED_OCTETS_TYPE_NAME,
};
use crate::error::{Error, Result};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Length of the random part of generated topic names.
pub const TOPIC_NAME_RANDOM_LEN: usize = 16;

/// Payload bytes are drawn from `0..PAYLOAD_VALUE_RANGE`.
pub const PAYLOAD_VALUE_RANGE: u8 = 100;

/// QoS for publisher and subscriber: children start disabled.
pub fn group_qos() -> QoS {
    QoS::reliable().manual_enable()
}

/// QoS for the writer and reader: reliable, keep-all, unlimited resources,
/// unbounded max blocking time.
pub fn endpoint_qos() -> QoS {
    QoS::reliable()
        .keep_all()
        .unlimited_resources()
        .max_blocking_time(None)
}

pub fn create_publisher(participant: &dyn DomainParticipant) -> Result<Arc<dyn Publisher>> {
    participant
        .create_publisher(&group_qos())
        .ok_or(Error::EntityCreation("publisher"))
}

pub fn create_subscriber(participant: &dyn DomainParticipant) -> Result<Arc<dyn Subscriber>> {
    participant
        .create_subscriber(&group_qos())
        .ok_or(Error::EntityCreation("subscriber"))
}

pub fn create_topic(participant: &dyn DomainParticipant, name: &str) -> Result<Arc<dyn Topic>> {
    participant
        .create_topic(name, KEYED_OCTETS_TYPE_NAME)
        .ok_or(Error::EntityCreation("topic"))
}

pub fn create_datawriter(publisher: &dyn Publisher, topic: &dyn Topic) -> Result<Arc<dyn DataWriter>> {
    publisher
        .create_datawriter(topic, &endpoint_qos())
        .ok_or(Error::EntityCreation("datawriter"))
}

pub fn create_datareader(
    subscriber: &dyn Subscriber,
    topic: &dyn Topic,
) -> Result<Arc<dyn DataReader>> {
    subscriber
        .create_datareader(topic, &endpoint_qos())
        .ok_or(Error::EntityCreation("datareader"))
}

/// Map a non-OK setup status to [`Error::Setup`].
pub fn check_setup(op: &'static str, status: DdsResult<()>) -> Result<()> {
    status.map_err(|code| {
        log::error!("[setup] {} failed: {}", op, code);
        Error::Setup { op, code }
    })
}

pub fn enable(op: &'static str, entity: &dyn Entity) -> Result<()> {
    check_setup(op, entity.enable())
}

/// Poll `matched` until it reports at least `min_matched` peers or `timeout`
/// elapses.
fn wait_for_matched<F>(
    what: &str,
    min_matched: usize,
    timeout: Duration,
    poll_interval: Duration,
    matched: F,
) -> bool
where
    F: Fn() -> DdsResult<usize>,
{
    let start = Instant::now();
    loop {
        match matched() {
            Ok(count) if count >= min_matched => {
                log::debug!(
                    "[setup] {}: {} matched after {:?}",
                    what,
                    count,
                    start.elapsed()
                );
                return true;
            }
            Ok(_) => {}
            Err(code) => log::debug!("[setup] {}: matched query failed: {}", what, code),
        }

        let elapsed = start.elapsed();
        if elapsed >= timeout {
            return false;
        }
        thread::sleep(poll_interval.min(timeout - elapsed));
    }
}

/// Wait until `reader` is matched with at least `min_matched` writers.
pub fn wait_for_publications(
    reader: &dyn DataReader,
    min_matched: usize,
    timeout: Duration,
    poll_interval: Duration,
) -> bool {
    wait_for_matched("publications", min_matched, timeout, poll_interval, || {
        reader.matched_publications().map(|m| m.len())
    })
}

/// Wait until `writer` is matched with at least `min_matched` readers.
pub fn wait_for_subscriptions(
    writer: &dyn DataWriter,
    min_matched: usize,
    timeout: Duration,
    poll_interval: Duration,
) -> bool {
    wait_for_matched("subscriptions", min_matched, timeout, poll_interval, || {
        writer.matched_subscriptions().map(|m| m.len())
    })
}

/// Random alphanumeric topic name, `<prefix>_<16 chars>` (bare when the
/// prefix is empty).
pub fn random_topic_name(prefix: &str) -> String {
    let suffix: String = std::iter::repeat_with(fastrand::alphanumeric)
        .take(TOPIC_NAME_RANDOM_LEN)
        .collect();
    if prefix.is_empty() {
        suffix
    } else {
        format!("{}_{}", prefix, suffix)
    }
}

/// Buffer of `size` pseudo-random small values.
pub fn random_payload(size: usize) -> Vec<u8> {
    (0..size).map(|_| fastrand::u8(..PAYLOAD_VALUE_RANGE)).collect()
}
