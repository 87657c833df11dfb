// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

use super::*;
use crate::dds::{
    is_active, Condition, DataReader, DataWriter, DomainParticipant, Entity, GuardCondition,
    InstanceHandle, KeyedOctets, LoanedSamples, Publisher, QoS, ReturnCode, StateFilter,
    Subscriber, Topic, ViewStateMask, WaitSet, KEYED_OCTETS_TYPE_NAME, LENGTH_UNLIMITED,
};
use std::thread;
use std::time::{Duration, Instant};

struct Fixture {
    domain: LoopbackDomain,
    participant: Arc<LoopbackParticipant>,
    publisher: Arc<dyn Publisher>,
    subscriber: Arc<dyn Subscriber>,
    topic: Arc<dyn Topic>,
}

fn fixture(domain: LoopbackDomain) -> Fixture {
    let participant = domain.create_participant();
    let publisher = participant
        .create_publisher(&QoS::default())
        .expect("publisher");
    let subscriber = participant
        .create_subscriber(&QoS::default())
        .expect("subscriber");
    let topic = participant
        .create_topic("loopback_test", KEYED_OCTETS_TYPE_NAME)
        .expect("topic");
    Fixture {
        domain,
        participant,
        publisher,
        subscriber,
        topic,
    }
}

fn reliable_keep_all() -> QoS {
    QoS::reliable().keep_all().unlimited_resources()
}

impl Fixture {
    fn writer(&self, qos: QoS) -> Arc<dyn DataWriter> {
        self.publisher
            .create_datawriter(&*self.topic, &qos)
            .expect("writer")
    }

    fn reader(&self, qos: QoS) -> Arc<dyn DataReader> {
        self.subscriber
            .create_datareader(&*self.topic, &qos)
            .expect("reader")
    }
}

fn sample(key: &str) -> KeyedOctets {
    KeyedOctets::new(key, vec![1, 2, 3])
}

fn take_all(reader: &dyn DataReader) -> Vec<String> {
    match reader.take(LENGTH_UNLIMITED, StateFilter::ANY) {
        Ok(loan) => {
            let keys = loan.samples().iter().map(|s| s.key.clone()).collect();
            reader.return_loan(loan).expect("return loan");
            keys
        }
        Err(ReturnCode::NoData) => Vec::new(),
        Err(code) => panic!("take failed: {}", code),
    }
}

// ============================================================================
// Matching
// ============================================================================

#[test]
fn test_auto_enabled_endpoints_match() {
    let f = fixture(LoopbackDomain::new(0));
    let writer = f.writer(reliable_keep_all());
    let reader = f.reader(reliable_keep_all());

    assert_eq!(
        writer.matched_subscriptions().expect("matched"),
        vec![reader.instance_handle()]
    );
    assert_eq!(
        reader.matched_publications().expect("matched"),
        vec![writer.instance_handle()]
    );
}

#[test]
fn test_manual_enable_defers_matching() {
    let f = fixture(LoopbackDomain::new(0));
    let publisher = f
        .participant
        .create_publisher(&QoS::reliable().manual_enable())
        .expect("publisher");
    let writer = publisher
        .create_datawriter(&*f.topic, &reliable_keep_all())
        .expect("writer");
    let reader = f.reader(reliable_keep_all());

    assert!(!writer.is_enabled());
    assert_eq!(writer.matched_subscriptions(), Err(ReturnCode::NotEnabled));
    assert_eq!(
        writer.write(&sample("1"), InstanceHandle::NIL),
        Err(ReturnCode::NotEnabled)
    );
    assert!(reader.matched_publications().expect("matched").is_empty());

    writer.enable().expect("enable");
    assert_eq!(reader.matched_publications().expect("matched").len(), 1);
}

#[test]
fn test_best_effort_writer_does_not_match_reliable_reader() {
    let f = fixture(LoopbackDomain::new(0));
    let writer = f.writer(QoS::best_effort());
    let reader = f.reader(reliable_keep_all());

    assert!(writer.matched_subscriptions().expect("matched").is_empty());
    writer
        .write(&sample("1"), InstanceHandle::NIL)
        .expect("write");
    assert!(take_all(&*reader).is_empty());
}

#[test]
fn test_discovery_delay() {
    let domain = LoopbackDomain::builder(0)
        .discovery_delay(Duration::from_millis(50))
        .build();
    let f = fixture(domain);
    let writer = f.writer(reliable_keep_all());
    let reader = f.reader(reliable_keep_all());

    assert!(reader.matched_publications().expect("matched").is_empty());
    thread::sleep(Duration::from_millis(70));
    assert_eq!(reader.matched_publications().expect("matched").len(), 1);
    assert_eq!(writer.matched_subscriptions().expect("matched").len(), 1);
}

#[test]
fn test_topic_type_mismatch_and_empty_name() {
    let f = fixture(LoopbackDomain::new(7));
    assert_eq!(f.participant.domain_id(), 7);
    assert!(f
        .participant
        .create_topic("loopback_test", "OtherType")
        .is_none());
    assert!(f
        .participant
        .create_topic("", KEYED_OCTETS_TYPE_NAME)
        .is_none());

    let other = f.domain.create_participant();
    let shared = other
        .create_topic("loopback_test", KEYED_OCTETS_TYPE_NAME)
        .expect("same topic from another participant");
    assert_eq!(shared.type_name(), KEYED_OCTETS_TYPE_NAME);
    assert_eq!(f.domain.topic_names(), vec!["loopback_test".to_string()]);
}

// ============================================================================
// Cache
// ============================================================================

#[test]
fn test_take_errors_and_view_state() {
    let f = fixture(LoopbackDomain::new(0));
    let writer = f.writer(reliable_keep_all());
    let reader = f.reader(reliable_keep_all());

    assert_eq!(
        reader.take(LENGTH_UNLIMITED, StateFilter::ANY).unwrap_err(),
        ReturnCode::NoData
    );
    assert_eq!(
        reader.take(0, StateFilter::ANY).unwrap_err(),
        ReturnCode::BadParameter
    );

    writer
        .write(&sample("a"), InstanceHandle::NIL)
        .expect("write");
    let loan = reader.take(1, StateFilter::ANY).expect("take");
    assert_eq!(loan.len(), 1);
    assert_eq!(loan.infos()[0].view_state, ViewStateMask::NEW);
    assert_eq!(loan.infos()[0].publication_handle, writer.instance_handle());
    assert_eq!(loan.valid_count(), 1);
    reader.return_loan(loan).expect("return");

    writer
        .write(&sample("a"), InstanceHandle::NIL)
        .expect("write");
    let new_only = StateFilter {
        view: ViewStateMask::NEW,
        ..StateFilter::ANY
    };
    assert_eq!(
        reader.take(LENGTH_UNLIMITED, new_only).unwrap_err(),
        ReturnCode::NoData
    );
    let loan = reader.take(LENGTH_UNLIMITED, StateFilter::ANY).expect("take");
    assert_eq!(loan.infos()[0].view_state, ViewStateMask::NOT_NEW);
    reader.return_loan(loan).expect("return");
}

#[test]
fn test_take_respects_max_samples_and_order() {
    let f = fixture(LoopbackDomain::new(0));
    let writer = f.writer(reliable_keep_all());
    let reader = f.reader(reliable_keep_all());

    for key in ["1", "2", "3"] {
        writer
            .write(&sample(key), InstanceHandle::NIL)
            .expect("write");
    }
    let loan = reader.take(2, StateFilter::ANY).expect("take");
    let keys: Vec<_> = loan.samples().iter().map(|s| s.key.as_str()).collect();
    assert_eq!(keys, ["1", "2"]);
    reader.return_loan(loan).expect("return");
    assert_eq!(take_all(&*reader), ["3"]);
}

#[test]
fn test_keep_last_replaces_per_instance() {
    let f = fixture(LoopbackDomain::new(0));
    let writer = f.writer(QoS::reliable());
    let reader = f.reader(QoS::reliable().keep_last(1));

    for key in ["1", "1", "2"] {
        writer
            .write(&sample(key), InstanceHandle::NIL)
            .expect("write");
    }
    assert_eq!(take_all(&*reader), ["1", "2"]);
}

#[test]
fn test_return_loan_twice_rejected() {
    let f = fixture(LoopbackDomain::new(0));
    let writer = f.writer(reliable_keep_all());
    let reader = f.reader(reliable_keep_all());

    writer
        .write(&sample("1"), InstanceHandle::NIL)
        .expect("write");
    let loan = reader.take(LENGTH_UNLIMITED, StateFilter::ANY).expect("take");
    let forged = LoanedSamples::new(loan.loan_id(), Vec::new(), Vec::new());
    reader.return_loan(loan).expect("return");
    assert_eq!(
        reader.return_loan(forged),
        Err(ReturnCode::PreconditionNotMet)
    );
}

// ============================================================================
// Flow control
// ============================================================================

#[test]
fn test_reliable_full_cache_times_out() {
    let f = fixture(LoopbackDomain::new(0));
    let writer = f.writer(
        QoS::reliable()
            .keep_all()
            .max_blocking_time(Some(Duration::from_millis(20))),
    );
    let reader = f.reader(QoS::reliable().keep_all().max_samples(1));

    writer
        .write(&sample("1"), InstanceHandle::NIL)
        .expect("first write fits");
    let start = Instant::now();
    assert_eq!(
        writer.write(&sample("2"), InstanceHandle::NIL),
        Err(ReturnCode::Timeout)
    );
    assert!(start.elapsed() >= Duration::from_millis(20));
    assert_eq!(take_all(&*reader), ["1"]);
}

#[test]
fn test_reliable_full_cache_unblocks_on_take() {
    let f = fixture(LoopbackDomain::new(0));
    let writer = f.writer(QoS::reliable().keep_all());
    let reader = f.reader(QoS::reliable().keep_all().max_samples(1));

    writer
        .write(&sample("1"), InstanceHandle::NIL)
        .expect("write");

    thread::scope(|scope| {
        let blocked = scope.spawn(|| writer.write(&sample("2"), InstanceHandle::NIL));
        thread::sleep(Duration::from_millis(20));
        assert_eq!(take_all(&*reader), ["1"]);
        blocked.join().expect("join").expect("second write");
    });
    assert_eq!(take_all(&*reader), ["2"]);
}

#[test]
fn test_best_effort_full_cache_drops() {
    let f = fixture(LoopbackDomain::new(0));
    let writer = f.writer(QoS::best_effort().keep_all());
    let reader = f.reader(QoS::best_effort().keep_all().max_samples(1));

    for key in ["1", "2"] {
        writer
            .write(&sample(key), InstanceHandle::NIL)
            .expect("best-effort write never fails");
    }
    assert_eq!(take_all(&*reader), ["1"]);
}

// ============================================================================
// Faults and journal
// ============================================================================

#[test]
fn test_failing_write_ordinal() {
    let domain = LoopbackDomain::builder(0)
        .faults(LoopbackFaults::fail_writes([2]))
        .record_writes(true)
        .build();
    let f = fixture(domain);
    let writer = f.writer(reliable_keep_all());
    let reader = f.reader(reliable_keep_all());

    assert!(writer.write(&sample("a"), InstanceHandle::NIL).is_ok());
    assert_eq!(
        writer.write(&sample("b"), InstanceHandle::NIL),
        Err(ReturnCode::Error)
    );
    assert!(writer.write(&sample("c"), InstanceHandle::NIL).is_ok());

    assert_eq!(f.domain.write_count(), 3);
    assert_eq!(f.domain.written_keys("loopback_test"), ["a", "c"]);
    assert_eq!(take_all(&*reader), ["a", "c"]);
}

#[test]
fn test_duplicate_delivery() {
    let f = fixture(LoopbackDomain::builder(0).record_writes(true).build());
    let writer = f.writer(reliable_keep_all());
    let reader = f.reader(reliable_keep_all());

    f.domain.set_faults(LoopbackFaults::duplicate_delivery());
    writer
        .write(&sample("1"), InstanceHandle::NIL)
        .expect("write");
    assert_eq!(take_all(&*reader), ["1", "1"]);
    assert_eq!(f.domain.written_keys("loopback_test"), ["1"]);

    f.domain.set_faults(LoopbackFaults::none());
    writer
        .write(&sample("2"), InstanceHandle::NIL)
        .expect("write");
    assert_eq!(take_all(&*reader), ["2"]);
}

#[test]
fn test_journal_off_by_default() {
    let f = fixture(LoopbackDomain::new(0));
    let writer = f.writer(reliable_keep_all());
    let reader = f.reader(reliable_keep_all());

    writer
        .write(&sample("1"), InstanceHandle::NIL)
        .expect("write");
    assert_eq!(take_all(&*reader), ["1"]);
    assert_eq!(f.domain.write_count(), 1);
    assert!(f.domain.written_keys("loopback_test").is_empty());
}

#[test]
fn test_bus_dropped_with_last_topic() {
    let f = fixture(LoopbackDomain::builder(0).record_writes(true).build());
    let other = f.domain.create_participant();
    let _shared = other
        .create_topic("loopback_test", KEYED_OCTETS_TYPE_NAME)
        .expect("shared topic");

    let writer = f.writer(reliable_keep_all());
    writer
        .write(&sample("1"), InstanceHandle::NIL)
        .expect("write");
    f.publisher.delete_datawriter(&*writer).expect("delete writer");

    f.participant.delete_topic(&*f.topic).expect("delete topic");
    assert_eq!(f.domain.topic_names(), ["loopback_test"]);
    assert_eq!(f.domain.written_keys("loopback_test"), ["1"]);

    other.delete_contained_entities().expect("delete contained");
    assert!(f.domain.topic_names().is_empty());
    assert!(f.domain.written_keys("loopback_test").is_empty());

    // A fresh binding starts a fresh bus.
    f.participant
        .create_topic("loopback_test", "OtherType")
        .expect("rebind with another type");
}

// ============================================================================
// Conditions
// ============================================================================

#[test]
fn test_waitset_timeout() {
    let ws = LoopbackWaitSet::new();
    let guard: Arc<dyn GuardCondition> = Arc::new(LoopbackGuardCondition::new());
    ws.attach_condition(Arc::clone(&guard).as_condition())
        .expect("attach");

    let start = Instant::now();
    assert_eq!(
        ws.wait(Some(Duration::from_millis(20))).err(),
        Some(ReturnCode::Timeout)
    );
    assert!(start.elapsed() >= Duration::from_millis(20));
}

#[test]
fn test_waitset_attach_rules() {
    let ws = LoopbackWaitSet::new();
    let guard = Arc::new(LoopbackGuardCondition::new());
    let condition: Arc<dyn Condition> = guard.clone();

    ws.attach_condition(Arc::clone(&condition)).expect("attach");
    assert_eq!(
        ws.attach_condition(Arc::clone(&condition)),
        Err(ReturnCode::PreconditionNotMet)
    );
    assert_eq!(ws.conditions().len(), 1);

    ws.detach_condition(&*condition).expect("detach");
    assert_eq!(
        ws.detach_condition(&*condition),
        Err(ReturnCode::PreconditionNotMet)
    );
}

#[test]
fn test_guard_condition_wakes_waiter() {
    let ws = LoopbackWaitSet::new();
    let guard: Arc<dyn GuardCondition> = Arc::new(LoopbackGuardCondition::new());
    let condition = Arc::clone(&guard).as_condition();
    ws.attach_condition(Arc::clone(&condition)).expect("attach");

    thread::scope(|scope| {
        scope.spawn(|| {
            thread::sleep(Duration::from_millis(20));
            guard.set_trigger_value(true);
        });
        let active = ws.wait(Some(Duration::from_secs(5))).expect("woken");
        assert!(is_active(&active, &*condition));
    });

    guard.set_trigger_value(false);
    assert!(!condition.trigger_value());
}

#[test]
fn test_read_condition_wakes_waiter() {
    let f = fixture(LoopbackDomain::new(0));
    let writer = f.writer(reliable_keep_all());
    let reader = f.reader(reliable_keep_all());

    let ws = LoopbackWaitSet::new();
    let condition = reader
        .create_readcondition(StateFilter::ANY)
        .expect("read condition");
    ws.attach_condition(Arc::clone(&condition)).expect("attach");
    assert!(!condition.trigger_value());

    thread::scope(|scope| {
        scope.spawn(|| {
            thread::sleep(Duration::from_millis(20));
            writer
                .write(&sample("1"), InstanceHandle::NIL)
                .expect("write");
        });
        let active = ws.wait(Some(Duration::from_secs(5))).expect("woken");
        assert!(is_active(&active, &*condition));
    });

    assert_eq!(take_all(&*reader), ["1"]);
    assert!(!condition.trigger_value());
}

// ============================================================================
// Deletion
// ============================================================================

#[test]
fn test_delete_preconditions() {
    let f = fixture(LoopbackDomain::new(0));
    let writer = f.writer(reliable_keep_all());
    let reader = f.reader(reliable_keep_all());
    let condition = reader
        .create_readcondition(StateFilter::ANY)
        .expect("read condition");

    assert_eq!(
        f.participant.delete_publisher(&*f.publisher),
        Err(ReturnCode::PreconditionNotMet)
    );
    assert_eq!(
        f.participant.delete_topic(&*f.topic),
        Err(ReturnCode::PreconditionNotMet)
    );
    assert_eq!(
        f.subscriber.delete_datareader(&*reader),
        Err(ReturnCode::PreconditionNotMet)
    );

    writer
        .write(&sample("1"), InstanceHandle::NIL)
        .expect("write");
    reader.delete_readcondition(&*condition).expect("delete rc");
    let loan = reader.take(LENGTH_UNLIMITED, StateFilter::ANY).expect("take");
    assert_eq!(
        f.subscriber.delete_datareader(&*reader),
        Err(ReturnCode::PreconditionNotMet)
    );
    reader.return_loan(loan).expect("return");

    f.subscriber.delete_datareader(&*reader).expect("delete reader");
    f.publisher.delete_datawriter(&*writer).expect("delete writer");
    assert_eq!(
        f.publisher.delete_datawriter(&*writer),
        Err(ReturnCode::AlreadyDeleted)
    );
    assert_eq!(
        writer.write(&sample("2"), InstanceHandle::NIL),
        Err(ReturnCode::AlreadyDeleted)
    );

    f.participant
        .delete_publisher(&*f.publisher)
        .expect("delete publisher");
    f.participant
        .delete_subscriber(&*f.subscriber)
        .expect("delete subscriber");
    f.participant.delete_topic(&*f.topic).expect("delete topic");
    assert_eq!(
        f.participant.delete_topic(&*f.topic),
        Err(ReturnCode::AlreadyDeleted)
    );
    assert_eq!(f.participant.entity_count(), 0);
}

#[test]
fn test_delete_contained_entities() {
    let f = fixture(LoopbackDomain::new(0));
    let _writer = f.writer(reliable_keep_all());
    let reader = f.reader(reliable_keep_all());
    let _condition = reader.create_readcondition(StateFilter::ANY);

    f.participant
        .delete_contained_entities()
        .expect("delete contained");
    assert_eq!(f.participant.entity_count(), 0);
    assert_eq!(
        f.participant.delete_publisher(&*f.publisher),
        Err(ReturnCode::AlreadyDeleted)
    );
}
