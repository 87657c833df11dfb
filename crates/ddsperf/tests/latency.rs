// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Latency harness integration tests over the loopback bus.

use ddsperf::{
    DiscoveryPolicy, Error, HarnessConfig, LatencyParams, LatencyStats, LatencyTest, LoopbackDomain,
    LoopbackFaults,
};
use std::time::{Duration, Instant};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn test_config() -> HarnessConfig {
    HarnessConfig::default()
        .with_discovery_timeout(Duration::from_secs(2))
        .with_poll_interval(Duration::from_millis(1))
        .with_receive_timeout(Duration::from_millis(500))
}

/// Domain that keeps the key of every write.
fn recording_domain() -> LoopbackDomain {
    LoopbackDomain::builder(0).record_writes(true).build()
}

fn initialized(domain: &LoopbackDomain, params: LatencyParams) -> LatencyTest {
    let mut test = LatencyTest::new(test_config());
    test.initialize(domain.create_participant(), params)
        .expect("initialize");
    test
}

#[test]
fn test_two_instances_three_samples() {
    init_logging();
    let domain = recording_domain();
    let mut test = initialized(&domain, LatencyParams::new(2, 3, 16));
    let topic = test.topic_name().expect("topic").to_string();

    test.run().expect("run");

    assert_eq!(test.latencies().len(), 6);
    assert!(test.latencies().iter().all(|ms| *ms >= 0.0));
    assert_eq!(
        domain.written_keys(&topic),
        ["1", "2", "1", "2", "1", "2"]
    );
    test.finalize().expect("finalize");
}

#[test]
fn test_instance_index_varies_fastest() {
    let domain = recording_domain();
    let mut test = initialized(&domain, LatencyParams::new(3, 2, 8));
    let topic = test.topic_name().expect("topic").to_string();

    test.run().expect("run");
    assert_eq!(
        domain.written_keys(&topic),
        ["1", "2", "3", "1", "2", "3"]
    );
    test.finalize().expect("finalize");
}

#[test]
fn test_result_count_matches_product() {
    let domain = LoopbackDomain::new(0);
    let mut test = initialized(&domain, LatencyParams::new(4, 25, 128));

    test.run().expect("run");
    assert_eq!(test.latencies().len(), 100);

    let stats = LatencyStats::from_samples(test.latencies());
    assert_eq!(stats.count, 100);
    assert!(stats.min <= stats.p50 && stats.p50 <= stats.max);
    test.finalize().expect("finalize");
}

#[test]
fn test_single_round_trip() {
    let domain = LoopbackDomain::new(0);
    let mut test = initialized(&domain, LatencyParams::new(1, 1, 64));

    test.run().expect("run");
    assert_eq!(test.latencies().len(), 1);
    test.finalize().expect("finalize");
}

#[test]
fn test_empty_payload() {
    let domain = LoopbackDomain::new(0);
    let mut test = initialized(&domain, LatencyParams::new(2, 2, 0));

    test.run().expect("run");
    assert_eq!(test.latencies().len(), 4);
    test.finalize().expect("finalize");
}

#[test]
fn test_second_run_starts_from_empty() {
    let domain = recording_domain();
    let mut test = initialized(&domain, LatencyParams::new(2, 5, 32));
    let topic = test.topic_name().expect("topic").to_string();

    test.run().expect("first run");
    assert_eq!(test.latencies().len(), 10);
    test.run().expect("second run");
    assert_eq!(test.latencies().len(), 10);
    assert_eq!(domain.written_keys(&topic).len(), 20);
    test.finalize().expect("finalize");
}

#[test]
fn test_duplicate_delivery_is_fatal() {
    init_logging();
    let domain = LoopbackDomain::new(0);
    let mut test = initialized(&domain, LatencyParams::new(1, 3, 16));

    domain.set_faults(LoopbackFaults::duplicate_delivery());
    let err = test.run().unwrap_err();
    assert!(
        matches!(err, Error::UnexpectedSampleCount { count: 2 }),
        "unexpected error: {}",
        err
    );
    assert!(test.latencies().is_empty());

    domain.set_faults(LoopbackFaults::none());
    test.finalize().expect("finalize");
}

#[test]
fn test_failed_write_is_skipped() {
    init_logging();
    let domain = recording_domain();
    let mut test = initialized(&domain, LatencyParams::new(2, 2, 16));
    let topic = test.topic_name().expect("topic").to_string();

    domain.set_faults(LoopbackFaults::fail_writes([domain.write_count() + 2]));
    test.run().expect("run");

    assert_eq!(test.latencies().len(), 3);
    assert_eq!(domain.written_keys(&topic), ["1", "1", "2"]);
    test.finalize().expect("finalize");
}

#[test]
fn test_last_write_failing_still_terminates() {
    let domain = LoopbackDomain::new(0);
    let mut test = initialized(&domain, LatencyParams::new(1, 3, 16));

    domain.set_faults(LoopbackFaults::fail_writes([domain.write_count() + 3]));
    test.run().expect("run");
    assert_eq!(test.latencies().len(), 2);
    test.finalize().expect("finalize");
}

#[test]
fn test_unmatched_reader_reports_lost_samples() {
    init_logging();
    let domain = LoopbackDomain::builder(0)
        .discovery_delay(Duration::from_secs(2))
        .build();
    let config = test_config()
        .with_discovery_timeout(Duration::from_millis(20))
        .with_discovery_policy(DiscoveryPolicy::Proceed)
        .with_receive_timeout(Duration::from_millis(50));
    let mut test = LatencyTest::new(config);
    test.initialize(domain.create_participant(), LatencyParams::new(1, 3, 8))
        .expect("proceed despite discovery timeout");

    let start = Instant::now();
    let err = test.run().unwrap_err();
    assert!(
        matches!(
            err,
            Error::SamplesLost {
                received: 0,
                expected: 3
            }
        ),
        "unexpected error: {}",
        err
    );
    // Timed-out pairs are not measurements.
    assert!(test.latencies().is_empty());
    assert!(start.elapsed() < Duration::from_secs(2));
    test.finalize().expect("finalize");
}

#[test]
fn test_exported_results() {
    let domain = LoopbackDomain::new(0);
    let mut test = initialized(&domain, LatencyParams::new(2, 4, 16));
    test.run().expect("run");

    let buf = ddsperf::encode_latencies(test.latencies());
    assert_eq!(buf.len(), 4 + 8 * 8);
    assert_eq!(
        ddsperf::decode_latencies(&buf).expect("decode"),
        test.latencies()
    );
    test.finalize().expect("finalize");
}
