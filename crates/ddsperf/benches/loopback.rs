// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

#![allow(clippy::uninlined_format_args)] // Bench readability over pedantic
#![allow(clippy::cast_possible_truncation)] // Criterion throughput counts

//! Harness benchmarks on the loopback bus
//!
//! Measures the cost of one full `run` of each harness, which bounds the
//! overhead the harness itself adds to a measurement.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use ddsperf::{
    HarnessConfig, LatencyParams, LatencyTest, LoopbackDomain, ThroughputParams, ThroughputTest,
};
use std::time::Duration;

fn bench_config() -> HarnessConfig {
    HarnessConfig::default().with_poll_interval(Duration::from_millis(1))
}

fn bench_latency_run(c: &mut Criterion) {
    let mut group = c.benchmark_group("latency_run");

    for payload in [16usize, 1024, 16 * 1024] {
        let domain = LoopbackDomain::new(0);
        let mut test = LatencyTest::new(bench_config());
        test.initialize(domain.create_participant(), LatencyParams::new(4, 50, payload))
            .expect("initialize");

        group.throughput(Throughput::Elements(200));
        group.bench_with_input(BenchmarkId::from_parameter(payload), &payload, |b, _| {
            b.iter(|| test.run().expect("run"));
        });

        test.finalize().expect("finalize");
    }
    group.finish();
}

fn bench_throughput_run(c: &mut Criterion) {
    let mut group = c.benchmark_group("throughput_run");

    for payload in [64usize, 4096] {
        let domain = LoopbackDomain::new(0);
        let mut test = ThroughputTest::new(bench_config());
        test.initialize(domain.create_participant(), ThroughputParams::new(1000, payload))
            .expect("initialize");

        group.throughput(Throughput::Bytes((1000 * payload) as u64));
        group.bench_with_input(BenchmarkId::from_parameter(payload), &payload, |b, _| {
            b.iter(|| test.run().expect("run"));
        });

        test.finalize().expect("finalize");
    }
    group.finish();
}

criterion_group!(benches, bench_latency_run, bench_throughput_run);
criterion_main!(benches);
