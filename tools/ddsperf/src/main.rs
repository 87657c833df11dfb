// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! ddsperf - DDS latency and throughput benchmark tool
//!
//! Drives the `ddsperf` harnesses against the in-process loopback bus.

use clap::{Parser, Subcommand};
use colored::*;
use ddsperf::{
    DiscoveryPolicy, HarnessConfig, LatencyParams, LatencyStats, LatencyTest, LoopbackDomain,
    ThroughputParams, ThroughputTest,
};
use std::path::PathBuf;
use std::time::{Duration, Instant};

/// DDS latency and throughput benchmark tool
#[derive(Parser, Debug)]
#[command(name = "ddsperf")]
#[command(version)]
#[command(about = "Measure pub/sub round-trip latency and throughput")]
struct Args {
    #[command(subcommand)]
    mode: Mode,

    /// DDS domain ID
    #[arg(short, long, default_value = "0", global = true)]
    domain: u32,

    /// YAML harness configuration
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Abort when discovery times out instead of proceeding
    #[arg(long, global = true)]
    fail_fast_discovery: bool,

    /// Simulated discovery delay of the loopback bus (milliseconds)
    #[arg(long, default_value = "0", global = true)]
    discovery_delay_ms: u64,

    /// Output JSON results
    #[arg(long, global = true)]
    json: bool,

    /// Quiet mode - only output final results
    #[arg(long, global = true)]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Mode {
    /// Ping/ack round-trip latency
    Latency {
        /// Number of distinct instances (keys)
        #[arg(short = 'i', long, default_value = "1")]
        instances: usize,

        /// Round trips per instance
        #[arg(short = 'n', long, default_value = "1000")]
        samples: usize,

        /// Payload size in bytes
        #[arg(short = 's', long, default_value = "64")]
        size: usize,

        /// Write raw latencies (u32 count + f64 values, native order) to a file
        #[arg(long)]
        export: Option<PathBuf>,
    },
    /// One-way burst throughput
    Throughput {
        /// Number of samples to publish
        #[arg(short = 'n', long, default_value = "100000")]
        samples: usize,

        /// Payload size in bytes
        #[arg(short = 's', long, default_value = "64")]
        size: usize,
    },
}

fn main() {
    // Initialize logger for RUST_LOG-based debug output
    env_logger::init();

    let args = Args::parse();

    if let Err(e) = run(&args) {
        eprintln!("{}: {}", "Error".red().bold(), e);
        std::process::exit(1);
    }
}

fn run(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(args)?;
    let domain = LoopbackDomain::builder(args.domain)
        .discovery_delay(Duration::from_millis(args.discovery_delay_ms))
        .build();

    match &args.mode {
        Mode::Latency {
            instances,
            samples,
            size,
            export,
        } => run_latency(
            args,
            config,
            &domain,
            LatencyParams::new(*instances, *samples, *size),
            export.as_ref(),
        ),
        Mode::Throughput { samples, size } => run_throughput(
            args,
            config,
            &domain,
            ThroughputParams::new(*samples, *size),
        ),
    }
}

fn load_config(args: &Args) -> Result<HarnessConfig, Box<dyn std::error::Error>> {
    let mut config = match &args.config {
        Some(path) => HarnessConfig::from_yaml_file(path)?,
        None => HarnessConfig::default(),
    }
    .with_env_overrides()?;

    if args.fail_fast_discovery {
        config = config.with_discovery_policy(DiscoveryPolicy::FailFast);
    }
    log::debug!("[cli] effective config: {:?}", config);
    Ok(config)
}

fn run_latency(
    args: &Args,
    config: HarnessConfig,
    domain: &LoopbackDomain,
    params: LatencyParams,
    export: Option<&PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let human = !args.quiet && !args.json;
    if human {
        eprintln!("{} Latency run", ">>>".green().bold());
        eprintln!(
            "    domain={}, instances={}, samples={}, size={} bytes",
            args.domain, params.total_instances, params.total_samples, params.payload_size
        );
    }

    let mut test = LatencyTest::new(config);
    test.initialize(domain.create_participant(), params)?;
    if human {
        eprintln!(
            "{}",
            format!("    Topic: {}", test.topic_name().unwrap_or("?")).dimmed()
        );
    }

    let start = Instant::now();
    test.run()?;
    let total_time = start.elapsed();

    let stats = LatencyStats::from_samples(test.latencies());
    if let Some(path) = export {
        std::fs::write(path, ddsperf::encode_latencies(test.latencies()))?;
        if human {
            eprintln!("    Exported {} latencies to {}", stats.count, path.display());
        }
    }
    test.finalize()?;

    if args.json {
        print_latency_json(&stats, &params, total_time)?;
    } else {
        print_latency_results(&stats, &params, total_time, args.quiet);
    }
    Ok(())
}

fn run_throughput(
    args: &Args,
    config: HarnessConfig,
    domain: &LoopbackDomain,
    params: ThroughputParams,
) -> Result<(), Box<dyn std::error::Error>> {
    let human = !args.quiet && !args.json;
    if human {
        eprintln!("{} Throughput run", ">>>".green().bold());
        eprintln!(
            "    domain={}, samples={}, size={} bytes",
            args.domain, params.total_samples, params.payload_size
        );
    }

    let mut test = ThroughputTest::new(config);
    test.initialize(domain.create_participant(), params)?;

    let start = Instant::now();
    let received = test.run()?;
    let total_time = start.elapsed();
    test.finalize()?;

    let secs = total_time.as_secs_f64();
    let msgs_per_sec = if secs > 0.0 { received as f64 / secs } else { 0.0 };
    let mbits_per_sec = msgs_per_sec * (params.payload_size as f64) * 8.0 / 1_000_000.0;

    if args.json {
        let report = serde_json::json!({
            "mode": "throughput",
            "payload_size": params.payload_size,
            "sent": params.total_samples,
            "received": received,
            "duration_secs": secs,
            "msgs_per_sec": msgs_per_sec,
            "mbits_per_sec": mbits_per_sec,
        });
        println!("{}", serde_json::to_string(&report)?);
    } else if args.quiet {
        println!(
            "received={}/{} msgs={:.0}/s {:.2} Mbit/s",
            received, params.total_samples, msgs_per_sec, mbits_per_sec
        );
    } else {
        println!();
        println!("{}", "=== ddsperf Throughput Results ===".bold());
        println!();
        println!("  {} {} bytes", "Payload size:".cyan(), params.payload_size);
        println!("  {} {}", "Sent:".cyan(), params.total_samples);
        println!("  {} {}", "Received:".cyan(), received);
        println!("  {} {:.3}s", "Duration:".cyan(), secs);
        println!();
        println!("  {} {:.0} msg/s", "Rate:".green(), msgs_per_sec);
        println!("  {} {:.2} Mbit/s", "Bandwidth:".green(), mbits_per_sec);
        println!();
    }
    Ok(())
}

fn print_latency_results(
    stats: &LatencyStats,
    params: &LatencyParams,
    total_time: Duration,
    quiet: bool,
) {
    if quiet {
        println!(
            "min={:.3} max={:.3} avg={:.3} p99={:.3} ms",
            stats.min, stats.max, stats.mean, stats.p99
        );
        return;
    }

    let skipped = params.total_pairs().saturating_sub(stats.count);

    println!();
    println!("{}", "=== ddsperf Latency Results ===".bold());
    println!();
    println!("  {} {} bytes", "Payload size:".cyan(), params.payload_size);
    println!("  {} {}", "Round trips:".cyan(), stats.count);
    println!("  {} {}", "Skipped:".cyan(), skipped);
    println!("  {} {:.2}s", "Duration:".cyan(), total_time.as_secs_f64());
    println!();
    println!("{}", "--- Latency (milliseconds) ---".dimmed());
    println!("  {} {:>10.4} ms", "Min:".green(), stats.min);
    println!("  {} {:>10.4} ms", "Max:".red(), stats.max);
    println!("  {} {:>10.4} ms", "Mean:".yellow(), stats.mean);
    println!("  {} {:>10.4} ms", "Stddev:".yellow(), stats.stddev);
    println!();
    println!("{}", "--- Percentiles ---".dimmed());
    println!("  {} {:>10.4} ms", "p50:".white(), stats.p50);
    println!("  {} {:>10.4} ms", "p90:".white(), stats.p90);
    println!("  {} {:>10.4} ms", "p99:".white(), stats.p99);
    println!("  {} {:>10.4} ms", "p99.9:".white(), stats.p999);
    println!();
    if stats.count > 0 {
        println!(
            "  {} {:.0} round trips/s",
            "Rate:".cyan(),
            stats.round_trips_per_sec()
        );
    }
    println!();
}

fn print_latency_json(
    stats: &LatencyStats,
    params: &LatencyParams,
    total_time: Duration,
) -> Result<(), serde_json::Error> {
    let report = serde_json::json!({
        "mode": "latency",
        "payload_size": params.payload_size,
        "instances": params.total_instances,
        "samples": params.total_samples,
        "duration_secs": total_time.as_secs_f64(),
        "latency_ms": stats,
    });
    println!("{}", serde_json::to_string(&report)?);
    Ok(())
}
