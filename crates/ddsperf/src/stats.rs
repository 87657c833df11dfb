// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Summary statistics over latency measurements.

use serde::Serialize;

/// Distribution summary of one latency run, in milliseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct LatencyStats {
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    /// Population standard deviation.
    pub stddev: f64,
    pub p50: f64,
    pub p90: f64,
    pub p99: f64,
    pub p999: f64,
}

impl LatencyStats {
    /// Summarize `samples`. An empty slice yields all zeros.
    ///
    /// Percentiles use the nearest rank on the sorted samples, at index
    /// `round(p / 100 * (n - 1))`.
    pub fn from_samples(samples: &[f64]) -> Self {
        if samples.is_empty() {
            return Self::default();
        }

        let mut sorted = samples.to_vec();
        sorted.sort_by(f64::total_cmp);

        let n = sorted.len();
        let mean = samples.iter().sum::<f64>() / n as f64;
        let variance = samples.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n as f64;

        let percentile = |p: f64| -> f64 {
            let idx = ((p / 100.0) * (n - 1) as f64).round() as usize;
            sorted[idx.min(n - 1)]
        };

        Self {
            count: n,
            min: sorted[0],
            max: sorted[n - 1],
            mean,
            stddev: variance.sqrt(),
            p50: percentile(50.0),
            p90: percentile(90.0),
            p99: percentile(99.0),
            p999: percentile(99.9),
        }
    }

    /// Round trips per second implied by the mean latency.
    pub fn round_trips_per_sec(&self) -> f64 {
        if self.mean > 0.0 {
            1000.0 / self.mean
        } else {
            0.0
        }
    }
}
