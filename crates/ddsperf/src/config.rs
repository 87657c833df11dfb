// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Harness configuration
//!
//! Timing knobs and the discovery-timeout policy shared by both harnesses.
//! Values come from, in increasing precedence: [`HarnessConfig::default`], a
//! YAML document, then `DDSPERF_*` environment variables.
//!
//! ```yaml
//! discovery_timeout_ms: 5000
//! discovery_poll_interval_ms: 100
//! receive_timeout_ms: 5000
//! discovery_policy: fail-fast
//! topic_prefix: ddsperf
//! ```

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Discovery wait default (milliseconds).
pub const DEFAULT_DISCOVERY_TIMEOUT_MS: u64 = 5000;

/// Matched-peer polling interval default (milliseconds).
pub const DEFAULT_DISCOVERY_POLL_INTERVAL_MS: u64 = 100;

/// Latency receiver wait-set timeout default (milliseconds).
pub const DEFAULT_RECEIVE_TIMEOUT_MS: u64 = 5000;

pub const ENV_DISCOVERY_TIMEOUT_MS: &str = "DDSPERF_DISCOVERY_TIMEOUT_MS";
pub const ENV_POLL_INTERVAL_MS: &str = "DDSPERF_POLL_INTERVAL_MS";
pub const ENV_RECEIVE_TIMEOUT_MS: &str = "DDSPERF_RECEIVE_TIMEOUT_MS";
pub const ENV_DISCOVERY_POLICY: &str = "DDSPERF_DISCOVERY_POLICY";

/// What `initialize` does when a discovery wait times out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DiscoveryPolicy {
    /// Log a warning and continue; `run` may hang without a matched peer.
    #[default]
    Proceed,
    /// Abort `initialize` with [`Error::DiscoveryTimeout`].
    FailFast,
}

impl FromStr for DiscoveryPolicy {
    type Err = String;

    fn from_str(s: &str) -> core::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "proceed" | "continue" => Ok(DiscoveryPolicy::Proceed),
            "fail-fast" | "failfast" | "fail_fast" | "abort" => Ok(DiscoveryPolicy::FailFast),
            _ => Err(format!("Unknown discovery policy: {}", s)),
        }
    }
}

/// Harness configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HarnessConfig {
    pub discovery_timeout_ms: u64,
    pub discovery_poll_interval_ms: u64,
    pub receive_timeout_ms: u64,
    pub discovery_policy: DiscoveryPolicy,
    /// Prepended to the random topic name of each harness.
    pub topic_prefix: String,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            discovery_timeout_ms: DEFAULT_DISCOVERY_TIMEOUT_MS,
            discovery_poll_interval_ms: DEFAULT_DISCOVERY_POLL_INTERVAL_MS,
            receive_timeout_ms: DEFAULT_RECEIVE_TIMEOUT_MS,
            discovery_policy: DiscoveryPolicy::Proceed,
            topic_prefix: "ddsperf".to_string(),
        }
    }
}

impl HarnessConfig {
    /// Parse a YAML document. Missing keys keep their defaults.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: HarnessConfig = serde_yaml::from_str(yaml)
            .map_err(|e| Error::Config(format!("Failed to parse YAML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a YAML file.
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml_str(&content)
    }

    /// Apply `DDSPERF_*` environment overrides.
    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup (environment-shaped).
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let parse_ms = |key: &str, value: String| -> Result<u64> {
            value
                .trim()
                .parse()
                .map_err(|_| Error::Config(format!("{}: not a number of milliseconds: {}", key, value)))
        };

        if let Some(v) = lookup(ENV_DISCOVERY_TIMEOUT_MS) {
            self.discovery_timeout_ms = parse_ms(ENV_DISCOVERY_TIMEOUT_MS, v)?;
        }
        if let Some(v) = lookup(ENV_POLL_INTERVAL_MS) {
            self.discovery_poll_interval_ms = parse_ms(ENV_POLL_INTERVAL_MS, v)?;
        }
        if let Some(v) = lookup(ENV_RECEIVE_TIMEOUT_MS) {
            self.receive_timeout_ms = parse_ms(ENV_RECEIVE_TIMEOUT_MS, v)?;
        }
        if let Some(v) = lookup(ENV_DISCOVERY_POLICY) {
            self.discovery_policy = v
                .parse()
                .map_err(|e: String| Error::Config(format!("{}: {}", ENV_DISCOVERY_POLICY, e)))?;
        }

        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        if self.discovery_poll_interval_ms == 0 {
            return Err(Error::Config(
                "discovery_poll_interval_ms must be greater than 0".to_string(),
            ));
        }
        if self.receive_timeout_ms == 0 {
            return Err(Error::Config(
                "receive_timeout_ms must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn with_discovery_timeout(mut self, timeout: Duration) -> Self {
        self.discovery_timeout_ms = duration_ms(timeout);
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.discovery_poll_interval_ms = duration_ms(interval).max(1);
        self
    }

    pub fn with_receive_timeout(mut self, timeout: Duration) -> Self {
        self.receive_timeout_ms = duration_ms(timeout).max(1);
        self
    }

    pub fn with_discovery_policy(mut self, policy: DiscoveryPolicy) -> Self {
        self.discovery_policy = policy;
        self
    }

    pub fn with_topic_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.topic_prefix = prefix.into();
        self
    }

    pub fn discovery_timeout(&self) -> Duration {
        Duration::from_millis(self.discovery_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.discovery_poll_interval_ms)
    }

    pub fn receive_timeout(&self) -> Duration {
        Duration::from_millis(self.receive_timeout_ms)
    }
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
