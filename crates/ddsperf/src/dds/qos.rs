// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! QoS policies understood by the collaborator contract.
//!
//! Only the policies the benchmark harness configures are modelled:
//! reliability, history, resource limits and entity factory.
//!
//! ```
//! use ddsperf::dds::qos::{History, QoS};
//!
//! let qos = QoS::reliable().keep_all().unlimited_resources();
//! assert!(matches!(qos.history, History::KeepAll));
//! ```

use std::time::Duration;

/// RELIABILITY policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Reliability {
    /// Samples may be dropped; writes never block.
    BestEffort,
    /// Samples are delivered to every matched reader. A writer blocks when a
    /// reader's resource limits are reached, for at most `max_blocking_time`
    /// (`None` blocks without bound).
    Reliable { max_blocking_time: Option<Duration> },
}

impl Reliability {
    /// Check whether this (offered) policy satisfies a requested one.
    pub fn satisfies(&self, requested: &Reliability) -> bool {
        match (self, requested) {
            (_, Reliability::BestEffort) => true,
            (Reliability::Reliable { .. }, Reliability::Reliable { .. }) => true,
            (Reliability::BestEffort, Reliability::Reliable { .. }) => false,
        }
    }

    pub fn is_reliable(&self) -> bool {
        matches!(self, Reliability::Reliable { .. })
    }
}

/// HISTORY policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum History {
    /// Keep the last `n` samples per instance.
    KeepLast(u32),
    /// Keep every sample until taken (bounded by resource limits).
    KeepAll,
}

/// RESOURCE_LIMITS policy. `None` means unlimited.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ResourceLimits {
    pub max_samples: Option<usize>,
    pub max_instances: Option<usize>,
    pub max_samples_per_instance: Option<usize>,
}

impl ResourceLimits {
    pub fn unlimited() -> Self {
        Self::default()
    }
}

/// Entity factory policy controlling auto-enable behaviour.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EntityFactory {
    /// Whether child entities are enabled as soon as they are created.
    pub autoenable_created_entities: bool,
}

impl EntityFactory {
    /// Create ENTITY_FACTORY with auto-enable (default).
    pub fn auto_enable() -> Self {
        Self {
            autoenable_created_entities: true,
        }
    }

    /// Create ENTITY_FACTORY with manual enable.
    pub fn manual_enable() -> Self {
        Self {
            autoenable_created_entities: false,
        }
    }

    pub fn is_auto_enable(&self) -> bool {
        self.autoenable_created_entities
    }
}

impl Default for EntityFactory {
    fn default() -> Self {
        Self::auto_enable()
    }
}

/// QoS bundle attached to publishers, subscribers, writers and readers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QoS {
    pub reliability: Reliability,
    pub history: History,
    pub resource_limits: ResourceLimits,
    pub entity_factory: EntityFactory,
}

impl QoS {
    /// Best-effort, keep-last(1).
    pub fn best_effort() -> Self {
        Self {
            reliability: Reliability::BestEffort,
            ..Self::default()
        }
    }

    /// Reliable with unbounded max blocking time, keep-last(1).
    pub fn reliable() -> Self {
        Self {
            reliability: Reliability::Reliable {
                max_blocking_time: None,
            },
            ..Self::default()
        }
    }

    pub fn keep_all(mut self) -> Self {
        self.history = History::KeepAll;
        self
    }

    pub fn keep_last(mut self, depth: u32) -> Self {
        self.history = History::KeepLast(depth);
        self
    }

    pub fn unlimited_resources(mut self) -> Self {
        self.resource_limits = ResourceLimits::unlimited();
        self
    }

    /// Cap the number of samples a reader may cache.
    pub fn max_samples(mut self, max: usize) -> Self {
        self.resource_limits.max_samples = Some(max);
        self
    }

    /// Set the reliable max blocking time. No effect on best-effort QoS.
    pub fn max_blocking_time(mut self, max: Option<Duration>) -> Self {
        if let Reliability::Reliable { max_blocking_time } = &mut self.reliability {
            *max_blocking_time = max;
        }
        self
    }

    pub fn manual_enable(mut self) -> Self {
        self.entity_factory = EntityFactory::manual_enable();
        self
    }

    pub fn auto_enable(mut self) -> Self {
        self.entity_factory = EntityFactory::auto_enable();
        self
    }
}

impl Default for QoS {
    fn default() -> Self {
        Self {
            reliability: Reliability::BestEffort,
            history: History::KeepLast(1),
            resource_limits: ResourceLimits::unlimited(),
            entity_factory: EntityFactory::auto_enable(),
        }
    }
}
