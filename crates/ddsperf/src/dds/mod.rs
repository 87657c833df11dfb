// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # Pub/sub collaborator contract
//!
//! The benchmark harnesses never talk to a concrete middleware. They consume
//! the DDS entity graph through the traits in this module, handed in as
//! `Arc<dyn DomainParticipant>`.
//!
//! ## Entity Hierarchy
//!
//! ```text
//! DomainParticipant
//! +-- Publisher
//! |   +-- DataWriter  ------> Topic
//! +-- Subscriber
//! |   +-- DataReader  <------ Topic
//! |       +-- ReadCondition
//! +-- WaitSet / GuardCondition
//! ```
//!
//! ## Conventions
//!
//! - `create_*` returns `None` on failure (the nil sentinel of the DDS API).
//! - Every other operation returns [`DdsResult`], with [`ReturnCode`]
//!   mirroring the DDS return codes.
//! - Entities are compared by [`InstanceHandle`], so implementations may
//!   hand out wrapper objects.

pub mod condition;
pub mod qos;
pub mod state;

pub use condition::{is_active, Condition, GuardCondition, WaitSet, WaitsetSignal};
pub use qos::{EntityFactory, History, QoS, Reliability, ResourceLimits};
pub use state::{InstanceStateMask, SampleStateMask, StateFilter, ViewStateMask};

use std::sync::Arc;
use std::time::SystemTime;

/// Type name registered for [`KeyedOctets`] topics.
pub const KEYED_OCTETS_TYPE_NAME: &str = "KeyedOctets";

/// `max_samples` value for `take` meaning "everything available".
pub const LENGTH_UNLIMITED: usize = usize::MAX;

/// Non-OK DDS return codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReturnCode {
    Error,
    Unsupported,
    BadParameter,
    PreconditionNotMet,
    OutOfResources,
    NotEnabled,
    ImmutablePolicy,
    InconsistentPolicy,
    AlreadyDeleted,
    Timeout,
    NoData,
    IllegalOperation,
}

impl std::fmt::Display for ReturnCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ReturnCode::Error => "RETCODE_ERROR",
            ReturnCode::Unsupported => "RETCODE_UNSUPPORTED",
            ReturnCode::BadParameter => "RETCODE_BAD_PARAMETER",
            ReturnCode::PreconditionNotMet => "RETCODE_PRECONDITION_NOT_MET",
            ReturnCode::OutOfResources => "RETCODE_OUT_OF_RESOURCES",
            ReturnCode::NotEnabled => "RETCODE_NOT_ENABLED",
            ReturnCode::ImmutablePolicy => "RETCODE_IMMUTABLE_POLICY",
            ReturnCode::InconsistentPolicy => "RETCODE_INCONSISTENT_POLICY",
            ReturnCode::AlreadyDeleted => "RETCODE_ALREADY_DELETED",
            ReturnCode::Timeout => "RETCODE_TIMEOUT",
            ReturnCode::NoData => "RETCODE_NO_DATA",
            ReturnCode::IllegalOperation => "RETCODE_ILLEGAL_OPERATION",
        };
        f.write_str(name)
    }
}

impl std::error::Error for ReturnCode {}

/// Result of a collaborator call.
pub type DdsResult<T> = core::result::Result<T, ReturnCode>;

/// Opaque entity / instance identifier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceHandle(u64);

impl InstanceHandle {
    /// The nil handle ("no specific instance").
    pub const NIL: InstanceHandle = InstanceHandle(0);

    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub const fn value(&self) -> u64 {
        self.0
    }

    pub const fn is_nil(&self) -> bool {
        self.0 == 0
    }
}

impl std::fmt::Display for InstanceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Benchmark payload: a string key naming the instance, plus opaque bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyedOctets {
    pub key: String,
    pub value: Vec<u8>,
}

impl KeyedOctets {
    pub fn new(key: impl Into<String>, value: Vec<u8>) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }
}

/// Per-sample metadata returned alongside taken data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleInfo {
    pub sample_state: SampleStateMask,
    pub view_state: ViewStateMask,
    pub instance_state: InstanceStateMask,
    pub instance_handle: InstanceHandle,
    pub publication_handle: InstanceHandle,
    pub source_timestamp: SystemTime,
    pub valid_data: bool,
}

/// Samples lent by a reader's `take`; must be handed back with
/// [`DataReader::return_loan`].
#[derive(Debug)]
pub struct LoanedSamples {
    loan_id: u64,
    samples: Vec<KeyedOctets>,
    infos: Vec<SampleInfo>,
}

impl LoanedSamples {
    /// Build a loan. `samples` and `infos` are index-aligned.
    pub fn new(loan_id: u64, samples: Vec<KeyedOctets>, infos: Vec<SampleInfo>) -> Self {
        debug_assert_eq!(samples.len(), infos.len());
        Self {
            loan_id,
            samples,
            infos,
        }
    }

    pub fn loan_id(&self) -> u64 {
        self.loan_id
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> &[KeyedOctets] {
        &self.samples
    }

    pub fn infos(&self) -> &[SampleInfo] {
        &self.infos
    }

    /// Number of samples carrying valid data.
    pub fn valid_count(&self) -> usize {
        self.infos.iter().filter(|info| info.valid_data).count()
    }
}

/// Operations common to every DDS entity.
pub trait Entity: Send + Sync {
    fn instance_handle(&self) -> InstanceHandle;

    /// Enable the entity. Enabling twice is a no-op.
    fn enable(&self) -> DdsResult<()>;

    fn is_enabled(&self) -> bool;
}

/// Named data channel with an associated type.
pub trait Topic: Entity {
    fn name(&self) -> &str;
    fn type_name(&self) -> &str;
}

/// Entry point to a domain and factory for every other entity.
pub trait DomainParticipant: Send + Sync {
    fn domain_id(&self) -> u32;

    fn create_publisher(&self, qos: &QoS) -> Option<Arc<dyn Publisher>>;

    fn create_subscriber(&self, qos: &QoS) -> Option<Arc<dyn Subscriber>>;

    /// Create (or bind) a topic. A name already bound to a different type
    /// yields `None`.
    fn create_topic(&self, name: &str, type_name: &str) -> Option<Arc<dyn Topic>>;

    fn create_waitset(&self) -> Option<Arc<dyn WaitSet>>;

    fn create_guard_condition(&self) -> Option<Arc<dyn GuardCondition>>;

    /// Fails with `PreconditionNotMet` while the publisher owns writers.
    fn delete_publisher(&self, publisher: &dyn Publisher) -> DdsResult<()>;

    /// Fails with `PreconditionNotMet` while the subscriber owns readers.
    fn delete_subscriber(&self, subscriber: &dyn Subscriber) -> DdsResult<()>;

    /// Fails with `PreconditionNotMet` while writers or readers use the topic.
    fn delete_topic(&self, topic: &dyn Topic) -> DdsResult<()>;

    /// Recursively delete every entity created by this participant.
    fn delete_contained_entities(&self) -> DdsResult<()>;
}

pub trait Publisher: Entity {
    fn create_datawriter(&self, topic: &dyn Topic, qos: &QoS) -> Option<Arc<dyn DataWriter>>;

    fn delete_datawriter(&self, writer: &dyn DataWriter) -> DdsResult<()>;

    fn delete_contained_entities(&self) -> DdsResult<()>;
}

pub trait Subscriber: Entity {
    fn create_datareader(&self, topic: &dyn Topic, qos: &QoS) -> Option<Arc<dyn DataReader>>;

    /// Fails with `PreconditionNotMet` while the reader owns read conditions
    /// or outstanding loans.
    fn delete_datareader(&self, reader: &dyn DataReader) -> DdsResult<()>;

    fn delete_contained_entities(&self) -> DdsResult<()>;
}

pub trait DataWriter: Entity {
    /// Publish a sample. `handle` may be [`InstanceHandle::NIL`].
    fn write(&self, sample: &KeyedOctets, handle: InstanceHandle) -> DdsResult<()>;

    /// Handles of the readers currently matched with this writer.
    fn matched_subscriptions(&self) -> DdsResult<Vec<InstanceHandle>>;
}

pub trait DataReader: Entity {
    fn create_readcondition(&self, filter: StateFilter) -> Option<Arc<dyn Condition>>;

    fn delete_readcondition(&self, condition: &dyn Condition) -> DdsResult<()>;

    /// Remove up to `max_samples` samples matching `filter` from the reader
    /// cache. An empty result is `ReturnCode::NoData`.
    fn take(&self, max_samples: usize, filter: StateFilter) -> DdsResult<LoanedSamples>;

    fn return_loan(&self, loan: LoanedSamples) -> DdsResult<()>;

    /// Handles of the writers currently matched with this reader.
    fn matched_publications(&self) -> DdsResult<Vec<InstanceHandle>>;

    /// Delete the read conditions created by this reader.
    fn delete_contained_entities(&self) -> DdsResult<()>;
}
