// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Harness error type.

use crate::dds::ReturnCode;

/// Errors returned by harness operations.
///
/// Any error from `initialize`, `run` or `finalize` means the measurement is
/// invalid. Transient per-sample failures are logged, never returned.
#[derive(Debug)]
pub enum Error {
    // ========================================================================
    // Setup Errors
    // ========================================================================
    /// Session parameters rejected (e.g. zero samples).
    InvalidParameter(String),
    /// A `create_*` call returned the nil handle.
    EntityCreation(&'static str),
    /// Enable / attach returned a non-OK status during `initialize`.
    Setup { op: &'static str, code: ReturnCode },
    /// Peer discovery did not complete in time (fail-fast policy only).
    DiscoveryTimeout { endpoint: &'static str },

    // ========================================================================
    // Run Errors
    // ========================================================================
    /// More than one sample was available while exactly one was in flight.
    UnexpectedSampleCount { count: usize },
    /// A worker thread panicked.
    WorkerPanicked(&'static str),
    /// The counterpart worker went away mid-run.
    WorkerDisconnected(&'static str),
    /// The sender finished but some written samples never reached the reader.
    SamplesLost { received: usize, expected: usize },

    // ========================================================================
    // Teardown Errors
    // ========================================================================
    /// First teardown step that returned a non-OK status.
    Teardown { op: &'static str, code: ReturnCode },

    // ========================================================================
    // Lifecycle Errors
    // ========================================================================
    /// No live session: `initialize` was never called or `finalize` already ran.
    NotInitialized,
    /// `initialize` called twice.
    AlreadyInitialized,

    // ========================================================================
    // Other Errors
    // ========================================================================
    /// Configuration could not be parsed or validated.
    Config(String),
    /// I/O error with underlying cause.
    Io(std::io::Error),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::InvalidParameter(msg) => write!(f, "Invalid parameter: {}", msg),
            Error::EntityCreation(entity) => write!(f, "Failed to create {}", entity),
            Error::Setup { op, code } => write!(f, "Setup step {} failed: {}", op, code),
            Error::DiscoveryTimeout { endpoint } => {
                write!(f, "Discovery timeout: {} found no matched peer", endpoint)
            }
            Error::UnexpectedSampleCount { count } => write!(
                f,
                "Expected at most one sample in flight, {} were available",
                count
            ),
            Error::WorkerPanicked(role) => write!(f, "{} thread panicked", role),
            Error::WorkerDisconnected(role) => write!(f, "{} stopped before the run completed", role),
            Error::SamplesLost { received, expected } => write!(
                f,
                "Samples lost: {} of {} written samples were received",
                received, expected
            ),
            Error::Teardown { op, code } => write!(f, "Teardown step {} failed: {}", op, code),
            Error::NotInitialized => write!(f, "Harness not initialized"),
            Error::AlreadyInitialized => write!(f, "Harness already initialized"),
            Error::Config(msg) => write!(f, "Configuration error: {}", msg),
            Error::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

/// Convenient alias for harness results.
pub type Result<T> = core::result::Result<T, Error>;
