// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Harness lifecycle: `initialize` -> `run`* -> `finalize`.

use crate::error::{Error, Result};

/// Lifecycle state of one harness instance.
pub(crate) enum Lifecycle<S> {
    Idle,
    Ready(S),
    Finalized,
}

impl<S> Lifecycle<S> {
    /// Check that `initialize` may proceed.
    pub fn check_idle(&self) -> Result<()> {
        match self {
            Lifecycle::Idle => Ok(()),
            Lifecycle::Ready(_) => Err(Error::AlreadyInitialized),
            Lifecycle::Finalized => Err(Error::NotInitialized),
        }
    }

    pub fn session(&self) -> Result<&S> {
        match self {
            Lifecycle::Ready(session) => Ok(session),
            Lifecycle::Idle | Lifecycle::Finalized => Err(Error::NotInitialized),
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Lifecycle::Ready(_))
    }

    /// Take the session out, leaving the harness finalized.
    ///
    /// The state moves to `Finalized` even when the caller's teardown later
    /// fails, so a harness is never torn down twice.
    pub fn finish(&mut self) -> Result<S> {
        match std::mem::replace(self, Lifecycle::Finalized) {
            Lifecycle::Ready(session) => Ok(session),
            Lifecycle::Idle => {
                *self = Lifecycle::Idle;
                Err(Error::NotInitialized)
            }
            Lifecycle::Finalized => Err(Error::NotInitialized),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle_transitions() {
        let mut state: Lifecycle<u32> = Lifecycle::Idle;
        assert!(state.check_idle().is_ok());
        assert!(matches!(state.session(), Err(Error::NotInitialized)));
        assert!(matches!(state.finish(), Err(Error::NotInitialized)));
        assert!(state.check_idle().is_ok());

        state = Lifecycle::Ready(7);
        assert!(matches!(state.check_idle(), Err(Error::AlreadyInitialized)));
        assert_eq!(*state.session().expect("ready"), 7);
        assert_eq!(state.finish().expect("finish"), 7);

        assert!(!state.is_ready());
        assert!(matches!(state.check_idle(), Err(Error::NotInitialized)));
        assert!(matches!(state.session(), Err(Error::NotInitialized)));
        assert!(matches!(state.finish(), Err(Error::NotInitialized)));
    }
}
