// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Sample, view and instance state masks used by `take` and read conditions.
//!
//! A [`SampleInfo`](super::SampleInfo) carries exactly one bit of each mask;
//! a filter matches when the info bit intersects the requested mask.

/// Sample state mask (DDS v1.4 section 2.2.2.5.4)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SampleStateMask(u32);

impl SampleStateMask {
    /// Sample has been read
    pub const READ: SampleStateMask = SampleStateMask(1 << 0);

    /// Sample has not been read
    pub const NOT_READ: SampleStateMask = SampleStateMask(1 << 1);

    /// Any sample state
    pub const ANY: SampleStateMask = SampleStateMask(Self::READ.0 | Self::NOT_READ.0);

    /// Create from raw bits
    pub const fn from_bits(bits: u32) -> Self {
        SampleStateMask(bits)
    }

    /// Get raw bits
    pub const fn bits(&self) -> u32 {
        self.0
    }

    /// Check if every bit of `other` is set
    pub const fn contains(&self, other: SampleStateMask) -> bool {
        (self.0 & other.0) == other.0
    }

    /// Check if any bit of `other` is set
    pub const fn intersects(&self, other: SampleStateMask) -> bool {
        (self.0 & other.0) != 0
    }
}

impl std::ops::BitOr for SampleStateMask {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        SampleStateMask(self.0 | rhs.0)
    }
}

/// View state mask (DDS v1.4 section 2.2.2.5.4)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ViewStateMask(u32);

impl ViewStateMask {
    /// First sample of an instance the reader has not accessed yet
    pub const NEW: ViewStateMask = ViewStateMask(1 << 0);

    /// Instance already accessed by the reader
    pub const NOT_NEW: ViewStateMask = ViewStateMask(1 << 1);

    /// Any view state
    pub const ANY: ViewStateMask = ViewStateMask(Self::NEW.0 | Self::NOT_NEW.0);

    pub const fn from_bits(bits: u32) -> Self {
        ViewStateMask(bits)
    }

    pub const fn bits(&self) -> u32 {
        self.0
    }

    pub const fn contains(&self, other: ViewStateMask) -> bool {
        (self.0 & other.0) == other.0
    }

    pub const fn intersects(&self, other: ViewStateMask) -> bool {
        (self.0 & other.0) != 0
    }
}

impl std::ops::BitOr for ViewStateMask {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        ViewStateMask(self.0 | rhs.0)
    }
}

/// Instance state mask (DDS v1.4 section 2.2.2.5.4)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstanceStateMask(u32);

impl InstanceStateMask {
    /// Instance is alive (writer exists)
    pub const ALIVE: InstanceStateMask = InstanceStateMask(1 << 0);

    /// Instance writer has disposed
    pub const NOT_ALIVE_DISPOSED: InstanceStateMask = InstanceStateMask(1 << 1);

    /// Instance has no live writers left
    pub const NOT_ALIVE_NO_WRITERS: InstanceStateMask = InstanceStateMask(1 << 2);

    /// Any instance state
    pub const ANY: InstanceStateMask = InstanceStateMask(
        Self::ALIVE.0 | Self::NOT_ALIVE_DISPOSED.0 | Self::NOT_ALIVE_NO_WRITERS.0,
    );

    pub const fn from_bits(bits: u32) -> Self {
        InstanceStateMask(bits)
    }

    pub const fn bits(&self) -> u32 {
        self.0
    }

    pub const fn contains(&self, other: InstanceStateMask) -> bool {
        (self.0 & other.0) == other.0
    }

    pub const fn intersects(&self, other: InstanceStateMask) -> bool {
        (self.0 & other.0) != 0
    }
}

impl std::ops::BitOr for InstanceStateMask {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        InstanceStateMask(self.0 | rhs.0)
    }
}

/// The three masks a `take` or read condition filters on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateFilter {
    pub sample: SampleStateMask,
    pub view: ViewStateMask,
    pub instance: InstanceStateMask,
}

impl StateFilter {
    /// Matches every sample.
    pub const ANY: StateFilter = StateFilter {
        sample: SampleStateMask::ANY,
        view: ViewStateMask::ANY,
        instance: InstanceStateMask::ANY,
    };

    pub const fn new(
        sample: SampleStateMask,
        view: ViewStateMask,
        instance: InstanceStateMask,
    ) -> Self {
        Self {
            sample,
            view,
            instance,
        }
    }

    /// Check a sample's states against this filter.
    pub fn matches(
        &self,
        sample: SampleStateMask,
        view: ViewStateMask,
        instance: InstanceStateMask,
    ) -> bool {
        self.sample.intersects(sample)
            && self.view.intersects(view)
            && self.instance.intersects(instance)
    }
}

impl Default for StateFilter {
    fn default() -> Self {
        Self::ANY
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_any_masks_contain_every_state() {
        assert!(SampleStateMask::ANY.contains(SampleStateMask::NOT_READ));
        assert!(ViewStateMask::ANY.contains(ViewStateMask::NEW | ViewStateMask::NOT_NEW));
        assert!(InstanceStateMask::ANY.contains(InstanceStateMask::NOT_ALIVE_NO_WRITERS));
    }

    #[test]
    fn test_filter_rejects_view_state() {
        let only_new = StateFilter::new(
            SampleStateMask::ANY,
            ViewStateMask::NEW,
            InstanceStateMask::ANY,
        );
        assert!(only_new.matches(
            SampleStateMask::NOT_READ,
            ViewStateMask::NEW,
            InstanceStateMask::ALIVE
        ));
        assert!(!only_new.matches(
            SampleStateMask::NOT_READ,
            ViewStateMask::NOT_NEW,
            InstanceStateMask::ALIVE
        ));
    }
}
