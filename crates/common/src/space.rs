//! Capacity bookkeeping for stored file bytes
//!
//! The accountant only counts file content. Directories and empty files are
//! free; the node limit is enforced separately by the tree.
//!
//! All mutating calls are made from inside the tree's write section, so the
//! counter moves in lockstep with the buffers it describes. The atomics exist
//! so readers (`statfs`, `usage`) never need the tree lock.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{FsError, Result};

/// Capacity used when zero or nothing is configured (4 GiB)
pub const DEFAULT_CAPACITY_BYTES: u64 = 4 * 1024 * 1024 * 1024;

#[derive(Debug)]
pub struct SpaceAccountant {
    capacity: AtomicU64,
    used: AtomicU64,
}

impl Default for SpaceAccountant {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY_BYTES)
    }
}

impl SpaceAccountant {
    /// Create an accountant; a capacity of 0 selects [`DEFAULT_CAPACITY_BYTES`]
    pub fn new(capacity: u64) -> Self {
        Self {
            capacity: AtomicU64::new(effective_capacity(capacity)),
            used: AtomicU64::new(0),
        }
    }

    pub fn capacity(&self) -> u64 {
        self.capacity.load(Ordering::Acquire)
    }

    pub fn used(&self) -> u64 {
        self.used.load(Ordering::Acquire)
    }

    pub fn available(&self) -> u64 {
        self.capacity().saturating_sub(self.used())
    }

    /// Change the capacity; a value of 0 selects the default
    ///
    /// Does not check the current usage; callers that must not shrink below
    /// it compare against [`Self::used`] first.
    pub fn set_capacity(&self, capacity: u64) {
        self.capacity
            .store(effective_capacity(capacity), Ordering::Release);
    }

    /// Claim `delta` bytes or fail without changing anything
    pub fn reserve(&self, delta: u64) -> Result<()> {
        if delta == 0 {
            return Ok(());
        }
        let capacity = self.capacity();
        self.used
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
                used.checked_add(delta).filter(|total| *total <= capacity)
            })
            .map(|_| ())
            .map_err(|used| FsError::CapacityExceeded {
                requested: delta,
                available: capacity.saturating_sub(used),
            })
    }

    /// Return `delta` bytes to the pool
    pub fn release(&self, delta: u64) {
        if delta == 0 {
            return;
        }
        let previous = self
            .used
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
                Some(used.saturating_sub(delta))
            })
            .unwrap_or_default();
        if previous < delta {
            tracing::warn!(
                released = delta,
                used = previous,
                "released more bytes than were reserved"
            );
        }
    }

    /// Overwrite the used counter with a value derived from the live tree
    pub fn reset_used(&self, used: u64) {
        let previous = self.used.swap(used, Ordering::AcqRel);
        if previous != used {
            tracing::warn!(previous, recomputed = used, "space accounting drift corrected");
        }
    }
}

fn effective_capacity(capacity: u64) -> u64 {
    if capacity == 0 {
        DEFAULT_CAPACITY_BYTES
    } else {
        capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_capacity_means_default() {
        let space = SpaceAccountant::new(0);
        assert_eq!(space.capacity(), DEFAULT_CAPACITY_BYTES);

        space.set_capacity(10);
        assert_eq!(space.capacity(), 10);
        space.set_capacity(0);
        assert_eq!(space.capacity(), DEFAULT_CAPACITY_BYTES);
    }

    #[test]
    fn test_reserve_and_release() {
        let space = SpaceAccountant::new(100);

        space.reserve(60).unwrap();
        space.reserve(40).unwrap();
        assert_eq!(space.used(), 100);
        assert_eq!(space.available(), 0);

        space.release(30);
        assert_eq!(space.used(), 70);
        assert_eq!(space.available(), 30);
    }

    #[test]
    fn test_reserve_over_capacity_changes_nothing() {
        let space = SpaceAccountant::new(100);
        space.reserve(90).unwrap();

        let err = space.reserve(11).unwrap_err();
        assert_eq!(
            err,
            FsError::CapacityExceeded {
                requested: 11,
                available: 10
            }
        );
        assert_eq!(space.used(), 90);
    }

    #[test]
    fn test_reserve_overflow() {
        let space = SpaceAccountant::new(u64::MAX);
        space.reserve(u64::MAX - 1).unwrap();
        assert!(space.reserve(u64::MAX).is_err());
    }

    #[test]
    fn test_release_saturates() {
        let space = SpaceAccountant::new(100);
        space.reserve(5).unwrap();
        space.release(50);
        assert_eq!(space.used(), 0);
    }

    #[test]
    fn test_reset_used_is_idempotent() {
        let space = SpaceAccountant::new(100);
        space.reserve(20).unwrap();

        space.reset_used(42);
        space.reset_used(42);
        assert_eq!(space.used(), 42);
    }
}
