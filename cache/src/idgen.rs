//! Numeric ID allocation for users and groups new to the cache.
//!
//! A new ID is the first free one above the highest ID in use within the
//! range; once the top of the range is reached, the lowest gap is reused.
//! IDs handed out but not stored yet stay reserved until
//! [`IdGenerator::clear_pending`], so two concurrent registrations never get
//! the same ID.

use crate::error::{CacheError, Result};
use std::collections::BTreeSet;
use std::sync::{Mutex, PoisonError};

/// Lowest ID assigned by default.
pub const DEFAULT_ID_MIN: u32 = 1_000_000_000;

/// Highest ID assigned by default.
pub const DEFAULT_ID_MAX: u32 = 1_999_999_999;

/// Inclusive range of assignable IDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdRange {
    /// Lowest assignable ID.
    pub min: u32,
    /// Highest assignable ID.
    pub max: u32,
}

impl IdRange {
    /// Create a range from `min` to `max`, both included.
    #[must_use]
    pub const fn new(min: u32, max: u32) -> Self {
        Self { min, max }
    }

    /// First free ID, given the IDs in `used`.
    fn candidate(&self, used: &BTreeSet<u32>) -> Result<u32> {
        let exhausted = CacheError::NoAvailableId {
            min: self.min,
            max: self.max,
        };
        if self.min > self.max {
            return Err(exhausted);
        }

        let highest = used.range(self.min..=self.max).next_back().copied();
        let above = match highest {
            Some(highest) if highest == self.max => None,
            Some(highest) => Some(highest + 1),
            None => Some(self.min),
        };

        above
            .or_else(|| (self.min..=self.max).find(|id| !used.contains(id)))
            .ok_or(exhausted)
    }
}

impl Default for IdRange {
    fn default() -> Self {
        Self::new(DEFAULT_ID_MIN, DEFAULT_ID_MAX)
    }
}

/// Allocates UIDs and GIDs from configured ranges.
#[derive(Debug, Default)]
pub struct IdGenerator {
    uids: IdRange,
    gids: IdRange,
    pending: Mutex<BTreeSet<u32>>,
}

impl IdGenerator {
    /// Create a generator drawing UIDs and GIDs from the given ranges.
    #[must_use]
    pub fn new(uids: IdRange, gids: IdRange) -> Self {
        Self {
            uids,
            gids,
            pending: Mutex::new(BTreeSet::new()),
        }
    }

    /// Pick a UID not in `used` nor handed out since the last
    /// [`clear_pending`](Self::clear_pending).
    ///
    /// A UID doubles as the GID of the user's private group, so `used`
    /// should hold GIDs as well.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::NoAvailableId`] if the range is full.
    pub fn generate_uid(&self, used: &BTreeSet<u32>) -> Result<u32> {
        self.generate(self.uids, used)
    }

    /// Pick a GID not in `used` nor handed out since the last
    /// [`clear_pending`](Self::clear_pending).
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::NoAvailableId`] if the range is full.
    pub fn generate_gid(&self, used: &BTreeSet<u32>) -> Result<u32> {
        self.generate(self.gids, used)
    }

    /// Release reservations once the generated IDs are stored.
    pub fn clear_pending(&self) {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    fn generate(&self, range: IdRange, used: &BTreeSet<u32>) -> Result<u32> {
        let mut pending = self.pending.lock().map_err(|_| CacheError::poisoned())?;
        let taken: BTreeSet<u32> = used.union(&pending).copied().collect();
        let id = range.candidate(&taken)?;
        pending.insert(id);
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn used(ids: &[u32]) -> BTreeSet<u32> {
        ids.iter().copied().collect()
    }

    #[test]
    fn test_first_id_is_range_start() {
        let generator = IdGenerator::new(IdRange::new(1000, 2000), IdRange::new(5000, 6000));
        assert_eq!(generator.generate_uid(&used(&[])).unwrap(), 1000);
        assert_eq!(generator.generate_gid(&used(&[])).unwrap(), 5000);
    }

    #[test]
    fn test_next_id_follows_highest_used() {
        let generator = IdGenerator::new(IdRange::new(1000, 2000), IdRange::default());
        // IDs outside the range are ignored.
        assert_eq!(generator.generate_uid(&used(&[5, 1000, 1500, 3000])).unwrap(), 1501);
    }

    #[test]
    fn test_pending_ids_are_not_reused() {
        let generator = IdGenerator::new(IdRange::new(1000, 2000), IdRange::new(1000, 2000));
        assert_eq!(generator.generate_uid(&used(&[])).unwrap(), 1000);
        assert_eq!(generator.generate_gid(&used(&[])).unwrap(), 1001);
        assert_eq!(generator.generate_uid(&used(&[])).unwrap(), 1002);

        generator.clear_pending();
        assert_eq!(generator.generate_uid(&used(&[])).unwrap(), 1000);
    }

    #[test]
    fn test_wraps_to_lowest_gap() {
        let generator = IdGenerator::new(IdRange::new(10, 14), IdRange::default());
        assert_eq!(generator.generate_uid(&used(&[10, 12, 14])).unwrap(), 11);
        assert_eq!(generator.generate_uid(&used(&[10, 12, 14])).unwrap(), 13);
    }

    #[test]
    fn test_full_range() {
        let generator = IdGenerator::new(IdRange::new(10, 12), IdRange::new(20, 10));
        let err = generator.generate_uid(&used(&[10, 11, 12])).unwrap_err();
        assert!(matches!(err, CacheError::NoAvailableId { min: 10, max: 12 }));
        assert!(generator.generate_gid(&used(&[])).is_err());
    }
}
