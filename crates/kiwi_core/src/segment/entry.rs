//! Entry records stored in a segment's order array.

use crate::types::Version;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

/// Slot index meaning "no entry": end of chain, or no value for a tombstone.
pub(crate) const NONE: u32 = u32::MAX;

/// One versioned key record inside a segment.
///
/// Key and value reference are immutable once written. `version` moves
/// exactly once, from unset to its stamp; `next` is published by the CAS
/// that links the entry into the segment's list.
#[derive(Debug)]
pub(crate) struct Entry<K> {
    pub(crate) key: K,
    /// Index into the value store, or `NONE` for a tombstone.
    pub(crate) data: u32,
    pub(crate) version: AtomicU64,
    pub(crate) next: AtomicU32,
}

impl<K> Entry<K> {
    pub(crate) fn new(key: K, data: u32, version: Version) -> Self {
        Self {
            key,
            data,
            version: AtomicU64::new(version.as_u64()),
            next: AtomicU32::new(NONE),
        }
    }

    pub(crate) fn version(&self) -> Version {
        Version::new(self.version.load(Ordering::Acquire))
    }

    pub(crate) fn next(&self) -> u32 {
        self.next.load(Ordering::Acquire)
    }

    pub(crate) fn is_tombstone(&self) -> bool {
        self.data == NONE
    }

    /// Returns true if the entry is stamped and not newer than `read_version`.
    pub(crate) fn visible_at(&self, read_version: Version) -> bool {
        let version = self.version();
        version.is_set() && version <= read_version
    }
}

/// Result of a slot reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Allocation {
    /// The reserved order-array slot.
    Slot(u32),
    /// The segment is saturated; the engine must rebalance it.
    Full,
}

/// A detached copy of an entry, produced when a segment is drained for
/// rebalancing and consumed by serial population of its replacement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Record<K, V> {
    pub(crate) key: K,
    pub(crate) value: Option<V>,
    pub(crate) version: Version,
}

impl<K, V> Record<K, V> {
    pub(crate) fn is_tombstone(&self) -> bool {
        self.value.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_entries_are_invisible() {
        let entry = Entry::new(7u64, 0, Version::UNSET);
        assert!(!entry.visible_at(Version::LATEST));

        entry.version.store(5, Ordering::Release);
        assert!(entry.visible_at(Version::new(5)));
        assert!(!entry.visible_at(Version::new(4)));
    }

    #[test]
    fn tombstone_has_no_data() {
        let entry = Entry::new(1u64, NONE, Version::FIRST);
        assert!(entry.is_tombstone());
        assert_eq!(entry.next(), NONE);
    }
}
