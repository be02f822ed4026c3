//! Ordered traversal of a segment merged with staged writes.
//!
//! Scans and rebalances both need the same view of a segment: its linked
//! list plus the entries that writers have allocated and staged but not yet
//! linked. [`MergeWalk`] yields both in ascending key order, preferring the
//! staged entry when keys tie.

use super::{Record, Segment};
use crate::staging::StagedSlot;
use crate::types::{Key, Version};
use std::ops::Bound;

/// Output buffer for range scans.
///
/// Values are always collected; keys only when the buffer was created with
/// [`ScanBuffer::with_keys`]. Scans append, so one buffer can accumulate
/// several ranges.
#[derive(Debug, Clone)]
pub struct ScanBuffer<K, V> {
    values: Vec<V>,
    keys: Option<Vec<K>>,
}

impl<K, V> ScanBuffer<K, V> {
    /// Creates a buffer that collects values only.
    pub fn values_only() -> Self {
        Self {
            values: Vec::new(),
            keys: None,
        }
    }

    /// Creates a buffer that collects keys alongside values.
    pub fn with_keys() -> Self {
        Self {
            values: Vec::new(),
            keys: Some(Vec::new()),
        }
    }

    /// Returns the number of collected pairs.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if nothing has been collected.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Returns the collected values in key order.
    pub fn values(&self) -> &[V] {
        &self.values
    }

    /// Returns the collected keys, if the buffer collects them.
    pub fn keys(&self) -> Option<&[K]> {
        self.keys.as_deref()
    }

    /// Empties the buffer, keeping its allocation and key mode.
    pub fn clear(&mut self) {
        self.values.clear();
        if let Some(keys) = &mut self.keys {
            keys.clear();
        }
    }

    /// Consumes the buffer into `(key, value)` pairs.
    ///
    /// Returns `None` for a values-only buffer.
    pub fn into_pairs(self) -> Option<Vec<(K, V)>> {
        let keys = self.keys?;
        Some(keys.into_iter().zip(self.values).collect())
    }

    pub(crate) fn push(&mut self, key: &K, value: &V)
    where
        K: Clone,
        V: Clone,
    {
        self.values.push(value.clone());
        if let Some(keys) = &mut self.keys {
            keys.push(key.clone());
        }
    }
}

/// Merge of a segment's list with a sorted slice of staged slots.
struct MergeWalk<'a, K, V> {
    segment: &'a Segment<K, V>,
    list: u32,
    staged: &'a [StagedSlot<K>],
}

impl<'a, K: Key, V> MergeWalk<'a, K, V> {
    fn new(segment: &'a Segment<K, V>, list: u32, staged: &'a [StagedSlot<K>]) -> Self {
        Self {
            segment,
            list,
            staged,
        }
    }

    fn take_staged(&mut self) -> Option<u32> {
        let (first, rest) = self.staged.split_first()?;
        self.staged = rest;
        Some(first.slot)
    }
}

impl<K: Key, V> Iterator for MergeWalk<'_, K, V> {
    type Item = u32;

    fn next(&mut self) -> Option<u32> {
        let listed = self.segment.read_key(self.list);
        match (listed, self.staged.first()) {
            (None, None) => None,
            (None, Some(_)) => self.take_staged(),
            (Some(key), Some(staged)) if staged.key <= *key => self.take_staged(),
            (Some(_), _) => {
                let slot = self.list;
                self.list = self.segment.next_of(slot);
                Some(slot)
            }
        }
    }
}

fn above_lower<K: Ord>(key: &K, lower: Bound<&K>) -> bool {
    match lower {
        Bound::Included(min) => key >= min,
        Bound::Excluded(min) => key > min,
        Bound::Unbounded => true,
    }
}

pub(crate) fn below_upper<K: Ord>(key: &K, upper: Bound<&K>) -> bool {
    match upper {
        Bound::Included(max) => key <= max,
        Bound::Excluded(max) => key < max,
        Bound::Unbounded => true,
    }
}

impl<K: Key, V: Clone> Segment<K, V> {
    /// Copies the newest value visible at `read_version` for every key in
    /// `[min, max]` into `out`, returning the number of pairs appended.
    ///
    /// `staged` must be sorted by key and belong to this segment.
    pub(crate) fn copy_range(
        &self,
        out: &mut ScanBuffer<K, V>,
        read_version: Version,
        min: &K,
        max: &K,
        staged: &[StagedSlot<K>],
    ) -> usize {
        self.copy_bounded(
            out,
            read_version,
            (Bound::Included(min), Bound::Included(max)),
            staged,
        )
    }

    pub(crate) fn copy_bounded(
        &self,
        out: &mut ScanBuffer<K, V>,
        read_version: Version,
        (lower, upper): (Bound<&K>, Bound<&K>),
        staged: &[StagedSlot<K>],
    ) -> usize {
        let start = match lower {
            Bound::Included(min) | Bound::Excluded(min) if !self.starts_at_or_after(min) => {
                self.find_first(min, read_version)
            }
            _ => self.get_first(read_version),
        };
        let skip = staged.partition_point(|slot| !above_lower(&slot.key, lower));

        let mut pending: Option<u32> = None;
        let mut copied = 0;
        for slot in MergeWalk::new(self, start, &staged[skip..]) {
            let Some(key) = self.read_key(slot) else {
                continue;
            };
            if !below_upper(key, upper) {
                break;
            }
            if !above_lower(key, lower) || !self.version_of(slot).is_set() {
                continue;
            }
            if self.version_of(slot) > read_version {
                continue;
            }
            match pending {
                Some(best) if self.read_key(best) == Some(key) => {
                    if self.compare_versions(slot, best).is_gt() {
                        pending = Some(slot);
                    }
                }
                _ => {
                    if let Some(best) = pending {
                        copied += self.emit(best, out);
                    }
                    pending = Some(slot);
                }
            }
        }
        if let Some(best) = pending {
            copied += self.emit(best, out);
        }
        copied
    }

    /// Returns true if every key of this segment is at or above `key`.
    fn starts_at_or_after(&self, key: &K) -> bool {
        self.min_key().is_some_and(|min| min >= key)
    }

    fn emit(&self, slot: u32, out: &mut ScanBuffer<K, V>) -> usize {
        match (self.read_key(slot), self.read_data(slot)) {
            (Some(key), Some(value)) => {
                out.push(key, value);
                1
            }
            _ => 0,
        }
    }

    /// Drains the content a replacement segment must keep.
    ///
    /// Per key this is every version newer than `horizon`, plus the newest
    /// version at or below `horizon` unless it is a tombstone. Records are
    /// ordered by key, then oldest version first. Unstamped entries are
    /// skipped; callers help-stamp staged entries before draining.
    pub(crate) fn drain_retained(
        &self,
        staged: &[StagedSlot<K>],
        horizon: Version,
    ) -> Vec<Record<K, V>> {
        let mut records = Vec::with_capacity(self.allocated());
        let mut group: Vec<u32> = Vec::new();
        for slot in MergeWalk::new(self, self.get_first(Version::LATEST), staged) {
            if !self.version_of(slot).is_set() {
                continue;
            }
            let same_key = group
                .first()
                .is_some_and(|&first| self.read_key(first) == self.read_key(slot));
            if !same_key {
                self.retain_group(&mut group, horizon, &mut records);
            }
            if !group.contains(&slot) {
                group.push(slot);
            }
        }
        self.retain_group(&mut group, horizon, &mut records);
        records
    }

    fn retain_group(
        &self,
        group: &mut Vec<u32>,
        horizon: Version,
        records: &mut Vec<Record<K, V>>,
    ) {
        if group.is_empty() {
            return;
        }
        group.sort_by(|a, b| self.compare_versions(*a, *b));
        let settled = group.partition_point(|&slot| self.version_of(slot) <= horizon);
        let base = settled
            .checked_sub(1)
            .map(|index| group[index])
            .filter(|&slot| !self.is_tombstone(slot));
        for &slot in base.iter().chain(&group[settled..]) {
            if let Some(key) = self.read_key(slot) {
                records.push(Record {
                    key: key.clone(),
                    value: self.read_data(slot).cloned(),
                    version: self.version_of(slot),
                });
            }
        }
        group.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::Allocation;
    use crate::types::{SegmentId, VersionClock};

    fn segment() -> Segment<u64, &'static str> {
        Segment::new(SegmentId::new(1), None, None, 32)
    }

    fn write(
        segment: &Segment<u64, &'static str>,
        clock: &VersionClock,
        key: u64,
        value: Option<&'static str>,
    ) -> Version {
        let Allocation::Slot(slot) = segment.allocate(key, value) else {
            panic!("segment full");
        };
        let version = segment.stamp(slot, clock);
        segment.link(slot);
        version
    }

    fn stage(
        segment: &Segment<u64, &'static str>,
        key: u64,
        value: &'static str,
    ) -> StagedSlot<u64> {
        let Allocation::Slot(slot) = segment.allocate(key, Some(value)) else {
            panic!("segment full");
        };
        StagedSlot { key, slot }
    }

    fn scan(
        segment: &Segment<u64, &'static str>,
        min: u64,
        max: u64,
        at: Version,
        staged: &[StagedSlot<u64>],
    ) -> Vec<(u64, &'static str)> {
        let mut out = ScanBuffer::with_keys();
        segment.copy_range(&mut out, at, &min, &max, staged);
        out.into_pairs().unwrap()
    }

    #[test]
    fn copy_range_restricts_to_bounds() {
        let clock = VersionClock::new();
        let seg = segment();
        write(&seg, &clock, 1, Some("a"));
        write(&seg, &clock, 2, Some("b"));
        write(&seg, &clock, 3, Some("c"));

        assert_eq!(scan(&seg, 1, 2, Version::LATEST, &[]), vec![(1, "a"), (2, "b")]);
        assert_eq!(scan(&seg, 4, 9, Version::LATEST, &[]), vec![]);
    }

    #[test]
    fn copy_range_keeps_newest_visible_version() {
        let clock = VersionClock::new();
        let seg = segment();
        write(&seg, &clock, 5, Some("a"));
        let middle = write(&seg, &clock, 5, Some("b"));
        write(&seg, &clock, 5, Some("c"));

        assert_eq!(scan(&seg, 0, 10, Version::LATEST, &[]), vec![(5, "c")]);
        assert_eq!(scan(&seg, 0, 10, middle, &[]), vec![(5, "b")]);
    }

    #[test]
    fn copy_range_drops_tombstones() {
        let clock = VersionClock::new();
        let seg = segment();
        write(&seg, &clock, 3, Some("x"));
        let before = write(&seg, &clock, 4, Some("y"));
        write(&seg, &clock, 3, None);

        assert_eq!(scan(&seg, 0, 10, Version::LATEST, &[]), vec![(4, "y")]);
        assert_eq!(scan(&seg, 0, 10, before, &[]), vec![(3, "x"), (4, "y")]);
    }

    #[test]
    fn copy_range_merges_staged_entries() {
        let clock = VersionClock::new();
        let seg = segment();
        write(&seg, &clock, 2, Some("old"));
        write(&seg, &clock, 6, Some("six"));
        let staged = vec![stage(&seg, 2, "new"), stage(&seg, 4, "four")];
        for entry in &staged {
            seg.stamp(entry.slot, &clock);
        }

        assert_eq!(
            scan(&seg, 0, 10, Version::LATEST, &staged),
            vec![(2, "new"), (4, "four"), (6, "six")]
        );
    }

    #[test]
    fn unstamped_entries_are_skipped() {
        let clock = VersionClock::new();
        let seg = segment();
        write(&seg, &clock, 1, Some("a"));
        let staged = vec![stage(&seg, 2, "pending")];
        write(&seg, &clock, 3, Some("c"));

        assert_eq!(
            scan(&seg, 0, 10, Version::LATEST, &staged),
            vec![(1, "a"), (3, "c")]
        );
    }

    #[test]
    fn values_only_buffer() {
        let clock = VersionClock::new();
        let seg = segment();
        write(&seg, &clock, 1, Some("a"));
        write(&seg, &clock, 2, Some("b"));

        let mut out = ScanBuffer::values_only();
        let copied = seg.copy_range(&mut out, Version::LATEST, &1, &2, &[]);
        assert_eq!(copied, 2);
        assert_eq!(out.values(), &["a", "b"]);
        assert!(out.keys().is_none());
        assert!(out.into_pairs().is_none());
    }

    #[test]
    fn exclusive_bounds() {
        let clock = VersionClock::new();
        let seg = segment();
        for key in 1..=4 {
            write(&seg, &clock, key, Some("v"));
        }
        let mut out = ScanBuffer::with_keys();
        seg.copy_bounded(
            &mut out,
            Version::LATEST,
            (Bound::Excluded(&1), Bound::Excluded(&4)),
            &[],
        );
        assert_eq!(out.keys(), Some(&[2, 3][..]));
    }

    #[test]
    fn drain_without_scans_keeps_live_values() {
        let clock = VersionClock::new();
        let seg = segment();
        write(&seg, &clock, 1, Some("a"));
        write(&seg, &clock, 1, Some("b"));
        write(&seg, &clock, 2, Some("c"));
        write(&seg, &clock, 2, None);
        write(&seg, &clock, 3, Some("d"));

        let records = seg.drain_retained(&[], clock.current());
        let kept: Vec<_> = records.iter().map(|r| (r.key, r.value)).collect();
        assert_eq!(kept, vec![(1, Some("b")), (3, Some("d"))]);
    }

    #[test]
    fn drain_retains_versions_above_horizon() {
        let clock = VersionClock::new();
        let seg = segment();
        write(&seg, &clock, 1, Some("a"));
        let horizon = write(&seg, &clock, 1, Some("b"));
        write(&seg, &clock, 1, None);
        write(&seg, &clock, 1, Some("d"));

        let records = seg.drain_retained(&[], horizon);
        let kept: Vec<_> = records.iter().map(|r| r.value).collect();
        assert_eq!(kept, vec![Some("b"), None, Some("d")]);
        assert!(records.windows(2).all(|pair| pair[0].version < pair[1].version));
    }

    #[test]
    fn drain_includes_stamped_staged_entries_once() {
        let clock = VersionClock::new();
        let seg = segment();
        write(&seg, &clock, 1, Some("a"));
        let staged = vec![stage(&seg, 2, "b")];
        seg.stamp(staged[0].slot, &clock);
        seg.link(staged[0].slot);

        let records = seg.drain_retained(&staged, clock.current());
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].key, 2);
    }
}
