//! Fixed-capacity segments.
//!
//! A segment owns a contiguous key range `[min_key, next.min_key)` and
//! stores every write to that range as an immutable entry. Entries live in
//! an arena indexed by slot; a lock-free singly linked list threads the
//! arena in key order.
//!
//! ## Allocation
//!
//! One atomic word packs two cursors: the entry cursor in the high 32 bits
//! and the value cursor in the low 32 bits. A single `fetch_add` reserves
//! an entry slot and, unless the write is a tombstone, a value slot.
//!
//! ## Layout
//!
//! ```text
//! head ─▶ [slot 3: k=1 v7] ─▶ [slot 0: k=4 v2] ─▶ [slot 5: k=4 v9] ─▶ NONE
//! ```
//!
//! Equal keys may appear several times; list order among them is not
//! version order.

mod entry;
mod merge;
mod pool;

pub(crate) use entry::{Allocation, Record};
pub(crate) use merge::below_upper;
pub use merge::ScanBuffer;
pub(crate) use pool::SegmentPool;

use crate::bounds::SegmentTally;
use crate::types::{Key, SegmentId, Version, VersionClock};
use crossbeam_epoch::Atomic;
use entry::{Entry, NONE};
use std::cmp::Ordering as CmpOrdering;
use std::fmt;
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::sync::OnceLock;

const ENTRY_UNIT: u64 = 1 << 32;
const VALUE_MASK: u64 = ENTRY_UNIT - 1;

const ACTIVE: u8 = 0;
const FROZEN: u8 = 1;
const RETIRED: u8 = 2;

/// Lifecycle of a segment. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentState {
    /// Accepting writes.
    Active,
    /// Claimed by a rebalance; writes are refused.
    Frozen,
    /// Unlinked from the chain and awaiting reclamation.
    Retired,
}

impl fmt::Display for SegmentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Frozen => write!(f, "frozen"),
            Self::Retired => write!(f, "retired"),
        }
    }
}

fn unpack(cursor: u64) -> (usize, usize) {
    ((cursor >> 32) as usize, (cursor & VALUE_MASK) as usize)
}

/// A fixed-capacity chunk of the ordered map.
pub(crate) struct Segment<K, V> {
    id: SegmentId,
    creator: Option<SegmentId>,
    /// Inclusive lower bound of the key range; `None` for the first segment.
    min_key: Option<K>,
    entries: Box<[OnceLock<Entry<K>>]>,
    values: Box<[OnceLock<V>]>,
    cursor: AtomicU64,
    head: AtomicU32,
    /// Slots `0..sorted_prefix` are linked in slot order and sorted by key.
    sorted_prefix: usize,
    state: AtomicU8,
    tally: SegmentTally,
    pub(crate) next: Atomic<Segment<K, V>>,
}

impl<K, V> Segment<K, V> {
    pub(crate) fn new(
        id: SegmentId,
        min_key: Option<K>,
        creator: Option<SegmentId>,
        capacity: usize,
    ) -> Self {
        Self {
            id,
            creator,
            min_key,
            entries: (0..capacity).map(|_| OnceLock::new()).collect(),
            values: (0..capacity).map(|_| OnceLock::new()).collect(),
            cursor: AtomicU64::new(0),
            head: AtomicU32::new(NONE),
            sorted_prefix: 0,
            state: AtomicU8::new(ACTIVE),
            tally: SegmentTally::new(0),
            next: Atomic::null(),
        }
    }

    pub(crate) fn id(&self) -> SegmentId {
        self.id
    }

    pub(crate) fn creator(&self) -> Option<SegmentId> {
        self.creator
    }

    pub(crate) fn min_key(&self) -> Option<&K> {
        self.min_key.as_ref()
    }

    pub(crate) fn capacity(&self) -> usize {
        self.entries.len()
    }

    /// Number of entry slots handed out, capped at capacity.
    pub(crate) fn allocated(&self) -> usize {
        let (entries, _) = unpack(self.cursor.load(Ordering::Acquire));
        entries.min(self.capacity())
    }

    pub(crate) fn sorted_prefix(&self) -> usize {
        self.sorted_prefix
    }

    pub(crate) fn tally(&self) -> &SegmentTally {
        &self.tally
    }

    pub(crate) fn state(&self) -> SegmentState {
        match self.state.load(Ordering::SeqCst) {
            ACTIVE => SegmentState::Active,
            FROZEN => SegmentState::Frozen,
            _ => SegmentState::Retired,
        }
    }

    /// Returns true once a rebalance has claimed the segment.
    pub(crate) fn is_frozen(&self) -> bool {
        self.state.load(Ordering::SeqCst) != ACTIVE
    }

    pub(crate) fn is_retired(&self) -> bool {
        self.state.load(Ordering::SeqCst) == RETIRED
    }

    /// Claims the segment for rebalancing. Exactly one caller wins.
    pub(crate) fn try_freeze(&self) -> bool {
        self.state
            .compare_exchange(ACTIVE, FROZEN, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub(crate) fn mark_retired(&self) {
        debug_assert!(self.is_frozen(), "retiring an active segment");
        self.state.store(RETIRED, Ordering::SeqCst);
    }

    fn entry(&self, slot: u32) -> Option<&Entry<K>> {
        self.entries.get(slot as usize)?.get()
    }

    pub(crate) fn read_key(&self, slot: u32) -> Option<&K> {
        self.entry(slot).map(|entry| &entry.key)
    }

    /// Returns the value of an entry, or `None` for a tombstone or an
    /// invalid slot.
    pub(crate) fn read_data(&self, slot: u32) -> Option<&V> {
        let entry = self.entry(slot)?;
        self.values.get(entry.data as usize)?.get()
    }

    pub(crate) fn version_of(&self, slot: u32) -> Version {
        self.entry(slot).map_or(Version::UNSET, Entry::version)
    }

    pub(crate) fn is_tombstone(&self, slot: u32) -> bool {
        self.entry(slot).is_some_and(Entry::is_tombstone)
    }

    /// Orders two slots by version, newest greatest.
    ///
    /// `NONE` and unset entries sort below everything; equal versions are
    /// broken by slot index.
    pub(crate) fn compare_versions(&self, a: u32, b: u32) -> CmpOrdering {
        let rank = |slot: u32| {
            self.entry(slot)
                .map_or((Version::UNSET, 0), |entry| (entry.version(), slot + 1))
        };
        rank(a).cmp(&rank(b))
    }

    /// Reserves a slot and writes the key and value into it.
    pub(crate) fn allocate(&self, key: K, value: Option<V>) -> Allocation {
        let footprint = u64::from(value.is_some());
        let previous = self
            .cursor
            .fetch_add(ENTRY_UNIT | footprint, Ordering::AcqRel);
        let (slot, data) = unpack(previous);
        if slot >= self.capacity() || data + footprint as usize > self.values.len() {
            return Allocation::Full;
        }
        let data_ref = match value {
            Some(value) => {
                let _ = self.values[data].set(value);
                data as u32
            }
            None => NONE,
        };
        let _ = self.entries[slot].set(Entry::new(key, data_ref, Version::UNSET));
        Allocation::Slot(slot as u32)
    }

    /// Assigns the entry its version unless someone already did.
    ///
    /// Writers call this on their own entry; readers and rebalancers call
    /// it on staged entries they observe. Either way the entry ends up with
    /// a single version and every caller returns it.
    pub(crate) fn stamp(&self, slot: u32, clock: &VersionClock) -> Version {
        let Some(entry) = self.entry(slot) else {
            return Version::UNSET;
        };
        let current = entry.version();
        if current.is_set() {
            return current;
        }
        let fresh = clock.advance();
        match entry.version.compare_exchange(
            Version::UNSET.as_u64(),
            fresh.as_u64(),
            Ordering::SeqCst,
            Ordering::SeqCst,
        ) {
            Ok(_) => fresh,
            Err(actual) => Version::new(actual),
        }
    }

    /// Counts the linked entries.
    pub(crate) fn linked(&self) -> usize {
        let mut count = 0;
        let mut cursor = self.head.load(Ordering::Acquire);
        while let Some(entry) = self.entry(cursor) {
            count += 1;
            cursor = entry.next();
        }
        count
    }

    /// Returns the stored `allocated` slots to their empty state and
    /// resets the segment for reuse under a new identity.
    pub(crate) fn reinit(
        &mut self,
        id: SegmentId,
        min_key: Option<K>,
        creator: Option<SegmentId>,
    ) {
        let (entries, values) = unpack(*self.cursor.get_mut());
        let entries = entries.min(self.entries.len());
        let values = values.min(self.values.len());
        for cell in &mut self.entries[..entries] {
            cell.take();
        }
        for cell in &mut self.values[..values] {
            cell.take();
        }
        self.id = id;
        self.min_key = min_key;
        self.creator = creator;
        *self.cursor.get_mut() = 0;
        *self.head.get_mut() = NONE;
        self.sorted_prefix = 0;
        *self.state.get_mut() = ACTIVE;
        self.tally.reset(0);
        self.next = Atomic::null();
    }

    /// Sets the tally to the exact live count produced by population.
    pub(crate) fn settle_tally(&mut self, live: i64) {
        self.tally.reset(live);
    }
}

impl<K: Key, V> Segment<K, V> {
    /// Returns true if `key` falls at or after the segment's lower bound.
    pub(crate) fn starts_at_or_before(&self, key: &K) -> bool {
        self.min_key.as_ref().map_or(true, |min| min <= key)
    }

    fn link_after(&self, prev: Option<u32>) -> &AtomicU32 {
        match prev.and_then(|slot| self.entry(slot)) {
            Some(entry) => &entry.next,
            None => &self.head,
        }
    }

    /// Last prefix slot whose key is below `key`.
    fn prefix_predecessor(&self, key: &K) -> Option<u32> {
        let prefix = &self.entries[..self.sorted_prefix];
        let below =
            prefix.partition_point(|cell| cell.get().is_some_and(|entry| entry.key < *key));
        below.checked_sub(1).map(|slot| slot as u32)
    }

    /// Finds the link position for `key`: the last node with a smaller key
    /// and the first node at or after it.
    fn insertion_point(&self, key: &K) -> (Option<u32>, u32) {
        let mut prev = self.prefix_predecessor(key);
        let mut next = self.link_after(prev).load(Ordering::Acquire);
        while let Some(entry) = self.entry(next) {
            if entry.key >= *key {
                break;
            }
            prev = Some(next);
            next = entry.next();
        }
        (prev, next)
    }

    /// Links an allocated entry into the list in key order.
    pub(crate) fn link(&self, slot: u32) {
        let Some(entry) = self.entry(slot) else {
            return;
        };
        loop {
            let (prev, next) = self.insertion_point(&entry.key);
            entry.next.store(next, Ordering::Relaxed);
            if self
                .link_after(prev)
                .compare_exchange(next, slot, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return;
            }
        }
    }

    fn skip_invisible(&self, mut cursor: u32, read_version: Version) -> u32 {
        while let Some(entry) = self.entry(cursor) {
            if entry.visible_at(read_version) {
                break;
            }
            cursor = entry.next();
        }
        cursor
    }

    /// First list entry at or after `min` visible at `read_version`.
    pub(crate) fn find_first(&self, min: &K, read_version: Version) -> u32 {
        let (_, first) = self.insertion_point(min);
        self.skip_invisible(first, read_version)
    }

    /// First list entry visible at `read_version`.
    pub(crate) fn get_first(&self, read_version: Version) -> u32 {
        self.skip_invisible(self.head.load(Ordering::Acquire), read_version)
    }

    pub(crate) fn next_of(&self, slot: u32) -> u32 {
        self.entry(slot).map_or(NONE, Entry::next)
    }

    /// Newest stamped entry for `key` among the list and `staged` slots.
    pub(crate) fn latest(&self, key: &K, staged: &[u32]) -> u32 {
        let mut best = NONE;
        let mut consider = |slot: u32| {
            if self.version_of(slot).is_set() && self.compare_versions(slot, best).is_gt() {
                best = slot;
            }
        };
        let (_, mut cursor) = self.insertion_point(key);
        while let Some(entry) = self.entry(cursor) {
            if entry.key != *key {
                break;
            }
            consider(cursor);
            cursor = entry.next();
        }
        for &slot in staged {
            if self.read_key(slot) == Some(key) {
                consider(slot);
            }
        }
        best
    }

    /// Returns true if `slot` is the only linked entry for its key.
    pub(crate) fn is_sole_entry(&self, key: &K, slot: u32) -> bool {
        let (_, mut cursor) = self.insertion_point(key);
        let mut found = false;
        while let Some(entry) = self.entry(cursor) {
            if entry.key != *key {
                break;
            }
            if cursor != slot {
                return false;
            }
            found = true;
            cursor = entry.next();
        }
        found
    }

    /// Number of distinct keys in the linked list.
    pub(crate) fn distinct_keys(&self) -> usize {
        let mut count = 0;
        let mut last: Option<&K> = None;
        let mut cursor = self.head.load(Ordering::Acquire);
        while let Some(entry) = self.entry(cursor) {
            if last != Some(&entry.key) {
                count += 1;
                last = Some(&entry.key);
            }
            cursor = entry.next();
        }
        count
    }

    /// Appends an entry during population of a segment nobody else can see.
    ///
    /// Entries written in key order extend the sorted prefix; anything else
    /// is linked through the regular list insertion.
    pub(crate) fn allocate_serial(
        &mut self,
        key: K,
        value: Option<V>,
        version: Version,
    ) -> Allocation {
        let (slot, data) = unpack(*self.cursor.get_mut());
        let footprint = usize::from(value.is_some());
        if slot >= self.capacity() || data + footprint > self.values.len() {
            return Allocation::Full;
        }
        *self.cursor.get_mut() += ENTRY_UNIT | footprint as u64;

        let in_order = self.sorted_prefix == slot
            && slot
                .checked_sub(1)
                .and_then(|last| self.entries[last].get())
                .map_or(true, |last| last.key <= key);

        let data_ref = match value {
            Some(value) => {
                let _ = self.values[data].set(value);
                data as u32
            }
            None => NONE,
        };
        let _ = self.entries[slot].set(Entry::new(key, data_ref, version));
        let slot_ref = slot as u32;

        if in_order {
            match slot.checked_sub(1).and_then(|last| self.entries[last].get_mut()) {
                Some(last) => *last.next.get_mut() = slot_ref,
                None => *self.head.get_mut() = slot_ref,
            }
            self.sorted_prefix = slot + 1;
        } else {
            self.link(slot_ref);
        }
        Allocation::Slot(slot_ref)
    }
}

impl<K: fmt::Debug, V> fmt::Debug for Segment<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Segment")
            .field("id", &self.id)
            .field("min_key", &self.min_key)
            .field("capacity", &self.entries.len())
            .field("sorted_prefix", &self.sorted_prefix)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}


