//! Worker contexts.
//!
//! Every operation on an [`Engine`] runs through a [`Worker`]. A worker
//! owns one slot of the engine's fixed registry; the slot carries the
//! worker's staging area and its scan floor. Workers are `Send` but not
//! `Sync`: one thread uses a worker at a time, which is what makes the
//! staging mutex uncontended between writers.

use crate::engine::Engine;
use crate::segment::ScanBuffer;
use crate::staging::{StagedSlot, StagingArea};
use crate::types::{Key, SegmentId, Value, Version};
use std::cell::Cell;
use std::marker::PhantomData;
use std::ops::{Bound, RangeBounds};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Scan floor of a slot with no scan in flight.
const IDLE: u64 = u64::MAX;

pub(crate) struct WorkerSlot<K> {
    in_use: AtomicBool,
    pub(crate) staging: StagingArea<K>,
    scan_floor: AtomicU64,
}

impl<K: Key> WorkerSlot<K> {
    fn new() -> Self {
        Self {
            in_use: AtomicBool::new(false),
            staging: StagingArea::new(),
            scan_floor: AtomicU64::new(IDLE),
        }
    }

    fn is_active(&self) -> bool {
        self.in_use.load(Ordering::SeqCst)
    }

    /// Publishes the lowest read version the coming scan may use.
    pub(crate) fn enter_scan(&self, floor: Version) {
        self.scan_floor.store(floor.as_u64(), Ordering::SeqCst);
    }

    pub(crate) fn exit_scan(&self) {
        self.scan_floor.store(IDLE, Ordering::SeqCst);
    }
}

/// Fixed set of worker slots.
pub(crate) struct WorkerRegistry<K> {
    slots: Box<[WorkerSlot<K>]>,
}

impl<K: Key> WorkerRegistry<K> {
    pub(crate) fn new(max_workers: usize) -> Self {
        Self {
            slots: (0..max_workers).map(|_| WorkerSlot::new()).collect(),
        }
    }

    pub(crate) fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Claims a free slot.
    pub(crate) fn claim(&self) -> Option<usize> {
        self.slots.iter().position(|slot| {
            slot.in_use
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::Relaxed)
                .is_ok()
        })
    }

    pub(crate) fn release(&self, index: usize) {
        if let Some(slot) = self.slots.get(index) {
            slot.staging.clear();
            slot.exit_scan();
            slot.in_use.store(false, Ordering::SeqCst);
        }
    }

    pub(crate) fn slot(&self, index: usize) -> Option<&WorkerSlot<K>> {
        self.slots.get(index)
    }

    pub(crate) fn active(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_active()).count()
    }

    /// Staged writes of every worker aimed at `segment`, in key order.
    pub(crate) fn staged_for(&self, segment: SegmentId) -> Vec<StagedSlot<K>> {
        let mut staged: Vec<StagedSlot<K>> = self
            .slots
            .iter()
            .filter(|slot| slot.is_active())
            .flat_map(|slot| slot.staging.snapshot(segment))
            .collect();
        staged.sort_by(|a, b| a.key.cmp(&b.key));
        staged
    }

    /// Staged slots of every worker for `key` in `segment`.
    pub(crate) fn staged_key(&self, segment: SegmentId, key: &K) -> Vec<u32> {
        self.slots
            .iter()
            .filter(|slot| slot.is_active())
            .filter_map(|slot| slot.staging.lookup(segment, key))
            .collect()
    }

    /// Oldest read version any scan may still be using.
    ///
    /// `now` must be read from the clock before calling.
    pub(crate) fn horizon(&self, now: Version) -> Version {
        self.slots
            .iter()
            .map(|slot| Version::new(slot.scan_floor.load(Ordering::SeqCst)))
            .fold(now, Version::min)
    }
}

/// A handle for running operations against an [`Engine`].
///
/// Obtained from [`Engine::worker`]. Dropping the worker frees its slot.
///
/// # Example
///
/// ```rust
/// use kiwi_core::{Engine, EngineConfig};
///
/// let engine: Engine<u64, &str> = Engine::new(EngineConfig::default()).unwrap();
/// let worker = engine.worker().unwrap();
///
/// worker.put(1, "a");
/// worker.put(2, "b");
/// worker.put(3, "c");
///
/// assert_eq!(worker.get(&2), Some("b"));
/// assert_eq!(worker.scan(&1, &2), vec![(1, "a"), (2, "b")]);
/// ```
pub struct Worker<'e, K: Key, V: Value> {
    engine: &'e Engine<K, V>,
    slot: &'e WorkerSlot<K>,
    index: usize,
    _not_sync: PhantomData<Cell<()>>,
}

impl<'e, K: Key, V: Value> Worker<'e, K, V> {
    pub(crate) fn new(engine: &'e Engine<K, V>, slot: &'e WorkerSlot<K>, index: usize) -> Self {
        Self {
            engine,
            slot,
            index,
            _not_sync: PhantomData,
        }
    }

    /// Returns the registry slot this worker occupies.
    pub fn id(&self) -> usize {
        self.index
    }

    /// Returns the engine this worker operates on.
    pub fn engine(&self) -> &'e Engine<K, V> {
        self.engine
    }

    /// Writes `value` under `key` and returns the version of the write.
    pub fn put(&self, key: K, value: V) -> Version {
        self.engine.put_with(self.slot, key, Some(value))
    }

    /// Writes every pair in order and returns how many were written.
    ///
    /// Each pair is an independent put; concurrent readers may observe a
    /// prefix of the batch.
    pub fn put_all<I>(&self, pairs: I) -> usize
    where
        I: IntoIterator<Item = (K, V)>,
    {
        let mut written = 0;
        for (key, value) in pairs {
            self.put(key, value);
            written += 1;
        }
        written
    }

    /// Removes `key` by writing a tombstone, returning its version.
    ///
    /// Removing an absent key is not an error; it still produces a version.
    pub fn remove(&self, key: K) -> Version {
        self.engine.put_with(self.slot, key, None)
    }

    /// Returns the newest value for `key`.
    pub fn get(&self, key: &K) -> Option<V> {
        self.engine.get_with(key)
    }

    /// Returns true if `key` currently maps to a value.
    pub fn contains_key(&self, key: &K) -> bool {
        self.get(key).is_some()
    }

    /// Appends the pairs with keys in `[min, max]` to `out` and returns how
    /// many were appended.
    pub fn scan_into(&self, min: &K, max: &K, out: &mut ScanBuffer<K, V>) -> usize {
        if min > max {
            return 0;
        }
        self.engine
            .scan_with(self.slot, (Bound::Included(min), Bound::Included(max)), out)
    }

    /// Returns the pairs with keys in `[min, max]` in ascending key order.
    pub fn scan(&self, min: &K, max: &K) -> Vec<(K, V)> {
        let mut out = ScanBuffer::with_keys();
        self.scan_into(min, max, &mut out);
        out.into_pairs().unwrap_or_default()
    }

    /// Returns the pairs with keys in `range` in ascending key order.
    pub fn range<R: RangeBounds<K>>(&self, range: R) -> Vec<(K, V)> {
        let mut out = ScanBuffer::with_keys();
        self.engine.scan_with(
            self.slot,
            (range.start_bound(), range.end_bound()),
            &mut out,
        );
        out.into_pairs().unwrap_or_default()
    }
}

impl<K: Key, V: Value> Drop for Worker<'_, K, V> {
    fn drop(&mut self) {
        self.engine.release_worker(self.index);
    }
}

impl<K: Key, V: Value> std::fmt::Debug for Worker<'_, K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("id", &self.index)
            .field("staged", &self.slot.staging.len())
            .finish_non_exhaustive()
    }
}


