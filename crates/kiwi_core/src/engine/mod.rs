//! The engine: a chain of segments serving get, put and range scans.

mod chain;
mod rebalance;

pub(crate) use chain::{Chain, ChainIter};

use crate::bounds::SizeBounds;
use crate::config::EngineConfig;
use crate::error::{CoreError, CoreResult};
use crate::segment::{below_upper, Allocation, ScanBuffer, Segment, SegmentPool};
use crate::stats::EngineStats;
use crate::types::{Key, SegmentId, Value, Version, VersionClock};
use crate::worker::{Worker, WorkerRegistry, WorkerSlot};
use crossbeam_epoch::{self as epoch, Guard};
use crossbeam_utils::Backoff;
use std::ops::Bound;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::trace;

/// A concurrent, ordered, multiversion map.
///
/// The engine holds no operation methods of its own; all reads and writes
/// go through a [`Worker`] obtained from [`Engine::worker`]. Workers borrow
/// the engine, so operations that need exclusive access (such as
/// [`Engine::clear`]) are only possible once every worker is dropped.
///
/// # Example
///
/// ```rust
/// use kiwi_core::{Engine, EngineConfig};
/// use std::thread;
///
/// let engine: Engine<u64, u64> = Engine::new(EngineConfig::default()).unwrap();
///
/// thread::scope(|s| {
///     for t in 0..4u64 {
///         let engine = &engine;
///         s.spawn(move || {
///             let worker = engine.worker().unwrap();
///             for i in 0..100 {
///                 worker.put(t * 100 + i, i);
///             }
///         });
///     }
/// });
///
/// assert_eq!(engine.count_keys(), 400);
/// ```
pub struct Engine<K: Key, V: Value> {
    config: EngineConfig,
    chain: Chain<K, V>,
    clock: VersionClock,
    workers: WorkerRegistry<K>,
    bounds: SizeBounds,
    stats: Arc<EngineStats>,
    pool: Arc<SegmentPool<K, V>>,
    segment_ids: AtomicU64,
}

impl<K: Key, V: Value> Engine<K, V> {
    /// Creates an empty engine.
    ///
    /// # Errors
    ///
    /// Returns `Unsupported` if `K` is a variable-length key type, or
    /// `InvalidConfig` if the configuration fails validation.
    pub fn new(config: EngineConfig) -> CoreResult<Self> {
        if K::FIXED_WIDTH.is_none() {
            return Err(CoreError::unsupported(format!(
                "variable-length keys ({})",
                std::any::type_name::<K>()
            )));
        }
        config.validate()?;

        let stats = Arc::new(EngineStats::new());
        let pool = Arc::new(SegmentPool::new(
            config.pool_size,
            config.segment_capacity,
            Arc::clone(&stats),
        ));
        let segment_ids = AtomicU64::new(0);
        let root = Self::root_segment(&pool, &segment_ids);

        Ok(Self {
            chain: Chain::new(root),
            clock: VersionClock::new(),
            workers: WorkerRegistry::new(config.max_workers),
            bounds: SizeBounds::new(config.track_size_bounds),
            stats,
            pool,
            segment_ids,
            config,
        })
    }

    /// Creates an empty engine with the default configuration.
    pub fn with_defaults() -> CoreResult<Self> {
        Self::new(EngineConfig::default())
    }

    fn root_segment(pool: &SegmentPool<K, V>, ids: &AtomicU64) -> Box<Segment<K, V>> {
        let id = SegmentId::new(ids.fetch_add(1, Ordering::Relaxed));
        pool.take(id, None, None, pool.segment_capacity())
    }

    /// Returns the configuration the engine was built with.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Returns the engine statistics.
    pub fn stats(&self) -> &EngineStats {
        &self.stats
    }

    /// Returns the size bounds tracker.
    pub fn bounds(&self) -> &SizeBounds {
        &self.bounds
    }

    /// Returns a lower bound on the number of live keys.
    ///
    /// Exact only at quiescence after [`compact_all`](Self::compact_all);
    /// always 0 when bound tracking is disabled.
    pub fn size_lower_bound(&self) -> usize {
        self.bounds.lower_bound()
    }

    /// Returns an upper bound on the number of live keys.
    ///
    /// `usize::MAX` when bound tracking is disabled.
    pub fn size_upper_bound(&self) -> usize {
        self.bounds.upper_bound()
    }

    /// Returns the version the next write will receive at the earliest.
    pub fn current_version(&self) -> Version {
        self.clock.current()
    }

    /// Claims a worker slot.
    ///
    /// # Errors
    ///
    /// Returns `WorkerLimit` if all `max_workers` slots are in use.
    pub fn worker(&self) -> CoreResult<Worker<'_, K, V>> {
        let index = self
            .workers
            .claim()
            .ok_or_else(|| CoreError::worker_limit(self.workers.capacity()))?;
        match self.workers.slot(index) {
            Some(slot) => Ok(Worker::new(self, slot, index)),
            None => Err(CoreError::worker_limit(self.workers.capacity())),
        }
    }

    /// Returns the number of workers currently alive.
    pub fn active_workers(&self) -> usize {
        self.workers.active()
    }

    pub(crate) fn release_worker(&self, index: usize) {
        self.workers.release(index);
    }

    /// Number of segments currently in the chain.
    pub fn segment_count(&self) -> usize {
        let guard = &epoch::pin();
        self.chain.iter(guard).count()
    }

    /// Number of scrubbed segments waiting in the reuse pool.
    pub fn pooled_segments(&self) -> usize {
        self.pool.available()
    }

    pub(crate) fn chain_iter<'g>(&self, guard: &'g Guard) -> ChainIter<'g, K, V> {
        self.chain.iter(guard)
    }

    /// Removes every key and resets the size bounds.
    ///
    /// Statistics and the version clock keep running.
    pub fn clear(&mut self) {
        let root = Self::root_segment(&self.pool, &self.segment_ids);
        self.chain = Chain::new(root);
        self.bounds.reset();
    }

    pub(crate) fn next_segment_id(&self) -> SegmentId {
        SegmentId::new(self.segment_ids.fetch_add(1, Ordering::Relaxed))
    }

    /// Oldest read version an in-flight scan may be using.
    pub(crate) fn scan_horizon(&self) -> Version {
        let now = self.clock.current();
        self.workers.horizon(now)
    }

    /// Spins until a rebalance has replaced `segment`.
    pub(crate) fn await_replacement(&self, segment: &Segment<K, V>) {
        let backoff = Backoff::new();
        while !segment.is_retired() {
            backoff.snooze();
        }
    }

    /// Writes `value` (or a tombstone) under `key` on behalf of `worker`.
    pub(crate) fn put_with(&self, worker: &WorkerSlot<K>, key: K, value: Option<V>) -> Version {
        let is_value = value.is_some();
        loop {
            let guard = &epoch::pin();
            let segment = self.chain.locate(&key, guard);
            if segment.is_frozen() {
                self.stats.record_write_retry();
                self.await_replacement(segment);
                continue;
            }

            let slot = match segment.allocate(key.clone(), value.clone()) {
                Allocation::Slot(slot) => slot,
                Allocation::Full => {
                    self.rebalance(segment, guard);
                    continue;
                }
            };

            if !worker.staging.record(segment, key.clone(), slot) {
                trace!(segment = %segment.id(), slot, "staged write refused by freeze");
                self.stats.record_staged_rejection();
                self.await_replacement(segment);
                continue;
            }

            let version = segment.stamp(slot, &self.clock);
            segment.link(slot);
            worker.staging.discard(&key);
            self.account_write(segment, &key, slot, is_value);

            if is_value {
                self.stats.record_put();
            } else {
                self.stats.record_remove();
            }
            return version;
        }
    }

    fn account_write(&self, segment: &Segment<K, V>, key: &K, slot: u32, is_value: bool) {
        if !self.bounds.is_enabled() {
            return;
        }
        let tally = segment.tally();
        let alone = segment.is_sole_entry(key, slot);
        if is_value {
            if tally.try_add_upper(1) {
                let is_new = alone && tally.try_add_lower(1);
                self.bounds.record_put(is_new);
            }
        } else if !alone && tally.try_add_lower(-1) {
            self.bounds.record_remove();
        }
    }

    /// Returns the newest value for `key`.
    pub(crate) fn get_with(&self, key: &K) -> Option<V> {
        self.stats.record_get();
        let guard = &epoch::pin();
        let segment = self.chain.locate(key, guard);
        let staged = self.workers.staged_key(segment.id(), key);
        let newest = segment.latest(key, &staged);
        segment.read_data(newest).cloned()
    }

    /// Scans `bounds` on behalf of `worker` at a fresh read version.
    pub(crate) fn scan_with(
        &self,
        worker: &WorkerSlot<K>,
        bounds: (Bound<&K>, Bound<&K>),
        out: &mut ScanBuffer<K, V>,
    ) -> usize {
        worker.enter_scan(self.clock.current());
        let read_version = self.clock.advance();
        let copied = self.collect(bounds, read_version, out);
        worker.exit_scan();
        self.stats.record_scan(copied);
        copied
    }

    /// Copies the newest pairs visible at `read_version` within `bounds`.
    pub(crate) fn collect(
        &self,
        (lower, upper): (Bound<&K>, Bound<&K>),
        read_version: Version,
        out: &mut ScanBuffer<K, V>,
    ) -> usize {
        let guard = &epoch::pin();
        let mut segment = match lower {
            Bound::Included(min) | Bound::Excluded(min) => self.chain.locate(min, guard),
            Bound::Unbounded => self.chain.first(guard),
        };
        let mut copied = 0;
        loop {
            let staged = self.workers.staged_for(segment.id());
            for entry in &staged {
                segment.stamp(entry.slot, &self.clock);
            }
            copied += match (lower, upper) {
                (Bound::Included(min), Bound::Included(max)) => {
                    segment.copy_range(out, read_version, min, max, &staged)
                }
                bounds => segment.copy_bounded(out, read_version, bounds, &staged),
            };

            match Chain::successor(segment, guard) {
                Some(next) if next.min_key().map_or(true, |min| below_upper(min, upper)) => {
                    segment = next;
                }
                _ => break,
            }
        }
        copied
    }
}

impl<K: Key, V: Value> std::fmt::Debug for Engine<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("segments", &self.segment_count())
            .field("workers", &self.active_workers())
            .field("version", &self.clock.current())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine(capacity: usize) -> Engine<u64, u64> {
        let config = EngineConfig::new()
            .segment_capacity(capacity)
            .track_size_bounds(true);
        Engine::new(config).unwrap()
    }

    #[test]
    fn rejects_variable_length_keys() {
        let err = Engine::<String, u64>::new(EngineConfig::default()).unwrap_err();
        assert!(matches!(err, CoreError::Unsupported { .. }));
    }

    #[test]
    fn rejects_invalid_config() {
        let err = Engine::<u64, u64>::new(EngineConfig::new().segment_capacity(1)).unwrap_err();
        assert!(matches!(err, CoreError::InvalidConfig { .. }));
    }

    #[test]
    fn read_your_writes() {
        let engine = engine(64);
        let worker = engine.worker().unwrap();
        worker.put(5, 1);
        worker.put(5, 2);
        assert_eq!(worker.get(&5), Some(2));
        assert_eq!(worker.get(&6), None);
    }

    #[test]
    fn remove_hides_key() {
        let engine = engine(64);
        let worker = engine.worker().unwrap();
        worker.put(3, 30);
        worker.remove(3);
        assert_eq!(worker.get(&3), None);
        assert!(!worker.contains_key(&3));
    }

    #[test]
    fn versions_increase() {
        let engine = engine(64);
        let worker = engine.worker().unwrap();
        let a = worker.put(1, 1);
        let b = worker.put(2, 2);
        let c = worker.remove(1);
        assert!(a < b && b < c);
    }

    #[test]
    fn scan_bounds_are_inclusive() {
        let engine = engine(64);
        let worker = engine.worker().unwrap();
        for key in 1..=3 {
            worker.put(key, key * 10);
        }
        assert_eq!(worker.scan(&1, &2), vec![(1, 10), (2, 20)]);
        assert_eq!(worker.scan(&3, &1), vec![]);
        assert_eq!(worker.range(2..), vec![(2, 20), (3, 30)]);
        assert_eq!(worker.range(..), vec![(1, 10), (2, 20), (3, 30)]);
    }

    #[test]
    fn inclusive_and_half_open_scans_agree() {
        let engine = engine(8);
        let worker = engine.worker().unwrap();
        for key in 0..60 {
            worker.put(key, key + 100);
        }
        assert!(engine.segment_count() > 2);

        let inclusive = worker.scan(&10, &30);
        assert_eq!(inclusive.len(), 21);
        assert_eq!(inclusive, worker.range(10..31));
        assert_eq!(worker.scan(&10, &30), worker.range(9..=30)[1..].to_vec());
    }

    #[test]
    fn put_all_writes_every_pair() {
        let engine = engine(8);
        let worker = engine.worker().unwrap();
        let written = worker.put_all((0..20).map(|key| (key, key * 3)));
        assert_eq!(written, 20);
        assert_eq!(worker.put_all([(4, 0), (4, 1)]), 2);

        assert_eq!(engine.count_keys(), 20);
        assert_eq!(worker.get(&4), Some(1));
        assert_eq!(worker.get(&19), Some(57));
        assert_eq!(engine.stats().puts(), 22);
    }

    #[test]
    fn worker_limit() {
        let engine: Engine<u64, u64> = Engine::new(EngineConfig::new().max_workers(1)).unwrap();
        let first = engine.worker().unwrap();
        assert!(matches!(engine.worker(), Err(CoreError::WorkerLimit { max: 1 })));
        drop(first);
        assert!(engine.worker().is_ok());
    }

    #[test]
    fn overflow_splits_segment() {
        let engine = engine(8);
        let worker = engine.worker().unwrap();
        for key in 0..100 {
            worker.put(key, key);
        }
        assert!(engine.segment_count() > 1);
        assert!(engine.stats().splits() > 0);

        let all = worker.scan(&0, &99);
        assert_eq!(all.len(), 100);
        assert!(all.iter().enumerate().all(|(i, (k, v))| *k == i as u64 && *v == i as u64));
    }

    #[test]
    fn bounds_bracket_cardinality() {
        let engine = engine(8);
        let worker = engine.worker().unwrap();
        for key in 0..40 {
            worker.put(key % 20, key);
        }
        for key in 0..5 {
            worker.remove(key);
        }
        let live = engine.count_keys();
        assert_eq!(live, 15);
        assert!(engine.size_lower_bound() <= live);
        assert!(engine.size_upper_bound() >= live);
    }

    #[test]
    fn disabled_bounds() {
        let engine: Engine<u64, u64> = Engine::with_defaults().unwrap();
        let worker = engine.worker().unwrap();
        worker.put(1, 1);
        assert_eq!(engine.size_lower_bound(), 0);
        assert_eq!(engine.size_upper_bound(), usize::MAX);
    }

    #[test]
    fn clear_empties_engine() {
        let mut engine = engine(8);
        {
            let worker = engine.worker().unwrap();
            for key in 0..50 {
                worker.put(key, key);
            }
        }
        engine.clear();
        assert_eq!(engine.segment_count(), 1);
        assert_eq!(engine.count_keys(), 0);
        assert_eq!(engine.size_upper_bound(), 0);

        let worker = engine.worker().unwrap();
        worker.put(7, 7);
        assert_eq!(worker.get(&7), Some(7));
    }

    #[test]
    fn stats_track_operations() {
        let engine = engine(64);
        let worker = engine.worker().unwrap();
        worker.put(1, 1);
        worker.remove(1);
        worker.get(&1);
        worker.scan(&0, &10);

        let snap = engine.stats().snapshot();
        assert_eq!(snap.puts, 1);
        assert_eq!(snap.removes, 1);
        assert_eq!(snap.gets, 1);
        assert_eq!(snap.scans, 1);
    }
}
