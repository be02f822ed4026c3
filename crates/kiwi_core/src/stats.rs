//! Engine statistics.
//!
//! Counters describing operation volume and structural maintenance.
//!
//! # Usage
//!
//! ```rust,ignore
//! use kiwi_core::{Engine, EngineConfig};
//!
//! let engine: Engine<u64, u64> = Engine::new(EngineConfig::default())?;
//! let worker = engine.worker()?;
//! worker.put(1, 10);
//!
//! let stats = engine.stats().snapshot();
//! println!("Puts: {}", stats.puts);
//! println!("Rebalances: {}", stats.rebalances);
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

/// Engine statistics and metrics.
///
/// All counters are atomic and can be read while operations are in progress.
/// Values are monotonically increasing.
#[derive(Debug, Default)]
pub struct EngineStats {
    // Operation counters
    /// Total number of point lookups.
    gets: AtomicU64,
    /// Total number of value writes.
    puts: AtomicU64,
    /// Total number of removals (tombstone writes).
    removes: AtomicU64,
    /// Total number of range scans.
    scans: AtomicU64,
    /// Total number of pairs returned by scans.
    scanned: AtomicU64,

    // Contention counters
    /// Writes restarted because the target segment was frozen.
    write_retries: AtomicU64,
    /// Staged writes refused because a rebalance froze the segment first.
    staged_rejections: AtomicU64,

    // Structural counters
    /// Completed rebalances.
    rebalances: AtomicU64,
    /// Rebalances that produced more segments than they consumed.
    splits: AtomicU64,
    /// Rebalances that produced fewer segments than they consumed.
    merges: AtomicU64,
    /// Segments created or taken from the pool.
    segments_created: AtomicU64,

    // Pool counters
    /// Segments served from the reuse pool.
    pool_hits: AtomicU64,
    /// Segment requests the pool could not serve.
    pool_misses: AtomicU64,
    /// Retired segments returned to the pool.
    pool_recycled: AtomicU64,
}

impl EngineStats {
    /// Creates a new stats instance.
    pub fn new() -> Self {
        Self::default()
    }

    // === Increment methods (internal use) ===

    pub(crate) fn record_get(&self) {
        self.gets.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_put(&self) {
        self.puts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_remove(&self) {
        self.removes.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a scan and the number of pairs it returned.
    pub(crate) fn record_scan(&self, returned: usize) {
        self.scans.fetch_add(1, Ordering::Relaxed);
        self.scanned.fetch_add(returned as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_write_retry(&self) {
        self.write_retries.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_staged_rejection(&self) {
        self.staged_rejections.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a completed rebalance that replaced `consumed` segments
    /// with `produced` ones.
    pub(crate) fn record_rebalance(&self, consumed: usize, produced: usize) {
        self.rebalances.fetch_add(1, Ordering::Relaxed);
        self.segments_created
            .fetch_add(produced as u64, Ordering::Relaxed);
        if produced > consumed {
            self.splits.fetch_add(1, Ordering::Relaxed);
        } else if produced < consumed {
            self.merges.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_pool_hit(&self) {
        self.pool_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_pool_miss(&self) {
        self.pool_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_pool_recycle(&self) {
        self.pool_recycled.fetch_add(1, Ordering::Relaxed);
    }

    // === Getter methods (public API) ===

    /// Returns the total number of point lookups.
    pub fn gets(&self) -> u64 {
        self.gets.load(Ordering::Relaxed)
    }

    /// Returns the total number of value writes.
    pub fn puts(&self) -> u64 {
        self.puts.load(Ordering::Relaxed)
    }

    /// Returns the total number of removals.
    pub fn removes(&self) -> u64 {
        self.removes.load(Ordering::Relaxed)
    }

    /// Returns the total number of range scans.
    pub fn scans(&self) -> u64 {
        self.scans.load(Ordering::Relaxed)
    }

    /// Returns the total number of pairs returned by scans.
    pub fn scanned(&self) -> u64 {
        self.scanned.load(Ordering::Relaxed)
    }

    /// Returns the number of writes restarted on a frozen segment.
    ///
    /// A high value relative to `puts` points at segments that are too
    /// small for the write rate.
    pub fn write_retries(&self) -> u64 {
        self.write_retries.load(Ordering::Relaxed)
    }

    /// Returns the number of staged writes refused by a freeze.
    pub fn staged_rejections(&self) -> u64 {
        self.staged_rejections.load(Ordering::Relaxed)
    }

    /// Returns the number of completed rebalances.
    pub fn rebalances(&self) -> u64 {
        self.rebalances.load(Ordering::Relaxed)
    }

    /// Returns the number of splitting rebalances.
    pub fn splits(&self) -> u64 {
        self.splits.load(Ordering::Relaxed)
    }

    /// Returns the number of merging rebalances.
    pub fn merges(&self) -> u64 {
        self.merges.load(Ordering::Relaxed)
    }

    /// Returns the number of segments produced by rebalancing.
    pub fn segments_created(&self) -> u64 {
        self.segments_created.load(Ordering::Relaxed)
    }

    /// Returns the number of pool hits.
    pub fn pool_hits(&self) -> u64 {
        self.pool_hits.load(Ordering::Relaxed)
    }

    /// Returns the number of pool misses.
    pub fn pool_misses(&self) -> u64 {
        self.pool_misses.load(Ordering::Relaxed)
    }

    /// Returns the number of segments returned to the pool.
    pub fn pool_recycled(&self) -> u64 {
        self.pool_recycled.load(Ordering::Relaxed)
    }

    /// Returns a snapshot of all stats.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            gets: self.gets(),
            puts: self.puts(),
            removes: self.removes(),
            scans: self.scans(),
            scanned: self.scanned(),
            write_retries: self.write_retries(),
            staged_rejections: self.staged_rejections(),
            rebalances: self.rebalances(),
            splits: self.splits(),
            merges: self.merges(),
            segments_created: self.segments_created(),
            pool_hits: self.pool_hits(),
            pool_misses: self.pool_misses(),
            pool_recycled: self.pool_recycled(),
        }
    }
}

/// A point-in-time snapshot of engine statistics.
///
/// Unlike `EngineStats`, this is a plain struct that can be compared or
/// passed across threads without atomics.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    /// Total number of point lookups.
    pub gets: u64,
    /// Total number of value writes.
    pub puts: u64,
    /// Total number of removals.
    pub removes: u64,
    /// Total number of range scans.
    pub scans: u64,
    /// Total number of pairs returned by scans.
    pub scanned: u64,
    /// Writes restarted on a frozen segment.
    pub write_retries: u64,
    /// Staged writes refused by a freeze.
    pub staged_rejections: u64,
    /// Completed rebalances.
    pub rebalances: u64,
    /// Splitting rebalances.
    pub splits: u64,
    /// Merging rebalances.
    pub merges: u64,
    /// Segments produced by rebalancing.
    pub segments_created: u64,
    /// Pool hits.
    pub pool_hits: u64,
    /// Pool misses.
    pub pool_misses: u64,
    /// Segments returned to the pool.
    pub pool_recycled: u64,
}


