//! Online rebalancing.
//!
//! A rebalance replaces a run of adjacent segments with freshly populated
//! ones covering the same key range. It is triggered by a full segment
//! (split), by a segment whose retained content is small enough to absorb
//! its successors (merge), or explicitly by `compact_all`.
//!
//! ```text
//!   before:  P ─▶ [S] ─▶ N
//!   freeze S, seal S.next, drain S (and N if S is nearly empty)
//!   after:   P ─▶ [S'a] ─▶ [S'b] ─▶ N
//! ```
//!
//! Concurrent operations never block on a rebalance except writers whose
//! target segment is frozen; they wait until it is retired and retry
//! against the replacement.

use super::{Chain, Engine};
use crate::segment::{Allocation, Record, Segment};
use crate::types::{Key, Value, Version};
use crossbeam_epoch::Guard;
use std::mem;
use tracing::debug;

impl<K: Key, V: Value> Engine<K, V> {
    /// Rebalances `segment`, or waits for the rebalance already claiming it.
    pub(crate) fn rebalance<'g>(&self, segment: &'g Segment<K, V>, guard: &'g Guard) {
        if !segment.try_freeze() {
            self.await_replacement(segment);
            return;
        }
        self.replace_frozen(segment, guard);
    }

    /// Replaces a segment this thread has frozen, engaging sparse successors.
    pub(crate) fn replace_frozen<'g>(&self, segment: &'g Segment<K, V>, guard: &'g Guard) {
        debug_assert!(segment.is_frozen());
        let horizon = self.scan_horizon();
        let mut run = vec![segment];
        let mut successor = Chain::seal(segment, guard);
        let mut records = self.drain(segment, horizon);

        while run.len() < self.config.rebalance_size
            && records.len() <= self.config.merge_threshold()
        {
            let Some(next) = successor else {
                break;
            };
            if !next.try_freeze() {
                break;
            }
            successor = Chain::seal(next, guard);
            records.extend(self.drain(next, horizon));
            run.push(next);
        }

        let retained = records.len();
        let (replacement, live) = self.populate(records, &run);
        let produced = replacement.len();

        let (closed_lower, closed_upper) = run
            .iter()
            .map(|segment| segment.tally().close())
            .fold((0, 0), |(lower, upper), (l, u)| (lower + l, upper + u));
        debug_assert!(run.iter().all(|segment| segment.tally().is_closed()));

        self.chain.splice(&run, replacement, successor, guard);
        Chain::retire(&run, &self.pool, guard);

        self.bounds
            .record_compaction(live - closed_lower, live - closed_upper);
        self.stats.record_rebalance(run.len(), produced);
        debug!(
            segment = %segment.id(),
            consumed = run.len(),
            produced,
            retained,
            horizon = %horizon,
            "rebalanced segment run"
        );
    }

    /// Help-stamps the staged writes aimed at `segment`, then drains it.
    fn drain(&self, segment: &Segment<K, V>, horizon: Version) -> Vec<Record<K, V>> {
        let staged = self.workers.staged_for(segment.id());
        for entry in &staged {
            segment.stamp(entry.slot, &self.clock);
        }
        segment.drain_retained(&staged, horizon)
    }

    /// Builds the replacement segments for `run` and returns them with the
    /// exact number of live keys they hold.
    fn populate(
        &self,
        records: Vec<Record<K, V>>,
        run: &[&Segment<K, V>],
    ) -> (Vec<Box<Segment<K, V>>>, i64) {
        let headroom = self.config.merge_threshold().max(1);
        let creator = run.first().map(|segment| segment.id());
        let mut inherited_min = run.first().and_then(|segment| segment.min_key().cloned());

        let parts = partition(records, self.config.split_target());
        let mut replacement = Vec::with_capacity(parts.len());
        let mut live_total = 0;
        for part in parts {
            let min_key = match inherited_min.take() {
                Some(min) => Some(min),
                None if replacement.is_empty() => None,
                None => part.first().map(|record| record.key.clone()),
            };
            let needed = part.len() + headroom;
            let mut segment = self
                .pool
                .take(self.next_segment_id(), min_key, creator, needed);

            let live = live_keys(&part) as i64;
            for record in part {
                let placed = segment.allocate_serial(record.key, record.value, record.version);
                debug_assert!(matches!(placed, Allocation::Slot(_)), "replacement overflow");
            }
            segment.settle_tally(live);
            live_total += live;
            replacement.push(segment);
        }
        (replacement, live_total)
    }
}

/// Splits records into parts of roughly `target` records, never separating
/// the versions of one key. Always returns at least one (possibly empty)
/// part.
fn partition<K: Key, V>(records: Vec<Record<K, V>>, target: usize) -> Vec<Vec<Record<K, V>>> {
    let parts = records.len().div_ceil(target.max(1)).max(1);
    let per_part = records.len().div_ceil(parts).max(1);

    let mut out = Vec::with_capacity(parts);
    let mut current: Vec<Record<K, V>> = Vec::with_capacity(per_part);
    for record in records {
        let boundary = current.len() >= per_part
            && current.last().is_some_and(|last| last.key != record.key);
        if boundary {
            out.push(mem::take(&mut current));
        }
        current.push(record);
    }
    out.push(current);
    out
}

/// Number of keys whose newest record is a value. Records are grouped by
/// key with the newest version last.
fn live_keys<K: Key, V>(records: &[Record<K, V>]) -> usize {
    records
        .iter()
        .enumerate()
        .filter(|(index, record)| {
            !record.is_tombstone()
                && records
                    .get(index + 1)
                    .map_or(true, |next| next.key != record.key)
        })
        .count()
}


