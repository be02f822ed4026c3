//! Structural diagnostics and maintenance.
//!
//! These operations walk the whole chain and are meant for tests, tooling
//! and occasional maintenance, not for hot paths.

use crate::engine::Engine;
use crate::segment::{ScanBuffer, Segment, SegmentState};
use crate::types::{Key, SegmentId, Value, Version};
use crossbeam_epoch as epoch;
use std::fmt;
use std::ops::Bound;
use tracing::info;

/// Snapshot of one segment's layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentReport {
    /// Segment id.
    pub id: SegmentId,
    /// Segment whose rebalance produced this one.
    pub creator: Option<SegmentId>,
    /// Lower bound of the key range, formatted with `Debug`.
    pub min_key: Option<String>,
    /// Lifecycle state.
    pub state: SegmentState,
    /// Entry capacity.
    pub capacity: usize,
    /// Entry slots handed out.
    pub allocated: usize,
    /// Entries reachable from the list head.
    pub linked: usize,
    /// Distinct keys among the linked entries.
    pub distinct_keys: usize,
    /// Length of the sorted prefix.
    pub sorted_prefix: usize,
}

impl SegmentReport {
    fn of<K: Key, V>(segment: &Segment<K, V>) -> Self {
        Self {
            id: segment.id(),
            creator: segment.creator(),
            min_key: segment.min_key().map(|key| format!("{key:?}")),
            state: segment.state(),
            capacity: segment.capacity(),
            allocated: segment.allocated(),
            linked: segment.linked(),
            distinct_keys: segment.distinct_keys(),
            sorted_prefix: segment.sorted_prefix(),
        }
    }

    /// Fraction of the capacity that has been allocated.
    pub fn fill(&self) -> f64 {
        if self.capacity == 0 {
            return 0.0;
        }
        self.allocated as f64 / self.capacity as f64
    }
}

/// Layout of every segment in the chain, in key order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StructureReport {
    /// Per-segment reports.
    pub segments: Vec<SegmentReport>,
}

impl StructureReport {
    /// Total linked entries across segments.
    pub fn total_linked(&self) -> usize {
        self.segments.iter().map(|segment| segment.linked).sum()
    }

    /// Total distinct keys across segments.
    pub fn total_distinct(&self) -> usize {
        self.segments.iter().map(|segment| segment.distinct_keys).sum()
    }

    /// Mean fill ratio across segments.
    pub fn average_fill(&self) -> f64 {
        if self.segments.is_empty() {
            return 0.0;
        }
        let total: f64 = self.segments.iter().map(SegmentReport::fill).sum();
        total / self.segments.len() as f64
    }

    /// Lowest and highest fill ratios.
    pub fn fill_range(&self) -> (f64, f64) {
        self.segments
            .iter()
            .map(SegmentReport::fill)
            .fold(None, |range: Option<(f64, f64)>, fill| match range {
                None => Some((fill, fill)),
                Some((low, high)) => Some((low.min(fill), high.max(fill))),
            })
            .unwrap_or((0.0, 0.0))
    }
}

impl fmt::Display for StructureReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{:<10} {:<10} {:<12} {:<8} {:>8} {:>8} {:>8} {:>8}",
            "segment", "creator", "min_key", "state", "alloc", "linked", "prefix", "cap"
        )?;
        for segment in &self.segments {
            let creator = segment
                .creator
                .map_or_else(|| "-".to_string(), |id| id.to_string());
            writeln!(
                f,
                "{:<10} {:<10} {:<12} {:<8} {:>8} {:>8} {:>8} {:>8}",
                segment.id.to_string(),
                creator,
                segment.min_key.as_deref().unwrap_or("-inf"),
                segment.state.to_string(),
                segment.allocated,
                segment.linked,
                segment.sorted_prefix,
                segment.capacity,
            )?;
        }
        let (low, high) = self.fill_range();
        write!(
            f,
            "{} segments, {} linked, fill avg {:.2} min {:.2} max {:.2}",
            self.segments.len(),
            self.total_linked(),
            self.average_fill(),
            low,
            high
        )
    }
}

impl<K: Key, V: Value> Engine<K, V> {
    /// Counts the live keys at the newest version.
    ///
    /// Exact when no writes run concurrently.
    pub fn count_keys(&self) -> usize {
        let mut out = ScanBuffer::values_only();
        self.collect((Bound::Unbounded, Bound::Unbounded), Version::LATEST, &mut out)
    }

    /// Counts linked entries that duplicate an older entry of the same key.
    pub fn count_duplicate_keys(&self) -> usize {
        let guard = &epoch::pin();
        self.chain_iter(guard)
            .map(|segment| segment.linked().saturating_sub(segment.distinct_keys()))
            .sum()
    }

    /// Reports the layout of every segment.
    pub fn structure(&self) -> StructureReport {
        let guard = &epoch::pin();
        StructureReport {
            segments: self.chain_iter(guard).map(SegmentReport::of).collect(),
        }
    }

    /// Logs the structure report, one event per segment.
    pub fn print_structure(&self) {
        let report = self.structure();
        for segment in &report.segments {
            info!(
                segment = %segment.id,
                creator = ?segment.creator,
                min_key = segment.min_key.as_deref().unwrap_or("-inf"),
                state = %segment.state,
                allocated = segment.allocated,
                linked = segment.linked,
                sorted_prefix = segment.sorted_prefix,
                capacity = segment.capacity,
                "segment"
            );
        }
        info!(
            segments = report.segments.len(),
            linked = report.total_linked(),
            average_fill = report.average_fill(),
            "structure"
        );
    }

    /// Rebalances every live segment, dropping superseded versions and
    /// restoring sorted prefixes.
    ///
    /// Versions still needed by in-flight scans are kept.
    pub fn compact_all(&self) {
        let guard = &epoch::pin();
        let segments: Vec<_> = self.chain_iter(guard).collect();
        for segment in segments {
            if !segment.is_frozen() {
                self.rebalance(segment, guard);
            }
        }
    }
}


