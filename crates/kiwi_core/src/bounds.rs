//! Approximate size bounds.
//!
//! The engine never counts its keys exactly; doing so would need a
//! serializing counter on every write. Instead each write adjusts a pair of
//! bounds that are guaranteed to bracket the true number of live keys once
//! the writes that touched them have completed:
//!
//! - the upper bound grows on every accepted value write and never
//!   undercounts a key;
//! - the lower bound grows only for writes proven to introduce a new key
//!   and shrinks only for removals proven to hit a live key.
//!
//! Rebalancing knows the exact live count of the segments it replaces and
//! uses it to pull both bounds back toward the truth.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

/// Engine-wide lower and upper bounds on the number of live keys.
#[derive(Debug)]
pub struct SizeBounds {
    enabled: AtomicBool,
    lower: AtomicI64,
    upper: AtomicI64,
}

impl SizeBounds {
    /// Creates bounds, optionally disabled.
    ///
    /// Disabled bounds report 0 and `usize::MAX` and ignore every update.
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled: AtomicBool::new(enabled),
            lower: AtomicI64::new(0),
            upper: AtomicI64::new(0),
        }
    }

    /// Returns true if the bounds are being maintained.
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Records an accepted value write.
    pub fn record_put(&self, is_new_key: bool) {
        if !self.is_enabled() {
            return;
        }
        self.upper.fetch_add(1, Ordering::Relaxed);
        if is_new_key {
            self.lower.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Records a removal known to hit a live key.
    pub fn record_remove(&self) {
        if self.is_enabled() {
            self.lower.fetch_sub(1, Ordering::Relaxed);
        }
    }

    /// Applies the correction computed by a rebalance.
    pub fn record_compaction(&self, lower_delta: i64, upper_delta: i64) {
        if !self.is_enabled() {
            return;
        }
        self.lower.fetch_add(lower_delta, Ordering::Relaxed);
        self.upper.fetch_add(upper_delta, Ordering::Relaxed);
    }

    /// Returns a lower bound on the number of live keys.
    pub fn lower_bound(&self) -> usize {
        if !self.is_enabled() {
            return 0;
        }
        clamp(self.lower.load(Ordering::Relaxed))
    }

    /// Returns an upper bound on the number of live keys.
    pub fn upper_bound(&self) -> usize {
        if !self.is_enabled() {
            return usize::MAX;
        }
        clamp(self.upper.load(Ordering::Relaxed))
    }

    /// Resets both bounds to zero.
    pub(crate) fn reset(&self) {
        self.lower.store(0, Ordering::Relaxed);
        self.upper.store(0, Ordering::Relaxed);
    }
}

fn clamp(raw: i64) -> usize {
    usize::try_from(raw.max(0)).unwrap_or(usize::MAX)
}

/// Sentinel stored in a closed tally.
const CLOSED: i64 = i64::MIN;

/// Per-segment share of the engine bounds.
///
/// Writes add to the tally of the segment they landed in. A rebalance
/// closes the tallies of the segments it replaces; from then on no write
/// can contribute to them, so the closed totals are exactly what the
/// engine bounds received from those segments.
#[derive(Debug)]
pub(crate) struct SegmentTally {
    lower: AtomicI64,
    upper: AtomicI64,
}

impl SegmentTally {
    pub(crate) fn new(live: i64) -> Self {
        Self {
            lower: AtomicI64::new(live),
            upper: AtomicI64::new(live),
        }
    }

    pub(crate) fn try_add_lower(&self, delta: i64) -> bool {
        try_add(&self.lower, delta)
    }

    pub(crate) fn try_add_upper(&self, delta: i64) -> bool {
        try_add(&self.upper, delta)
    }

    /// Closes the tally and returns its final `(lower, upper)` totals.
    ///
    /// Returns zeros if the tally was already closed.
    pub(crate) fn close(&self) -> (i64, i64) {
        let settle = |raw: i64| if raw == CLOSED { 0 } else { raw };
        let lower = self.lower.swap(CLOSED, Ordering::AcqRel);
        let upper = self.upper.swap(CLOSED, Ordering::AcqRel);
        (settle(lower), settle(upper))
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.upper.load(Ordering::Acquire) == CLOSED
    }

    pub(crate) fn reset(&mut self, live: i64) {
        *self.lower.get_mut() = live;
        *self.upper.get_mut() = live;
    }
}

fn try_add(counter: &AtomicI64, delta: i64) -> bool {
    counter
        .fetch_update(Ordering::AcqRel, Ordering::Acquire, |raw| {
            (raw != CLOSED).then(|| raw + delta)
        })
        .is_ok()
}


