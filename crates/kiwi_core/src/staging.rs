//! Per-worker staging of in-flight writes.
//!
//! A writer records its freshly allocated entry here before stamping and
//! linking it, and discards the record once the entry is linked. Anyone who
//! must see every write to a segment (range scans and rebalances) snapshots
//! the staging areas in addition to walking the segment's list.
//!
//! The staging mutex is what orders a write against a freeze: `record`
//! checks the frozen flag while holding it, and a rebalance freezes before
//! it takes any of them. Either the record lands first and the rebalance
//! sees it, or the writer sees the freeze and retries elsewhere.

use crate::segment::Segment;
use crate::types::{Key, SegmentId};
use parking_lot::Mutex;
use std::collections::BTreeMap;

/// A write that is allocated in a segment but not yet linked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct StagedWrite {
    pub(crate) segment: SegmentId,
    pub(crate) slot: u32,
}

/// A staged entry as seen by a reader of one segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct StagedSlot<K> {
    pub(crate) key: K,
    pub(crate) slot: u32,
}

/// Ordered map of one worker's in-flight writes, keyed by target key.
#[derive(Debug)]
pub(crate) struct StagingArea<K> {
    writes: Mutex<BTreeMap<K, StagedWrite>>,
}

impl<K: Key> StagingArea<K> {
    pub(crate) fn new() -> Self {
        Self {
            writes: Mutex::new(BTreeMap::new()),
        }
    }

    /// Stages `slot` of `segment` for `key`.
    ///
    /// Returns false without staging anything if the segment is frozen.
    pub(crate) fn record<V>(&self, segment: &Segment<K, V>, key: K, slot: u32) -> bool {
        let mut writes = self.writes.lock();
        if segment.is_frozen() {
            return false;
        }
        writes.insert(
            key,
            StagedWrite {
                segment: segment.id(),
                slot,
            },
        );
        true
    }

    pub(crate) fn discard(&self, key: &K) {
        self.writes.lock().remove(key);
    }

    /// Staged entries aimed at `segment`, in key order.
    pub(crate) fn snapshot(&self, segment: SegmentId) -> Vec<StagedSlot<K>> {
        self.writes
            .lock()
            .iter()
            .filter(|(_, write)| write.segment == segment)
            .map(|(key, write)| StagedSlot {
                key: key.clone(),
                slot: write.slot,
            })
            .collect()
    }

    /// The staged slot for `key` in `segment`, if any.
    pub(crate) fn lookup(&self, segment: SegmentId, key: &K) -> Option<u32> {
        self.writes
            .lock()
            .get(key)
            .filter(|write| write.segment == segment)
            .map(|write| write.slot)
    }

    pub(crate) fn len(&self) -> usize {
        self.writes.lock().len()
    }

    pub(crate) fn clear(&self) {
        self.writes.lock().clear();
    }
}


