//! Reuse pool for segments.
//!
//! Building a segment allocates two arenas of `segment_capacity` cells.
//! The pool keeps retired segments of the standard capacity around so a
//! rebalance can take a scrubbed one instead.

use super::Segment;
use crate::stats::EngineStats;
use crate::types::SegmentId;
use crossbeam_queue::ArrayQueue;
use std::sync::Arc;

/// A bounded lock-free pool of standard-capacity segments.
pub(crate) struct SegmentPool<K, V> {
    free: Option<ArrayQueue<Box<Segment<K, V>>>>,
    segment_capacity: usize,
    stats: Arc<EngineStats>,
}

impl<K, V> SegmentPool<K, V> {
    /// Creates a pool pre-filled with `pool_size` empty segments.
    pub(crate) fn new(pool_size: usize, segment_capacity: usize, stats: Arc<EngineStats>) -> Self {
        let free = (pool_size > 0).then(|| {
            let queue = ArrayQueue::new(pool_size);
            for _ in 0..pool_size {
                let blank = Segment::new(SegmentId::new(0), None, None, segment_capacity);
                let _ = queue.push(Box::new(blank));
            }
            queue
        });
        Self {
            free,
            segment_capacity,
            stats,
        }
    }

    /// Returns a segment able to hold `needed` entries.
    ///
    /// Requests that fit the standard capacity are served from the pool
    /// when possible; larger ones always get a dedicated segment.
    pub(crate) fn take(
        &self,
        id: SegmentId,
        min_key: Option<K>,
        creator: Option<SegmentId>,
        needed: usize,
    ) -> Box<Segment<K, V>> {
        if needed > self.segment_capacity {
            self.stats.record_pool_miss();
            return Box::new(Segment::new(id, min_key, creator, needed));
        }
        match self.free.as_ref().and_then(ArrayQueue::pop) {
            Some(mut segment) => {
                self.stats.record_pool_hit();
                segment.reinit(id, min_key, creator);
                segment
            }
            None => {
                self.stats.record_pool_miss();
                Box::new(Segment::new(id, min_key, creator, self.segment_capacity))
            }
        }
    }

    /// Returns a retired segment to the pool, or drops it when the pool is
    /// full or the segment has a non-standard capacity.
    pub(crate) fn recycle(&self, mut segment: Box<Segment<K, V>>) {
        let Some(free) = &self.free else {
            return;
        };
        if segment.capacity() != self.segment_capacity {
            return;
        }
        segment.reinit(SegmentId::new(0), None, None);
        if free.push(segment).is_ok() {
            self.stats.record_pool_recycle();
        }
    }

    /// Number of segments ready for reuse.
    pub(crate) fn available(&self) -> usize {
        self.free.as_ref().map_or(0, ArrayQueue::len)
    }

    pub(crate) fn segment_capacity(&self) -> usize {
        self.segment_capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(size: usize) -> SegmentPool<u64, u64> {
        SegmentPool::new(size, 8, Arc::new(EngineStats::new()))
    }

    #[test]
    fn serves_prefilled_segments() {
        let pool = pool(2);
        assert_eq!(pool.available(), 2);

        let segment = pool.take(SegmentId::new(5), Some(3), None, 4);
        assert_eq!(segment.id(), SegmentId::new(5));
        assert_eq!(segment.min_key(), Some(&3));
        assert_eq!(pool.available(), 1);
        assert_eq!(pool.stats.pool_hits(), 1);
    }

    #[test]
    fn empty_pool_allocates() {
        let pool = pool(0);
        let segment = pool.take(SegmentId::new(1), None, None, 8);
        assert_eq!(segment.capacity(), 8);
        assert_eq!(pool.stats.pool_misses(), 1);

        pool.recycle(segment);
        assert_eq!(pool.available(), 0);
    }

    #[test]
    fn pool_never_holds_more_than_its_size() {
        let pool = pool(1);
        let first = pool.take(SegmentId::new(1), None, None, 8);
        let second = pool.take(SegmentId::new(2), None, None, 8);
        assert_eq!(pool.available(), 0);

        pool.recycle(first);
        pool.recycle(second);
        assert_eq!(pool.available(), 1);
        assert_eq!(pool.stats.pool_recycled(), 1);
    }

    #[test]
    fn oversized_requests_bypass_pool() {
        let pool = pool(1);
        let segment = pool.take(SegmentId::new(1), None, None, 20);
        assert_eq!(segment.capacity(), 20);
        assert_eq!(pool.available(), 1);

        pool.recycle(segment);
        assert_eq!(pool.available(), 1);
    }

    #[test]
    fn recycled_segments_are_scrubbed() {
        let pool = pool(1);
        let first = pool.take(SegmentId::new(1), None, None, 4);
        assert!(matches!(first.allocate(7, Some(70)), crate::segment::Allocation::Slot(0)));
        first.try_freeze();

        pool.recycle(first);
        assert_eq!(pool.stats.pool_recycled(), 1);

        let again = pool.take(SegmentId::new(2), None, None, 4);
        assert_eq!(again.allocated(), 0);
        assert!(!again.is_frozen());
        assert_eq!(again.read_key(0), None);
    }
}
