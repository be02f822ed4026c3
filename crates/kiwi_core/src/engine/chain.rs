//! The segment chain.
//!
//! Segments form a singly linked list ordered by `min_key`, built from
//! `crossbeam_epoch` atomic pointers. Every pointer to a segment is loaded
//! under an epoch guard, and a segment unlinked by a rebalance is only
//! reclaimed (returned to the pool) once all guards pinned before its
//! retirement are gone.
//!
//! A rebalance seals the `next` link of every segment it consumes by
//! setting tag bit 1. A sealed link is never modified again, so a
//! concurrent splice whose predecessor is being replaced has to wait and
//! find the predecessor's replacement instead.

#![allow(unsafe_code)]

use crate::segment::{Segment, SegmentPool};
use crate::types::Key;
use crossbeam_epoch::{self as epoch, Atomic, Guard, Owned, Shared};
use crossbeam_utils::Backoff;
use std::sync::atomic::Ordering;
use std::sync::Arc;

const SEALED: usize = 1;

pub(crate) struct Chain<K, V> {
    head: Atomic<Segment<K, V>>,
}

impl<K, V> Chain<K, V> {
    pub(crate) fn new(first: Box<Segment<K, V>>) -> Self {
        Self {
            head: Atomic::from(Owned::<Segment<K, V>>::from(first)),
        }
    }

    /// The segment owning the smallest keys.
    pub(crate) fn first<'g>(&self, guard: &'g Guard) -> &'g Segment<K, V> {
        let first = self.head.load(Ordering::Acquire, guard);
        debug_assert!(!first.is_null(), "chain without a first segment");
        // SAFETY: The head always points at a segment (a splice never
        // publishes an empty run), and the guard keeps it from being
        // reclaimed while borrowed.
        unsafe { first.deref() }
    }

    /// The segment after `segment`, sealed or not.
    pub(crate) fn successor<'g>(
        segment: &Segment<K, V>,
        guard: &'g Guard,
    ) -> Option<&'g Segment<K, V>> {
        let next = segment.next.load(Ordering::Acquire, guard);
        // SAFETY: A link only ever points at a segment that was live when
        // the link was last written. Such a segment is unlinked no earlier
        // than the segment holding the link, so it cannot have been
        // reclaimed before the guard was pinned.
        unsafe { next.as_ref() }
    }

    /// Seals the `next` link of a frozen segment and returns its successor.
    pub(crate) fn seal<'g>(segment: &Segment<K, V>, guard: &'g Guard) -> Option<&'g Segment<K, V>> {
        debug_assert!(segment.is_frozen(), "sealing an active segment");
        let next = segment.next.fetch_or(SEALED, Ordering::AcqRel, guard);
        // SAFETY: see `successor`.
        unsafe { next.as_ref() }
    }

    /// Iterates over the segments reachable from the head.
    pub(crate) fn iter<'g>(&self, guard: &'g Guard) -> ChainIter<'g, K, V> {
        ChainIter {
            next: Some(self.first(guard)),
            guard,
        }
    }

    /// Atomic link currently pointing at `target` with no seal, if any.
    ///
    /// Returns `None` while the predecessor of `target` is being replaced.
    fn unsealed_link_to<'g>(
        &'g self,
        target: Shared<'g, Segment<K, V>>,
        guard: &'g Guard,
    ) -> Option<&'g Atomic<Segment<K, V>>> {
        let mut link = &self.head;
        loop {
            let current = link.load(Ordering::Acquire, guard);
            if current.with_tag(0) == target {
                return (current.tag() == 0).then_some(link);
            }
            // SAFETY: see `successor`.
            let segment = unsafe { current.as_ref() }?;
            link = &segment.next;
        }
    }

    /// Replaces the consumed `run` with `replacement`.
    ///
    /// The last replacement segment is linked to `successor` before the
    /// new run is published with a single CAS on the predecessor link.
    pub(crate) fn splice<'g>(
        &self,
        run: &[&'g Segment<K, V>],
        replacement: Vec<Box<Segment<K, V>>>,
        successor: Option<&'g Segment<K, V>>,
        guard: &'g Guard,
    ) {
        debug_assert!(!run.is_empty() && !replacement.is_empty());
        let Some(&first) = run.first() else {
            return;
        };

        let mut next = successor.map_or_else(Shared::null, |segment| {
            Shared::from(segment as *const Segment<K, V>)
        });
        for segment in replacement.into_iter().rev() {
            segment.next.store(next, Ordering::Relaxed);
            next = Owned::<Segment<K, V>>::from(segment).into_shared(guard);
        }
        let new_head = next;

        let target = Shared::from(first as *const Segment<K, V>);
        let backoff = Backoff::new();
        loop {
            if let Some(link) = self.unsealed_link_to(target, guard) {
                if link
                    .compare_exchange(target, new_head, Ordering::AcqRel, Ordering::Acquire, guard)
                    .is_ok()
                {
                    return;
                }
            }
            backoff.snooze();
        }
    }
}

impl<K: Key, V> Chain<K, V> {
    /// The segment whose key range contains `key`.
    pub(crate) fn locate<'g>(&self, key: &K, guard: &'g Guard) -> &'g Segment<K, V> {
        let mut current = self.first(guard);
        while let Some(next) = Self::successor(current, guard) {
            if !next.starts_at_or_before(key) {
                break;
            }
            current = next;
        }
        current
    }
}

impl<K: Key, V: Send + Sync + 'static> Chain<K, V> {
    /// Marks the consumed run retired and hands it to the pool once no
    /// pinned reader can reach it.
    pub(crate) fn retire<'g>(
        run: &[&'g Segment<K, V>],
        pool: &Arc<SegmentPool<K, V>>,
        guard: &'g Guard,
    ) {
        for &segment in run {
            segment.mark_retired();
            let retired = Shared::from(segment as *const Segment<K, V>);
            let pool = Arc::clone(pool);
            // SAFETY: The run has been unlinked by `splice`, so no new
            // reference to it can be loaded from the chain. The closure runs
            // after every guard that might still hold one is unpinned, and
            // each segment of the run is deferred exactly once.
            unsafe {
                guard.defer_unchecked(move || pool.recycle(retired.into_owned().into_box()));
            }
        }
    }
}

impl<K, V> Drop for Chain<K, V> {
    fn drop(&mut self) {
        // SAFETY: `&mut self` means no worker can hold a reference into the
        // chain. Only the live segments are owned here; retired ones belong
        // to their deferred recycle closures.
        unsafe {
            let guard = epoch::unprotected();
            let mut current = self.head.load(Ordering::Relaxed, guard);
            while !current.is_null() {
                let next = current.deref().next.load(Ordering::Relaxed, guard).with_tag(0);
                drop(current.into_owned());
                current = next;
            }
        }
    }
}

/// Iterator over the segments of a chain.
pub(crate) struct ChainIter<'g, K, V> {
    next: Option<&'g Segment<K, V>>,
    guard: &'g Guard,
}

impl<'g, K, V> Iterator for ChainIter<'g, K, V> {
    type Item = &'g Segment<K, V>;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        self.next = Chain::successor(current, self.guard);
        Some(current)
    }
}


