//! # Page Pools
//!
//! A [`PagePool`] recycles runs of exactly one order for uncached buffers.
//! Setting up uncached mappings and flushing caches for fresh pages is
//! expensive, so pages freed by uncached buffers are kept here, already
//! synchronized, and handed out again before falling back to the backing
//! allocator.
//!
//! Each pool holds two segments, one per [`Zone`], guarded by a single spin
//! lock. The lock only ever covers pushing or popping a run; it is never held
//! across a call into the backing allocator and never nested with another
//! pool's lock.

use crate::flags::GfpFlags;
use crate::order::Order;
use crate::page_alloc::{PageAllocator, release_run};
use crate::run::{Provenance, Run, Zone};
use alloc::vec::Vec;
use log::trace;
use spin::Mutex;

/// Snapshot of the number of idle runs in each segment of a pool.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct PoolCounts {
    pub high: usize,
    pub low: usize,
}

impl PoolCounts {
    #[inline]
    #[must_use]
    pub const fn total(self) -> usize {
        self.high + self.low
    }
}

/// The two segments. A segment's count is its length, so the count always
/// equals the number of runs actually queued.
#[derive(Default)]
struct Segments {
    high: Vec<Run>,
    low: Vec<Run>,
}

impl Segments {
    const fn segment_mut(&mut self, zone: Zone) -> &mut Vec<Run> {
        match zone {
            Zone::High => &mut self.high,
            Zone::Low => &mut self.low,
        }
    }

    /// Pop from the high segment first, keeping 32-bit reachable memory for
    /// callers that cannot use anything else.
    fn pop(&mut self) -> Option<(Run, Zone)> {
        if let Some(run) = self.high.pop() {
            return Some((run, Zone::High));
        }
        self.low.pop().map(|run| (run, Zone::Low))
    }
}

/// Recycling pool for runs of one order.
pub struct PagePool {
    order: Order,
    gfp: GfpFlags,
    segments: Mutex<Segments>,
}

impl PagePool {
    #[must_use]
    pub fn new(gfp: GfpFlags, order: Order) -> Self {
        Self {
            order,
            gfp,
            segments: Mutex::new(Segments::default()),
        }
    }

    #[inline]
    #[must_use]
    pub const fn order(&self) -> Order {
        self.order
    }

    /// The hint used when the pool falls back to the backing allocator.
    #[inline]
    #[must_use]
    pub const fn gfp(&self) -> GfpFlags {
        self.gfp
    }

    /// Remove one idle run, tagged [`Provenance::FromPool`] with the segment
    /// it was taken from.
    ///
    /// When both segments hold runs the high segment is drained first.
    pub fn try_take(&self) -> Option<Run> {
        let (run, zone) = self.segments.lock().pop()?;
        Some(run.with_provenance(Provenance::FromPool(zone)))
    }

    /// Take an idle run, or allocate a fresh one from `pages` with this
    /// pool's hint if both segments are empty.
    pub fn alloc<A: PageAllocator + ?Sized>(&self, pages: &A) -> Option<Run> {
        if let Some(run) = self.try_take() {
            return Some(run);
        }
        trace!(
            "page pool: order {} empty, allocating fresh (may block: {})",
            self.order,
            self.gfp.may_block()
        );
        pages.alloc_pages(self.gfp, self.order)
    }

    /// Put `run` into the segment of its zone.
    ///
    /// The pool is unbounded; runs stay until taken or drained.
    ///
    /// # Panics
    /// If `run` is not of this pool's order.
    pub fn give(&self, run: Run) {
        assert_eq!(
            run.order(),
            self.order,
            "run of order {} given to pool of order {}",
            run.order(),
            self.order
        );
        let run = run.with_provenance(Provenance::FreshlyAllocated);
        let zone = run.zone();
        self.segments.lock().segment_mut(zone).push(run);
    }

    /// Non-blocking probe whether any run is idle.
    ///
    /// Returns `false` if the pool lock is currently contended.
    #[must_use]
    pub fn has_pages(&self) -> bool {
        self.segments
            .try_lock()
            .is_some_and(|s| !s.high.is_empty() || !s.low.is_empty())
    }

    /// Snapshot of both segment counts, for diagnostics.
    #[must_use]
    pub fn counts(&self) -> PoolCounts {
        let segments = self.segments.lock();
        PoolCounts {
            high: segments.high.len(),
            low: segments.low.len(),
        }
    }

    /// Bytes held idle by this pool.
    #[must_use]
    pub fn resident_bytes(&self) -> u64 {
        self.counts().total() as u64 * self.order.size()
    }

    /// Hand every idle run back to `pages`, returning how many were released.
    pub fn drain<A: PageAllocator + ?Sized>(&self, pages: &A) -> usize {
        let taken = core::mem::take(&mut *self.segments.lock());
        let released = taken.high.len() + taken.low.len();
        for run in taken.high.into_iter().chain(taken.low) {
            release_run(pages, run);
        }
        released
    }
}

impl core::fmt::Debug for PagePool {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PagePool")
            .field("order", &self.order)
            .field("gfp", &self.gfp)
            .field("counts", &self.counts())
            .finish_non_exhaustive()
    }
}
