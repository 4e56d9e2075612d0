//! # System Heap
//!
//! Builds buffers out of physically contiguous runs drawn from a small,
//! descending menu of orders.
//!
//! ## Allocation
//!
//! The requested length is rounded up to whole pages and then tiled greedily:
//!
//! ```text
//! remaining = 1040 pages, orders = [10, 4, 0]
//!
//!   order 10 ──► 1024 pages   remaining 16, max order 10
//!   order  4 ──►   16 pages   remaining  0, max order  4
//! ```
//!
//! Each step picks the largest order that fits the remaining length and does
//! not exceed the order of the previous run, so run sizes never increase
//! along a buffer and the scatter table stays short. If a run of the chosen
//! order cannot be had, smaller orders are tried; multi-page runs are
//! requested with a fail-fast hint so that fragmentation degrades to smaller
//! runs instead of stalling in reclaim.
//!
//! Uncached buffers take runs from the [`PagePool`] of the order first and
//! only fall back to the backing allocator when it is empty. Cached buffers
//! always take fresh runs.
//!
//! ## Readiness
//!
//! Pool runs were synchronized when they were returned, so a buffer made
//! entirely of pool runs needs no cache maintenance before first use. Buffers
//! flagged `sync_force` are synchronized here. Any other buffer is handed out
//! not ready and the caller must synchronize it.
//!
//! ## Failure
//!
//! If no order can satisfy the remaining length, or the scatter table cannot
//! be allocated, every run obtained so far goes back to where it came from:
//! recycled runs to their pool segment, fresh runs to the backing allocator.
//! Pool counts and the allocator's outstanding pages are exactly as before
//! the call when [`HeapError::OutOfMemory`] is returned. Runs are only split
//! into single pages once the buffer is committed, so the unwinding never
//! deals with split runs.
//!
//! ## Free
//!
//! Uncached buffers are zeroed before their runs re-enter a pool, unless the
//! buffer asked for `no_zeroed`: recycled memory must never expose a previous
//! owner's data. The order of each run is recovered from the length of its
//! scatter entry; split buffers therefore return single pages.

use crate::addresses::page_align;
use crate::diagnostics::{HeapDiagnostics, PoolStats};
use crate::dma::{DeviceSync, DmaDirection};
use crate::error::HeapError;
use crate::flags::{BufferFlags, GfpFlags};
use crate::heap::{Heap, HeapType};
use crate::mapper::{PhysMapper, zero_extent};
use crate::order::{Order, SizeClassError, SizeClassTable};
use crate::page_alloc::PageAllocator;
use crate::page_pool::PagePool;
use crate::run::Run;
use crate::scatterlist::{ScatterList, count_entries};
use alloc::boxed::Box;
use alloc::vec::Vec;
use log::{debug, trace, warn};

/// A buffer allocated from a [`SystemHeap`].
#[derive(Debug)]
#[must_use = "dropping a buffer leaks its pages; return it with `SystemHeap::free`"]
pub struct SystemBuffer {
    len: u64,
    flags: BufferFlags,
    table: ScatterList,
    ready: bool,
}

impl SystemBuffer {
    /// The length originally requested.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> u64 {
        self.len
    }

    /// Always `false`; zero-length buffers are rejected.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    #[must_use]
    pub const fn flags(&self) -> BufferFlags {
        self.flags
    }

    #[inline]
    #[must_use]
    pub const fn sg_table(&self) -> &ScatterList {
        &self.table
    }

    /// Whether the buffer may be used without further cache maintenance.
    #[inline]
    #[must_use]
    pub const fn is_ready(&self) -> bool {
        self.ready
    }
}

/// Page-run heap with one [`PagePool`] per size class.
pub struct SystemHeap<A, M, D>
where
    A: PageAllocator,
    M: PhysMapper,
    D: DeviceSync,
{
    classes: SizeClassTable,
    pools: Box<[PagePool]>,
    pages: A,
    mapper: M,
    sync: D,
}

impl<A, M, D> SystemHeap<A, M, D>
where
    A: PageAllocator,
    M: PhysMapper,
    D: DeviceSync,
{
    /// Create a heap allocating from `classes`, with empty pools.
    pub fn new(classes: SizeClassTable, pages: A, mapper: M, sync: D) -> Self {
        let pools = classes
            .iter()
            .map(|order| PagePool::new(GfpFlags::for_order(order), order))
            .collect();
        debug!("system heap: created with size classes {classes:?}");
        Self {
            classes,
            pools,
            pages,
            mapper,
            sync,
        }
    }

    /// Create a heap with [`DEFAULT_ORDERS`](crate::DEFAULT_ORDERS).
    pub fn with_default_orders(pages: A, mapper: M, sync: D) -> Self {
        Self::new(SizeClassTable::default(), pages, mapper, sync)
    }

    /// Create a heap from a custom order list, largest first.
    ///
    /// # Errors
    /// The order list is not a valid [`SizeClassTable`].
    pub fn with_orders(orders: &[u8], pages: A, mapper: M, sync: D) -> Result<Self, SizeClassError> {
        Ok(Self::new(SizeClassTable::new(orders)?, pages, mapper, sync))
    }

    #[inline]
    #[must_use]
    pub const fn size_classes(&self) -> &SizeClassTable {
        &self.classes
    }

    /// The pool recycling runs of `order`.
    ///
    /// # Panics
    /// If `order` is not one of the heap's size classes.
    #[must_use]
    pub fn pool(&self, order: Order) -> &PagePool {
        &self.pools[self.classes.order_to_index(order)]
    }

    /// The backing page allocator.
    #[inline]
    #[must_use]
    pub const fn page_allocator(&self) -> &A {
        &self.pages
    }

    /// Allocate a buffer of at least `len` bytes.
    ///
    /// # Errors
    /// - [`HeapError::InvalidLength`] if `len` is zero or cannot be page aligned.
    /// - [`HeapError::OutOfMemory`] if the runs or the scatter table could not
    ///   be obtained. Nothing obtained along the way is kept.
    pub fn allocate(&self, len: u64, flags: BufferFlags) -> Result<SystemBuffer, HeapError> {
        if len == 0 {
            return Err(HeapError::InvalidLength);
        }
        let aligned = page_align(len).ok_or(HeapError::InvalidLength)?;
        let split = flags.fault_user_mappings();

        let mut runs: Vec<Run> = Vec::new();
        let mut remaining = aligned;
        let mut max_order = self.classes.largest();

        while remaining > 0 {
            let Some(run) = self.alloc_largest_available(flags, remaining, max_order) else {
                warn!(
                    "system heap: out of memory with {remaining} of {aligned} bytes outstanding, rolling back {} runs",
                    runs.len()
                );
                self.unwind(runs);
                return Err(HeapError::OutOfMemory);
            };

            if runs.try_reserve(1).is_err() {
                warn!("system heap: cannot grow run list, rolling back {} runs", runs.len() + 1);
                self.unwind_run(run);
                self.unwind(runs);
                return Err(HeapError::OutOfMemory);
            }

            remaining -= run.size();
            max_order = run.order();
            runs.push(run);
        }

        let all_from_pool = runs.iter().all(Run::is_from_pool);

        let mut table = match ScatterList::try_with_capacity(count_entries(&runs, split)) {
            Ok(table) => table,
            Err(err) => {
                warn!("system heap: cannot allocate scatter table, rolling back {} runs", runs.len());
                self.unwind(runs);
                return Err(err);
            }
        };

        for mut run in runs {
            if split {
                self.pages.split_page(&run);
                run.mark_split();
            }
            table.push_run(&run, split);
        }

        if flags.sync_force() {
            self.sync.sync_for_device(&table, DmaDirection::Bidirectional);
        }
        let ready = all_from_pool || flags.sync_force();

        debug!(
            "system heap: allocated {len} bytes as {} entries (split: {split}, cached: {}, ready: {ready})",
            table.len(),
            flags.cached()
        );

        Ok(SystemBuffer {
            len,
            flags,
            table,
            ready,
        })
    }

    /// Return every extent of `buffer` to its pool or the backing allocator.
    pub fn free(&self, buffer: SystemBuffer) {
        let SystemBuffer {
            len, flags, table, ..
        } = buffer;

        // Pool pages are recycled without the backing allocator's zeroing.
        if !flags.cached() && !flags.no_zeroed() {
            for entry in &table {
                // SAFETY: The caller handed the buffer back, so the heap owns
                // every extent of the table exclusively until it is released.
                unsafe { zero_extent(&self.mapper, entry.address(), entry.length()) };
            }
        }

        let nents = table.len();
        for entry in table {
            let run = Run::new(entry.address(), Order::from_len(entry.length()), entry.zone());
            self.free_buffer_run(flags, run);
        }

        debug!("system heap: freed {len} bytes in {nents} entries (cached: {})", flags.cached());
    }

    /// Snapshot of the idle runs held by every pool.
    #[must_use]
    pub fn diagnostics(&self) -> HeapDiagnostics {
        self.pools
            .iter()
            .map(|pool| PoolStats::new(pool.order(), pool.counts()))
            .collect()
    }

    /// Try the size classes from `max_order` downwards until one yields a run
    /// no larger than `remaining`.
    fn alloc_largest_available(&self, flags: BufferFlags, remaining: u64, max_order: Order) -> Option<Run> {
        for order in self.classes.iter() {
            if remaining < order.size() || order > max_order {
                continue;
            }

            let run = if flags.cached() {
                self.pages.alloc_pages(self.pool(order).gfp(), order)
            } else {
                self.pool(order).alloc(&self.pages)
            };

            if let Some(run) = run {
                trace!(
                    "system heap: order {order} run at {} ({:?})",
                    run.base(),
                    run.provenance()
                );
                return Some(run);
            }

            trace!("system heap: no order {order} run available");
        }
        None
    }

    /// Route a run of a freed buffer to where a buffer with `flags` keeps its
    /// memory when idle.
    fn free_buffer_run(&self, flags: BufferFlags, run: Run) {
        if !flags.cached() {
            self.pool(run.order()).give(run);
        } else if flags.fault_user_mappings() {
            for page in run.pages() {
                self.pages.free_page(page);
            }
        } else {
            self.pages.free_pages(run);
        }
    }

    /// Give a run of an abandoned buffer back to where it came from.
    fn unwind_run(&self, run: Run) {
        if run.is_from_pool() {
            self.pool(run.order()).give(run);
        } else {
            self.pages.free_pages(run);
        }
    }

    fn unwind(&self, runs: Vec<Run>) {
        for run in runs {
            self.unwind_run(run);
        }
    }
}

impl<A, M, D> Heap for SystemHeap<A, M, D>
where
    A: PageAllocator,
    M: PhysMapper,
    D: DeviceSync,
{
    type Buffer = SystemBuffer;

    fn heap_type(&self) -> HeapType {
        HeapType::System
    }

    fn allocate(&self, len: u64, flags: BufferFlags) -> Result<SystemBuffer, HeapError> {
        Self::allocate(self, len, flags)
    }

    fn free(&self, buffer: SystemBuffer) {
        Self::free(self, buffer);
    }

    fn map_dma<'b>(&self, buffer: &'b SystemBuffer) -> &'b ScatterList {
        buffer.sg_table()
    }
}

impl<A, M, D> Drop for SystemHeap<A, M, D>
where
    A: PageAllocator,
    M: PhysMapper,
    D: DeviceSync,
{
    fn drop(&mut self) {
        for pool in &self.pools {
            let released = pool.drain(&self.pages);
            if released > 0 {
                debug!(
                    "system heap: released {released} idle order {} runs",
                    pool.order()
                );
            }
        }
    }
}

impl<A, M, D> core::fmt::Debug for SystemHeap<A, M, D>
where
    A: PageAllocator,
    M: PhysMapper,
    D: DeviceSync,
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SystemHeap")
            .field("classes", &self.classes)
            .field("pools", &self.pools)
            .finish_non_exhaustive()
    }
}
