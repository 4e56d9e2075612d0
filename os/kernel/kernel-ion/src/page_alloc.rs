//! # Backing Page Allocator
//!
//! The heap never manages raw memory itself. Fresh runs come from, and idle
//! runs eventually go back to, an implementation of [`PageAllocator`] (in a
//! kernel, the buddy allocator).

use crate::addresses::PhysicalAddress;
use crate::flags::GfpFlags;
use crate::order::Order;
use crate::run::Run;
use alloc::sync::Arc;

/// Capability to obtain and release aligned power-of-two page runs.
///
/// Implementations must be safe to call from several threads at once and
/// may block (e.g. in reclaim) unless the hint asks them not to.
pub trait PageAllocator {
    /// Allocate a run of `order`, aligned to its size.
    ///
    /// Returns `None` when no such run is available under `gfp`. With
    /// [`GfpFlags::no_retry`] set the implementation should fail quickly.
    fn alloc_pages(&self, gfp: GfpFlags, order: Order) -> Option<Run>;

    /// Release a whole run that was never split.
    fn free_pages(&self, run: Run);

    /// Release one page of a run previously passed to [`split_page`](Self::split_page).
    fn free_page(&self, page: PhysicalAddress);

    /// Turn `run` into individually freeable pages.
    ///
    /// The run stays physically contiguous; afterwards each of its pages
    /// must be returned through [`free_page`](Self::free_page).
    fn split_page(&self, run: &Run);
}

impl<T> PageAllocator for &T
where
    T: PageAllocator + ?Sized,
{
    fn alloc_pages(&self, gfp: GfpFlags, order: Order) -> Option<Run> {
        (**self).alloc_pages(gfp, order)
    }

    fn free_pages(&self, run: Run) {
        (**self).free_pages(run);
    }

    fn free_page(&self, page: PhysicalAddress) {
        (**self).free_page(page);
    }

    fn split_page(&self, run: &Run) {
        (**self).split_page(run);
    }
}

impl<T> PageAllocator for Arc<T>
where
    T: PageAllocator + ?Sized,
{
    fn alloc_pages(&self, gfp: GfpFlags, order: Order) -> Option<Run> {
        (**self).alloc_pages(gfp, order)
    }

    fn free_pages(&self, run: Run) {
        (**self).free_pages(run);
    }

    fn free_page(&self, page: PhysicalAddress) {
        (**self).free_page(page);
    }

    fn split_page(&self, run: &Run) {
        (**self).split_page(run);
    }
}

/// Return `run` to `pages`, page by page if it was split.
pub(crate) fn release_run<A: PageAllocator + ?Sized>(pages: &A, run: Run) {
    if run.is_split() {
        for page in run.pages() {
            pages.free_page(page);
        }
    } else {
        pages.free_pages(run);
    }
}
