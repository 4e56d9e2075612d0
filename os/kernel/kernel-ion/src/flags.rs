//! # Buffer Flags and Allocation Hints

use crate::order::Order;
use bitfield_struct::bitfield;

/// Per-buffer allocation flags as passed down by the buffer-sharing layer.
///
/// ```rust
/// # use kernel_ion::BufferFlags;
/// let flags = BufferFlags::new().with_cached(true).with_fault_user_mappings(true);
/// assert!(flags.cached());
/// assert!(!flags.sync_force());
/// assert_eq!(flags.into_bits(), 0b0011);
/// ```
#[bitfield(u32, order = Lsb)]
#[derive(Eq, PartialEq)]
pub struct BufferFlags {
    /// Bit 0 — `CACHED`: CPU mappings are cacheable.
    ///
    /// Cached buffers bypass the page pools and always take fresh runs.
    pub cached: bool,

    /// Bit 1 — `FAULT_USER_MAPPINGS`: user mappings are populated page by page.
    ///
    /// Every run is split into single pages and the scatter table carries one
    /// entry per page.
    pub fault_user_mappings: bool,

    /// Bit 2 — `SYNC_FORCE`: synchronize with the device before returning.
    pub sync_force: bool,

    /// Bit 3 — `NO_ZEROED`: skip zeroing on free.
    pub no_zeroed: bool,

    /// Bits 4–31 — Reserved.
    #[bits(28)]
    __: u32,
}

/// Hints passed to the backing [`PageAllocator`](crate::PageAllocator).
///
/// Modelled on the kernel's `gfp_t` modifiers that matter to this heap.
#[bitfield(u8, order = Lsb)]
#[derive(Eq, PartialEq)]
pub struct GfpFlags {
    /// Bit 0 — the run may come from memory above the 32-bit DMA limit.
    pub highmem: bool,

    /// Bit 1 — hand the run out zero-filled.
    pub zero: bool,

    /// Bit 2 — do not log allocation failures.
    pub no_warn: bool,

    /// Bit 3 — fail instead of retrying.
    pub no_retry: bool,

    /// Bit 4 — do not wait for or wake up reclaim.
    pub no_reclaim: bool,

    /// Bits 5–7 — Reserved.
    #[bits(3)]
    __: u8,
}

impl GfpFlags {
    /// Hint for single-page runs: may block under memory pressure.
    #[must_use]
    pub fn low_order() -> Self {
        Self::new()
            .with_highmem(true)
            .with_zero(true)
            .with_no_warn(true)
    }

    /// Hint for multi-page runs.
    ///
    /// Large runs are opportunistic: the allocator must fail fast rather
    /// than stall in reclaim, and the heap falls back to the next smaller
    /// size class.
    #[must_use]
    pub fn high_order() -> Self {
        Self::low_order().with_no_retry(true).with_no_reclaim(true)
    }

    /// The hint used for runs of `order`.
    #[must_use]
    pub fn for_order(order: Order) -> Self {
        if order > Order::ZERO {
            Self::high_order()
        } else {
            Self::low_order()
        }
    }

    /// Whether the caller accepts blocking in the allocator.
    #[inline]
    #[must_use]
    pub fn may_block(self) -> bool {
        !self.no_reclaim()
    }
}
