//! # Physical Page Runs

use crate::addresses::{PAGE_SIZE, PhysicalAddress};
use crate::order::Order;
use core::fmt;

/// Physical memory region a run was carved from.
///
/// Pools keep one segment per zone so that memory reachable with 32-bit DMA
/// is not handed out where any memory would do.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Zone {
    /// Directly addressable, 32-bit DMA reachable memory.
    Low,
    /// Memory above the DMA limit.
    High,
}

impl Zone {
    /// Zone of the memory at `pa`.
    #[inline]
    #[must_use]
    pub const fn of(pa: PhysicalAddress) -> Self {
        if pa.is_below_4g() { Self::Low } else { Self::High }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "lowmem",
            Self::High => "highmem",
        }
    }
}

impl fmt::Display for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a run came from when it was handed to a buffer.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Provenance {
    /// Obtained from the backing page allocator.
    FreshlyAllocated,
    /// Recycled from a page pool segment; already synchronized when it was
    /// returned to the pool.
    FromPool(Zone),
}

/// One physically contiguous extent of `PAGE_SIZE << order` bytes, aligned
/// to its own size.
///
/// A `Run` is a unique token: it is neither `Copy` nor `Clone`, and whoever
/// holds the value (the backing allocator, a pool segment or a buffer) owns
/// the memory it describes.
#[derive(Eq, PartialEq)]
pub struct Run {
    base: PhysicalAddress,
    order: Order,
    zone: Zone,
    provenance: Provenance,
    split: bool,
}

impl Run {
    /// Describe a run freshly obtained from a backing allocator.
    ///
    /// # Panics
    /// If `base` is not aligned to the run size.
    #[must_use]
    pub fn new(base: PhysicalAddress, order: Order, zone: Zone) -> Self {
        assert!(
            base.is_aligned(order.size()),
            "run at {base} is not aligned to order {order}"
        );
        Self {
            base,
            order,
            zone,
            provenance: Provenance::FreshlyAllocated,
            split: false,
        }
    }

    #[inline]
    #[must_use]
    pub const fn base(&self) -> PhysicalAddress {
        self.base
    }

    #[inline]
    #[must_use]
    pub const fn order(&self) -> Order {
        self.order
    }

    #[inline]
    #[must_use]
    pub const fn size(&self) -> u64 {
        self.order.size()
    }

    #[inline]
    #[must_use]
    pub const fn zone(&self) -> Zone {
        self.zone
    }

    #[inline]
    #[must_use]
    pub const fn provenance(&self) -> Provenance {
        self.provenance
    }

    #[inline]
    #[must_use]
    pub const fn is_from_pool(&self) -> bool {
        matches!(self.provenance, Provenance::FromPool(_))
    }

    /// Whether the run has been split into individually freeable pages.
    #[inline]
    #[must_use]
    pub const fn is_split(&self) -> bool {
        self.split
    }

    /// Base addresses of every page in the run, in address order.
    pub fn pages(&self) -> impl Iterator<Item = PhysicalAddress> + use<> {
        let base = self.base;
        (0..self.order.pages()).map(move |i| base + i * PAGE_SIZE)
    }

    pub(crate) const fn with_provenance(mut self, provenance: Provenance) -> Self {
        self.provenance = provenance;
        self
    }

    pub(crate) const fn mark_split(&mut self) {
        self.split = true;
    }
}

impl fmt::Debug for Run {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Run")
            .field("base", &self.base)
            .field("order", &self.order)
            .field("zone", &self.zone)
            .field("provenance", &self.provenance)
            .field("split", &self.split)
            .finish()
    }
}
