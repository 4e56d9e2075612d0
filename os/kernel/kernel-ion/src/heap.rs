//! # Heap Interface
//!
//! The operations the buffer-sharing layer invokes on any heap.

use crate::addresses::PhysicalAddress;
use crate::error::HeapError;
use crate::flags::BufferFlags;
use crate::scatterlist::ScatterList;
use core::fmt;

/// Kind of heap, as reported to the buffer-sharing layer.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum HeapType {
    /// Page-run heap built from size classes and page pools.
    System,
    /// Single physically contiguous kernel allocation per buffer.
    SystemContig,
}

impl fmt::Display for HeapType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::System => "system",
            Self::SystemContig => "system-contig",
        })
    }
}

/// A memory heap that produces buffers described by scatter tables.
pub trait Heap {
    type Buffer;

    fn heap_type(&self) -> HeapType;

    /// Allocate a buffer covering at least `len` bytes.
    ///
    /// # Errors
    /// [`HeapError::OutOfMemory`] if memory could not be obtained (nothing is
    /// leaked), [`HeapError::InvalidLength`] for a zero or unrepresentable
    /// length.
    fn allocate(&self, len: u64, flags: BufferFlags) -> Result<Self::Buffer, HeapError>;

    /// Release a buffer previously returned by [`allocate`](Self::allocate)
    /// on this heap. Must be called exactly once per buffer.
    fn free(&self, buffer: Self::Buffer);

    /// Scatter table of the buffer, for DMA mapping.
    fn map_dma<'b>(&self, buffer: &'b Self::Buffer) -> &'b ScatterList;

    /// Physical base and length if the buffer is a single contiguous extent.
    fn phys(&self, _buffer: &Self::Buffer) -> Option<(PhysicalAddress, u64)> {
        None
    }
}
