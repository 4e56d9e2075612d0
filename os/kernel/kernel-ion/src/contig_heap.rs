//! # Contiguous Heap
//!
//! Serves each buffer with a single zeroed, page-aligned allocation from the
//! kernel's global allocator. The buffer is one physical extent, so its scatter
//! table has exactly one entry and [`Heap::phys`] can describe it.

use crate::addresses::{PAGE_SIZE, PhysicalAddress};
use crate::error::HeapError;
use crate::flags::BufferFlags;
use crate::heap::{Heap, HeapType};
use crate::mapper::PhysMapper;
use crate::run::Zone;
use crate::scatterlist::{ScatterEntry, ScatterList};
use alloc::alloc::{Layout, alloc_zeroed, dealloc};
use core::ptr::NonNull;
use log::{debug, warn};

/// A buffer allocated from a [`ContiguousHeap`].
#[derive(Debug)]
#[must_use = "dropping a buffer leaks its memory; return it with `ContiguousHeap::free`"]
pub struct ContiguousBuffer {
    ptr: NonNull<u8>,
    layout: Layout,
    flags: BufferFlags,
    table: ScatterList,
}

// SAFETY: The buffer exclusively owns its allocation; the pointer is never
// shared outside of it.
unsafe impl Send for ContiguousBuffer {}

impl ContiguousBuffer {
    /// Kernel pointer to the first byte.
    #[inline]
    #[must_use]
    pub const fn as_ptr(&self) -> NonNull<u8> {
        self.ptr
    }

    #[inline]
    #[must_use]
    pub const fn len(&self) -> u64 {
        self.layout.size() as u64
    }

    /// Always `false`; zero-length buffers are rejected.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.layout.size() == 0
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

    /// Physical address of the first byte.
    #[must_use]
    pub fn base(&self) -> PhysicalAddress {
        self.table
            .entries()
            .first()
            .map_or_else(PhysicalAddress::zero, ScatterEntry::address)
    }
}

/// Heap of single physically contiguous allocations.
#[derive(Debug)]
pub struct ContiguousHeap<M: PhysMapper> {
    mapper: M,
}

impl<M: PhysMapper> ContiguousHeap<M> {
    pub const fn new(mapper: M) -> Self {
        Self { mapper }
    }

    /// Allocate `len` zeroed, physically contiguous bytes.
    ///
    /// # Errors
    /// - [`HeapError::InvalidLength`] if `len` is zero or not addressable.
    /// - [`HeapError::OutOfMemory`] if the allocation or its table failed.
    pub fn allocate(&self, len: u64, flags: BufferFlags) -> Result<ContiguousBuffer, HeapError> {
        let size = usize::try_from(len).map_err(|_| HeapError::InvalidLength)?;
        if size == 0 {
            return Err(HeapError::InvalidLength);
        }
        #[allow(clippy::cast_possible_truncation)]
        let layout = Layout::from_size_align(size, PAGE_SIZE as usize)
            .map_err(|_| HeapError::InvalidLength)?;

        // SAFETY: `layout` has a non-zero size.
        let Some(ptr) = NonNull::new(unsafe { alloc_zeroed(layout) }) else {
            warn!("contig heap: cannot allocate {len} bytes");
            return Err(HeapError::OutOfMemory);
        };

        let mut table = match ScatterList::try_with_capacity(1) {
            Ok(table) => table,
            Err(err) => {
                // SAFETY: `ptr` was just allocated with `layout`.
                unsafe { dealloc(ptr.as_ptr(), layout) };
                return Err(err);
            }
        };
        let base = self.mapper.virt_to_phys(ptr);
        table.push_entry(ScatterEntry::new(base, len, Zone::of(base)));

        debug!("contig heap: allocated {len} bytes at {base}");
        Ok(ContiguousBuffer {
            ptr,
            layout,
            flags,
            table,
        })
    }

    /// The single physical extent backing `buffer`.
    #[must_use]
    pub fn describe_physical(&self, buffer: &ContiguousBuffer) -> (PhysicalAddress, u64) {
        (buffer.base(), buffer.len())
    }

    pub fn free(&self, buffer: ContiguousBuffer) {
        debug!("contig heap: freeing {} bytes at {}", buffer.len(), buffer.base());
        let ContiguousBuffer { ptr, layout, .. } = buffer;
        // SAFETY: Buffers only come from `allocate`, which allocated `ptr`
        // with exactly this layout.
        unsafe { dealloc(ptr.as_ptr(), layout) };
    }
}

impl<M: PhysMapper> Heap for ContiguousHeap<M> {
    type Buffer = ContiguousBuffer;

    fn heap_type(&self) -> HeapType {
        HeapType::SystemContig
    }

    fn allocate(&self, len: u64, flags: BufferFlags) -> Result<ContiguousBuffer, HeapError> {
        Self::allocate(self, len, flags)
    }

    fn free(&self, buffer: ContiguousBuffer) {
        Self::free(self, buffer);
    }

    fn map_dma<'b>(&self, buffer: &'b ContiguousBuffer) -> &'b ScatterList {
        buffer.sg_table()
    }

    fn phys(&self, buffer: &ContiguousBuffer) -> Option<(PhysicalAddress, u64)> {
        Some(self.describe_physical(buffer))
    }
}
