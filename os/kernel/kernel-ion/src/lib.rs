//! # ION System Heaps
//!
//! Physical memory heaps for a buffer-sharing subsystem: devices and user
//! space exchange buffers that are described to the DMA layer by scatter
//! tables of physical extents.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                   SystemHeap                        │
//! │    • Greedy tiling with descending size classes     │
//! │    • Split or coalesced scatter tables              │
//! │    • Zero-on-free, rollback on failure              │
//! └─────────────────┬───────────────────────────────────┘
//!                   │ uncached buffers
//! ┌─────────────────▼───────────────────────────────────┐
//! │               PagePool (one per order)              │
//! │    • highmem and lowmem segments                    │
//! │    • spin-locked push/pop only                      │
//! └─────────────────┬───────────────────────────────────┘
//!                   │ empty pool / cached buffers
//! ┌─────────────────▼───────────────────────────────────┐
//! │             PageAllocator (buddy allocator)         │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! [`ContiguousHeap`] sits beside this stack and serves every buffer from a
//! single zeroed allocation of the global allocator.
//!
//! ## Core Components
//!
//! * [`SizeClassTable`]: the descending orders a buffer is built from.
//! * [`PagePool`]: recycles already-synchronized runs of one order.
//! * [`SystemHeap`]: assembles runs into [`SystemBuffer`]s and frees them.
//! * [`ScatterList`]: the externally visible extent list of a buffer.
//! * [`PageAllocator`], [`PhysMapper`], [`DeviceSync`]: the capabilities
//!   the heaps need from the surrounding kernel.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use kernel_ion::{BufferFlags, HhdmPhysMapper, SystemHeap};
//!
//! let heap = SystemHeap::with_default_orders(&buddy, HhdmPhysMapper::new(HHDM_BASE), &device);
//! let buffer = heap.allocate(1 << 20, BufferFlags::new())?;
//! for entry in buffer.sg_table() {
//!     program_descriptor(entry.address(), entry.length());
//! }
//! heap.free(buffer);
//! ```
//!
//! ## Concurrency
//!
//! All heap operations take `&self`. Pools serialize their own segments with
//! a spin lock that is held only for a single push or pop; the backing
//! allocator, zeroing and device synchronization all run without any heap
//! lock held.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

extern crate alloc;

mod addresses;
mod contig_heap;
mod diagnostics;
mod dma;
mod error;
mod flags;
mod heap;
mod mapper;
mod order;
mod page_alloc;
mod page_pool;
mod run;
mod scatterlist;
mod system_heap;

pub use addresses::{PAGE_SHIFT, PAGE_SIZE, PhysicalAddress, page_align};
pub use contig_heap::{ContiguousBuffer, ContiguousHeap};
pub use diagnostics::{HeapDiagnostics, PoolStats};
pub use dma::{DeviceSync, DmaDirection};
pub use error::HeapError;
pub use flags::{BufferFlags, GfpFlags};
pub use heap::{Heap, HeapType};
pub use mapper::{HhdmPhysMapper, PhysMapper};
pub use order::{DEFAULT_ORDERS, MAX_ORDER, Order, SizeClassError, SizeClassTable};
pub use page_alloc::PageAllocator;
pub use page_pool::{PagePool, PoolCounts};
pub use run::{Provenance, Run, Zone};
pub use scatterlist::{ScatterEntry, ScatterList};
pub use system_heap::{SystemBuffer, SystemHeap};
