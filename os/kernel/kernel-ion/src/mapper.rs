//! # Physical Memory Access
//!
//! Zeroing returned buffers and describing kernel allocations both need to
//! cross between physical addresses and pointers the CPU can use. The
//! [`PhysMapper`] trait abstracts that translation; [`HhdmPhysMapper`] is the
//! implementation for kernels that map all of physical memory at a fixed
//! offset (a higher-half direct map, HHDM).

use crate::addresses::{PAGE_SIZE, PhysicalAddress};
use core::ptr::NonNull;

/// Converts between physical addresses and usable pointers in the current
/// address space.
pub trait PhysMapper {
    /// Borrow `len` bytes of physical memory starting at `pa`.
    ///
    /// # Safety
    /// - `[pa, pa + len)` must be mapped writable for the lifetime `'a`.
    /// - The caller must own the memory exclusively for `'a`; no other
    ///   reference to it may exist.
    unsafe fn phys_to_mut<'a>(&self, pa: PhysicalAddress, len: usize) -> &'a mut [u8];

    /// Physical address backing the kernel pointer `va`.
    fn virt_to_phys(&self, va: NonNull<u8>) -> PhysicalAddress;
}

impl<T> PhysMapper for &T
where
    T: PhysMapper + ?Sized,
{
    unsafe fn phys_to_mut<'a>(&self, pa: PhysicalAddress, len: usize) -> &'a mut [u8] {
        unsafe { (**self).phys_to_mut(pa, len) }
    }

    fn virt_to_phys(&self, va: NonNull<u8>) -> PhysicalAddress {
        (**self).virt_to_phys(va)
    }
}

/// [`PhysMapper`] for a direct map: physical address `pa` is visible at
/// `base + pa`.
///
/// A `base` of zero describes an identity mapping.
///
/// # Example
/// ```rust
/// use kernel_ion::{HhdmPhysMapper, PhysMapper, PhysicalAddress};
/// let mut backing = [0xAAu8; 64];
/// let mapper = HhdmPhysMapper::identity();
/// let pa = PhysicalAddress::new(backing.as_mut_ptr() as u64);
/// unsafe { mapper.phys_to_mut(pa, 64).fill(0) };
/// assert!(backing.iter().all(|&b| b == 0));
/// ```
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct HhdmPhysMapper {
    base: u64,
}

impl HhdmPhysMapper {
    #[must_use]
    pub const fn new(base: u64) -> Self {
        Self { base }
    }

    #[must_use]
    pub const fn identity() -> Self {
        Self::new(0)
    }

    #[must_use]
    pub const fn base(&self) -> u64 {
        self.base
    }
}

impl PhysMapper for HhdmPhysMapper {
    unsafe fn phys_to_mut<'a>(&self, pa: PhysicalAddress, len: usize) -> &'a mut [u8] {
        // The direct map may sit below the physical range (test arenas), so
        // the offset is applied modulo 2^64.
        let va = self.base.wrapping_add(pa.as_u64()) as *mut u8;
        // SAFETY: Caller guarantees the range is mapped at `base + pa` and exclusively owned.
        unsafe { core::slice::from_raw_parts_mut(va, len) }
    }

    fn virt_to_phys(&self, va: NonNull<u8>) -> PhysicalAddress {
        PhysicalAddress::new((va.as_ptr() as u64).wrapping_sub(self.base))
    }
}

/// Zero `len` bytes of physical memory at `pa`, one page mapping at a time.
///
/// # Safety
/// Same contract as [`PhysMapper::phys_to_mut`] for the whole range.
pub(crate) unsafe fn zero_extent<M: PhysMapper + ?Sized>(
    mapper: &M,
    pa: PhysicalAddress,
    len: u64,
) {
    let mut offset = 0;
    while offset < len {
        let chunk = core::cmp::min(PAGE_SIZE, len - offset);
        #[allow(clippy::cast_possible_truncation)]
        let bytes = unsafe { mapper.phys_to_mut(pa + offset, chunk as usize) };
        bytes.fill(0);
        offset += chunk;
    }
}
