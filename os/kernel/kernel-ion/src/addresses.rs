//! # Physical Addresses and Page Geometry

use core::fmt;
use core::ops::{Add, AddAssign};

/// log2 of the base page size.
pub const PAGE_SHIFT: u32 = 12;

/// Base page size in bytes (4 KiB).
pub const PAGE_SIZE: u64 = 1 << PAGE_SHIFT;

const _: () = {
    assert!(PAGE_SIZE.is_power_of_two());
    assert!(PAGE_SIZE == 4096);
};

/// Round `len` up to the next multiple of [`PAGE_SIZE`].
///
/// Returns `None` if the rounded value does not fit into a `u64`.
#[inline]
#[must_use]
pub const fn page_align(len: u64) -> Option<u64> {
    match len.checked_add(PAGE_SIZE - 1) {
        Some(v) => Some(v & !(PAGE_SIZE - 1)),
        None => None,
    }
}

/// Physical memory address.
///
/// Distinguishes bus/physical addresses handed to devices from kernel
/// virtual pointers. Every run and scatter entry is described in terms of
/// this type; turning it into something dereferenceable goes through a
/// [`PhysMapper`](crate::PhysMapper).
///
/// ### Examples
/// ```rust
/// # use kernel_ion::{PhysicalAddress, PAGE_SIZE};
/// let pa = PhysicalAddress::new(0x0000_0001_0000_2042);
/// assert_eq!(pa.page_base().as_u64(), 0x0000_0001_0000_2000);
/// assert!(!pa.is_aligned(PAGE_SIZE));
/// ```
#[repr(transparent)]
#[derive(Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct PhysicalAddress(u64);

impl PhysicalAddress {
    #[inline]
    #[must_use]
    pub const fn zero() -> Self {
        Self::new(0)
    }

    #[inline]
    #[must_use]
    pub const fn new(v: u64) -> Self {
        Self(v)
    }

    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Base address of the 4 KiB page containing this address.
    #[inline]
    #[must_use]
    pub const fn page_base(self) -> Self {
        Self(self.0 & !(PAGE_SIZE - 1))
    }

    /// Whether the address is a multiple of `align` (a power of two).
    #[inline]
    #[must_use]
    pub const fn is_aligned(self, align: u64) -> bool {
        debug_assert!(align.is_power_of_two());
        self.0 & (align - 1) == 0
    }

    /// Whether the address can be reached with 32-bit DMA addressing.
    #[inline]
    #[must_use]
    pub const fn is_below_4g(self) -> bool {
        self.0 < (1 << 32)
    }
}

impl fmt::Debug for PhysicalAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PA(0x{:016X})", self.as_u64())
    }
}

impl fmt::Display for PhysicalAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:016X}", self.as_u64())
    }
}

impl From<u64> for PhysicalAddress {
    #[inline]
    fn from(v: u64) -> Self {
        Self::new(v)
    }
}

impl Add<u64> for PhysicalAddress {
    type Output = Self;
    #[inline]
    fn add(self, rhs: u64) -> Self::Output {
        Self(self.0 + rhs)
    }
}

impl AddAssign<u64> for PhysicalAddress {
    #[inline]
    fn add_assign(&mut self, rhs: u64) {
        self.0 += rhs;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_align_rounds_up() {
        assert_eq!(page_align(0), Some(0));
        assert_eq!(page_align(1), Some(PAGE_SIZE));
        assert_eq!(page_align(PAGE_SIZE), Some(PAGE_SIZE));
        assert_eq!(page_align(PAGE_SIZE + 1), Some(2 * PAGE_SIZE));
        assert_eq!(page_align(u64::MAX), None);
    }

    #[test]
    fn page_base_and_alignment() {
        let pa = PhysicalAddress::new(0x1234_5678);
        assert_eq!(pa.page_base().as_u64(), 0x1234_5000);
        assert!(pa.page_base().is_aligned(PAGE_SIZE));
        assert!(!pa.is_aligned(PAGE_SIZE));
        assert!(PhysicalAddress::new(0x40_0000).is_aligned(PAGE_SIZE << 10));
    }

    #[test]
    fn dma32_boundary() {
        assert!(PhysicalAddress::new(0xFFFF_F000).is_below_4g());
        assert!(!PhysicalAddress::new(0x1_0000_0000).is_below_4g());
    }

    #[test]
    fn formatting() {
        let pa = PhysicalAddress::new(0x42);
        assert_eq!(format!("{pa}"), "0x0000000000000042");
        assert_eq!(format!("{pa:?}"), "PA(0x0000000000000042)");
    }
}
