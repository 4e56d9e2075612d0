//! # Size Classes
//!
//! A run of order `n` spans `PAGE_SIZE << n` bytes and is aligned to its own
//! size. The [`SizeClassTable`] is the fixed, strictly descending menu of
//! orders a heap is willing to hand out; every buffer is tiled from it
//! largest-first.

use crate::addresses::{PAGE_SHIFT, PAGE_SIZE};
use alloc::boxed::Box;
use core::fmt;

/// Largest order any size class may declare (1024 pages, 4 MiB).
pub const MAX_ORDER: u8 = 10;

/// The default order menu: 1 MiB, 64 KiB and 4 KiB runs.
pub const DEFAULT_ORDERS: [u8; 3] = [8, 4, 0];

const _: () = {
    assert!(DEFAULT_ORDERS[0] <= MAX_ORDER);
    assert!(DEFAULT_ORDERS[DEFAULT_ORDERS.len() - 1] == 0);
    assert!((MAX_ORDER as u32) + PAGE_SHIFT < u64::BITS);
};

/// Power-of-two page count exponent of a run.
#[repr(transparent)]
#[derive(Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Order(u8);

impl Order {
    /// A single page.
    pub const ZERO: Self = Self(0);

    #[inline]
    #[must_use]
    pub const fn new(order: u8) -> Self {
        Self(order)
    }

    #[inline]
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self.0
    }

    /// Number of base pages in a run of this order.
    #[inline]
    #[must_use]
    pub const fn pages(self) -> u64 {
        1 << self.0
    }

    /// Size in bytes of a run of this order.
    #[inline]
    #[must_use]
    pub const fn size(self) -> u64 {
        PAGE_SIZE << self.0
    }

    /// Smallest order whose run covers `len` bytes.
    ///
    /// Scatter entries always carry exact run or page lengths, so on the
    /// free path this recovers the order a run was allocated with.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn from_len(len: u64) -> Self {
        if len <= PAGE_SIZE {
            return Self::ZERO;
        }
        let pages = (len - 1) >> PAGE_SHIFT;
        Self((u64::BITS - pages.leading_zeros()) as u8)
    }
}

impl fmt::Debug for Order {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Order({})", self.0)
    }
}

impl fmt::Display for Order {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl From<u8> for Order {
    #[inline]
    fn from(v: u8) -> Self {
        Self::new(v)
    }
}

/// Error returned by [`SizeClassTable::new`] for an unusable order menu.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SizeClassError {
    #[error("no size classes declared")]
    Empty,
    #[error("size classes must be strictly descending, found order {next} after {prev}")]
    NotDescending { prev: Order, next: Order },
    #[error("order {0} exceeds MAX_ORDER")]
    TooLarge(Order),
    #[error("smallest size class must be order 0, found order {0}")]
    MissingBaseOrder(Order),
}

/// The descending list of run orders a heap allocates from.
///
/// Pure lookup, no mutable state. The table is validated once on
/// construction; afterwards asking for an order that is not part of it is a
/// contract violation and panics.
#[derive(Clone, PartialEq, Eq)]
pub struct SizeClassTable {
    orders: Box<[Order]>,
}

impl SizeClassTable {
    /// Build a table from `orders`, largest first.
    ///
    /// # Errors
    /// The list is empty, not strictly descending, exceeds [`MAX_ORDER`] or
    /// does not end in order 0 (without single pages, page-rounded lengths
    /// could not always be tiled exactly).
    pub fn new(orders: &[u8]) -> Result<Self, SizeClassError> {
        let (&first, rest) = orders.split_first().ok_or(SizeClassError::Empty)?;
        if first > MAX_ORDER {
            return Err(SizeClassError::TooLarge(Order(first)));
        }

        let mut prev = first;
        for &next in rest {
            if next >= prev {
                return Err(SizeClassError::NotDescending {
                    prev: Order(prev),
                    next: Order(next),
                });
            }
            prev = next;
        }

        if prev != 0 {
            return Err(SizeClassError::MissingBaseOrder(Order(prev)));
        }

        Ok(Self {
            orders: orders.iter().copied().map(Order).collect(),
        })
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.orders.len()
    }

    /// Always `false`; a validated table holds at least order 0.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    /// The largest declared order.
    #[inline]
    #[must_use]
    pub fn largest(&self) -> Order {
        self.orders[0]
    }

    /// Orders in descending order.
    #[inline]
    #[must_use]
    pub fn iter(&self) -> impl ExactSizeIterator<Item = Order> + '_ {
        self.orders.iter().copied()
    }

    #[inline]
    #[must_use]
    pub fn contains(&self, order: Order) -> bool {
        self.orders.contains(&order)
    }

    /// Position of `order` in the table.
    ///
    /// # Panics
    /// If `order` is not one of the declared orders.
    #[must_use]
    pub fn order_to_index(&self, order: Order) -> usize {
        match self.orders.iter().position(|&o| o == order) {
            Some(i) => i,
            None => panic!("order {order} is not a declared size class"),
        }
    }

    /// Size in bytes of a run of `order`.
    #[inline]
    #[must_use]
    pub const fn order_to_size(order: Order) -> u64 {
        order.size()
    }
}

impl Default for SizeClassTable {
    fn default() -> Self {
        Self {
            orders: DEFAULT_ORDERS.iter().copied().map(Order).collect(),
        }
    }
}

impl fmt::Debug for SizeClassTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.orders.iter()).finish()
    }
}
