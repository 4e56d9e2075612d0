//! # Pool Diagnostics
//!
//! Point-in-time view of how much memory the system heap holds idle.
//! Rendering with [`Display`](core::fmt::Display) yields two lines per pool:
//!
//! ```text
//! 3 order 8 highmem pages in pool = 3145728 total
//! 0 order 8 lowmem pages in pool = 0 total
//! ```

use crate::order::Order;
use crate::page_pool::PoolCounts;
use crate::run::Zone;
use alloc::vec::Vec;
use core::fmt;

/// Idle runs held by one pool.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct PoolStats {
    order: Order,
    counts: PoolCounts,
}

impl PoolStats {
    #[must_use]
    pub const fn new(order: Order, counts: PoolCounts) -> Self {
        Self { order, counts }
    }

    #[inline]
    #[must_use]
    pub const fn order(&self) -> Order {
        self.order
    }

    #[inline]
    #[must_use]
    pub const fn counts(&self) -> PoolCounts {
        self.counts
    }

    /// Idle runs in the segment of `zone`.
    #[must_use]
    pub const fn runs(&self, zone: Zone) -> usize {
        match zone {
            Zone::High => self.counts.high,
            Zone::Low => self.counts.low,
        }
    }

    /// Idle bytes in the segment of `zone`.
    #[must_use]
    pub const fn bytes(&self, zone: Zone) -> u64 {
        self.runs(zone) as u64 * self.order.size()
    }

    #[must_use]
    pub const fn resident_bytes(&self) -> u64 {
        self.bytes(Zone::High) + self.bytes(Zone::Low)
    }
}

/// Per-pool statistics in size-class order.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct HeapDiagnostics {
    pools: Vec<PoolStats>,
}

impl HeapDiagnostics {
    #[inline]
    #[must_use]
    pub fn pools(&self) -> &[PoolStats] {
        &self.pools
    }

    #[must_use]
    pub fn pool(&self, order: Order) -> Option<&PoolStats> {
        self.pools.iter().find(|p| p.order == order)
    }

    /// Idle bytes across all pools.
    #[must_use]
    pub fn resident_bytes(&self) -> u64 {
        self.pools.iter().map(PoolStats::resident_bytes).sum()
    }
}

impl FromIterator<PoolStats> for HeapDiagnostics {
    fn from_iter<I: IntoIterator<Item = PoolStats>>(iter: I) -> Self {
        Self {
            pools: iter.into_iter().collect(),
        }
    }
}

impl fmt::Display for HeapDiagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for pool in &self.pools {
            for zone in [Zone::High, Zone::Low] {
                writeln!(
                    f,
                    "{} order {} {zone} pages in pool = {} total",
                    pool.runs(zone),
                    pool.order,
                    pool.bytes(zone)
                )?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_two_lines_per_pool() {
        let diag: HeapDiagnostics = [
            PoolStats::new(Order::new(8), PoolCounts { high: 3, low: 0 }),
            PoolStats::new(Order::new(0), PoolCounts { high: 0, low: 2 }),
        ]
        .into_iter()
        .collect();

        let text = format!("{diag}");
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines,
            [
                "3 order 8 highmem pages in pool = 3145728 total",
                "0 order 8 lowmem pages in pool = 0 total",
                "0 order 0 highmem pages in pool = 0 total",
                "2 order 0 lowmem pages in pool = 8192 total",
            ]
        );
        assert_eq!(diag.resident_bytes(), 3 * 1_048_576 + 8192);
        assert_eq!(diag.pool(Order::new(0)).map(|p| p.runs(Zone::Low)), Some(2));
        assert!(diag.pool(Order::new(4)).is_none());
    }
}
