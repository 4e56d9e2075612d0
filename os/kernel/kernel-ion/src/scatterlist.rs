//! # Scatter Tables
//!
//! The externally visible description of a buffer: an ordered list of
//! physical extents. A table is built in two steps so that a failure to
//! allocate the table itself can still be rolled back cleanly:
//! [`ScatterList::try_with_capacity`] reserves every entry up front, after
//! which [`ScatterList::push_run`] cannot fail.

use crate::addresses::{PAGE_SIZE, PhysicalAddress};
use crate::error::HeapError;
use crate::run::{Run, Zone};
use alloc::vec::Vec;

#[cfg(test)]
std::thread_local! {
    /// Makes the next table allocation on this thread fail.
    pub(crate) static FAIL_NEXT_TABLE: core::cell::Cell<bool> = const { core::cell::Cell::new(false) };
}

#[cfg(test)]
fn table_alloc_fails() -> bool {
    FAIL_NEXT_TABLE.with(core::cell::Cell::take)
}

#[cfg(not(test))]
const fn table_alloc_fails() -> bool {
    false
}

/// One physically contiguous extent of a buffer.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct ScatterEntry {
    address: PhysicalAddress,
    length: u64,
    zone: Zone,
}

impl ScatterEntry {
    #[must_use]
    pub const fn new(address: PhysicalAddress, length: u64, zone: Zone) -> Self {
        Self {
            address,
            length,
            zone,
        }
    }

    #[inline]
    #[must_use]
    pub const fn address(&self) -> PhysicalAddress {
        self.address
    }

    #[inline]
    #[must_use]
    pub const fn length(&self) -> u64 {
        self.length
    }

    #[inline]
    #[must_use]
    pub const fn zone(&self) -> Zone {
        self.zone
    }
}

/// Ordered list of extents covering one buffer.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct ScatterList {
    entries: Vec<ScatterEntry>,
}

impl ScatterList {
    /// Allocate a table with room for exactly `nents` entries.
    ///
    /// # Errors
    /// [`HeapError::OutOfMemory`] if the table cannot be allocated.
    pub fn try_with_capacity(nents: usize) -> Result<Self, HeapError> {
        if table_alloc_fails() {
            return Err(HeapError::OutOfMemory);
        }
        let mut entries = Vec::new();
        entries
            .try_reserve_exact(nents)
            .map_err(|_| HeapError::OutOfMemory)?;
        Ok(Self { entries })
    }

    /// Append the extents of `run`: one entry per page if `split`, otherwise
    /// one entry spanning the whole run.
    ///
    /// # Panics
    /// If the reserved capacity is exceeded.
    pub fn push_run(&mut self, run: &Run, split: bool) {
        let needed = if split {
            usize::try_from(run.order().pages()).unwrap_or(usize::MAX)
        } else {
            1
        };
        assert!(
            self.entries.capacity() - self.entries.len() >= needed,
            "scatter table was not sized for {needed} more entries"
        );

        if split {
            self.entries.extend(
                run.pages()
                    .map(|page| ScatterEntry::new(page, PAGE_SIZE, run.zone())),
            );
        } else {
            self.entries
                .push(ScatterEntry::new(run.base(), run.size(), run.zone()));
        }
    }

    /// Append a single extent.
    ///
    /// # Panics
    /// If the reserved capacity is exhausted.
    pub fn push_entry(&mut self, entry: ScatterEntry) {
        assert!(
            self.entries.len() < self.entries.capacity(),
            "scatter table is full"
        );
        self.entries.push(entry);
    }

    #[inline]
    #[must_use]
    pub fn entries(&self) -> &[ScatterEntry] {
        &self.entries
    }

    #[inline]
    pub fn iter(&self) -> core::slice::Iter<'_, ScatterEntry> {
        self.entries.iter()
    }

    /// Number of entries (`nents`).
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sum of all entry lengths.
    #[must_use]
    pub fn total_len(&self) -> u64 {
        self.entries.iter().map(ScatterEntry::length).sum()
    }
}

impl IntoIterator for ScatterList {
    type Item = ScatterEntry;
    type IntoIter = alloc::vec::IntoIter<ScatterEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<'a> IntoIterator for &'a ScatterList {
    type Item = &'a ScatterEntry;
    type IntoIter = core::slice::Iter<'a, ScatterEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// Number of table entries needed for `runs`.
pub(crate) fn count_entries(runs: &[Run], split: bool) -> usize {
    if split {
        runs.iter()
            .map(|r| usize::try_from(r.order().pages()).unwrap_or(usize::MAX))
            .fold(0, usize::saturating_add)
    } else {
        runs.len()
    }
}
