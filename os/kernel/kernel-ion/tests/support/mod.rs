//! Test doubles for the heap capabilities.
#![allow(dead_code)]

use kernel_ion::{
    DeviceSync, DmaDirection, GfpFlags, HhdmPhysMapper, Order, PAGE_SIZE, PageAllocator,
    PhysicalAddress, Run, ScatterList, Zone,
};
use std::alloc::{Layout, alloc_zeroed, dealloc};
use std::collections::HashSet;
use std::sync::Mutex;

/// Physical address of the first arena page. The first 4 MiB lie below the
/// 32-bit DMA limit, everything after it above.
pub const ARENA_PHYS_BASE: u64 = 0xFFC0_0000;

#[derive(Default)]
struct ArenaState {
    used: Vec<bool>,
    split: Vec<bool>,
    outstanding: usize,
    fail_after: Option<usize>,
    failing_orders: HashSet<u8>,
    allocs: Vec<(GfpFlags, Order)>,
    splits: usize,
    page_frees: usize,
    run_frees: usize,
}

/// A buddy-allocator stand-in over a heap-allocated arena.
///
/// Tracks every page, panics on double frees and mismatched split/whole
/// frees, and can be told to fail.
pub struct ArenaAllocator {
    base: usize,
    layout: Layout,
    pages: usize,
    state: Mutex<ArenaState>,
}

impl ArenaAllocator {
    pub fn new(pages: usize) -> Self {
        let layout = Layout::from_size_align(pages * PAGE_SIZE as usize, PAGE_SIZE as usize).unwrap();
        let ptr = unsafe { alloc_zeroed(layout) };
        assert!(!ptr.is_null());
        Self {
            base: ptr as usize,
            layout,
            pages,
            state: Mutex::new(ArenaState {
                used: vec![false; pages],
                split: vec![false; pages],
                ..ArenaState::default()
            }),
        }
    }

    /// 16 MiB: 4 MiB lowmem followed by 12 MiB highmem.
    pub fn standard() -> Self {
        Self::new(4096)
    }

    pub fn mapper(&self) -> HhdmPhysMapper {
        HhdmPhysMapper::new((self.base as u64).wrapping_sub(ARENA_PHYS_BASE))
    }

    fn index(&self, pa: PhysicalAddress) -> usize {
        let off = pa.as_u64().checked_sub(ARENA_PHYS_BASE).expect("address below arena");
        let idx = (off / PAGE_SIZE) as usize;
        assert!(idx < self.pages, "address {pa} beyond arena");
        idx
    }

    fn ptr(&self, pa: PhysicalAddress, len: u64) -> *mut u8 {
        let off = pa.as_u64().checked_sub(ARENA_PHYS_BASE).expect("address below arena");
        assert!(off + len <= self.layout.size() as u64, "range at {pa} beyond arena");
        (self.base + off as usize) as *mut u8
    }

    pub fn fill(&self, pa: PhysicalAddress, len: u64, byte: u8) {
        unsafe { std::ptr::write_bytes(self.ptr(pa, len), byte, len as usize) };
    }

    pub fn read(&self, pa: PhysicalAddress, len: u64) -> Vec<u8> {
        unsafe { std::slice::from_raw_parts(self.ptr(pa, len), len as usize) }.to_vec()
    }

    /// Pages currently handed out by this allocator.
    pub fn outstanding_pages(&self) -> usize {
        self.state.lock().unwrap().outstanding
    }

    /// Let the next `n` allocations succeed, then fail every one.
    pub fn fail_after(&self, n: usize) {
        self.state.lock().unwrap().fail_after = Some(n);
    }

    /// Fail every allocation of `order`.
    pub fn fail_order(&self, order: u8) {
        self.state.lock().unwrap().failing_orders.insert(order);
    }

    pub fn clear_failures(&self) {
        let mut s = self.state.lock().unwrap();
        s.fail_after = None;
        s.failing_orders.clear();
    }

    pub fn allocs(&self) -> Vec<(GfpFlags, Order)> {
        self.state.lock().unwrap().allocs.clone()
    }

    pub fn split_calls(&self) -> usize {
        self.state.lock().unwrap().splits
    }

    pub fn page_frees(&self) -> usize {
        self.state.lock().unwrap().page_frees
    }

    pub fn run_frees(&self) -> usize {
        self.state.lock().unwrap().run_frees
    }
}

impl Drop for ArenaAllocator {
    fn drop(&mut self) {
        unsafe { dealloc(self.base as *mut u8, self.layout) };
    }
}

impl PageAllocator for ArenaAllocator {
    fn alloc_pages(&self, gfp: GfpFlags, order: Order) -> Option<Run> {
        let mut s = self.state.lock().unwrap();
        s.allocs.push((gfp, order));

        if s.failing_orders.contains(&order.as_u8()) {
            return None;
        }
        if let Some(n) = s.fail_after.as_mut() {
            if *n == 0 {
                return None;
            }
            *n -= 1;
        }

        let n = order.pages() as usize;
        let start = (0..self.pages)
            .step_by(n)
            .find(|&i| i + n <= self.pages && s.used[i..i + n].iter().all(|u| !u))?;
        s.used[start..start + n].fill(true);
        s.outstanding += n;
        drop(s);

        let pa = PhysicalAddress::new(ARENA_PHYS_BASE + start as u64 * PAGE_SIZE);
        if gfp.zero() {
            self.fill(pa, order.size(), 0);
        }
        Some(Run::new(pa, order, Zone::of(pa)))
    }

    fn free_pages(&self, run: Run) {
        let start = self.index(run.base());
        let n = run.order().pages() as usize;
        let mut s = self.state.lock().unwrap();
        for i in start..start + n {
            assert!(s.used[i], "double free of page {i}");
            // An order 0 free of a split page is the same as a page free.
            assert!(n == 1 || !s.split[i], "split page {i} freed as part of a whole run");
            s.used[i] = false;
            s.split[i] = false;
        }
        s.outstanding -= n;
        s.run_frees += 1;
    }

    fn free_page(&self, page: PhysicalAddress) {
        let i = self.index(page);
        let mut s = self.state.lock().unwrap();
        assert!(s.used[i], "double free of page {i}");
        assert!(s.split[i], "page {i} freed individually without being split");
        s.used[i] = false;
        s.split[i] = false;
        s.outstanding -= 1;
        s.page_frees += 1;
    }

    fn split_page(&self, run: &Run) {
        let start = self.index(run.base());
        let n = run.order().pages() as usize;
        let mut s = self.state.lock().unwrap();
        s.split[start..start + n].fill(true);
        s.splits += 1;
    }
}

/// [`DeviceSync`] that records every call.
#[derive(Default)]
pub struct RecordingSync {
    calls: Mutex<Vec<(usize, u64, DmaDirection)>>,
}

impl RecordingSync {
    /// `(nents, total length, direction)` per call.
    pub fn calls(&self) -> Vec<(usize, u64, DmaDirection)> {
        self.calls.lock().unwrap().clone()
    }
}

impl DeviceSync for RecordingSync {
    fn sync_for_device(&self, table: &ScatterList, direction: DmaDirection) {
        self.calls
            .lock()
            .unwrap()
            .push((table.len(), table.total_len(), direction));
    }
}

/// [`DeviceSync`] that does nothing.
#[derive(Debug, Default, Copy, Clone)]
pub struct NullSync;

impl DeviceSync for NullSync {
    fn sync_for_device(&self, _table: &ScatterList, _direction: DmaDirection) {}
}
