use kernel_ion::{
    BufferFlags, ContiguousHeap, Heap, HeapError, HeapType, HhdmPhysMapper, PAGE_SIZE,
    PhysicalAddress, Zone,
};

const HHDM: u64 = 0x1000_0000;

#[test]
fn physical_address_follows_the_direct_map() {
    let heap = ContiguousHeap::new(HhdmPhysMapper::new(HHDM));
    let buffer = heap.allocate(2 * PAGE_SIZE, BufferFlags::new()).unwrap();

    let va = buffer.as_ptr().as_ptr() as u64;
    let expected = PhysicalAddress::new(va.wrapping_sub(HHDM));
    assert_eq!(buffer.base(), expected);

    let entry = buffer.sg_table().entries()[0];
    assert_eq!(entry.address(), expected);
    assert_eq!(entry.length(), 2 * PAGE_SIZE);
    assert_eq!(entry.zone(), Zone::of(expected));

    heap.free(buffer);
}

#[test]
fn heap_interface_reports_one_extent() {
    fn describe<H: Heap>(heap: &H, len: u64) -> (usize, Option<u64>) {
        let buffer = heap.allocate(len, BufferFlags::new().with_cached(true)).unwrap();
        let nents = heap.map_dma(&buffer).len();
        let phys_len = heap.phys(&buffer).map(|(_, len)| len);
        heap.free(buffer);
        (nents, phys_len)
    }

    let heap = ContiguousHeap::new(HhdmPhysMapper::identity());
    assert_eq!(heap.heap_type(), HeapType::SystemContig);
    assert_eq!(describe(&heap, 12_345), (1, Some(12_345)));
}

#[test]
fn repeated_allocations_are_zeroed() {
    let heap = ContiguousHeap::new(HhdmPhysMapper::identity());
    for _ in 0..4 {
        let buffer = heap.allocate(PAGE_SIZE, BufferFlags::new()).unwrap();
        let bytes = unsafe { std::slice::from_raw_parts_mut(buffer.as_ptr().as_ptr(), PAGE_SIZE as usize) };
        assert!(bytes.iter().all(|&b| b == 0));
        bytes.fill(0xEE);
        heap.free(buffer);
    }
}

#[test]
fn zero_length_is_invalid() {
    let heap = ContiguousHeap::new(HhdmPhysMapper::identity());
    assert_eq!(
        heap.allocate(0, BufferFlags::new()).unwrap_err(),
        HeapError::InvalidLength
    );
}
