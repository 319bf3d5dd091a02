use kernel_alloc::{BitmapFrameAlloc, MemoryError, MemoryManager};
use kernel_info::MemoryLayout;
use kernel_info::memory::{HEAP_START, PAGE_SIZE, SCRATCH_PAGE};
use kernel_memory_addresses::{PhysicalAddress, VirtualAddress};
use kernel_sync::SpinLock;
use kernel_vmem::sim::SimMachine;
use kernel_vmem::{Mmu, PageEntryBits, PageTableManager, PdEntry};

type SimManager<'a> = MemoryManager<'a, &'a SimMachine, &'a SimMachine>;

/// Run `f` on a manager over a simulated machine with `frames` frames.
/// Frames 0..3 (unused, directory, fixmap) are reserved up front.
fn with_manager(frames: usize, f: impl FnOnce(&SimMachine, &mut SimManager<'_>)) {
    let (sim, _) = SimMachine::with_recursive_directory(frames);
    let mut bitmap = vec![0u8; frames / 8];
    let mut bits = BitmapFrameAlloc::new(&mut bitmap);
    bits.reserve_range(PhysicalAddress::new(0), PhysicalAddress::new(3 * PAGE_SIZE));
    let pages = PageTableManager::new(&sim, &sim, VirtualAddress::new(SCRATCH_PAGE));
    let mut mm = MemoryManager::new(bits, pages);
    f(&sim, &mut mm);
}

fn small_heap(pages: u32) -> MemoryLayout {
    MemoryLayout::DEFAULT.with_heap_end(VirtualAddress::new(HEAP_START + pages * PAGE_SIZE))
}

#[test]
fn map_page_takes_table_frames_from_the_bitmap() {
    with_manager(64, |sim, mm| {
        let va = VirtualAddress::new(0xC000_0000);
        mm.map_page(va, PhysicalAddress::new(0x0001_0000), PageEntryBits::kernel_rw())
            .unwrap();
        assert_eq!(mm.frame_stats().allocated, 4);
        assert_eq!(mm.translate(va), Some(PhysicalAddress::new(0x0001_0000)));
        assert_eq!(sim.translate(va), Some(PhysicalAddress::new(0x0001_0000)));

        assert!(mm.unmap_page(va));
        assert_eq!(mm.translate(va), None);
    });
}

#[test]
fn heap_init_maps_every_page() {
    with_manager(64, |sim, mm| {
        let layout = small_heap(4);
        mm.heap_init(&layout).unwrap();

        let mut frames = Vec::new();
        for i in 0..4 {
            let pa = sim.translate(layout.heap_start() + i * PAGE_SIZE).unwrap();
            assert!(mm.frames().is_allocated(pa));
            frames.push(pa);
        }
        frames.dedup();
        assert_eq!(frames.len(), 4);
        // Four heap pages plus one page table.
        assert_eq!(mm.frame_stats().allocated, 3 + 5);

        let stats = mm.heap_stats().unwrap();
        assert_eq!(stats.free_blocks, 1);
        assert_eq!(stats.free_bytes, 4 * PAGE_SIZE - kernel_alloc::heap::HEADER_SIZE);
    });
}

#[test]
fn heap_serves_allocations_after_init() {
    with_manager(64, |_, mm| {
        assert!(mm.allocate(16).is_none());
        assert_eq!(mm.heap_stats(), Err(MemoryError::HeapNotInitialized));

        mm.heap_init(&small_heap(2)).unwrap();
        let before = mm.heap_stats().unwrap();

        let a = mm.allocate(24).unwrap();
        let b = mm.allocate(40).unwrap();
        unsafe {
            a.as_ptr().write_bytes(0x11, 24);
            b.as_ptr().write_bytes(0x22, 40);
            assert_eq!(*a.as_ptr().add(23), 0x11);
        }
        assert!(mm.allocate(0).is_none());

        unsafe {
            mm.free(b.as_ptr());
            mm.free(a.as_ptr());
        }
        assert_eq!(mm.heap_stats().unwrap(), before);
        mm.dump_heap();
    });
}

#[test]
fn heap_init_runs_once() {
    with_manager(64, |_, mm| {
        mm.heap_init(&small_heap(1)).unwrap();
        assert_eq!(mm.heap_init(&small_heap(1)), Err(MemoryError::HeapAlreadyInitialized));
    });
}

#[test]
fn heap_init_reports_exhaustion() {
    with_manager(8, |_, mm| {
        // Five free frames cannot back eight pages and a table.
        assert_eq!(mm.heap_init(&small_heap(8)), Err(MemoryError::OutOfFrames));
        assert!(mm.heap().is_none());
    });
}

#[test]
fn new_directories_come_from_the_bitmap() {
    with_manager(64, |sim, mm| {
        let active = sim.active_directory();
        let dir = mm.create_page_directory().unwrap();
        assert!(mm.frames().is_allocated(dir.phys.base()));
        assert_eq!(sim.active_directory(), active);
        let slot = PdEntry::from_bits(sim.read_phys_u32(dir.phys.base() + 1023 * 4));
        assert_eq!(slot.next_table(), Some(dir.phys));
    });
}

#[test]
fn contiguous_frames_and_frees_go_through() {
    with_manager(64, |_, mm| {
        let run = mm.allocate_contiguous(8).unwrap();
        assert_eq!(run.frame_index(), 3);
        mm.free_frame(run);
        assert_eq!(mm.frame_stats().allocated, 3 + 7);
        assert_eq!(mm.allocate_frame(), Some(run));
    });
}

#[test]
fn locked_manager_serves_the_heap() {
    let (sim, _) = SimMachine::with_recursive_directory(32);
    let mut bitmap = vec![0u8; 4];
    let mut bits = BitmapFrameAlloc::new(&mut bitmap);
    bits.reserve_range(PhysicalAddress::new(0), PhysicalAddress::new(3 * PAGE_SIZE));
    let pages = PageTableManager::new(&sim, &sim, VirtualAddress::new(SCRATCH_PAGE));
    let mm = SpinLock::new(MemoryManager::new(bits, pages));

    assert!(mm.lock_irq().allocate(8).is_none());
    mm.lock_irq().heap_init(&small_heap(1)).unwrap();

    let p = {
        let mut guard = mm.lock_irq();
        guard.allocate(8)
    };
    assert!(p.is_some());
    assert!(!mm.is_locked());
}
