use kernel_alloc::{BitmapFrameAlloc, MemoryManager};
use kernel_boot::bootstrap::dump_mappings;
use kernel_boot::{BootPhase, BootState, BootstrapTables, build_permanent_directory};
use kernel_info::memory::{
    HEAP_START, KERNEL_VMA, PAGE_SIZE, PHYS_LOAD, SCRATCH_PAGE, VGA_PHYS_START, VGA_VIRT_START,
};
use kernel_info::{KernelImage, MemoryLayout};
use kernel_memory_addresses::{PhysicalAddress, VirtualAddress};
use kernel_vmem::sim::SimMachine;
use kernel_vmem::{Mmu, PageTableManager};

const FRAMES: usize = 512;

fn image() -> KernelImage {
    KernelImage::new(PhysicalAddress::new(0x0010_5000), PhysicalAddress::new(0x0012_0000))
}

fn phys(va: u32, sim: &SimMachine) -> Option<u32> {
    sim.translate(VirtualAddress::new(va)).map(PhysicalAddress::as_u32)
}

/// A machine running on freshly built bootstrap tables at `PHYS_LOAD`.
fn bootstrapped() -> SimMachine {
    let sim = SimMachine::new(FRAMES);
    let tables_phys = PhysicalAddress::new(PHYS_LOAD);
    let tables = unsafe { sim.phys_mut::<BootstrapTables>(tables_phys) };
    tables.build(tables_phys, &image(), &MemoryLayout::DEFAULT);
    unsafe { sim.load_directory(BootstrapTables::directory_page(tables_phys)) };
    sim
}

#[test]
fn bootstrap_directory_maps_low_memory_kernel_and_vga() {
    let sim = bootstrapped();
    assert!(sim.paging_enabled());
    assert_eq!(phys(0x0000_1000, &sim), Some(0x0000_1000));
    assert_eq!(phys(0x0003_FFFF, &sim), Some(0x0003_FFFF));
    assert_eq!(phys(KERNEL_VMA, &sim), Some(0x0010_5000));
    assert_eq!(phys(KERNEL_VMA + 0x1234, &sim), Some(0x0010_6234));
    assert_eq!(phys(VGA_VIRT_START, &sim), Some(VGA_PHYS_START));
    assert_eq!(phys(VGA_VIRT_START + 31 * PAGE_SIZE, &sim), Some(0x000B_F000));
    assert_eq!(phys(VGA_VIRT_START + 32 * PAGE_SIZE, &sim), None);
    assert_eq!(phys(0xFFFF_F000, &sim), Some(PHYS_LOAD));
    assert_eq!(phys(SCRATCH_PAGE, &sim), None);
    assert_eq!(phys(HEAP_START, &sim), None);

    dump_mappings(&sim, BootstrapTables::directory_page(PhysicalAddress::new(PHYS_LOAD)));
}

#[test]
fn permanent_directory_drops_the_identity_slot() {
    let sim = bootstrapped();
    let mut bitmap = [0_u8; FRAMES / 8];
    let pages = PageTableManager::new(&sim, &sim, VirtualAddress::new(SCRATCH_PAGE));
    let mut mm = MemoryManager::new(BitmapFrameAlloc::new(&mut bitmap), pages);
    sim.clear_tlb_log();

    let directory = unsafe { build_permanent_directory(&mut mm, &image()) }.unwrap();

    assert_eq!(
        directory.base().as_u32(),
        0x0016_0000,
        "first frame after the reserved kernel footprint"
    );
    assert_eq!(sim.active_directory(), directory);
    assert!(sim.flush_count() >= 1);

    assert_eq!(phys(0x0000_1000, &sim), None);
    assert_eq!(phys(KERNEL_VMA, &sim), Some(0x0010_5000));
    assert_eq!(phys(VGA_VIRT_START, &sim), Some(VGA_PHYS_START));
    assert_eq!(phys(0xFFFF_F000, &sim), Some(0x0016_0000));
    assert_eq!(phys(SCRATCH_PAGE, &sim), None, "window is unmapped again");

    let frames = mm.frames();
    for pa in [0x0, 0x0009_F000, PHYS_LOAD, 0x0010_4000, 0x0015_F000, 0x0016_0000] {
        assert!(frames.is_allocated(PhysicalAddress::new(pa)), "{pa:#x}");
    }
    assert!(!frames.is_allocated(PhysicalAddress::new(0x0016_1000)));

    // The bootstrap directory itself is left as it was.
    let bootstrap_slot0 = sim.read_phys_u32(PhysicalAddress::new(PHYS_LOAD));
    assert_ne!(bootstrap_slot0 & 1, 0);
}

#[test]
fn heap_comes_up_in_the_permanent_space() {
    let sim = bootstrapped();
    let mut bitmap = [0_u8; FRAMES / 8];
    let pages = PageTableManager::new(&sim, &sim, VirtualAddress::new(SCRATCH_PAGE));
    let mut mm = MemoryManager::new(BitmapFrameAlloc::new(&mut bitmap), pages);
    let mut state = BootState::new();

    state.advance(BootPhase::BootstrapPaging).unwrap();
    unsafe { build_permanent_directory(&mut mm, &image()) }.unwrap();
    state.advance(BootPhase::HighHalf).unwrap();
    state.advance(BootPhase::Reporting).unwrap();
    assert!(state.can_report());

    let layout =
        MemoryLayout::DEFAULT.with_heap_end(VirtualAddress::new(HEAP_START + 4 * PAGE_SIZE));
    mm.heap_init(&layout).unwrap();
    state.advance(BootPhase::Heap).unwrap();

    assert!(phys(HEAP_START, &sim).is_some());
    let a = mm.allocate(100).unwrap();
    let b = mm.allocate(100).unwrap();
    assert_ne!(a, b);
    assert!(state.advance(BootPhase::HighHalf).is_err());
}
