//! # Memory Layout

/// Bytes per page and per frame.
pub const PAGE_SIZE: u32 = 4096;

/// Entries in a page directory or a page table.
pub const ENTRIES_PER_TABLE: usize = 1024;

/// Bytes covered by one page directory entry.
pub const DIRECTORY_ENTRY_SPAN: u32 = PAGE_SIZE * ENTRIES_PER_TABLE as u32;

/// 4 GiB of physical address space in 4 KiB frames.
pub const TOTAL_FRAMES: usize = 1024 * 1024;

/// Size of the frame bitmap, one bit per frame.
pub const FRAME_BITMAP_BYTES: usize = TOTAL_FRAMES / 8;

/// Where the kernel executes (VMA). Must match `kernel.ld`.
pub const KERNEL_VMA: u32 = 0xC000_0000;

/// Directory slot of [`KERNEL_VMA`].
pub const KERNEL_SLOT: usize = (KERNEL_VMA >> 22) as usize;

/// Physical load address of the bootstrap section (1 MiB).
pub const PHYS_LOAD: u32 = 0x0010_0000;

/// Everything below this is legacy: IVT/BDA, the bootstrap stack, the VGA
/// window and the BIOS ROM.
pub const LEGACY_AREA_END: u32 = PHYS_LOAD;

/// First byte of the kernel heap.
pub const HEAP_START: u32 = 0xD000_0000;

/// One past the last byte of the kernel heap.
pub const HEAP_END: u32 = 0xD100_0000;

/// First byte of the VGA window.
pub const VGA_PHYS_START: u32 = 0x000A_0000;

/// Last byte of the VGA window (inclusive).
pub const VGA_PHYS_END: u32 = 0x000B_FFFF;

/// Where the VGA window appears in the higher half.
pub const VGA_VIRT_START: u32 = 0xC10A_0000;

/// Directory slot of [`VGA_VIRT_START`].
pub const VGA_SLOT: usize = (VGA_VIRT_START >> 22) as usize;

/// Lowest address of the bootstrap stack.
pub const BOOTSTRAP_STACK_BASE: u32 = 0x0006_0000;

/// Initial `ESP` of the bootstrap stack.
pub const BOOTSTRAP_STACK_TOP: u32 = 0x0009_FFFC;

/// Size of the stack that replaces the bootstrap stack after the switch.
pub const HIGH_HALF_STACK_CAPACITY: u32 = 0x0003_FFFC;

/// Directory slot that points back at the directory itself.
pub const RECURSIVE_SLOT: usize = 1023;

/// The active page directory, seen through the recursive slot.
pub const RECURSIVE_DIRECTORY: u32 = 0xFFFF_F000;

/// Page table `i` lives at `RECURSIVE_TABLES + i * PAGE_SIZE`.
pub const RECURSIVE_TABLES: u32 = 0xFFC0_0000;

/// Directory slot whose table holds the scratch mapping.
pub const FIXMAP_SLOT: usize = 1022;

/// Reserved page for temporary mappings of arbitrary frames.
pub const SCRATCH_PAGE: u32 = 0xFFBF_F000;

const _: () = {
    assert!(PAGE_SIZE.is_power_of_two());
    assert!(KERNEL_VMA.is_multiple_of(DIRECTORY_ENTRY_SPAN));
    assert!(KERNEL_SLOT == 768);
    assert!(HEAP_START.is_multiple_of(PAGE_SIZE));
    assert!(HEAP_END.is_multiple_of(PAGE_SIZE));
    assert!(HEAP_START < HEAP_END);
    assert!(HEAP_START > VGA_VIRT_START);
    assert!(VGA_PHYS_START.is_multiple_of(PAGE_SIZE));
    assert!(VGA_VIRT_START.is_multiple_of(PAGE_SIZE));
    assert!(VGA_SLOT != KERNEL_SLOT);
    assert!(VGA_PHYS_END < LEGACY_AREA_END);
    assert!(BOOTSTRAP_STACK_TOP < VGA_PHYS_START);
    assert!(BOOTSTRAP_STACK_TOP - BOOTSTRAP_STACK_BASE == HIGH_HALF_STACK_CAPACITY);
    assert!(RECURSIVE_DIRECTORY == RECURSIVE_TABLES + (RECURSIVE_SLOT as u32) * PAGE_SIZE);
    assert!((SCRATCH_PAGE >> 22) as usize == FIXMAP_SLOT);
    assert!(SCRATCH_PAGE + PAGE_SIZE == RECURSIVE_TABLES);
    assert!(FRAME_BITMAP_BYTES * 8 == TOTAL_FRAMES);
};
