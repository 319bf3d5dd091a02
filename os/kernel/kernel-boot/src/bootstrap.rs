//! # Bootstrap Paging
//!
//! The first page directory, built while the CPU still runs on physical
//! addresses. It makes the kernel reachable at [`KERNEL_VMA`] without losing
//! the identity view of the low 4 MiB that the bootstrap code executes from.
//!
//! ```text
//! slot    0 ──► identity   0x0000_0000..0x0040_0000 → same
//! slot  768 ──► kernel     0xC000_0000..            → phys_base..
//! slot  772 ──► vga        0xC10A_0000..0xC10C_0000 → 0xA0000..0xC0000
//! slot 1022 ──► fixmap     (empty, scratch page lives here)
//! slot 1023 ──► directory  (recursive)
//! ```
//!
//! Nothing here is checked at runtime. A wrong entry shows up as a triple
//! fault the moment CR0.PG is set, so every table is filled completely
//! before the directory references it.
//!
//! [`KERNEL_VMA`]: kernel_info::memory::KERNEL_VMA

use core::mem::offset_of;
use kernel_info::memory::{FIXMAP_SLOT, KERNEL_SLOT, PAGE_SIZE, RECURSIVE_SLOT};
use kernel_info::{KernelImage, MemoryLayout};
use kernel_memory_addresses::{PhysicalAddress, PhysicalPage, Size4K};
use kernel_vmem::page_table::ENTRIES;
use kernel_vmem::{
    PageDirectory, PageEntryBits, PageTable, PdEntry, PhysicalTables, PtEntry, VirtualMemory,
};

/// Every structure the bootstrap directory needs, in one page-aligned block.
///
/// The kernel binary keeps one instance in its `.bootstrap.data` section so
/// that it is addressable before paging is on and stays mapped afterwards
/// through the identity table.
#[repr(C, align(4096))]
pub struct BootstrapTables {
    pub directory: PageDirectory,
    pub identity: PageTable,
    pub kernel: PageTable,
    pub vga: PageTable,
    pub fixmap: PageTable,
}

/// Word offset of each structure inside the block.
const DIRECTORY: usize = 0;
const IDENTITY: usize = ENTRIES;
const KERNEL: usize = 2 * ENTRIES;
const VGA: usize = 3 * ENTRIES;
const FIXMAP: usize = 4 * ENTRIES;
const WORDS: usize = 5 * ENTRIES;

const LEAF_RO: u32 = PageEntryBits::kernel_ro().into_bits();
const LEAF_MMIO: u32 = PageEntryBits::mmio().into_bits();
const TABLE_RO: u32 = PageEntryBits::kernel_ro().into_bits();
const TABLE_RW: u32 = PageEntryBits::kernel_rw().into_bits();

const _: () = {
    assert!(size_of::<BootstrapTables>() == 5 * PAGE_SIZE as usize);
    assert!(size_of::<BootstrapTables>() == WORDS * size_of::<u32>());
    assert!(size_of::<PdEntry>() == size_of::<u32>());
    assert!(size_of::<PtEntry>() == size_of::<u32>());
    assert!(offset_of!(BootstrapTables, identity) == IDENTITY * size_of::<u32>());
    assert!(offset_of!(BootstrapTables, kernel) == KERNEL * size_of::<u32>());
    assert!(offset_of!(BootstrapTables, vga) == VGA * size_of::<u32>());
    assert!(offset_of!(BootstrapTables, fixmap) == FIXMAP * size_of::<u32>());
};

impl Default for BootstrapTables {
    fn default() -> Self {
        Self::new()
    }
}

impl BootstrapTables {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            directory: PageDirectory::zeroed(),
            identity: PageTable::zeroed(),
            kernel: PageTable::zeroed(),
            vga: PageTable::zeroed(),
            fixmap: PageTable::zeroed(),
        }
    }

    /// The directory frame, given where the whole block lives.
    #[must_use]
    pub const fn directory_page(tables_phys: PhysicalAddress) -> PhysicalPage<Size4K> {
        tables_phys.page()
    }

    /// Fill every table and wire them into the directory.
    ///
    /// `tables_phys` is the physical address of `self`; the directory entries
    /// need the physical address of each table.
    ///
    /// # Panics
    /// In debug builds, if the VGA window does not fit its page table.
    #[allow(clippy::cast_possible_truncation)]
    pub fn build(
        &mut self,
        tables_phys: PhysicalAddress,
        image: &KernelImage,
        layout: &MemoryLayout,
    ) {
        debug_assert!(
            u32::from(layout.vga_virt_start().table_index()) + layout.vga_pages()
                <= ENTRIES as u32
        );
        self.directory.zero();
        self.vga.zero();
        self.fixmap.zero();
        self.fill(
            tables_phys.as_u32(),
            image.phys_base().as_u32(),
            layout.vga_phys_start().as_u32(),
            layout.vga_pages(),
            layout.vga_virt_start().as_u32(),
        );
    }

    /// The raw form of [`build`](Self::build) for a block that is still
    /// all zeroes.
    ///
    /// The kernel runs this from its bootstrap section with paging off. It is
    /// always inlined and works on plain words and constants only, so the
    /// caller's code never reaches into the higher-half `.text` or `.rodata`.
    #[inline(always)]
    #[allow(clippy::inline_always, clippy::cast_possible_truncation)]
    pub fn fill(
        &mut self,
        tables_phys: u32,
        kernel_phys: u32,
        vga_phys: u32,
        vga_pages: u32,
        vga_virt: u32,
    ) {
        let block: *mut Self = self;
        let words = unsafe { &mut *block.cast::<[u32; WORDS]>() };

        let mut i = 0_u32;
        while i < ENTRIES as u32 {
            words[IDENTITY + i as usize] = (i * PAGE_SIZE) | LEAF_RO;
            words[KERNEL + i as usize] = (kernel_phys + i * PAGE_SIZE) | LEAF_RO;
            i += 1;
        }

        let first_vga = (vga_virt / PAGE_SIZE) as usize % ENTRIES;
        let mut page = 0_u32;
        while page < vga_pages {
            words[VGA + first_vga + page as usize] = (vga_phys + page * PAGE_SIZE) | LEAF_MMIO;
            page += 1;
        }

        let vga_slot = (vga_virt / (ENTRIES as u32 * PAGE_SIZE)) as usize;
        words[DIRECTORY] = (tables_phys + PAGE_SIZE) | TABLE_RW;
        words[DIRECTORY + KERNEL_SLOT] = (tables_phys + 2 * PAGE_SIZE) | TABLE_RO;
        words[DIRECTORY + vga_slot] = (tables_phys + 3 * PAGE_SIZE) | TABLE_RO;
        words[DIRECTORY + FIXMAP_SLOT] = (tables_phys + 4 * PAGE_SIZE) | TABLE_RW;
        words[DIRECTORY + RECURSIVE_SLOT] = tables_phys | TABLE_RW;
    }
}

/// Log every present mapping of a directory that is reachable by its
/// physical address, i.e. before paging is on or while identity mapped.
pub fn dump_mappings<V: VirtualMemory>(vm: &V, directory: PhysicalPage<Size4K>) {
    kernel_vmem::dump_mappings(&PhysicalTables::new(vm, directory));
}

#[cfg(all(target_arch = "x86", target_os = "none"))]
pub use self::cpu::enable_paging;

#[cfg(all(target_arch = "x86", target_os = "none"))]
mod cpu {
    use kernel_registers::cr0::Cr0;
    use kernel_registers::cr4::Cr4;

    const CR0_PG: u32 = Cr0::new().with_pg_paging(true).into_bits();
    const CR4_PGE: u32 = Cr4::new().with_pge(true).into_bits();

    /// Load the directory at `directory_phys` and switch paging on.
    ///
    /// Inlined into the bootstrap section like
    /// [`fill`](super::BootstrapTables::fill).
    ///
    /// # Safety
    /// The directory must identity map the code calling this and the stack,
    /// and every table it references must be fully initialized.
    #[inline(always)]
    #[allow(clippy::inline_always)]
    pub unsafe fn enable_paging(directory_phys: u32) {
        unsafe {
            core::arch::asm!(
                "mov cr3, {dir}",
                "mov {tmp}, cr4",
                "or {tmp}, {pge}",
                "mov cr4, {tmp}",
                "mov {tmp}, cr0",
                "or {tmp}, {pg}",
                "mov cr0, {tmp}",
                dir = in(reg) directory_phys,
                tmp = out(reg) _,
                pge = const CR4_PGE,
                pg = const CR0_PG,
                options(nostack),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kernel_info::memory::{KERNEL_VMA, VGA_PHYS_END, VGA_PHYS_START, VGA_VIRT_START};
    use kernel_vmem::{PdEntryKind, PdIndex, PtIndex};

    const BASE: u32 = 0x0010_0000;

    fn built() -> Box<BootstrapTables> {
        let image = KernelImage::new(
            PhysicalAddress::new(0x0010_5000),
            PhysicalAddress::new(0x0012_0000),
        );
        let mut tables = Box::new(BootstrapTables::new());
        tables.build(PhysicalAddress::new(BASE), &image, &MemoryLayout::DEFAULT);
        tables
    }

    #[allow(clippy::cast_possible_truncation)]
    fn table_of(tables: &BootstrapTables, slot: usize) -> u32 {
        match tables.directory.get(PdIndex::new(slot as u16)).kind() {
            Some(PdEntryKind::Table(page)) => page.base().as_u32(),
            other => panic!("slot {slot}: {other:?}"),
        }
    }

    #[test]
    fn directory_points_at_the_embedded_tables() {
        let tables = built();
        assert_eq!(table_of(&tables, 0), BASE + PAGE_SIZE);
        assert_eq!(table_of(&tables, KERNEL_SLOT), BASE + 2 * PAGE_SIZE);
        assert_eq!(table_of(&tables, 772), BASE + 3 * PAGE_SIZE);
        assert_eq!(table_of(&tables, FIXMAP_SLOT), BASE + 4 * PAGE_SIZE);
        assert_eq!(table_of(&tables, RECURSIVE_SLOT), BASE);
        assert_eq!(tables.directory.present_entries().count(), 5);
    }

    #[test]
    fn identity_and_kernel_tables_are_full() {
        let tables = built();
        assert_eq!(tables.identity.present_entries().count(), ENTRIES);
        assert_eq!(tables.kernel.present_entries().count(), ENTRIES);

        let last = tables.identity.get(PtIndex::new(1023)).page().map(|p| p.base().as_u32());
        assert_eq!(last, Some(0x003F_F000));
        let first = tables.kernel.get(PtIndex::new(0)).page().map(|p| p.base().as_u32());
        assert_eq!(first, Some(0x0010_5000));
        assert_eq!(KERNEL_SLOT, (KERNEL_VMA >> 22) as usize);
    }

    #[test]
    fn vga_window_is_uncached_and_starts_at_its_alias() {
        let tables = built();
        assert_eq!(tables.vga.present_entries().count(), 32);
        let first = tables.vga.get(PtIndex::new(0xA0));
        assert_eq!(first.page().map(|p| p.base().as_u32()), Some(VGA_PHYS_START));
        assert!(first.flags().cache_disabled());
        assert!(first.flags().writable());
        assert!(!tables.vga.get(PtIndex::new(0x9F)).is_present());
        assert!(!tables.vga.get(PtIndex::new(0xC0)).is_present());
    }

    #[test]
    fn fixmap_table_starts_empty() {
        let tables = built();
        assert_eq!(tables.fixmap.present_entries().count(), 0);
    }

    #[test]
    fn raw_fill_matches_the_typed_build() {
        let typed = built();
        let mut raw = Box::new(BootstrapTables::new());
        let vga_pages = (VGA_PHYS_END - VGA_PHYS_START).div_ceil(PAGE_SIZE);
        raw.fill(BASE, 0x0010_5000, VGA_PHYS_START, vga_pages, VGA_VIRT_START);

        for i in 0..ENTRIES {
            let pd = PdIndex::new(u16::try_from(i).unwrap());
            let pt = PtIndex::new(u16::try_from(i).unwrap());
            assert_eq!(raw.directory.get(pd), typed.directory.get(pd), "pde {i}");
            assert_eq!(raw.identity.get(pt), typed.identity.get(pt), "identity {i}");
            assert_eq!(raw.kernel.get(pt), typed.kernel.get(pt), "kernel {i}");
            assert_eq!(raw.vga.get(pt), typed.vga.get(pt), "vga {i}");
        }
    }

    #[test]
    fn recursive_slot_is_writable_and_kernel_table_is_not() {
        let tables = built();
        let recursive = tables.directory.get(PdIndex::new(RECURSIVE_SLOT as u16));
        assert!(recursive.flags().writable());
        let kernel = tables.directory.get(PdIndex::new(KERNEL_SLOT as u16));
        assert!(!kernel.flags().writable());
    }
}
