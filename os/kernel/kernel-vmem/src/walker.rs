//! Enumeration of present 4 KiB mappings.

use crate::info::RECURSIVE_SLOT;
use crate::page_table::join_indices;
use crate::{
    PageDirectory, PageEntryBits, PageTable, PdEntry, PdEntryKind, PdIndex, PtIndex,
    RecursiveMapping, VirtualMemory,
};
use kernel_memory_addresses::{PhysicalAddress, PhysicalPage, Size4K, VirtualAddress};

/// Where the walker finds the directory and its tables.
pub trait TableSource {
    fn directory(&self) -> &PageDirectory;
    fn table(&self, index: PdIndex, entry: PdEntry) -> Option<&PageTable>;
}

/// The active address space, reached through the recursive slot.
pub struct RecursiveTables<'a, V: VirtualMemory> {
    vm: &'a V,
}

impl<'a, V: VirtualMemory> RecursiveTables<'a, V> {
    pub const fn new(vm: &'a V) -> Self {
        Self { vm }
    }
}

impl<V: VirtualMemory> TableSource for RecursiveTables<'_, V> {
    fn directory(&self) -> &PageDirectory {
        unsafe { self.vm.virt_to_mut(RecursiveMapping::directory()) }
    }

    fn table(&self, index: PdIndex, entry: PdEntry) -> Option<&PageTable> {
        entry.next_table()?;
        Some(unsafe { self.vm.virt_to_mut(RecursiveMapping::table(index)) })
    }
}

/// Tables addressed by their physical address, for use before paging is on
/// (or while the frames are identity mapped).
pub struct PhysicalTables<'a, V: VirtualMemory> {
    vm: &'a V,
    directory: PhysicalPage<Size4K>,
}

impl<'a, V: VirtualMemory> PhysicalTables<'a, V> {
    pub const fn new(vm: &'a V, directory: PhysicalPage<Size4K>) -> Self {
        Self { vm, directory }
    }
}

impl<V: VirtualMemory> TableSource for PhysicalTables<'_, V> {
    fn directory(&self) -> &PageDirectory {
        unsafe { self.vm.virt_to_mut(VirtualAddress::new(self.directory.base().as_u32())) }
    }

    fn table(&self, _index: PdIndex, entry: PdEntry) -> Option<&PageTable> {
        let page = entry.next_table()?;
        Some(unsafe { self.vm.virt_to_mut(VirtualAddress::new(page.base().as_u32())) })
    }
}

/// One present 4 KiB translation.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Mapping {
    pub virt: VirtualAddress,
    pub phys: PhysicalAddress,
    pub flags: PageEntryBits,
}

/// Iterator over every present 4 KiB mapping, in address order.
///
/// 4 MiB entries and the recursive slot are skipped.
pub struct Mappings<'s, S: TableSource> {
    source: &'s S,
    pd: usize,
    pt: usize,
    table: Option<&'s PageTable>,
}

impl<'s, S: TableSource> Mappings<'s, S> {
    pub const fn new(source: &'s S) -> Self {
        Self {
            source,
            pd: 0,
            pt: 0,
            table: None,
        }
    }
}

impl<S: TableSource> Iterator for Mappings<'_, S> {
    type Item = Mapping;

    #[allow(clippy::cast_possible_truncation)]
    fn next(&mut self) -> Option<Mapping> {
        loop {
            if let Some(table) = self.table {
                while self.pt < crate::page_table::ENTRIES {
                    let pt = PtIndex::new(self.pt as u16);
                    self.pt += 1;
                    let entry = table.get(pt);
                    if let Some(page) = entry.page() {
                        return Some(Mapping {
                            virt: join_indices(PdIndex::new(self.pd as u16), pt),
                            phys: page.base(),
                            flags: entry.flags().attributes(),
                        });
                    }
                }
                self.table = None;
                self.pd += 1;
            }

            if self.pd >= RECURSIVE_SLOT {
                return None;
            }

            let index = PdIndex::new(self.pd as u16);
            let entry = self.source.directory().get(index);
            match entry.kind() {
                Some(PdEntryKind::Table(_)) => {
                    self.table = self.source.table(index, entry);
                    self.pt = 0;
                    if self.table.is_none() {
                        self.pd += 1;
                    }
                }
                _ => self.pd += 1,
            }
        }
    }
}

/// Log every present mapping as `phys -> virt`.
pub fn dump_mappings<S: TableSource>(source: &S) {
    let mut count = 0_usize;
    for m in Mappings::new(source) {
        log::info!("{} -> {}", m.phys, m.virt);
        count += 1;
    }
    log::info!("{count} mappings");
}
