//! # Page Table Manager
//!
//! Edits the **active** address space through the recursive mapping. Every
//! table it creates is zeroed through its recursive view right after being
//! installed, so it never needs a physical pointer.

use crate::info::PAGE_SIZE;
use crate::page_table::split_indices;
use crate::walker::{Mappings, RecursiveTables};
use crate::{
    FrameAlloc, Mmu, PageDirectory, PageEntryBits, PageTable, PdEntry, PdEntryKind, PdIndex,
    PhysicalWindow, PtEntry, RecursiveMapping, VirtualMemory, VmemError,
};
use kernel_memory_addresses::{PhysicalAddress, PhysicalPage, Size4K, Size4M, VirtualAddress};

/// A page directory prepared by [`PageTableManager::create_page_directory`].
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct NewDirectory {
    /// Frame holding the directory; what goes into CR3.
    pub phys: PhysicalPage<Size4K>,
    /// Where the directory shows up once it is active.
    pub recursive_view: VirtualAddress,
}

pub struct PageTableManager<V: VirtualMemory, M: Mmu> {
    vm: V,
    mmu: M,
    window: PhysicalWindow,
}

impl<V: VirtualMemory, M: Mmu> PageTableManager<V, M> {
    /// A manager for whatever directory is active. The directory must contain
    /// the recursive slot, and the scratch page's table must exist.
    pub const fn new(vm: V, mmu: M, scratch: VirtualAddress) -> Self {
        Self {
            vm,
            mmu,
            window: PhysicalWindow::new(scratch),
        }
    }

    #[inline]
    pub const fn vm(&self) -> &V {
        &self.vm
    }

    #[inline]
    pub const fn mmu(&self) -> &M {
        &self.mmu
    }

    #[inline]
    pub const fn window(&self) -> &PhysicalWindow {
        &self.window
    }

    #[allow(clippy::mut_from_ref)]
    fn directory(&self) -> &mut PageDirectory {
        unsafe { self.vm.virt_to_mut(RecursiveMapping::directory()) }
    }

    #[allow(clippy::mut_from_ref)]
    fn table(&self, pd: PdIndex) -> &mut PageTable {
        unsafe { self.vm.virt_to_mut(RecursiveMapping::table(pd)) }
    }

    /// Make sure directory slot `pd` points at a page table.
    ///
    /// A new table is installed present+writable (plus user if `user`), then
    /// zeroed through its recursive view. An existing table gains the user bit
    /// if it is requested.
    fn ensure_table<A: FrameAlloc + ?Sized>(
        &self,
        alloc: &mut A,
        va: VirtualAddress,
        user: bool,
    ) -> Result<(), VmemError> {
        let pd = PdIndex::from(va);
        let dir = self.directory();
        let entry = dir.get(pd);

        match entry.kind() {
            Some(PdEntryKind::Large(_)) => Err(VmemError::LargePage(va)),
            Some(PdEntryKind::Table(_)) => {
                if user && !entry.flags().user_access() {
                    dir.set(pd, PdEntry::from(entry.flags().with_user_access(true)));
                }
                Ok(())
            }
            None => {
                let frame = alloc.alloc_4k().ok_or(VmemError::OutOfFrames)?;
                let flags = PageEntryBits::kernel_rw().with_user_access(user);
                dir.set(pd, PdEntry::table(frame, flags));
                self.mmu.invalidate_page(RecursiveMapping::table(pd));
                self.table(pd).zero();
                log::debug!("new page table {} for {}", frame.base(), pd.base());
                Ok(())
            }
        }
    }

    fn check_aligned(va: VirtualAddress, pa: PhysicalAddress) -> Result<(), VmemError> {
        if !va.is_aligned::<Size4K>() {
            return Err(VmemError::Unaligned(va.as_u32()));
        }
        if !pa.is_aligned::<Size4K>() {
            return Err(VmemError::Unaligned(pa.as_u32()));
        }
        Ok(())
    }

    fn write_pte(&self, va: VirtualAddress, pa: PhysicalAddress, flags: PageEntryBits) {
        let (pd, pt) = split_indices(va);
        self.table(pd).set(pt, PtEntry::leaf(pa.page(), flags.attributes()));
    }

    /// Map `va → pa` with `flags` (present is implied), creating the page
    /// table if needed. Overwrites an existing mapping.
    ///
    /// # Errors
    /// - [`VmemError::Unaligned`] if either address is not page aligned.
    /// - [`VmemError::OutOfFrames`] if a table was needed and none is left.
    /// - [`VmemError::LargePage`] if `va` is covered by a 4 MiB entry.
    pub fn map_page<A: FrameAlloc + ?Sized>(
        &mut self,
        alloc: &mut A,
        va: VirtualAddress,
        pa: PhysicalAddress,
        flags: PageEntryBits,
    ) -> Result<(), VmemError> {
        Self::check_aligned(va, pa)?;
        self.ensure_table(alloc, va, flags.user_access())?;
        self.write_pte(va, pa, flags);
        self.mmu.invalidate_page(va);
        log::trace!("map {va} -> {pa}");
        Ok(())
    }

    /// Map `count` consecutive pages starting at `va → pa`, then flush the TLB once.
    ///
    /// # Errors
    /// As [`map_page`](Self::map_page), plus [`VmemError::RangeOverflow`] if
    /// the range wraps around either address space. Pages before the failing
    /// one stay mapped.
    pub fn map_range<A: FrameAlloc + ?Sized>(
        &mut self,
        alloc: &mut A,
        va: VirtualAddress,
        pa: PhysicalAddress,
        count: u32,
        flags: PageEntryBits,
    ) -> Result<(), VmemError> {
        Self::check_aligned(va, pa)?;
        let span = count.checked_mul(PAGE_SIZE);
        let fits = span.is_some_and(|s| {
            s == 0
                || (va.as_u32().checked_add(s - 1).is_some()
                    && pa.as_u32().checked_add(s - 1).is_some())
        });
        if !fits {
            return Err(VmemError::RangeOverflow { start: va, pages: count });
        }

        let result = self.map_range_entries(alloc, va, pa, count, flags);
        self.mmu.flush_all();
        log::debug!("mapped {count} pages at {va} -> {pa}");
        result
    }

    fn map_range_entries<A: FrameAlloc + ?Sized>(
        &self,
        alloc: &mut A,
        va: VirtualAddress,
        pa: PhysicalAddress,
        count: u32,
        flags: PageEntryBits,
    ) -> Result<(), VmemError> {
        let mut table_for = None;
        for i in 0..count {
            let v = va + i * PAGE_SIZE;
            let p = pa + i * PAGE_SIZE;
            let pd = PdIndex::from(v);
            if table_for != Some(pd) {
                self.ensure_table(alloc, v, flags.user_access())?;
                table_for = Some(pd);
            }
            self.write_pte(v, p, flags);
        }
        Ok(())
    }

    /// Remove the mapping at `va`. Returns whether a mapping was removed.
    pub fn unmap_page(&mut self, va: VirtualAddress) -> bool {
        let va = va.page::<Size4K>().base();
        let (pd, pt) = split_indices(va);
        if self.directory().get(pd).next_table().is_none() {
            return false;
        }

        let table = self.table(pd);
        if !table.get(pt).is_present() {
            return false;
        }
        table.set(pt, PtEntry::zero());
        self.mmu.invalidate_page(va);
        log::trace!("unmap {va}");
        true
    }

    /// Prepare an empty directory whose only entry is its own recursive slot.
    /// It is not activated.
    ///
    /// # Errors
    /// [`VmemError::OutOfFrames`] or [`VmemError::WindowBusy`].
    pub fn create_page_directory<A: FrameAlloc + ?Sized>(
        &mut self,
        alloc: &mut A,
    ) -> Result<NewDirectory, VmemError> {
        if self.window.is_busy() {
            return Err(VmemError::WindowBusy);
        }
        let frame = alloc.alloc_4k().ok_or(VmemError::OutOfFrames)?;

        {
            let mut dir =
                unsafe { self.window.map::<PageDirectory, _, _>(&self.vm, &self.mmu, frame)? };
            dir.zero();
            dir.set(RecursiveMapping::SLOT, PdEntry::table(frame, PageEntryBits::kernel_rw()));
        }

        log::debug!("new page directory at {}", frame.base());
        Ok(NewDirectory {
            phys: frame,
            recursive_view: RecursiveMapping::directory(),
        })
    }

    /// Physical address behind `va`, if mapped.
    #[must_use]
    pub fn translate(&self, va: VirtualAddress) -> Option<PhysicalAddress> {
        let pd = PdIndex::from(va);
        match self.directory().get(pd).kind()? {
            PdEntryKind::Large(base) => Some(PhysicalAddress::new(
                base.base().as_u32() | va.offset::<Size4M>().as_u32(),
            )),
            PdEntryKind::Table(_) => {
                let page = self.entry(va)?.page()?;
                Some(page.join(va.offset::<Size4K>()))
            }
        }
    }

    /// The PTE for `va`, if its page table exists.
    #[must_use]
    pub fn entry(&self, va: VirtualAddress) -> Option<PtEntry> {
        let (pd, pt) = split_indices(va);
        self.directory().get(pd).next_table()?;
        Some(self.table(pd).get(pt))
    }

    #[must_use]
    pub fn directory_entry(&self, index: PdIndex) -> PdEntry {
        self.directory().get(index)
    }

    /// Load `directory` into CR3.
    ///
    /// # Safety
    /// See [`Mmu::load_directory`].
    pub unsafe fn activate(&self, directory: PhysicalPage<Size4K>) {
        log::debug!("activating page directory {}", directory.base());
        unsafe { self.mmu.load_directory(directory) };
    }

    /// Every present 4 KiB mapping of the active space.
    pub fn for_each_mapping(&self, mut f: impl FnMut(crate::Mapping)) {
        let source = RecursiveTables::new(&self.vm);
        for m in Mappings::new(&source) {
            f(m);
        }
    }

    /// Log every present mapping as `phys -> virt`.
    pub fn dump_mappings(&self) {
        crate::walker::dump_mappings(&RecursiveTables::new(&self.vm));
    }
}
