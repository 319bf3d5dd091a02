//! # Simulated Machine
//!
//! A few hundred KiB of "physical RAM" plus a software MMU that walks the
//! two-level tables exactly like the CPU does. Because the walk also follows
//! the recursive slot, code under test reaches its tables through
//! `0xFFC0_0000..` on the host just as it would on hardware.
//!
//! The TLB is not modelled; invalidations and flushes are only recorded so
//! tests can assert on them.

use crate::info::{FIXMAP_SLOT, PAGE_SIZE, RECURSIVE_SLOT};
use crate::{FrameAlloc, Mmu, PageEntryBits, PdIndex, VirtualMemory};
use alloc::boxed::Box;
use alloc::vec::Vec;
use core::cell::{Cell, RefCell, UnsafeCell};
use kernel_memory_addresses::{PhysicalAddress, PhysicalPage, Size4K, Size4M, VirtualAddress};

// Only ever accessed through raw pointers into the whole RAM slice.
#[allow(dead_code)]
#[repr(C, align(4096))]
struct Frame(UnsafeCell<[u8; PAGE_SIZE as usize]>);

pub struct SimMachine {
    ram: Box<[Frame]>,
    cr3: Cell<u32>,
    paging: Cell<bool>,
    invalidations: RefCell<Vec<VirtualAddress>>,
    flushes: Cell<usize>,
}

impl SimMachine {
    /// A machine with `frames` zeroed frames of RAM and paging off.
    #[must_use]
    pub fn new(frames: usize) -> Self {
        let ram = (0..frames)
            .map(|_| Frame(UnsafeCell::new([0; PAGE_SIZE as usize])))
            .collect();
        Self {
            ram,
            cr3: Cell::new(0),
            paging: Cell::new(false),
            invalidations: RefCell::new(Vec::new()),
            flushes: Cell::new(0),
        }
    }

    /// A machine already running on a directory with the recursive slot and
    /// an empty fixmap table, as the boot code leaves it.
    ///
    /// Frame 0 stays unused, the directory is frame 1, the fixmap table
    /// frame 2. The returned allocator hands out frames from 3 on.
    #[must_use]
    pub fn with_recursive_directory(frames: usize) -> (Self, BumpFrames) {
        let sim = Self::new(frames);
        let directory = PhysicalPage::<Size4K>::from_frame_index(1);
        let fixmap = PhysicalPage::<Size4K>::from_frame_index(2);

        let rw = PageEntryBits::kernel_rw();
        sim.write_pde(directory, PdIndex::new(FIXMAP_SLOT as u16), rw.with_physical_page(fixmap));
        sim.write_pde(
            directory,
            PdIndex::new(RECURSIVE_SLOT as u16),
            rw.with_physical_page(directory),
        );
        unsafe { sim.load_directory(directory) };

        #[allow(clippy::cast_possible_truncation)]
        let end = frames as u32;
        (sim, BumpFrames::new(3, end))
    }

    #[must_use]
    pub fn frame_count(&self) -> usize {
        self.ram.len()
    }

    fn ram_len(&self) -> usize {
        self.ram.len() * PAGE_SIZE as usize
    }

    fn phys_ptr(&self, pa: PhysicalAddress) -> *mut u8 {
        let offset = pa.as_u32() as usize;
        assert!(offset < self.ram_len(), "physical address {pa} outside simulated RAM");
        // Frames are laid out back to back, so RAM is one contiguous range.
        unsafe { self.ram.as_ptr().cast::<u8>().cast_mut().add(offset) }
    }

    /// Direct physical access, bypassing paging. `T` may span several frames.
    ///
    /// # Safety
    /// `T` must match the bytes at `pa`; the caller must not create
    /// overlapping live references.
    pub unsafe fn phys_mut<'a, T>(&self, pa: PhysicalAddress) -> &'a mut T {
        assert!(pa.as_u32() as usize + size_of::<T>() <= self.ram_len());
        unsafe { &mut *self.phys_ptr(pa).cast::<T>() }
    }

    #[must_use]
    pub fn read_phys_u32(&self, pa: PhysicalAddress) -> u32 {
        unsafe { self.phys_ptr(pa).cast::<u32>().read_unaligned() }
    }

    pub fn write_phys_u32(&self, pa: PhysicalAddress, value: u32) {
        unsafe { self.phys_ptr(pa).cast::<u32>().write_unaligned(value) }
    }

    /// Write a directory entry of the (not necessarily active) directory at `directory`.
    pub fn write_pde(&self, directory: PhysicalPage<Size4K>, index: PdIndex, entry: PageEntryBits) {
        #[allow(clippy::cast_possible_truncation)]
        let off = index.as_usize() as u32 * 4;
        self.write_phys_u32(directory.base() + off, entry.into_bits());
    }

    /// Software page walk of the active directory. Identity while paging is off.
    #[must_use]
    pub fn translate(&self, va: VirtualAddress) -> Option<PhysicalAddress> {
        if !self.paging.get() {
            return Some(PhysicalAddress::new(va.as_u32()));
        }

        let pde_pa = PhysicalAddress::new(self.cr3.get()) + u32::from(va.directory_index()) * 4;
        let pde = PageEntryBits::from_bits(self.read_phys_u32(pde_pa));
        if !pde.present() {
            return None;
        }
        if pde.large_page() {
            let base = pde.physical_address().page::<Size4M>();
            return Some(PhysicalAddress::new(
                base.base().as_u32() + va.offset::<Size4M>().as_u32(),
            ));
        }

        let pte_pa = pde.physical_address() + u32::from(va.table_index()) * 4;
        let pte = PageEntryBits::from_bits(self.read_phys_u32(pte_pa));
        if !pte.present() {
            return None;
        }
        Some(pte.physical_page().join(va.offset::<Size4K>()))
    }

    #[must_use]
    pub fn paging_enabled(&self) -> bool {
        self.paging.get()
    }

    /// Every `invalidate_page` so far, oldest first.
    #[must_use]
    pub fn invalidations(&self) -> Vec<VirtualAddress> {
        self.invalidations.borrow().clone()
    }

    #[must_use]
    pub fn flush_count(&self) -> usize {
        self.flushes.get()
    }

    pub fn clear_tlb_log(&self) {
        self.invalidations.borrow_mut().clear();
        self.flushes.set(0);
    }
}

impl VirtualMemory for SimMachine {
    unsafe fn virt_to_mut<'a, T>(&self, va: VirtualAddress) -> &'a mut T {
        let Some(pa) = self.translate(va) else {
            panic!("simulated page fault at {va}");
        };
        unsafe { self.phys_mut(pa) }
    }
}

impl Mmu for SimMachine {
    fn invalidate_page(&self, va: VirtualAddress) {
        self.invalidations.borrow_mut().push(va);
    }

    fn flush_all(&self) {
        self.flushes.set(self.flushes.get() + 1);
    }

    unsafe fn load_directory(&self, directory: PhysicalPage<Size4K>) {
        self.cr3.set(directory.base().as_u32());
        self.paging.set(true);
    }

    fn active_directory(&self) -> PhysicalPage<Size4K> {
        PhysicalAddress::new(self.cr3.get()).page()
    }
}

/// Hands out consecutive frames and never takes them back.
#[derive(Debug)]
pub struct BumpFrames {
    next: u32,
    end: u32,
}

impl BumpFrames {
    /// Frames `first..end` (frame indices, not addresses).
    #[must_use]
    pub const fn new(first: u32, end: u32) -> Self {
        Self { next: first, end }
    }

    /// Next frame, panicking when the simulated RAM runs out.
    pub fn take(&mut self) -> PhysicalPage<Size4K> {
        let Some(frame) = self.alloc_4k() else {
            panic!("simulated RAM exhausted");
        };
        frame
    }

    #[must_use]
    pub const fn remaining(&self) -> u32 {
        self.end - self.next
    }
}

impl FrameAlloc for BumpFrames {
    fn alloc_4k(&mut self) -> Option<PhysicalPage<Size4K>> {
        if self.next >= self.end {
            return None;
        }
        let frame = PhysicalPage::from_frame_index(self.next);
        self.next += 1;
        Some(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RecursiveMapping;

    #[test]
    fn recursive_slot_exposes_directory() {
        let (sim, _) = SimMachine::with_recursive_directory(8);
        let dir = sim.translate(RecursiveMapping::directory());
        assert_eq!(dir, Some(PhysicalAddress::new(0x1000)));

        let fixmap = sim.translate(RecursiveMapping::table(PdIndex::new(1022)));
        assert_eq!(fixmap, Some(PhysicalAddress::new(0x2000)));
    }

    #[test]
    fn identity_before_paging() {
        let sim = SimMachine::new(4);
        assert!(!sim.paging_enabled());
        assert_eq!(sim.translate(VirtualAddress::new(0x1234)), Some(PhysicalAddress::new(0x1234)));
    }

    #[test]
    fn large_pages_are_walked() {
        let (sim, _) = SimMachine::with_recursive_directory(8);
        let large = PageEntryBits::kernel_rw().with_large_page(true).with_physical_page(
            PhysicalAddress::new(0x0040_0000).page(),
        );
        sim.write_pde(sim.active_directory(), PdIndex::new(2), large);
        assert_eq!(
            sim.translate(VirtualAddress::new(0x0081_2345)),
            Some(PhysicalAddress::new(0x0041_2345))
        );
    }
}
