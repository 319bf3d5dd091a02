//! # Physical Window
//!
//! A single reserved virtual page (the scratch page, in the fixmap slot)
//! that can be pointed at any physical frame. The scratch page's table must
//! already exist; the boot code installs it.

use crate::page_table::pt::PtEntry;
use crate::{Mmu, PageEntryBits, RecursiveMapping, VirtualMemory, VmemError};
use core::cell::Cell;
use core::marker::PhantomData;
use core::ops::{Deref, DerefMut};
use core::ptr::NonNull;
use kernel_memory_addresses::{PhysicalPage, Size4K, VirtualAddress};

pub struct PhysicalWindow {
    scratch: VirtualAddress,
    busy: Cell<bool>,
}

impl PhysicalWindow {
    /// # Panics
    /// In debug builds, if `scratch` is not page aligned.
    #[must_use]
    pub const fn new(scratch: VirtualAddress) -> Self {
        debug_assert!(scratch.is_aligned::<Size4K>());
        Self {
            scratch,
            busy: Cell::new(false),
        }
    }

    #[inline]
    #[must_use]
    pub const fn scratch_page(&self) -> VirtualAddress {
        self.scratch
    }

    #[inline]
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.busy.get()
    }

    /// Point the scratch page at `frame` and view it as a `T`.
    ///
    /// The mapping lasts as long as the returned guard.
    ///
    /// # Errors
    /// [`VmemError::WindowBusy`] while another guard is alive.
    ///
    /// # Safety
    /// The frame must be exclusively owned by the caller for the guard's
    /// lifetime and hold a valid `T` (or be about to be fully initialized).
    pub unsafe fn map<'w, T, V, M>(
        &'w self,
        vm: &'w V,
        mmu: &'w M,
        frame: PhysicalPage<Size4K>,
    ) -> Result<WindowMapping<'w, T, V, M>, VmemError>
    where
        V: VirtualMemory,
        M: Mmu,
    {
        const { assert!(size_of::<T>() <= 4096) };

        if self.busy.replace(true) {
            return Err(VmemError::WindowBusy);
        }

        unsafe {
            let pte = vm.virt_to_mut::<PtEntry>(RecursiveMapping::pte_address(self.scratch));
            *pte = PtEntry::leaf(frame, PageEntryBits::kernel_rw());
        }
        mmu.invalidate_page(self.scratch);
        log::trace!("window: {} -> {}", frame.base(), self.scratch);

        let target = NonNull::from(unsafe { vm.virt_to_mut::<T>(self.scratch) });
        Ok(WindowMapping {
            window: self,
            vm,
            mmu,
            target,
            _frame: PhantomData,
        })
    }
}

/// A live scratch mapping. Clears the PTE and invalidates it on drop.
pub struct WindowMapping<'w, T, V: VirtualMemory, M: Mmu> {
    window: &'w PhysicalWindow,
    vm: &'w V,
    mmu: &'w M,
    target: NonNull<T>,
    _frame: PhantomData<&'w mut T>,
}

impl<T, V: VirtualMemory, M: Mmu> Deref for WindowMapping<'_, T, V, M> {
    type Target = T;
    fn deref(&self) -> &T {
        unsafe { self.target.as_ref() }
    }
}

impl<T, V: VirtualMemory, M: Mmu> DerefMut for WindowMapping<'_, T, V, M> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { self.target.as_mut() }
    }
}

impl<T, V: VirtualMemory, M: Mmu> Drop for WindowMapping<'_, T, V, M> {
    fn drop(&mut self) {
        let scratch = self.window.scratch;
        unsafe {
            let pte = RecursiveMapping::pte_address(scratch);
            *self.vm.virt_to_mut::<PtEntry>(pte) = PtEntry::zero();
        }
        self.mmu.invalidate_page(scratch);
        self.window.busy.set(false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PageTable;
    use crate::sim::SimMachine;

    #[test]
    fn maps_and_unmaps_scratch() {
        let (sim, mut frames) = SimMachine::with_recursive_directory(16);
        let window = PhysicalWindow::new(VirtualAddress::new(crate::info::SCRATCH_PAGE));
        let frame = frames.take();

        {
            let mut table = unsafe { window.map::<PageTable, _, _>(&sim, &sim, frame) }.unwrap();
            table.zero();
            table.set(crate::PtIndex::new(5), PtEntry::from_bits(0xABCD_E001));
            assert_eq!(sim.translate(window.scratch_page()), Some(frame.base()));
        }

        assert_eq!(sim.translate(window.scratch_page()), None);
        assert_eq!(sim.read_phys_u32(frame.base() + 5 * 4), 0xABCD_E001);
        assert!(sim.invalidations().contains(&window.scratch_page()));
        assert!(!window.is_busy());
    }

    #[test]
    fn second_mapping_is_rejected() {
        let (sim, mut frames) = SimMachine::with_recursive_directory(16);
        let window = PhysicalWindow::new(VirtualAddress::new(crate::info::SCRATCH_PAGE));
        let a = frames.take();
        let b = frames.take();

        let first = unsafe { window.map::<u32, _, _>(&sim, &sim, a) }.unwrap();
        let second = unsafe { window.map::<u32, _, _>(&sim, &sim, b) };
        assert!(matches!(second, Err(VmemError::WindowBusy)));
        drop(first);
        assert!(unsafe { window.map::<u32, _, _>(&sim, &sim, b) }.is_ok());
    }
}
