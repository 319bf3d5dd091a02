//! The real CPU behind [`VirtualMemory`] and [`Mmu`].

use crate::{Mmu, VirtualMemory};
use kernel_memory_addresses::{PhysicalPage, Size4K, VirtualAddress};
use kernel_registers::cr3::Cr3;
use kernel_registers::{LoadRegisterUnsafe, StoreRegisterUnsafe};

/// Plain pointer access to the active address space.
#[derive(Debug, Default, Copy, Clone)]
pub struct CpuMemory;

impl VirtualMemory for CpuMemory {
    #[inline(always)]
    unsafe fn virt_to_mut<'a, T>(&self, va: VirtualAddress) -> &'a mut T {
        unsafe { &mut *va.as_mut_ptr::<T>() }
    }
}

/// `invlpg` and CR3.
#[derive(Debug, Default, Copy, Clone)]
pub struct CpuMmu;

impl Mmu for CpuMmu {
    #[inline(always)]
    fn invalidate_page(&self, va: VirtualAddress) {
        unsafe {
            core::arch::asm!("invlpg [{}]", in(reg) va.as_u32(), options(nostack, preserves_flags));
        }
    }

    #[inline(always)]
    fn flush_all(&self) {
        unsafe {
            let cr3 = Cr3::load_unsafe();
            cr3.store_unsafe();
        }
    }

    #[inline(always)]
    unsafe fn load_directory(&self, directory: PhysicalPage<Size4K>) {
        unsafe { Cr3::from_directory_phys(directory.base()).store_unsafe() }
    }

    #[inline(always)]
    fn active_directory(&self) -> PhysicalPage<Size4K> {
        unsafe { Cr3::load_unsafe() }.page_directory_base().page()
    }
}
