//! # High-Half Transition
//!
//! Replaces the bootstrap directory with the permanent one. The permanent
//! directory is a copy of the bootstrap directory minus the identity slot,
//! so once it is active nothing below [`KERNEL_VMA`] is mapped any more
//! except what other slots explicitly cover.
//!
//! The stack must already run from the higher half ([`crate::stack`]) and
//! the GDT must already live in kernel memory ([`crate::gdt`]).
//!
//! [`KERNEL_VMA`]: kernel_info::memory::KERNEL_VMA

use crate::BootError;
use kernel_alloc::{MemoryError, MemoryManager};
use kernel_info::KernelImage;
use kernel_info::memory::{LEGACY_AREA_END, PHYS_LOAD};
use kernel_memory_addresses::{PhysicalAddress, PhysicalPage, Size4K};
use kernel_vmem::{
    Mmu, PageDirectory, PageEntryBits, PdEntry, PdIndex, RecursiveMapping, VirtualMemory,
};

/// Mark every frame the boot sequence already uses as allocated:
/// the legacy area below 1 MiB, the bootstrap section and the kernel image
/// together with its stack.
pub fn reserve_boot_memory<V: VirtualMemory, M: Mmu>(
    mm: &mut MemoryManager<'_, V, M>,
    image: &KernelImage,
) {
    mm.reserve_range(PhysicalAddress::zero(), PhysicalAddress::new(LEGACY_AREA_END));
    mm.reserve_range(PhysicalAddress::new(PHYS_LOAD), image.phys_base());
    mm.reserve_range(image.phys_base(), image.reserved_physical_end());
    log::debug!(
        "reserved boot memory up to {}, {} frames in use",
        image.reserved_physical_end(),
        mm.frame_stats().allocated
    );
}

/// Build the permanent page directory from the active bootstrap directory
/// and switch to it.
///
/// Returns the frame of the new directory.
///
/// # Errors
/// [`MemoryError::OutOfFrames`] if no frame is left for the directory, or a
/// [`kernel_vmem::VmemError`] if the physical window is in use.
///
/// # Safety
/// The bootstrap directory must be active with its recursive and fixmap
/// slots installed, and nothing may still run from or point into the
/// identity-mapped low memory.
pub unsafe fn build_permanent_directory<V: VirtualMemory, M: Mmu>(
    mm: &mut MemoryManager<'_, V, M>,
    image: &KernelImage,
) -> Result<PhysicalPage<Size4K>, BootError> {
    reserve_boot_memory(mm, image);
    let frame = mm.allocate_frame().ok_or(MemoryError::OutOfFrames)?;

    let pages = mm.pages();
    let (vm, mmu) = (pages.vm(), pages.mmu());
    {
        let bootstrap = unsafe { vm.virt_to_mut::<PageDirectory>(RecursiveMapping::directory()) };
        let mut directory = unsafe { pages.window().map::<PageDirectory, _, _>(vm, mmu, frame)? };
        directory.copy_from(bootstrap);
        directory.set(PdIndex::new(0), PdEntry::zero());
        directory.set(RecursiveMapping::SLOT, PdEntry::table(frame, PageEntryBits::kernel_rw()));
        mmu.flush_all();
    }

    unsafe { pages.activate(frame) };
    log::info!("permanent page directory at {} is active", frame.base());
    Ok(frame)
}
