//! # Virtual Memory Support
//!
//! Two-level, 32-bit (non-PAE) paging for the kernel.
//!
//! ## What you get
//! - [`PageEntryBits`] and the typed [`PageDirectory`]/[`PageTable`] structures.
//! - [`RecursiveMapping`]: addresses of the active paging structures through
//!   the self-referencing directory slot 1023.
//! - [`PhysicalWindow`]: one scratch page for touching arbitrary frames.
//! - [`PageTableManager`]: map, unmap and translate in the active address
//!   space, and prepare new page directories.
//! - [`Mappings`]: iteration over every present 4 KiB mapping.
//!
//! ## Virtual address → physical address
//!
//! ```text
//! | 31‒22 | 21‒12 | 11‒0   |
//! |  PD   |  PT   | Offset |
//!
//!  CR3 ──► PageDirectory ──► PageTable ──► 4 KiB frame
//!              │
//!              └─ PS=1 ──────────────────► 4 MiB frame
//! ```
//!
//! ## Reaching the tables
//!
//! Once paging is on, physical addresses cannot be dereferenced. Because slot
//! 1023 of every directory points back at the directory itself, the CPU's own
//! walk makes the directory visible at `0xFFFF_F000` and table `i` at
//! `0xFFC0_0000 + i * 4096`. Frames that are not page tables of the active
//! space are reached through the [`PhysicalWindow`].
//!
//! ## Seams
//!
//! The code never touches hardware directly: memory access goes through
//! [`VirtualMemory`], TLB and CR3 handling through [`Mmu`] and frame supply
//! through [`FrameAlloc`]. The kernel plugs in [`cpu`] implementations; tests
//! use the simulated machine in `sim`.

#![cfg_attr(not(test), no_std)]
#![allow(unsafe_code, clippy::inline_always)]

#[cfg(any(test, feature = "sim"))]
extern crate alloc;

#[cfg(target_arch = "x86")]
pub mod cpu;
mod error;
mod manager;
mod page_entry_bits;
pub mod page_table;
mod recursive;
#[cfg(any(test, feature = "sim"))]
pub mod sim;
mod walker;
mod window;

pub use crate::error::VmemError;
pub use crate::manager::{NewDirectory, PageTableManager};
pub use crate::page_entry_bits::PageEntryBits;
pub use crate::page_table::pd::{PageDirectory, PdEntry, PdEntryKind, PdIndex};
pub use crate::page_table::pt::{PageTable, PtEntry, PtIndex};
pub use crate::recursive::RecursiveMapping;
pub use crate::walker::{
    Mapping, Mappings, PhysicalTables, RecursiveTables, TableSource, dump_mappings,
};
pub use crate::window::{PhysicalWindow, WindowMapping};

/// Re-export constants as info module.
pub use kernel_info::memory as info;

use kernel_memory_addresses::{PhysicalPage, Size4K, VirtualAddress};

/// Source of **physical** 4 KiB frames for page tables and directories.
///
/// Returned frames must be page aligned and exclusively owned by the caller.
/// Returns `None` on out-of-memory.
pub trait FrameAlloc {
    fn alloc_4k(&mut self) -> Option<PhysicalPage<Size4K>>;
}

/// Typed access to memory at a virtual address of the **active** address space.
pub trait VirtualMemory {
    /// # Safety
    /// - `va` must be mapped (writable for mutation) in the active space.
    /// - `T` must match the bytes at `va`, and no other live reference may
    ///   alias them for `'a`.
    unsafe fn virt_to_mut<'a, T>(&self, va: VirtualAddress) -> &'a mut T;
}

/// TLB and page-directory-base control.
pub trait Mmu {
    /// Drop the cached translation for `va` (`invlpg`).
    fn invalidate_page(&self, va: VirtualAddress);

    /// Drop every non-global cached translation (CR3 reload).
    fn flush_all(&self);

    /// Switch to the page directory at `directory` (CR3 write).
    ///
    /// # Safety
    /// The new directory must map the executing code, the stack, and itself
    /// through the recursive slot.
    unsafe fn load_directory(&self, directory: PhysicalPage<Size4K>);

    /// The page directory currently in CR3.
    fn active_directory(&self) -> PhysicalPage<Size4K>;
}

impl<T: VirtualMemory + ?Sized> VirtualMemory for &T {
    #[inline(always)]
    unsafe fn virt_to_mut<'a, U>(&self, va: VirtualAddress) -> &'a mut U {
        unsafe { (**self).virt_to_mut(va) }
    }
}

impl<T: Mmu + ?Sized> Mmu for &T {
    #[inline(always)]
    fn invalidate_page(&self, va: VirtualAddress) {
        (**self).invalidate_page(va);
    }

    #[inline(always)]
    fn flush_all(&self) {
        (**self).flush_all();
    }

    #[inline(always)]
    unsafe fn load_directory(&self, directory: PhysicalPage<Size4K>) {
        unsafe { (**self).load_directory(directory) }
    }

    #[inline(always)]
    fn active_directory(&self) -> PhysicalPage<Size4K> {
        (**self).active_directory()
    }
}

impl<A: FrameAlloc + ?Sized> FrameAlloc for &mut A {
    #[inline]
    fn alloc_4k(&mut self) -> Option<PhysicalPage<Size4K>> {
        (**self).alloc_4k()
    }
}
