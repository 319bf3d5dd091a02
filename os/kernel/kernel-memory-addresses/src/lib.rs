//! # Physical and Virtual Address Types (IA-32)
//!
//! Strongly typed wrappers for raw 32-bit memory addresses and page bases used
//! by the paging, frame allocation and heap code.
//!
//! ## Overview
//!
//! A handful of principal types keep virtual and physical addresses apart at
//! compile time while staying zero-cost wrappers around `u32`:
//!
//! | Concept | Generic | Description |
//! |----------|----------|-------------|
//! | [`MemoryAddress`] | – | A raw 32-bit address, either physical or virtual. |
//! | [`MemoryPage<S>`] | [`S: PageSize`](PageSize) | A page-aligned base address of a page of size `S`. |
//! | [`MemoryAddressOffset<S>`] | [`S: PageSize`](PageSize) | An offset within a page of size `S`. |
//!
//! These are wrapped again to carry intent:
//!
//! | Wrapper | Meaning |
//! |----------|----------|
//! | [`VirtualAddress`] / [`VirtualPage<S>`] | Linear addresses, translated by the page directory. |
//! | [`PhysicalAddress`] / [`PhysicalPage<S>`] | Physical RAM frames or MMIO windows. |
//!
//! ## Page Sizes
//!
//! Two page sizes exist with 32-bit, non-PAE paging:
//!
//! - [`Size4K`]: 4 KiB pages mapped through a page table
//! - [`Size4M`]: 4 MiB pages mapped directly by a directory entry (`PS=1`)
//!
//! ## Typical Usage
//!
//! ```rust
//! # use kernel_memory_addresses::*;
//! let va = VirtualAddress::new(0xC010_1234);
//! let (page, off) = va.split::<Size4K>();
//! assert_eq!(page.base().as_u32(), 0xC010_1000);
//! assert_eq!(page.join(off), va);
//!
//! let pa = PhysicalAddress::new(0x0020_3042);
//! assert_eq!(pa.page::<Size4K>().frame_index(), 0x203);
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code, clippy::inline_always)]

mod memory_address;
mod memory_address_offset;
mod memory_page;
mod page_size;
mod physical_address;
mod physical_page;
mod virtual_address;
mod virtual_page;

pub use crate::memory_address::MemoryAddress;
pub use crate::memory_address_offset::MemoryAddressOffset;
pub use crate::memory_page::MemoryPage;
pub use crate::page_size::{PageSize, Size4K, Size4M};
pub use crate::physical_address::PhysicalAddress;
pub use crate::physical_page::PhysicalPage;
pub use crate::virtual_address::VirtualAddress;
pub use crate::virtual_page::VirtualPage;

/// Align `x` down to the nearest multiple of `a`.
///
/// `a` must be a non-zero power of two.
///
/// ```rust
/// # use kernel_memory_addresses::align_down;
/// assert_eq!(align_down(0,      4096), 0);
/// assert_eq!(align_down(4095,   4096), 0);
/// assert_eq!(align_down(8191,   4096), 4096);
/// assert_eq!(align_down(0x12345,   8), 0x12340);
/// ```
#[inline(always)]
#[must_use]
pub const fn align_down(x: u32, a: u32) -> u32 {
    x & !(a - 1)
}

/// Align `x` up to the nearest multiple of `a`.
///
/// `a` must be a non-zero power of two and `x + a - 1` must not overflow.
///
/// ```rust
/// # use kernel_memory_addresses::align_up;
/// assert_eq!(align_up(0,       4096), 0);
/// assert_eq!(align_up(1,       4096), 4096);
/// assert_eq!(align_up(4096,    4096), 4096);
/// assert_eq!(align_up(0x12345,    8), 0x12348);
/// ```
#[inline(always)]
#[must_use]
pub const fn align_up(x: u32, a: u32) -> u32 {
    (x + a - 1) & !(a - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_and_join_4k() {
        let a = MemoryAddress::new(0xC123_4567);
        let (p, o) = a.split::<Size4K>();
        assert_eq!(p.base().as_u32(), 0xC123_4000);
        assert_eq!(o.as_u32(), 0x567);
        assert_eq!(p.join(o), a);
    }

    #[test]
    fn split_and_join_4m() {
        let a = MemoryAddress::new(0xC123_4567);
        let (p, o) = a.split::<Size4M>();
        assert_eq!(p.base().as_u32(), 0xC100_0000);
        assert_eq!(o.as_u32(), 0x23_4567);
        assert_eq!(p.join(o), a);
    }

    #[test]
    fn frame_index_round_trips_through_physical_page() {
        let pp = PhysicalPage::<Size4K>::from_frame_index(0x1_2345);
        assert_eq!(pp.base().as_u32(), 0x1234_5000);
        assert_eq!(pp.frame_index(), 0x1_2345);
    }

    #[test]
    fn virtual_page_stepping() {
        let vp = VirtualAddress::new(0xD000_0000).page::<Size4K>();
        let next = vp.checked_next().expect("not at the top");
        assert_eq!(next.base().as_u32(), 0xD000_1000);

        let last = VirtualAddress::new(0xFFFF_F123).page::<Size4K>();
        assert!(last.checked_next().is_none());
    }

    #[test]
    fn alignment_helpers() {
        let a = MemoryAddress::new(0x12345);
        assert_eq!(a.align_down::<Size4K>().as_u32(), 0x12000);
        assert_eq!(a.align_up::<Size4K>().as_u32(), 0x13000);
        assert_eq!(a.offset::<Size4K>().as_u32(), 0x345);
        assert!(MemoryAddress::new(0x4000).is_aligned::<Size4K>());
    }
}
