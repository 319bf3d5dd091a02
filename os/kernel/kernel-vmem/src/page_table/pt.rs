//! # Page Table
//!
//! - [`PtIndex`]: virtual-address bits `[21:12]`.
//! - [`PtEntry`]: a 4 KiB leaf mapping.
//! - [`PageTable`]: a 4 KiB-aligned array of 1024 entries.

use crate::PageEntryBits;
use crate::page_table::ENTRIES;
use kernel_memory_addresses::{PhysicalPage, Size4K, VirtualAddress};

/// Index into a page table.
#[repr(transparent)]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct PtIndex(u16);

impl PtIndex {
    /// Extract bits `[21:12]` of `va`.
    #[inline]
    #[must_use]
    pub const fn from(va: VirtualAddress) -> Self {
        Self(va.table_index())
    }

    /// # Panics
    /// In debug builds, if `v >= 1024`.
    #[inline]
    #[must_use]
    pub const fn new(v: u16) -> Self {
        debug_assert!((v as usize) < ENTRIES);
        Self(v)
    }

    #[inline]
    #[must_use]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }
}

/// A page table entry (PTE). A present PTE maps exactly one 4 KiB page.
#[doc(alias = "PTE")]
#[repr(transparent)]
#[derive(Copy, Clone, Default, Eq, PartialEq)]
pub struct PtEntry(PageEntryBits);

impl PtEntry {
    #[inline]
    #[must_use]
    pub const fn zero() -> Self {
        Self(PageEntryBits::new())
    }

    /// A present leaf for `page` with `flags` on top.
    #[inline]
    #[must_use]
    pub const fn leaf(page: PhysicalPage<Size4K>, flags: PageEntryBits) -> Self {
        Self(flags.with_present(true).with_physical_page(page))
    }

    #[inline]
    #[must_use]
    pub const fn is_present(self) -> bool {
        self.0.present()
    }

    #[inline]
    #[must_use]
    pub const fn flags(self) -> PageEntryBits {
        self.0
    }

    /// Mapped frame, or `None` if not present.
    #[inline]
    #[must_use]
    pub const fn page(self) -> Option<PhysicalPage<Size4K>> {
        if self.is_present() {
            Some(self.0.physical_page())
        } else {
            None
        }
    }

    #[inline]
    #[must_use]
    pub const fn from_bits(bits: u32) -> Self {
        Self(PageEntryBits::from_bits(bits))
    }

    #[inline]
    #[must_use]
    pub const fn into_bits(self) -> u32 {
        self.0.into_bits()
    }
}

impl core::fmt::Debug for PtEntry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "PtEntry(0x{:08X})", self.into_bits())
    }
}

/// A page table: 1024 entries, 4 KiB-aligned.
#[doc(alias = "PT")]
#[repr(C, align(4096))]
pub struct PageTable {
    entries: [PtEntry; ENTRIES],
}

impl PageTable {
    #[inline]
    #[must_use]
    pub const fn zeroed() -> Self {
        Self {
            entries: [PtEntry::zero(); ENTRIES],
        }
    }

    /// Plain load; does not imply any TLB synchronization.
    #[inline]
    #[must_use]
    pub const fn get(&self, i: PtIndex) -> PtEntry {
        self.entries[i.as_usize()]
    }

    #[inline]
    pub const fn set(&mut self, i: PtIndex, e: PtEntry) {
        self.entries[i.as_usize()] = e;
    }

    #[inline]
    pub fn zero(&mut self) {
        self.entries.fill(PtEntry::zero());
    }

    /// All present entries with their index.
    #[allow(clippy::cast_possible_truncation)]
    pub fn present_entries(&self) -> impl Iterator<Item = (PtIndex, PtEntry)> + '_ {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.is_present())
            .map(|(i, e)| (PtIndex(i as u16), *e))
    }
}

const _: () = assert!(size_of::<PageTable>() == 4096);
