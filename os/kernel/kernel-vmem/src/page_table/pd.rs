//! # Page Directory
//!
//! - [`PdIndex`]: virtual-address bits `[31:22]`.
//! - [`PdEntry`]: either a pointer to a page table (`PS=0`) or a 4 MiB leaf (`PS=1`).
//! - [`PageDirectory`]: a 4 KiB-aligned array of 1024 entries.
//!
//! TLB maintenance is the caller's responsibility after mutating active entries.

use crate::PageEntryBits;
use crate::page_table::ENTRIES;
use kernel_memory_addresses::{PhysicalPage, Size4K, Size4M, VirtualAddress};

/// Index into the page directory.
#[repr(transparent)]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct PdIndex(u16);

impl PdIndex {
    /// Extract bits `[31:22]` of `va`.
    #[inline]
    #[must_use]
    pub const fn from(va: VirtualAddress) -> Self {
        Self(va.directory_index())
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

    /// First virtual address covered by this slot.
    #[inline]
    #[must_use]
    pub const fn base(self) -> VirtualAddress {
        VirtualAddress::new((self.0 as u32) << 22)
    }
}

/// Decoded directory entry.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PdEntryKind {
    /// Points at a page table.
    Table(PhysicalPage<Size4K>),
    /// Maps a 4 MiB page directly.
    Large(PhysicalPage<Size4M>),
}

/// A page directory entry (PDE).
#[doc(alias = "PDE")]
#[repr(transparent)]
#[derive(Copy, Clone, Default, Eq, PartialEq)]
pub struct PdEntry(PageEntryBits);

impl PdEntry {
    #[inline]
    #[must_use]
    pub const fn zero() -> Self {
        Self(PageEntryBits::new())
    }

    /// A present entry pointing at the table in `page`, with `flags` on top.
    #[inline]
    #[must_use]
    pub const fn table(page: PhysicalPage<Size4K>, flags: PageEntryBits) -> Self {
        Self(
            flags
                .with_present(true)
                .with_large_page(false)
                .with_physical_page(page),
        )
    }

    #[inline]
    #[must_use]
    pub const fn is_present(self) -> bool {
        self.0.present()
    }

    #[inline]
    #[must_use]
    pub const fn is_large(self) -> bool {
        self.0.large_page()
    }

    #[inline]
    #[must_use]
    pub const fn flags(self) -> PageEntryBits {
        self.0
    }

    /// Decode, or `None` if not present.
    #[inline]
    #[must_use]
    pub const fn kind(self) -> Option<PdEntryKind> {
        if !self.is_present() {
            return None;
        }
        let base = self.0.physical_address();
        Some(if self.is_large() {
            PdEntryKind::Large(base.page::<Size4M>())
        } else {
            PdEntryKind::Table(base.page::<Size4K>())
        })
    }

    /// The table this entry points to, if present and not a 4 MiB leaf.
    #[inline]
    #[must_use]
    pub const fn next_table(self) -> Option<PhysicalPage<Size4K>> {
        match self.kind() {
            Some(PdEntryKind::Table(page)) => Some(page),
            _ => None,
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

impl core::fmt::Debug for PdEntry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "PdEntry(0x{:08X})", self.into_bits())
    }
}

impl From<PageEntryBits> for PdEntry {
    #[inline]
    fn from(bits: PageEntryBits) -> Self {
        Self(bits)
    }
}

/// The page directory: 1024 entries, 4 KiB-aligned.
#[doc(alias = "PD")]
#[repr(C, align(4096))]
pub struct PageDirectory {
    entries: [PdEntry; ENTRIES],
}

impl PageDirectory {
    #[inline]
    #[must_use]
    pub const fn zeroed() -> Self {
        Self {
            entries: [PdEntry::zero(); ENTRIES],
        }
    }

    /// Plain load; does not imply any TLB synchronization.
    #[inline]
    #[must_use]
    pub const fn get(&self, i: PdIndex) -> PdEntry {
        self.entries[i.as_usize()]
    }

    #[inline]
    pub const fn set(&mut self, i: PdIndex, e: PdEntry) {
        self.entries[i.as_usize()] = e;
    }

    #[inline]
    pub fn zero(&mut self) {
        self.entries.fill(PdEntry::zero());
    }

    /// Copy every entry of `other` into this directory.
    #[inline]
    pub fn copy_from(&mut self, other: &Self) {
        self.entries.copy_from_slice(&other.entries);
    }

    /// All present entries with their index.
    #[allow(clippy::cast_possible_truncation)]
    pub fn present_entries(&self) -> impl Iterator<Item = (PdIndex, PdEntry)> + '_ {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.is_present())
            .map(|(i, e)| (PdIndex(i as u16), *e))
    }
}

const _: () = assert!(size_of::<PageDirectory>() == 4096);

#[cfg(test)]
mod tests {
    use super::*;
    use kernel_memory_addresses::PhysicalAddress;

    #[test]
    fn table_entry_vs_large_entry() {
        let pt = PhysicalAddress::new(0x0020_3000).page::<Size4K>();
        let e = PdEntry::table(pt, PageEntryBits::new().with_writable(true));
        assert_eq!(e.kind(), Some(PdEntryKind::Table(pt)));
        assert_eq!(e.into_bits(), 0x0020_3003);

        let large = PdEntry::from_bits(0x0040_0083);
        assert!(large.is_large());
        assert_eq!(large.next_table(), None);
        assert_eq!(
            large.kind(),
            Some(PdEntryKind::Large(PhysicalAddress::new(0x0040_0000).page::<Size4M>()))
        );
        assert_eq!(PdEntry::zero().kind(), None);
    }

    #[test]
    fn present_entries_skips_holes() {
        let mut pd = PageDirectory::zeroed();
        let page = PhysicalAddress::new(0x1000).page::<Size4K>();
        pd.set(PdIndex::new(3), PdEntry::table(page, PageEntryBits::new()));
        pd.set(PdIndex::new(1023), PdEntry::table(page, PageEntryBits::kernel_rw()));
        let idx: Vec<_> = pd.present_entries().map(|(i, _)| i.as_usize()).collect();
        assert_eq!(idx, vec![3, 1023]);
    }
}
