use bitfield_struct::bitfield;
use kernel_memory_addresses::{PhysicalAddress, PhysicalPage, Size4K};

/// A 32-bit paging entry in its raw bitfield form.
///
/// Models the common superset of a page directory entry (PDE) and a page
/// table entry (PTE) under 32-bit, non-PAE paging.
///
/// | Bits  | Name    | Meaning |
/// |-------|---------|---------|
/// | 0     | `P`     | Present |
/// | 1     | `RW`    | Writable |
/// | 2     | `US`    | User accessible |
/// | 3     | `PWT`   | Write-through |
/// | 4     | `PCD`   | Cache disable |
/// | 5     | `A`     | Accessed |
/// | 6     | `D`     | Dirty (leaf only) |
/// | 7     | `PS`    | 4 MiB page in a PDE; PAT in a PTE |
/// | 8     | `G`     | Global (leaf only, needs CR4.PGE) |
/// | 9–11  | avail   | Free for the OS |
/// | 12–31 | frame   | Physical frame number |
///
/// ```rust
/// # use kernel_vmem::PageEntryBits;
/// # use kernel_memory_addresses::{PhysicalAddress, Size4K};
/// let e = PageEntryBits::kernel_rw()
///     .with_physical_page(PhysicalAddress::new(0x0030_0000).page::<Size4K>());
/// assert_eq!(e.into_bits(), 0x0030_0003);
/// ```
#[bitfield(u32)]
#[derive(Eq, PartialEq)]
pub struct PageEntryBits {
    /// Present (P, bit 0).
    ///
    /// Clear means any access through this entry faults.
    pub present: bool,

    /// Writable (RW, bit 1).
    pub writable: bool,

    /// User/Supervisor (US, bit 2).
    ///
    /// Effective user access requires the bit at both levels of the walk.
    pub user_access: bool,

    /// Page Write-Through (PWT, bit 3).
    pub write_through: bool,

    /// Page Cache Disable (PCD, bit 4). Set for MMIO.
    pub cache_disabled: bool,

    /// Accessed (A, bit 5). Set by the CPU.
    pub accessed: bool,

    /// Dirty (D, bit 6). Set by the CPU on the first write to a leaf.
    pub dirty: bool,

    /// Page Size (PS, bit 7).
    ///
    /// In a PDE with CR4.PSE: the entry maps a 4 MiB page directly.
    pub large_page: bool,

    /// Global (G, bit 8).
    ///
    /// Keeps the TLB entry across CR3 reloads when CR4.PGE is set.
    pub global_translation: bool,

    /// OS-available (bits 9..=11).
    #[bits(3)]
    pub os_available: u8,

    /// Physical frame number (bits 12..=31).
    #[bits(20)]
    frame_index: u32,
}

impl PageEntryBits {
    #[inline]
    #[must_use]
    pub const fn with_physical_page(self, page: PhysicalPage<Size4K>) -> Self {
        self.with_frame_index(page.frame_index())
    }

    #[inline]
    pub const fn set_physical_page(&mut self, page: PhysicalPage<Size4K>) {
        self.set_frame_index(page.frame_index());
    }

    /// The 4 KiB frame the entry points at.
    #[inline]
    #[must_use]
    pub const fn physical_page(&self) -> PhysicalPage<Size4K> {
        PhysicalPage::from_frame_index(self.frame_index())
    }

    #[inline]
    #[must_use]
    pub const fn physical_address(&self) -> PhysicalAddress {
        self.physical_page().base()
    }

    /// Present and writable, supervisor only.
    #[inline]
    #[must_use]
    pub const fn kernel_rw() -> Self {
        Self::new().with_present(true).with_writable(true)
    }

    /// Present, read-only, supervisor only.
    #[inline]
    #[must_use]
    pub const fn kernel_ro() -> Self {
        Self::new().with_present(true)
    }

    /// Uncached, global, writable mapping for device memory.
    #[inline]
    #[must_use]
    pub const fn mmio() -> Self {
        Self::kernel_rw()
            .with_cache_disabled(true)
            .with_global_translation(true)
    }

    /// The permission and caching bits only (no frame, no CPU-maintained bits).
    #[inline]
    #[must_use]
    pub const fn attributes(self) -> Self {
        self.with_frame_index(0).with_accessed(false).with_dirty(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_round_trips_and_keeps_flags() {
        let page = PhysicalPage::<Size4K>::from_frame_index(0xFFFFF);
        let e = PageEntryBits::mmio().with_physical_page(page);
        assert_eq!(e.physical_page(), page);
        assert!(e.present() && e.writable() && e.cache_disabled() && e.global_translation());
        assert!(!e.user_access());
        assert_eq!(e.into_bits(), 0xFFFF_F113);
    }

    #[test]
    fn attributes_strip_frame_and_cpu_bits() {
        let e = PageEntryBits::kernel_rw()
            .with_accessed(true)
            .with_dirty(true)
            .with_frame_index(0x1234);
        assert_eq!(e.attributes().into_bits(), 0b11);
    }
}
