use bitfield_struct::bitfield;
use kernel_memory_addresses::PhysicalAddress;

#[cfg(all(feature = "asm", target_arch = "x86"))]
use crate::{LoadRegisterUnsafe, StoreRegisterUnsafe};

/// CR3: Page Directory Base Register (32-bit paging, no PAE).
///
/// Holds the physical base of the active page directory. Writing CR3 flushes
/// every non-global TLB entry.
#[bitfield(u32)]
pub struct Cr3 {
    /// Bits 0–2: Ignored.
    #[bits(3)]
    pub reserved0: u8,

    /// Bit 3 (PWT): write-through for directory accesses.
    pub pwt: bool,

    /// Bit 4 (PCD): cache disable for directory accesses.
    pub pcd: bool,

    /// Bits 5–11: Ignored.
    #[bits(7)]
    pub reserved1: u8,

    /// Bits 12–31: Page directory physical base >> 12.
    #[bits(20)]
    directory_base_4k: u32,
}

impl Cr3 {
    /// Create a `Cr3` value pointing at the page directory at `directory`.
    ///
    /// `directory` must be 4 KiB-aligned.
    #[must_use]
    pub fn from_directory_phys(directory: PhysicalAddress) -> Self {
        debug_assert_eq!(directory.as_u32() & 0xFFF, 0, "page directory must be 4K-aligned");
        Self::new().with_directory_base_4k(directory.as_u32() >> 12)
    }

    /// Physical address of the page directory.
    #[must_use]
    pub fn page_directory_base(&self) -> PhysicalAddress {
        PhysicalAddress::new(self.directory_base_4k() << 12)
    }
}

#[cfg(all(feature = "asm", target_arch = "x86"))]
impl LoadRegisterUnsafe for Cr3 {
    #[inline(always)]
    unsafe fn load_unsafe() -> Self {
        let cr3: u32;
        unsafe {
            core::arch::asm!("mov {}, cr3", out(reg) cr3, options(nomem, nostack, preserves_flags));
        }
        Self::from_bits(cr3)
    }
}

#[cfg(all(feature = "asm", target_arch = "x86"))]
impl StoreRegisterUnsafe for Cr3 {
    #[inline(always)]
    unsafe fn store_unsafe(self) {
        let cr3 = self.into_bits();
        unsafe {
            core::arch::asm!("mov cr3, {}", in(reg) cr3, options(nostack, preserves_flags));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directory_base_keeps_page_frame_bits() {
        let cr3 = Cr3::from_directory_phys(PhysicalAddress::new(0x0012_3000));
        assert_eq!(cr3.into_bits(), 0x0012_3000);
        assert_eq!(cr3.page_directory_base().as_u32(), 0x0012_3000);
    }

    #[test]
    fn flag_bits_do_not_leak_into_base() {
        let cr3 = Cr3::from_bits(0x0040_0018);
        assert!(cr3.pwt());
        assert!(cr3.pcd());
        assert_eq!(cr3.page_directory_base().as_u32(), 0x0040_0000);
    }
}
