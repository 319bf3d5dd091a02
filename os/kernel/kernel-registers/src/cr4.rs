use bitfield_struct::bitfield;

#[cfg(all(feature = "asm", target_arch = "x86"))]
use crate::{LoadRegisterUnsafe, StoreRegisterUnsafe};

/// CR4: Control Register 4 (IA-32).
///
/// Only the bits relevant before long mode are modeled; the rest are reserved.
#[bitfield(u32, order = Lsb)]
pub struct Cr4 {
    /// Bit 0 (VME): Virtual-8086 Mode Extensions.
    pub vme: bool,

    /// Bit 1 (PVI): Protected-Mode Virtual Interrupts.
    pub pvi: bool,

    /// Bit 2 (TSD): Time Stamp Disable.
    pub tsd: bool,

    /// Bit 3 (DE): Debugging Extensions.
    pub de: bool,

    /// Bit 4 (PSE): Page Size Extensions (4 MiB directory entries).
    pub pse: bool,

    /// Bit 5 (PAE): Physical Address Extension. Always 0 here.
    pub pae: bool,

    /// Bit 6 (MCE): Machine-Check Enable.
    pub mce: bool,

    /// Bit 7 (PGE): Page Global Enable.
    ///
    /// Global entries survive CR3 reloads.
    pub pge: bool,

    /// Bit 8 (PCE): Performance-Monitoring Counter Enable.
    pub pce: bool,

    /// Bit 9: OSFXSR.
    pub osfxsr: bool,

    /// Bit 10: OSXMMEXCPT.
    pub osxmmexcpt: bool,

    #[bits(21, access = RO)]
    pub reserved: u32,
}

#[cfg(all(feature = "asm", target_arch = "x86"))]
impl LoadRegisterUnsafe for Cr4 {
    #[inline(always)]
    unsafe fn load_unsafe() -> Self {
        let cr4: u32;
        unsafe {
            core::arch::asm!("mov {}, cr4", out(reg) cr4, options(nomem, nostack, preserves_flags));
        }
        Self::from_bits(cr4)
    }
}

#[cfg(all(feature = "asm", target_arch = "x86"))]
impl StoreRegisterUnsafe for Cr4 {
    #[inline(always)]
    unsafe fn store_unsafe(self) {
        let cr4 = self.into_bits();
        unsafe {
            core::arch::asm!("mov cr4, {}", in(reg) cr4, options(nostack, preserves_flags));
        }
    }
}
