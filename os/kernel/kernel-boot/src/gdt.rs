//! # Global Descriptor Table
//!
//! 32-bit protected-mode segment descriptors and the one-time move of the
//! firmware's GDT into kernel-owned storage.
//!
//! The loader leaves the GDT wherever it built it, usually low memory that
//! stops being mapped once the permanent directory is active. Before that,
//! the kernel snapshots it with `sgdt`, copies the entries into a static
//! [`GdtCopy`] and points GDTR at the copy.
//!
//! ```text
//!  63      56 55 54 53 52 51   48 47 46 45 44 43  40 39      32
//! +----------+--+--+--+--+-------+--+-----+--+------+----------+
//! | base hi  |G |DB|L |AV|lim hi |P | DPL |S | type | base mid |
//! +----------+--+--+--+--+-------+--+-----+--+------+----------+
//!  31                      16 15                               0
//! +--------------------------+---------------------------------+
//! |        base lo           |            limit lo             |
//! +--------------------------+---------------------------------+
//! ```

use bitfield_struct::bitfield;

/// Kernel code selector used by the loader's flat GDT.
pub const KERNEL_CODE_SELECTOR: u16 = 0x08;

/// Kernel data selector used by the loader's flat GDT.
pub const KERNEL_DATA_SELECTOR: u16 = 0x10;

/// Descriptors kept by [`GdtCopy`].
pub const MAX_DESCRIPTORS: usize = 16;

/// Types of system descriptors (`S = 0`).
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[repr(u8)]
pub enum SystemType {
    Tss16Available = 1,
    Ldt = 2,
    Tss16Busy = 3,
    CallGate16 = 4,
    TaskGate = 5,
    InterruptGate16 = 6,
    TrapGate16 = 7,
    Tss32Available = 9,
    Tss32Busy = 11,
    CallGate32 = 12,
    InterruptGate32 = 14,
    TrapGate32 = 15,
}

#[bitfield(u64)]
#[derive(Eq, PartialEq)]
pub struct SegmentDescriptor {
    pub limit_lo: u16,
    pub base_lo: u16,
    pub base_mid: u8,
    /// For code: executable, conforming, readable, accessed (bits 3..0).
    /// For data: 0, expand-down, writable, accessed.
    #[bits(4)]
    pub typ: u8,
    /// Code/data (1) or system (0).
    pub s: bool,
    #[bits(2)]
    pub dpl: u8,
    pub present: bool,
    #[bits(4)]
    pub limit_hi: u8,
    pub avl: bool,
    pub long_mode: bool,
    /// 32-bit default operand size.
    pub db: bool,
    /// Limit counts 4 KiB units.
    pub granularity: bool,
    pub base_hi: u8,
}

impl SegmentDescriptor {
    pub const NULL: Self = Self::new();

    /// Ring 0, 32-bit, page-granular code segment.
    #[must_use]
    pub const fn code(base: u32, limit: u32, conforming: bool, readable: bool) -> Self {
        let typ = 0b1000 | ((conforming as u8) << 2) | ((readable as u8) << 1);
        Self::new()
            .with_typ(typ)
            .with_s(true)
            .with_present(true)
            .with_db(true)
            .with_granularity(true)
            .with_base(base)
            .with_limit(limit)
    }

    /// Ring 0, 32-bit, page-granular data segment.
    #[must_use]
    pub const fn data(base: u32, limit: u32, expand_down: bool, writable: bool) -> Self {
        let typ = ((expand_down as u8) << 2) | ((writable as u8) << 1);
        Self::new()
            .with_typ(typ)
            .with_s(true)
            .with_present(true)
            .with_db(true)
            .with_granularity(true)
            .with_base(base)
            .with_limit(limit)
    }

    /// Ring 0 system descriptor with a byte-granular limit.
    #[must_use]
    pub const fn system(base: u32, limit: u32, ty: SystemType) -> Self {
        Self::new()
            .with_typ(ty as u8)
            .with_present(true)
            .with_base(base)
            .with_limit(limit)
    }

    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn with_base(self, base: u32) -> Self {
        self.with_base_lo(base as u16)
            .with_base_mid((base >> 16) as u8)
            .with_base_hi((base >> 24) as u8)
    }

    /// Only the low 20 bits of `limit` are kept.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn with_limit(self, limit: u32) -> Self {
        self.with_limit_lo(limit as u16)
            .with_limit_hi(((limit >> 16) & 0xF) as u8)
    }

    pub const fn set_base(&mut self, base: u32) {
        *self = self.with_base(base);
    }

    pub const fn set_limit(&mut self, limit: u32) {
        *self = self.with_limit(limit);
    }

    #[must_use]
    pub const fn base(&self) -> u32 {
        self.base_lo() as u32 | (self.base_mid() as u32) << 16 | (self.base_hi() as u32) << 24
    }

    /// The raw 20-bit limit (not scaled by the granularity).
    #[must_use]
    pub const fn limit(&self) -> u32 {
        self.limit_lo() as u32 | (self.limit_hi() as u32) << 16
    }
}

const _: () = {
    assert!(size_of::<SegmentDescriptor>() == 8);
};

/// Operand of `lgdt`/`sgdt`.
#[repr(C, packed)]
#[derive(Debug, Copy, Clone, Default)]
pub struct DescriptorTablePointer {
    /// Size of the table minus one.
    pub limit: u16,
    pub base: u32,
}

impl DescriptorTablePointer {
    /// Number of whole descriptors the table covers.
    #[must_use]
    pub const fn entries(&self) -> usize {
        (self.limit as usize + 1) / size_of::<SegmentDescriptor>()
    }
}

/// Kernel-owned home of the global descriptor table.
#[repr(C, align(8))]
pub struct GdtCopy {
    entries: [SegmentDescriptor; MAX_DESCRIPTORS],
    len: usize,
}

impl Default for GdtCopy {
    fn default() -> Self {
        Self::new()
    }
}

impl GdtCopy {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: [SegmentDescriptor::NULL; MAX_DESCRIPTORS],
            len: 0,
        }
    }

    /// Copy `source`, keeping at most [`MAX_DESCRIPTORS`] entries.
    /// Returns how many were copied.
    pub fn copy_from(&mut self, source: &[SegmentDescriptor]) -> usize {
        let len = source.len().min(MAX_DESCRIPTORS);
        if len < source.len() {
            log::warn!("GDT has {} entries, keeping {len}", source.len());
        }
        self.entries[..len].copy_from_slice(&source[..len]);
        self.entries[len..].fill(SegmentDescriptor::NULL);
        self.len = len;
        len
    }

    #[must_use]
    pub fn entries(&self) -> &[SegmentDescriptor] {
        &self.entries[..self.len]
    }

    /// The `lgdt` operand for this table.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn pointer(&self) -> DescriptorTablePointer {
        DescriptorTablePointer {
            limit: (self.len * size_of::<SegmentDescriptor>()).saturating_sub(1) as u16,
            base: self.entries.as_ptr() as usize as u32,
        }
    }
}

#[cfg(all(target_arch = "x86", target_os = "none"))]
pub use self::cpu::{reload_into, store_gdt};

#[cfg(all(target_arch = "x86", target_os = "none"))]
mod cpu {
    use super::{
        DescriptorTablePointer, GdtCopy, KERNEL_CODE_SELECTOR, KERNEL_DATA_SELECTOR,
        SegmentDescriptor,
    };

    /// `sgdt`.
    #[must_use]
    pub fn store_gdt() -> DescriptorTablePointer {
        let mut ptr = DescriptorTablePointer::default();
        unsafe {
            core::arch::asm!("sgdt [{}]", in(reg) &raw mut ptr, options(nostack, preserves_flags));
        }
        ptr
    }

    /// Copy the active GDT into `copy`, load it and reload every segment register.
    ///
    /// # Safety
    /// Interrupts must be off. The active GDT must be readable at its base and
    /// contain flat kernel code and data descriptors at the usual selectors.
    pub unsafe fn reload_into(copy: &'static mut GdtCopy) {
        let current = store_gdt();
        let source = unsafe {
            core::slice::from_raw_parts(
                current.base as usize as *const SegmentDescriptor,
                current.entries(),
            )
        };
        copy.copy_from(source);

        let ptr = copy.pointer();
        unsafe {
            core::arch::asm!(
                "lgdt [{ptr}]",
                "mov ds, {data:x}",
                "mov es, {data:x}",
                "mov fs, {data:x}",
                "mov gs, {data:x}",
                "mov ss, {data:x}",
                "push {code}",
                "lea {tmp}, [2f]",
                "push {tmp}",
                "retf",
                "2:",
                ptr = in(reg) &raw const ptr,
                data = in(reg) u32::from(KERNEL_DATA_SELECTOR),
                code = in(reg) u32::from(KERNEL_CODE_SELECTOR),
                tmp = out(reg) _,
            );
        }
        log::debug!("GDT moved to {:#010x}", { ptr.base });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_segments_match_the_classic_encoding() {
        let code = SegmentDescriptor::code(0, 0xFFFFF, false, true);
        let data = SegmentDescriptor::data(0, 0xFFFFF, false, true);
        assert_eq!(code.into_bits(), 0x00CF_9A00_0000_FFFF);
        assert_eq!(data.into_bits(), 0x00CF_9200_0000_FFFF);
    }

    #[test]
    fn base_and_limit_are_scattered_and_gathered() {
        let mut d = SegmentDescriptor::data(0, 0, false, true);
        d.set_base(0xC012_3456);
        d.set_limit(0xABCDE);
        assert_eq!(d.base(), 0xC012_3456);
        assert_eq!(d.limit(), 0xABCDE);
        assert_eq!(d.base_hi(), 0xC0);
        assert_eq!(d.limit_hi(), 0xA);

        d.set_limit(0xFFF_FFFF);
        assert_eq!(d.limit(), 0xFFFFF);
    }

    #[test]
    fn type_bits_follow_the_flags() {
        assert_eq!(SegmentDescriptor::code(0, 0, true, false).typ(), 0b1100);
        assert_eq!(SegmentDescriptor::data(0, 0, true, false).typ(), 0b0100);
        let tss = SegmentDescriptor::system(0x1000, 0x67, SystemType::Tss32Available);
        assert!(!tss.s());
        assert!(!tss.granularity());
        assert_eq!(tss.typ(), 9);
        assert_eq!(tss.limit(), 0x67);
    }

    #[test]
    fn copy_keeps_entries_and_computes_limit() {
        let source = [
            SegmentDescriptor::NULL,
            SegmentDescriptor::code(0, 0xFFFFF, false, true),
            SegmentDescriptor::data(0, 0xFFFFF, false, true),
        ];
        let mut copy = GdtCopy::new();
        assert_eq!(copy.copy_from(&source), 3);
        assert_eq!(copy.entries(), &source);
        let ptr = copy.pointer();
        assert_eq!({ ptr.limit }, 23);
        assert_eq!(ptr.entries(), 3);
    }

    #[test]
    fn oversized_tables_are_truncated() {
        let source = [SegmentDescriptor::code(0, 0xFFFFF, false, true); MAX_DESCRIPTORS + 4];
        let mut copy = GdtCopy::new();
        assert_eq!(copy.copy_from(&source), MAX_DESCRIPTORS);
        assert_eq!(copy.entries().len(), MAX_DESCRIPTORS);
    }
}
