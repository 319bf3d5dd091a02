use crate::memory::{HIGH_HALF_STACK_CAPACITY, KERNEL_VMA, PAGE_SIZE};
use kernel_memory_addresses::{PhysicalAddress, VirtualAddress, align_up};

/// Physical placement of the higher-half part of the kernel image.
///
/// `phys_base` is where the higher-half sections start (right after the
/// bootstrap section, page aligned) and `phys_end` one past their last byte.
/// The bootstrap kernel table maps `phys_base` to [`KERNEL_VMA`].
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct KernelImage {
    phys_base: PhysicalAddress,
    phys_end: PhysicalAddress,
}

impl KernelImage {
    /// # Panics
    /// In debug builds, if `phys_base` is not page aligned or `phys_end` precedes it.
    #[must_use]
    pub const fn new(phys_base: PhysicalAddress, phys_end: PhysicalAddress) -> Self {
        debug_assert!(phys_base.as_u32().is_multiple_of(PAGE_SIZE));
        debug_assert!(phys_end.as_u32() >= phys_base.as_u32());
        Self { phys_base, phys_end }
    }

    #[must_use]
    pub const fn phys_base(&self) -> PhysicalAddress {
        self.phys_base
    }

    #[must_use]
    pub const fn phys_end(&self) -> PhysicalAddress {
        self.phys_end
    }

    /// Higher-half address of a physical address inside the kernel image.
    ///
    /// ```
    /// # use kernel_info::KernelImage;
    /// # use kernel_memory_addresses::{PhysicalAddress, VirtualAddress};
    /// let image = KernelImage::new(PhysicalAddress::new(0x0010_3000), PhysicalAddress::new(0x0012_0000));
    /// assert_eq!(image.phys_to_virt(PhysicalAddress::new(0x0010_3010)), VirtualAddress::new(0xC000_0010));
    /// ```
    #[must_use]
    pub const fn phys_to_virt(&self, pa: PhysicalAddress) -> VirtualAddress {
        VirtualAddress::new(pa.as_u32() - self.phys_base.as_u32() + KERNEL_VMA)
    }

    /// Inverse of [`phys_to_virt`](Self::phys_to_virt).
    #[must_use]
    pub const fn virt_to_phys(&self, va: VirtualAddress) -> PhysicalAddress {
        PhysicalAddress::new(va.as_u32() - KERNEL_VMA + self.phys_base.as_u32())
    }

    /// Bytes occupied by the higher-half sections.
    #[must_use]
    pub const fn len(&self) -> u32 {
        self.phys_end.as_u32() - self.phys_base.as_u32()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Lowest address of the higher-half stack, directly after the image.
    #[must_use]
    pub const fn high_half_stack_base(&self) -> VirtualAddress {
        VirtualAddress::new(KERNEL_VMA + self.len())
    }

    /// Initial `ESP` after the stack relocation.
    #[must_use]
    pub const fn high_half_stack_top(&self) -> VirtualAddress {
        VirtualAddress::new(self.high_half_stack_base().as_u32() + HIGH_HALF_STACK_CAPACITY)
    }

    /// End of the physical kernel footprint (image plus stack), page aligned.
    #[must_use]
    pub const fn reserved_physical_end(&self) -> PhysicalAddress {
        PhysicalAddress::new(align_up(self.phys_end.as_u32() + HIGH_HALF_STACK_CAPACITY, PAGE_SIZE))
    }

    /// Whether image and stack fit into the single 4 MiB kernel table.
    #[must_use]
    pub const fn fits_kernel_table(&self) -> bool {
        self.reserved_physical_end().as_u32() - self.phys_base.as_u32()
            <= crate::memory::DIRECTORY_ENTRY_SPAN
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image() -> KernelImage {
        KernelImage::new(PhysicalAddress::new(0x0010_3000), PhysicalAddress::new(0x0013_8420))
    }

    #[test]
    fn conversions_are_inverse() {
        let img = image();
        let pa = PhysicalAddress::new(0x0011_0004);
        assert_eq!(img.virt_to_phys(img.phys_to_virt(pa)), pa);
        assert_eq!(img.phys_to_virt(img.phys_base()), VirtualAddress::new(KERNEL_VMA));
    }

    #[test]
    fn stack_sits_behind_the_image() {
        let img = image();
        assert_eq!(img.high_half_stack_base().as_u32(), 0xC003_5420);
        assert_eq!(img.high_half_stack_top().as_u32(), 0xC003_5420 + 0x3_FFFC);
        assert_eq!(img.reserved_physical_end().as_u32(), 0x0017_9000);
        assert!(img.fits_kernel_table());
    }

    #[test]
    fn high_half_stack_holds_the_whole_bootstrap_stack() {
        use crate::memory::{BOOTSTRAP_STACK_BASE, BOOTSTRAP_STACK_TOP};
        let img = image();
        let capacity = img.high_half_stack_top().as_u32() - img.high_half_stack_base().as_u32();
        assert_eq!(capacity, BOOTSTRAP_STACK_TOP - BOOTSTRAP_STACK_BASE);
    }
}
