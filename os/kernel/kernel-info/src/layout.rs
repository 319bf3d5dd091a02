use crate::memory::{
    HEAP_END, HEAP_START, PAGE_SIZE, SCRATCH_PAGE, VGA_PHYS_END, VGA_PHYS_START, VGA_VIRT_START,
};
use kernel_memory_addresses::{PhysicalAddress, VirtualAddress};
use utils_accessors_derive::Accessors;

/// The tunable part of the address-space layout.
///
/// The higher-half stack is not part of it: its size is tied to the
/// bootstrap stack it is copied from (see [`KernelImage`](crate::KernelImage)).
///
/// The kernel runs with [`MemoryLayout::DEFAULT`]; tests shrink the heap to
/// a handful of pages through the generated `with_*` builders.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Accessors)]
pub struct MemoryLayout {
    /// First byte of the heap window.
    heap_start: VirtualAddress,
    /// One past the last byte of the heap window.
    heap_end: VirtualAddress,
    /// Page reserved for the physical window.
    scratch_page: VirtualAddress,
    /// First byte of the VGA window.
    vga_phys_start: PhysicalAddress,
    /// Last byte of the VGA window (inclusive).
    vga_phys_end: PhysicalAddress,
    /// Where the VGA window is aliased.
    vga_virt_start: VirtualAddress,
}

impl MemoryLayout {
    pub const DEFAULT: Self = Self {
        heap_start: VirtualAddress::new(HEAP_START),
        heap_end: VirtualAddress::new(HEAP_END),
        scratch_page: VirtualAddress::new(SCRATCH_PAGE),
        vga_phys_start: PhysicalAddress::new(VGA_PHYS_START),
        vga_phys_end: PhysicalAddress::new(VGA_PHYS_END),
        vga_virt_start: VirtualAddress::new(VGA_VIRT_START),
    };

    /// Heap size in bytes.
    #[must_use]
    pub const fn heap_len(&self) -> u32 {
        self.heap_end.as_u32() - self.heap_start.as_u32()
    }

    /// Pages needed to back the whole heap.
    #[must_use]
    pub const fn heap_pages(&self) -> u32 {
        self.heap_len().div_ceil(PAGE_SIZE)
    }

    /// Pages spanned by the VGA window.
    #[must_use]
    pub const fn vga_pages(&self) -> u32 {
        (self.vga_phys_end.as_u32() - self.vga_phys_start.as_u32()).div_ceil(PAGE_SIZE)
    }
}

impl Default for MemoryLayout {
    fn default() -> Self {
        Self::DEFAULT
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_heap_is_sixteen_mib() {
        let layout = MemoryLayout::default();
        assert_eq!(layout.heap_len(), 16 * 1024 * 1024);
        assert_eq!(layout.heap_pages(), 4096);
    }

    #[test]
    fn vga_window_is_thirty_two_pages() {
        assert_eq!(MemoryLayout::DEFAULT.vga_pages(), 32);
    }

    #[test]
    fn builders_only_touch_their_field() {
        let small =
            MemoryLayout::DEFAULT.with_heap_end(VirtualAddress::new(HEAP_START + 4 * PAGE_SIZE));
        assert_eq!(small.heap_pages(), 4);
        assert_eq!(small.heap_start(), MemoryLayout::DEFAULT.heap_start());
        assert_eq!(small.scratch_page(), MemoryLayout::DEFAULT.scratch_page());
    }
}
