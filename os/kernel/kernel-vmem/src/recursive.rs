use crate::info::{PAGE_SIZE, RECURSIVE_DIRECTORY, RECURSIVE_SLOT, RECURSIVE_TABLES};
use crate::page_table::pd::PdIndex;
use kernel_memory_addresses::VirtualAddress;

/// Address arithmetic for the self-map in directory slot 1023.
///
/// ```
/// # use kernel_vmem::{RecursiveMapping, PdIndex};
/// # use kernel_memory_addresses::VirtualAddress;
/// assert_eq!(RecursiveMapping::directory().as_u32(), 0xFFFF_F000);
/// assert_eq!(RecursiveMapping::table(PdIndex::new(768)).as_u32(), 0xFFF0_0000);
/// assert_eq!(
///     RecursiveMapping::pte_address(VirtualAddress::new(0xD000_1000)).as_u32(),
///     0xFFF4_0004
/// );
/// ```
#[derive(Debug, Copy, Clone)]
pub struct RecursiveMapping;

impl RecursiveMapping {
    pub const SLOT: PdIndex = PdIndex::new(RECURSIVE_SLOT as u16);

    /// The active page directory.
    #[inline]
    #[must_use]
    pub const fn directory() -> VirtualAddress {
        VirtualAddress::new(RECURSIVE_DIRECTORY)
    }

    /// The page table behind directory slot `pd`.
    #[inline]
    #[must_use]
    pub const fn table(pd: PdIndex) -> VirtualAddress {
        VirtualAddress::new(RECURSIVE_TABLES + (pd.as_usize() as u32) * PAGE_SIZE)
    }

    /// The PTE that maps `va`.
    #[inline]
    #[must_use]
    pub const fn pte_address(va: VirtualAddress) -> VirtualAddress {
        VirtualAddress::new(RECURSIVE_TABLES + (va.as_u32() >> 12) * 4)
    }

    /// The PDE that covers `va`.
    #[inline]
    #[must_use]
    pub const fn pde_address(va: VirtualAddress) -> VirtualAddress {
        VirtualAddress::new(RECURSIVE_DIRECTORY + (va.as_u32() >> 22) * 4)
    }

    /// Whether `va` lies in the window the self-map occupies.
    #[inline]
    #[must_use]
    pub const fn contains(va: VirtualAddress) -> bool {
        va.as_u32() >= RECURSIVE_TABLES
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pte_address_agrees_with_table_view() {
        let va = VirtualAddress::new(0xC10A_3000);
        let table = RecursiveMapping::table(PdIndex::from(va));
        let idx = u32::from(va.table_index());
        assert_eq!(RecursiveMapping::pte_address(va).as_u32(), table.as_u32() + idx * 4);
    }

    #[test]
    fn directory_is_table_of_the_recursive_slot() {
        assert_eq!(RecursiveMapping::table(RecursiveMapping::SLOT), RecursiveMapping::directory());
        assert_eq!(
            RecursiveMapping::pde_address(VirtualAddress::new(0xC000_0000)).as_u32(),
            0xFFFF_FC00
        );
    }
}
