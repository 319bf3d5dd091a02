//! # Paging Structures
//!
//! Two levels: a [`PageDirectory`](pd::PageDirectory) of 1024 PDEs, each
//! pointing to a [`PageTable`](pt::PageTable) of 1024 PTEs.
//!
//! ```text
//! | 31‒22 | 21‒12 | 11‒0   |
//! |  PD   |  PT   | Offset |
//! ```

pub mod pd;
pub mod pt;

use crate::page_table::pd::PdIndex;
use crate::page_table::pt::PtIndex;
use kernel_memory_addresses::VirtualAddress;

/// Entries per directory or table.
pub const ENTRIES: usize = kernel_info::memory::ENTRIES_PER_TABLE;

#[inline]
#[must_use]
pub const fn split_indices(va: VirtualAddress) -> (PdIndex, PtIndex) {
    (PdIndex::from(va), PtIndex::from(va))
}

/// Inverse of [`split_indices`] for page-aligned addresses.
#[inline]
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub const fn join_indices(pd: PdIndex, pt: PtIndex) -> VirtualAddress {
    VirtualAddress::new(((pd.as_usize() as u32) << 22) | ((pt.as_usize() as u32) << 12))
}
