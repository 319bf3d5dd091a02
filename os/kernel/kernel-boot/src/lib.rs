//! # Kernel Boot Sequence
//!
//! Everything that runs exactly once between the loader's jump into the
//! kernel and the first heap allocation:
//!
//! 1. [`bootstrap`]: the first page directory and the switch to paging.
//! 2. [`stack`]: moving the running stack into the higher half.
//! 3. [`gdt`]: moving the descriptor table into kernel memory.
//! 4. [`high_half`]: the permanent directory without the identity slot.
//!
//! [`BootState`] tracks how far the sequence got. Before
//! [`BootPhase::Reporting`] there is no console, so contract violations in
//! these steps are preconditions of the `unsafe` entry points rather than
//! checked errors.
//!
//! The CPU-facing parts (`enable_paging`, `relocate_stack`, the GDT reload)
//! only exist on the bare-metal x86 target; the table and chain logic is
//! target independent and tested on the host.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

pub mod bootstrap;
mod error;
pub mod gdt;
pub mod high_half;
mod phase;
pub mod stack;

pub use crate::bootstrap::BootstrapTables;
pub use crate::error::BootError;
pub use crate::gdt::{DescriptorTablePointer, GdtCopy, SegmentDescriptor, SystemType};
pub use crate::high_half::{build_permanent_directory, reserve_boot_memory};
pub use crate::phase::{BootPhase, BootState};
pub use crate::stack::StackRelocation;
