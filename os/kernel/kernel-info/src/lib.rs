//! # Kernel Memory Configuration
//!
//! Single source of truth for the 32-bit address-space layout shared by the
//! boot code, the paging layer, the allocators and the linker script.
//!
//! ```text
//! Virtual address space (4 GiB):
//!
//! 0x0000_0000 ┌───────────────────────────────┐
//!             │ identity map of the low 4 MiB │  bootstrap only, removed
//!             │ (bootstrap code, old stack)   │  by the high-half switch
//! 0x0040_0000 ├───────────────────────────────┤
//!             │           unused              │
//! KERNEL_VMA  ├───────────────────────────────┤ 0xC000_0000 (slot 768)
//!             │ kernel image + high-half stack│
//! VGA alias   ├───────────────────────────────┤ 0xC10A_0000 (slot 772)
//!             │ VGA window 0xA0000..0xBFFFF   │
//! HEAP_START  ├───────────────────────────────┤ 0xD000_0000
//!             │ kernel heap (16 MiB)          │
//! HEAP_END    ├───────────────────────────────┤ 0xD100_0000
//!             │           unused              │
//! fixmap      ├───────────────────────────────┤ 0xFF80_0000 (slot 1022)
//!             │ scratch page at 0xFFBF_F000   │
//! recursive   ├───────────────────────────────┤ 0xFFC0_0000 (slot 1023)
//!             │ all page tables, then the     │
//!             │ directory at 0xFFFF_F000      │
//! 0xFFFF_FFFF └───────────────────────────────┘
//! ```
//!
//! * [`memory`]: compile-time constants with layout assertions.
//! * [`MemoryLayout`]: the runtime-tunable subset as a `Copy` value.
//! * [`KernelImage`]: where the linker placed the kernel, and the
//!   physical/virtual conversions derived from it.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![deny(unsafe_code)]

mod image;
mod layout;
pub mod memory;

pub use image::KernelImage;
pub use layout::MemoryLayout;
