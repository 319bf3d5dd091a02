//! # Kernel Entry Point
//!
//! The i686 kernel image. A multiboot loader drops it at [`PHYS_LOAD`] in
//! protected mode with paging off and jumps to `_start`:
//!
//! ```text
//! _start (.bootstrap.text, physical)
//!   └─ bootstrap_paging        BootstrapTables::fill, enable_paging (inlined)
//! kernel_main (KERNEL_VMA)
//!   ├─ relocate_stack          onto the stack above the image
//!   └─ high_half_main
//!        ├─ gdt::reload_into
//!        ├─ build_permanent_directory
//!        ├─ serial console + logger
//!        └─ heap_init, #[global_allocator] attached
//! ```
//!
//! Host builds compile to an empty binary so the workspace builds and tests
//! on the development machine.
//!
//! [`PHYS_LOAD`]: kernel_info::memory::PHYS_LOAD

#![cfg_attr(all(target_arch = "x86", target_os = "none"), no_std, no_main)]
#![allow(unsafe_code)]

#[cfg(all(target_arch = "x86", target_os = "none"))]
extern crate alloc;

#[cfg(all(target_arch = "x86", target_os = "none"))]
mod entry;
#[cfg(all(target_arch = "x86", target_os = "none"))]
mod memory;

#[cfg(not(all(target_arch = "x86", target_os = "none")))]
fn main() {}
