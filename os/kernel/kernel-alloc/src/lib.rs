//! # Kernel Memory Allocation
//!
//! Physical frames, the kernel heap, and the [`MemoryManager`] tying them to
//! the paging layer of `kernel-vmem`.
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │ MemoryManager (behind SpinLock::lock_irq)    │
//! │                                              │
//! │  BitmapFrameAlloc ──► PageTableManager       │
//! │        │                    │                │
//! │        └──── heap_init ─────┴──► Heap        │
//! └──────────────────────────────────────────────┘
//!                                      ▲
//!                           KernelHeap (GlobalAlloc)
//! ```
//!
//! ## Frames
//! [`BitmapFrameAlloc`] keeps one bit per 4 KiB frame over caller-provided
//! storage and resumes its scans at the last allocation.
//!
//! ## Heap
//! [`Heap`] is a best-fit, address-ordered free list with coalescing. It
//! never grows; [`MemoryManager::heap_init`] maps the whole window up front.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

mod error;
pub mod frame_alloc;
pub mod heap;
mod kernel_heap;
mod manager;

pub use crate::error::MemoryError;
pub use crate::frame_alloc::{BitmapFrameAlloc, FrameStats};
pub use crate::heap::{FreeBlock, Heap, HeapStats};
pub use crate::kernel_heap::{HeapSource, KernelHeap};
pub use crate::manager::MemoryManager;
