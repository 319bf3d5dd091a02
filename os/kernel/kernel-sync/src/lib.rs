//! # Kernel synchronization primitives
//!
//! The memory manager is a single shared context. It is reached through a
//! [`SpinLock`], and every mutation happens with interrupts masked via
//! [`SpinLock::lock_irq`].

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

pub mod irq;
mod spin_lock;
mod sync_once_cell;

pub use irq::{IrqGuard, IrqSpinGuard};
pub use spin_lock::{SpinLock, SpinLockGuard};
pub use sync_once_cell::SyncOnceCell;
