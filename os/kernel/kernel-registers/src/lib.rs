//! # Typed IA-32 Control Registers
//!
//! Bitfield models of the registers the memory manager touches: `CR0` for the
//! paging switch, `CR3` for the page directory base, `CR4` for global pages and
//! `EFLAGS` for the interrupt flag.
//!
//! Register access instructions are only compiled for `target_arch = "x86"`
//! with the `asm` feature; on other targets the types remain plain bitfields.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

#[cfg(feature = "cr0")]
pub mod cr0;

#[cfg(feature = "cr3")]
pub mod cr3;

#[cfg(feature = "cr4")]
pub mod cr4;

#[cfg(feature = "eflags")]
pub mod eflags;

pub trait LoadRegisterUnsafe {
    /// # Safety
    /// The caller must uphold the implementation-specific safety requirements.
    /// For example, the register access might be privileged and require kernel mode (Ring 0).
    unsafe fn load_unsafe() -> Self;
}

pub trait StoreRegisterUnsafe {
    /// # Safety
    /// The caller must uphold the implementation-specific safety requirements.
    /// Writing a control register can change the meaning of every address in flight.
    unsafe fn store_unsafe(self);
}

pub trait LoadRegister {
    /// Loading this register is permitted at any privilege level.
    fn load() -> Self;
}

impl<T> LoadRegisterUnsafe for T
where
    T: LoadRegister,
{
    #[inline]
    unsafe fn load_unsafe() -> Self {
        <Self as LoadRegister>::load()
    }
}
