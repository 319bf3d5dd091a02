//! Interrupt masking.
//!
//! On bare-metal IA-32 the guard toggles `EFLAGS.IF` with `cli`/`sti`. Hosted
//! builds (unit tests) have no interrupt flag to manage and report interrupts
//! as already disabled, which turns [`IrqGuard`] into a no-op.

use core::ops::{Deref, DerefMut};

use crate::{SpinLock, SpinLockGuard};

/// Disables hardware interrupts (`cli`).
///
/// Must only be called where `cli` is permitted (CPL 0).
#[inline(always)]
pub fn cli_stop_interrupts() {
    #[cfg(all(target_arch = "x86", target_os = "none"))]
    unsafe {
        core::arch::asm!("cli", options(nomem, nostack));
    }
}

/// Enables hardware interrupts (`sti`).
#[inline(always)]
pub fn sti_enable_interrupts() {
    #[cfg(all(target_arch = "x86", target_os = "none"))]
    unsafe {
        core::arch::asm!("sti", options(nomem, nostack));
    }
}

/// Whether `EFLAGS.IF` is currently set.
#[inline(always)]
#[must_use]
pub fn interrupts_enabled() -> bool {
    #[cfg(all(target_arch = "x86", target_os = "none"))]
    {
        use kernel_registers::LoadRegister;
        kernel_registers::eflags::Eflags::load().if_interrupt_enable()
    }
    #[cfg(not(all(target_arch = "x86", target_os = "none")))]
    {
        false
    }
}

/// RAII guard that disables interrupts on creation and restores them on drop.
///
/// Snapshots `EFLAGS.IF`; if interrupts were enabled, executes `cli`. On drop,
/// `sti` runs **only** if they were enabled before, so guards nest.
pub struct IrqGuard {
    were_enabled: bool,
}

impl Default for IrqGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl IrqGuard {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        let enabled = interrupts_enabled();
        if enabled {
            cli_stop_interrupts();
        }
        Self {
            were_enabled: enabled,
        }
    }

    /// Whether dropping this guard re-enables interrupts.
    #[inline]
    #[must_use]
    pub const fn restores_interrupts(&self) -> bool {
        self.were_enabled
    }
}

impl Drop for IrqGuard {
    fn drop(&mut self) {
        if self.were_enabled {
            sti_enable_interrupts();
        }
    }
}

/// A [`SpinLockGuard`] that also keeps interrupts disabled while held.
///
/// Field order matters: the lock is released before interrupts come back, so
/// a handler can never observe the lock held by the code it interrupted.
pub struct IrqSpinGuard<'a, T> {
    guard: SpinLockGuard<'a, T>,
    _irq: IrqGuard,
}

impl<T> SpinLock<T> {
    /// Masks interrupts, then spins for the lock.
    ///
    /// ```
    /// use kernel_sync::SpinLock;
    ///
    /// let counter = SpinLock::new(0_u32);
    /// {
    ///     let mut g = counter.lock_irq();
    ///     *g += 1;
    /// }
    /// assert_eq!(*counter.lock(), 1);
    /// ```
    #[inline]
    pub fn lock_irq(&self) -> IrqSpinGuard<'_, T> {
        let irq = IrqGuard::new();
        let guard = self.lock();
        IrqSpinGuard { guard, _irq: irq }
    }
}

impl<T> Deref for IrqSpinGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T> DerefMut for IrqSpinGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hosted_guard_never_reenables() {
        let g = IrqGuard::new();
        assert!(!g.restores_interrupts());
    }

    #[test]
    fn lock_irq_releases_on_drop() {
        let l = SpinLock::new(5_u8);
        {
            let g = l.lock_irq();
            assert_eq!(*g, 5);
            assert!(l.try_lock().is_none());
        }
        assert!(l.try_lock().is_some());
    }
}
