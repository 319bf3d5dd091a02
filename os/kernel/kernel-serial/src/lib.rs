//! # Serial Diagnostic Console
//!
//! Output side of a 16550 UART on COM1, used as the kernel's only diagnostic
//! channel. Under QEMU, `-serial stdio` routes it to the host terminal.
//!
//! ```text
//! log::info!(..) ──► SerialLogger ─┐
//!                                  ├─► serial_trace! ──► CONSOLE: Uart<CpuPorts> ──► COM1
//! Hex / HexDump adapters ──────────┘
//! ```
//!
//! ## Features
//!
//! * `enabled` (default): output reaches the UART. When disabled, every write
//!   compiles to nothing.
//!
//! Output is also a no-op on hosted targets, so crates can log freely from
//! code that runs under `cargo test`.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use kernel_serial::{Hex, SerialLogger};
//! use log::LevelFilter;
//!
//! kernel_serial::init_console();
//! SerialLogger::new(LevelFilter::Debug).init().ok();
//! log::info!("CR3 = {}", Hex(0x0010_2000_u32));
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

mod format;
mod logger;
mod port;
mod uart;

pub use format::{DecDump, DumpWord, Hex, HexDump};
pub use logger::SerialLogger;
pub use port::{CpuPorts, PortIo};
pub use uart::{COM1, Uart};

#[doc(hidden)]
pub mod serial_fmt {
    use core::fmt;

    #[cfg(feature = "enabled")]
    use crate::{COM1, CpuPorts, Uart};
    #[cfg(feature = "enabled")]
    use kernel_sync::SpinLock;

    #[cfg(feature = "enabled")]
    pub(crate) static CONSOLE: SpinLock<Uart<CpuPorts>> = SpinLock::new(Uart::new(COM1, CpuPorts));

    #[cfg(feature = "enabled")]
    #[doc(hidden)]
    pub fn serial_write(args: fmt::Arguments) {
        let mut uart = CONSOLE.lock_irq();
        // Best-effort debug output.
        let _ = fmt::write(&mut *uart, args);
    }

    #[cfg(not(feature = "enabled"))]
    #[doc(hidden)]
    #[inline(always)]
    #[allow(clippy::inline_always)]
    pub const fn serial_write(_: fmt::Arguments) {}
}

/// Program COM1 (38400 baud, 8N1, FIFO on). Call once, before the first log line.
pub fn init_console() {
    #[cfg(feature = "enabled")]
    serial_fmt::CONSOLE.lock_irq().init();
}

/// Format straight to the serial console, bypassing the `log` facade.
#[macro_export]
macro_rules! serial_trace {
    ($($arg:tt)*) => {{
        $crate::serial_fmt::serial_write(core::format_args!($($arg)*));
    }};
}
