/// Byte-wide access to the x86 I/O port space.
pub trait PortIo {
    fn write_u8(&mut self, port: u16, value: u8);
    fn read_u8(&mut self, port: u16) -> u8;
}

/// `in`/`out` on the executing CPU.
///
/// On anything but bare-metal x86 the port space does not exist: writes are
/// dropped and reads return `0xFF` (a floating bus), which the UART reads as
/// "transmitter ready".
#[derive(Debug, Default, Copy, Clone)]
pub struct CpuPorts;

impl PortIo for CpuPorts {
    #[inline]
    fn write_u8(&mut self, port: u16, value: u8) {
        #[cfg(all(target_arch = "x86", target_os = "none"))]
        unsafe {
            core::arch::asm!(
                "out dx, al",
                in("dx") port,
                in("al") value,
                options(nomem, nostack, preserves_flags)
            );
        }
        #[cfg(not(all(target_arch = "x86", target_os = "none")))]
        let _ = (port, value);
    }

    #[inline]
    fn read_u8(&mut self, port: u16) -> u8 {
        #[cfg(all(target_arch = "x86", target_os = "none"))]
        {
            let value: u8;
            unsafe {
                core::arch::asm!(
                    "in al, dx",
                    out("al") value,
                    in("dx") port,
                    options(nomem, nostack, preserves_flags)
                );
            }
            value
        }
        #[cfg(not(all(target_arch = "x86", target_os = "none")))]
        {
            let _ = port;
            0xFF
        }
    }
}
