use crate::PortIo;
use core::fmt;

/// Base I/O port of the first serial controller.
pub const COM1: u16 = 0x3F8;

const DATA: u16 = 0;
const INTERRUPT_ENABLE: u16 = 1;
const FIFO_CONTROL: u16 = 2;
const LINE_CONTROL: u16 = 3;
const MODEM_CONTROL: u16 = 4;
const LINE_STATUS: u16 = 5;

/// LSR bit 5: transmit holding register empty.
const LSR_THR_EMPTY: u8 = 1 << 5;

/// Transmit-only driver for a 16550-compatible UART.
pub struct Uart<P: PortIo> {
    base: u16,
    ports: P,
}

impl<P: PortIo> Uart<P> {
    #[must_use]
    pub const fn new(base: u16, ports: P) -> Self {
        Self { base, ports }
    }

    #[inline]
    fn out(&mut self, reg: u16, value: u8) {
        self.ports.write_u8(self.base + reg, value);
    }

    /// Program divisor 3 (38400 baud), 8N1, FIFOs with a 14-byte threshold,
    /// and assert DTR/RTS/OUT2. Device interrupts stay off.
    pub fn init(&mut self) {
        self.out(INTERRUPT_ENABLE, 0x00);
        self.out(LINE_CONTROL, 0x80);
        self.out(DATA, 0x03);
        self.out(INTERRUPT_ENABLE, 0x00);
        self.out(LINE_CONTROL, 0x03);
        self.out(FIFO_CONTROL, 0xC7);
        self.out(MODEM_CONTROL, 0x0B);
    }

    #[inline]
    pub fn is_transmit_empty(&mut self) -> bool {
        self.ports.read_u8(self.base + LINE_STATUS) & LSR_THR_EMPTY != 0
    }

    /// Blocks until the transmitter accepts the byte.
    pub fn write_byte(&mut self, byte: u8) {
        while !self.is_transmit_empty() {
            core::hint::spin_loop();
        }
        self.out(DATA, byte);
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.write_byte(b);
        }
    }

    #[cfg(test)]
    pub(crate) const fn ports(&self) -> &P {
        &self.ports
    }
}

impl<P: PortIo> fmt::Write for Uart<P> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.write_bytes(s.as_bytes());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::fmt::Write;

    #[derive(Default)]
    struct Recorder {
        writes: Vec<(u16, u8)>,
        busy_polls: usize,
    }

    impl PortIo for Recorder {
        fn write_u8(&mut self, port: u16, value: u8) {
            self.writes.push((port, value));
        }

        fn read_u8(&mut self, _port: u16) -> u8 {
            if self.busy_polls > 0 {
                self.busy_polls -= 1;
                0
            } else {
                LSR_THR_EMPTY
            }
        }
    }

    #[test]
    fn init_programs_com1() {
        let mut uart = Uart::new(COM1, Recorder::default());
        uart.init();
        assert_eq!(
            uart.ports().writes,
            vec![
                (0x3F9, 0x00),
                (0x3FB, 0x80),
                (0x3F8, 0x03),
                (0x3F9, 0x00),
                (0x3FB, 0x03),
                (0x3FA, 0xC7),
                (0x3FC, 0x0B),
            ]
        );
    }

    #[test]
    fn write_waits_for_transmitter() {
        let mut uart = Uart::new(COM1, Recorder {
            busy_polls: 3,
            ..Recorder::default()
        });
        write!(uart, "ok").unwrap();
        assert_eq!(uart.ports().busy_polls, 0);
        assert_eq!(uart.ports().writes, vec![(COM1, b'o'), (COM1, b'k')]);
    }
}
