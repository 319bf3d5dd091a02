//! Formatting adapters for diagnostic output.
//!
//! Decimal uses plain `Display` and binary uses `{:b}`; these cover the
//! fixed-width hex and whole-array forms.

use core::fmt;

mod sealed {
    pub trait Sealed {}
    impl Sealed for u8 {}
    impl Sealed for u16 {}
    impl Sealed for u32 {}
    impl Sealed for u64 {}
}

/// Unsigned integers that can be dumped at their natural width.
pub trait DumpWord: sealed::Sealed + Copy + fmt::UpperHex + fmt::Display {
    /// Hex digits needed for the full width.
    const NIBBLES: usize;
}

impl DumpWord for u8 {
    const NIBBLES: usize = 2;
}
impl DumpWord for u16 {
    const NIBBLES: usize = 4;
}
impl DumpWord for u32 {
    const NIBBLES: usize = 8;
}
impl DumpWord for u64 {
    const NIBBLES: usize = 16;
}

/// Zero-padded, upper-case hex at the width of `T`, without a prefix.
///
/// ```
/// use kernel_serial::Hex;
/// assert_eq!(format!("{}", Hex(0xB8_u16)), "00B8");
/// assert_eq!(format!("{}", Hex(0xC000_0000_u32)), "C0000000");
/// ```
#[derive(Copy, Clone)]
pub struct Hex<T: DumpWord>(pub T);

impl<T: DumpWord> fmt::Display for Hex<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:0width$X}", self.0, width = T::NIBBLES)
    }
}

/// Every element as `0x..` followed by `", "`.
///
/// ```
/// use kernel_serial::HexDump;
/// assert_eq!(format!("{}", HexDump(&[1_u8, 0xFF])), "0x01, 0xFF, ");
/// ```
#[derive(Copy, Clone)]
pub struct HexDump<'a, T: DumpWord>(pub &'a [T]);

impl<T: DumpWord> fmt::Display for HexDump<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &v in self.0 {
            write!(f, "0x{}, ", Hex(v))?;
        }
        Ok(())
    }
}

/// Every element in decimal followed by `", "`.
#[derive(Copy, Clone)]
pub struct DecDump<'a, T: DumpWord>(pub &'a [T]);

impl<T: DumpWord> fmt::Display for DecDump<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for v in self.0 {
            write!(f, "{v}, ")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_pads_to_type_width() {
        assert_eq!(Hex(0_u8).to_string(), "00");
        assert_eq!(Hex(0xABC_u32).to_string(), "00000ABC");
        assert_eq!(Hex(u64::MAX).to_string(), "FFFFFFFFFFFFFFFF");
    }

    #[test]
    fn dumps_use_trailing_separator() {
        assert_eq!(HexDump(&[0x1234_u16, 0x5]).to_string(), "0x1234, 0x0005, ");
        assert_eq!(DecDump(&[0_u32, 42, 7]).to_string(), "0, 42, 7, ");
        assert_eq!(HexDump::<u8>(&[]).to_string(), "");
    }
}
