//! # Word Order Handling
//!
//! 32-bit values span two consecutive 16-bit registers. Each register is
//! always big-endian on the wire; devices differ only in which register
//! carries the high half.
//!
//! For the 32-bit value `0x12345678`:
//! - `HighFirst (ABCD)`: registers \[0x1234, 0x5678\]
//! - `LowFirst (CDAB)`: registers \[0x5678, 0x1234\]

use std::fmt;

/// Order of the two 16-bit words of a 32-bit value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum WordOrder {
    /// High word at the lower address (ABCD)
    #[default]
    HighFirst,
    /// Low word at the lower address (CDAB)
    LowFirst,
}

impl WordOrder {
    /// Map a descriptor's `word_swap` flag.
    #[inline]
    pub fn from_word_swap(word_swap: bool) -> Self {
        if word_swap {
            Self::LowFirst
        } else {
            Self::HighFirst
        }
    }

    /// Combine two registers in wire order into a 32-bit pattern.
    #[inline]
    pub fn combine(self, regs: [u16; 2]) -> u32 {
        let (hi, lo) = match self {
            Self::HighFirst => (regs[0], regs[1]),
            Self::LowFirst => (regs[1], regs[0]),
        };
        (u32::from(hi) << 16) | u32::from(lo)
    }

    /// Split a 32-bit pattern into two registers in wire order.
    #[inline]
    pub fn split(self, value: u32) -> [u16; 2] {
        let hi = (value >> 16) as u16;
        let lo = value as u16;
        match self {
            Self::HighFirst => [hi, lo],
            Self::LowFirst => [lo, hi],
        }
    }
}

impl fmt::Display for WordOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HighFirst => write!(f, "ABCD"),
            Self::LowFirst => write!(f, "CDAB"),
        }
    }
}
