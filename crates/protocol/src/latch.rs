//! Latch registers and physical pin placement
//!
//! Latch ids used by the host software are logical; the firmware addresses
//! the registers through a different selector numbering. Logical latch 7 is
//! a virtual group with no register behind it.

use crate::error::{ProtocolError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of addressable latch ids (0-7)
pub const LATCH_COUNT: u8 = 8;

/// Virtual latch used for combined multi-device scan writes
pub const VIRTUAL_LATCH: LogicalLatch = LogicalLatch(7);

/// Logical latch identifier as used in the wiring table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LogicalLatch(pub u8);

impl LogicalLatch {
    /// Map to the selector nibble the firmware expects in the command byte
    ///
    /// Only latches 1, 2, 3, 4 and 7 are addressable by a latch write.
    pub fn physical_selector(self) -> Result<u8> {
        match self.0 {
            1 => Ok(1),
            2 => Ok(3),
            3 => Ok(0),
            4 => Ok(2),
            7 => Ok(7),
            other => Err(ProtocolError::InvalidLatch(other)),
        }
    }

    /// Reverse of [`physical_selector`](Self::physical_selector)
    pub fn from_physical_selector(selector: u8) -> Result<Self> {
        match selector {
            1 => Ok(Self(1)),
            3 => Ok(Self(2)),
            0 => Ok(Self(3)),
            2 => Ok(Self(4)),
            7 => Ok(Self(7)),
            other => Err(ProtocolError::InvalidLatch(other)),
        }
    }
}

impl fmt::Display for LogicalLatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "latch{}", self.0)
    }
}

/// Physical placement of one logical pin: a bit of a latch register
///
/// `mask` has every bit set except the pin's own, so a byte can be updated
/// with clear-then-set without touching bits owned by other pins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Wiring {
    latch: LogicalLatch,
    bit: u8,
    mask: u8,
}

impl Wiring {
    /// Create a wiring entry, rejecting ids outside the register file
    pub fn new(latch: LogicalLatch, bit: u8) -> Result<Self> {
        if latch.0 >= LATCH_COUNT {
            return Err(ProtocolError::InvalidLatch(latch.0));
        }
        if bit > 7 {
            return Err(ProtocolError::InvalidBitPosition(bit));
        }

        Ok(Self {
            latch,
            bit,
            mask: !(1u8 << bit),
        })
    }

    pub fn latch(&self) -> LogicalLatch {
        self.latch
    }

    pub fn bit(&self) -> u8 {
        self.bit
    }

    pub fn mask(&self) -> u8 {
        self.mask
    }

    /// Write `value` into this pin's bit of `byte`
    pub fn apply(&self, byte: u8, value: bool) -> u8 {
        (byte & self.mask) | ((value as u8) << self.bit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selector_table() {
        let expected = [(1, 1), (2, 3), (3, 0), (4, 2), (7, 7)];
        for (logical, physical) in expected {
            assert_eq!(LogicalLatch(logical).physical_selector().unwrap(), physical);
            assert_eq!(
                LogicalLatch::from_physical_selector(physical).unwrap(),
                LogicalLatch(logical)
            );
        }
    }

    #[test]
    fn test_selector_rejects_unmapped_latches() {
        for logical in [0u8, 5, 6, 8, 255] {
            assert_eq!(
                LogicalLatch(logical).physical_selector(),
                Err(ProtocolError::InvalidLatch(logical))
            );
        }
    }

    #[test]
    fn test_wiring_mask() {
        let wiring = Wiring::new(LogicalLatch(1), 3).unwrap();
        assert_eq!(wiring.mask(), !0x08);
        assert_eq!(wiring.bit(), 3);
        assert_eq!(wiring.latch(), LogicalLatch(1));
    }

    #[test]
    fn test_apply_sets_and_clears() {
        let wiring = Wiring::new(LogicalLatch(1), 3).unwrap();
        let set = wiring.apply(0x00, true);
        assert_eq!(set, 0x08);
        assert_eq!(wiring.apply(set, false), 0x00);
    }

    #[test]
    fn test_apply_keeps_other_bits() {
        let wiring = Wiring::new(LogicalLatch(2), 0).unwrap();
        assert_eq!(wiring.apply(0xF0, true), 0xF1);
        assert_eq!(wiring.apply(0xFF, false), 0xFE);
    }

    #[test]
    fn test_wiring_rejects_out_of_range() {
        assert_eq!(
            Wiring::new(LogicalLatch(8), 0),
            Err(ProtocolError::InvalidLatch(8))
        );
        assert_eq!(
            Wiring::new(LogicalLatch(1), 8),
            Err(ProtocolError::InvalidBitPosition(8))
        );
    }
}
