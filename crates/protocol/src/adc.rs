//! ADC trigger command and reply decoding
//!
//! A single trigger command starts a conversion on both the magnitude and
//! phase ADCs. Its layout depends on the converter resolution:
//!
//! ```text
//! 16-bit chips:  [0xB2, 0x00, 0x01, 0x10, averaging]
//! other chips:   [0xB2, 0x01, 0x03, 0x0C, averaging]
//! ```
//!
//! The firmware answers with a fixed-size reply whose first eight bytes hold
//! the magnitude and phase readings as little-endian `u32` values.

use crate::error::{ProtocolError, Result};
use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

/// Command byte that triggers an ADC conversion
pub const ADC_TRIGGER_COMMAND: u8 = 0xB2;

/// Converter resolution class, which selects the trigger layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdcResolution {
    /// 16-bit serial converters (AD7685)
    Bits16,
    /// Every other supported converter
    Standard,
}

impl AdcResolution {
    /// Resolution-selector bytes following the command byte
    pub fn selector(self) -> &'static [u8] {
        match self {
            Self::Bits16 => &[0x00, 0x01, 0x10],
            Self::Standard => &[0x01, 0x03, 0x0C],
        }
    }

    /// Exact reply length the transport must return
    pub fn expected_reply_len(self) -> usize {
        match self {
            Self::Bits16 => 16,
            Self::Standard => 12,
        }
    }
}

/// Prebuilt ADC trigger, shared by every step of a scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdcTrigger {
    resolution: AdcResolution,
    averaging: u8,
    payload: Bytes,
}

impl AdcTrigger {
    pub fn new(resolution: AdcResolution, averaging: u8) -> Self {
        let selector = resolution.selector();
        let mut buf = BytesMut::with_capacity(2 + selector.len());
        buf.put_u8(ADC_TRIGGER_COMMAND);
        buf.put_slice(selector);
        buf.put_u8(averaging);

        Self {
            resolution,
            averaging,
            payload: buf.freeze(),
        }
    }

    /// Raw command bytes; ADC triggers are sent without a latch header
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    pub fn resolution(&self) -> AdcResolution {
        self.resolution
    }

    pub fn averaging(&self) -> u8 {
        self.averaging
    }

    pub fn expected_reply_len(&self) -> usize {
        self.resolution.expected_reply_len()
    }
}

/// One magnitude/phase sample pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdcReading {
    pub magnitude: u32,
    pub phase: u32,
}

/// Decode an ADC reply, which must be exactly `expected_len` bytes long
pub fn decode_adc_reply(reply: &[u8], expected_len: usize) -> Result<AdcReading> {
    if reply.len() != expected_len || reply.len() < 8 {
        return Err(ProtocolError::ReplySizeMismatch {
            expected: expected_len,
            actual: reply.len(),
        });
    }

    let magnitude = u32::from_le_bytes([reply[0], reply[1], reply[2], reply[3]]);
    let phase = u32::from_le_bytes([reply[4], reply[5], reply[6], reply[7]]);

    Ok(AdcReading { magnitude, phase })
}
