//! Latch-write framing
//!
//! Every latch write sent to the instrument has a three byte header:
//!
//! ```text
//! [0xA0 + selector][payload length][auto-clock: 0 or 1][payload bytes ...]
//! ```
//!
//! `selector` is the physical selector of the target latch (see
//! [`LogicalLatch::physical_selector`]). The length field is a single byte,
//! so a payload holds at most 255 latch values.

use crate::error::{ProtocolError, Result};
use crate::latch::LogicalLatch;
use bytes::{BufMut, Bytes, BytesMut};
use std::fmt::Write;

/// Command byte base for latch writes
pub const LATCH_WRITE_BASE: u8 = 0xA0;

/// Size of the latch-write header
pub const FRAME_HEADER_LEN: usize = 3;

/// Largest payload expressible by the one-byte length field
pub const MAX_PAYLOAD_LEN: usize = u8::MAX as usize;

/// One write to a single latch, before framing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LatchWrite {
    pub latch: LogicalLatch,
    pub auto_clock: bool,
    pub payload: Vec<u8>,
}

impl LatchWrite {
    pub fn new(latch: LogicalLatch, auto_clock: bool, payload: Vec<u8>) -> Self {
        Self {
            latch,
            auto_clock,
            payload,
        }
    }

    /// Frame this write for the transport
    pub fn encode(&self) -> Result<Bytes> {
        frame(&self.payload, self.latch, self.auto_clock)
    }
}

/// Prepend the latch-write header to `payload`
///
/// # Example
/// ```
/// use protocol::{LogicalLatch, frame};
///
/// let bytes = frame(&[0x01, 0x00], LogicalLatch(2), true).unwrap();
/// assert_eq!(&bytes[..], &[0xA3, 0x02, 0x01, 0x01, 0x00]);
/// ```
pub fn frame(payload: &[u8], latch: LogicalLatch, auto_clock: bool) -> Result<Bytes> {
    if payload.len() > MAX_PAYLOAD_LEN {
        return Err(ProtocolError::PayloadTooLarge {
            size: payload.len(),
            max: MAX_PAYLOAD_LEN,
        });
    }
    let selector = latch.physical_selector()?;

    let mut buf = BytesMut::with_capacity(FRAME_HEADER_LEN + payload.len());
    buf.put_u8(LATCH_WRITE_BASE + selector);
    buf.put_u8(payload.len() as u8);
    buf.put_u8(auto_clock as u8);
    buf.put_slice(payload);

    Ok(buf.freeze())
}

/// Decoded latch-write header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub latch: LogicalLatch,
    pub len: u8,
    pub auto_clock: bool,
}

/// Parse the header of a framed latch write
pub fn decode_header(bytes: &[u8]) -> Result<FrameHeader> {
    if bytes.len() < FRAME_HEADER_LEN {
        return Err(ProtocolError::MalformedFrame(format!(
            "need {} header bytes, got {}",
            FRAME_HEADER_LEN,
            bytes.len()
        )));
    }
    if bytes[0] & 0xF0 != LATCH_WRITE_BASE {
        return Err(ProtocolError::MalformedFrame(format!(
            "command byte {:#04x} is not a latch write",
            bytes[0]
        )));
    }

    let latch = LogicalLatch::from_physical_selector(bytes[0] & 0x0F)?;
    let len = bytes[1];
    if bytes.len() - FRAME_HEADER_LEN != len as usize {
        return Err(ProtocolError::MalformedFrame(format!(
            "length field says {} bytes, payload has {}",
            len,
            bytes.len() - FRAME_HEADER_LEN
        )));
    }

    Ok(FrameHeader {
        latch,
        len,
        auto_clock: bytes[2] == 1,
    })
}

/// Render bytes as a contiguous lowercase hex string
pub fn hex_string(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(out, "{:02x}", b);
    }
    out
}
