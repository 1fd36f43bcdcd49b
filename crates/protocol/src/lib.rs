//! Wire protocol for the MSA slim USB control bus
//!
//! The instrument exposes a handful of shared 8-bit latch registers. Every
//! host write selects one latch, carries the bytes to clock into it, and says
//! whether the firmware should pulse the bus clock for each byte. ADC reads
//! use a separate trigger command that returns a fixed-size reply.
//!
//! # Example
//!
//! ```
//! use protocol::{LogicalLatch, Wiring, frame};
//!
//! // PLL1 data line sits on bit 1 of latch 1
//! let wiring = Wiring::new(LogicalLatch(1), 1).unwrap();
//! let byte = wiring.apply(0x00, true);
//! assert_eq!(byte, 0x02);
//!
//! let bytes = frame(&[byte], LogicalLatch(1), false).unwrap();
//! assert_eq!(&bytes[..], &[0xA1, 0x01, 0x00, 0x02]);
//! ```

pub mod adc;
pub mod error;
pub mod frame;
pub mod latch;

pub use adc::{ADC_TRIGGER_COMMAND, AdcReading, AdcResolution, AdcTrigger, decode_adc_reply};
pub use error::{ProtocolError, Result};
pub use frame::{
    FRAME_HEADER_LEN, FrameHeader, LATCH_WRITE_BASE, LatchWrite, MAX_PAYLOAD_LEN, decode_header,
    frame, hex_string,
};
pub use latch::{LogicalLatch, VIRTUAL_LATCH, Wiring};
