//! Protocol error types

use thiserror::Error;

/// Errors raised while building or decoding instrument command buffers
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// Logical latch id has no physical selector
    #[error("Invalid logical latch: {0}")]
    InvalidLatch(u8),

    /// Bit offset outside an 8-bit latch register
    #[error("Invalid bit position: {0} (must be 0-7)")]
    InvalidBitPosition(u8),

    /// Payload does not fit the one-byte length field
    #[error("Payload too large: {size} bytes (max: {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// Buffer is shorter than a latch-write header
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    /// ADC transaction returned an unexpected number of bytes
    #[error("ADC reply size mismatch: expected {expected} bytes, got {actual}")]
    ReplySizeMismatch { expected: usize, actual: usize },
}

/// Type alias for protocol results
pub type Result<T> = std::result::Result<T, ProtocolError>;
