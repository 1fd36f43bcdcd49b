//! Transport seam between the controller and the USB link
//!
//! The controller only needs to enumerate instruments, open one by index,
//! push byte buffers, and run request/reply transactions for ADC reads.
//! The rusb-backed implementation lives in the controller crate; tests use
//! [`MockTransport`](crate::test_utils::MockTransport).

use serde::{Deserialize, Serialize};

/// Identity of an enumerated instrument
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstrumentInfo {
    /// Position in the enumeration, as accepted by [`Transport::open`]
    pub index: usize,
    pub vendor_id: u16,
    pub product_id: u16,
    pub bus_number: u8,
    pub device_address: u8,
    pub manufacturer: Option<String>,
    pub product: Option<String>,
}

/// Byte-level link to the instrument
pub trait Transport: Send {
    /// Enumerate instruments that match the configured filters
    fn list_devices(&self) -> crate::Result<Vec<InstrumentInfo>>;

    /// Open the instrument at `index` of [`list_devices`](Self::list_devices)
    fn open(&mut self, index: usize) -> crate::Result<()>;

    /// Close the link; a no-op when not open
    fn close(&mut self);

    fn is_connected(&self) -> bool;

    /// Write one buffer to the command endpoint
    fn send(&mut self, bytes: &[u8]) -> crate::Result<()>;

    /// Write `bytes` then read the reply into `reply`, returning the
    /// number of bytes received
    fn transact(&mut self, bytes: &[u8], reply: &mut [u8]) -> crate::Result<usize>;
}
