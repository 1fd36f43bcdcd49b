//! Test utilities for msa-usb
//!
//! Provides a recording mock transport and helper functions for testing
//! across crates.
//!
//! Compiled for this crate's unit tests and behind the `test-utils`
//! feature, which dependent crates enable from their dev-dependencies.
//!
//! # Example
//!
//! ```ignore
//! use common::Transport;
//! use common::test_utils::{MockTransport, bits};
//!
//! let mut transport = MockTransport::connected();
//! transport.send(&[0xA1, 0x01, 0x00, 0x02]).unwrap();
//! assert_eq!(transport.sent(), vec![vec![0xA1, 0x01, 0x00, 0x02]]);
//! assert_eq!(bits("101"), vec![true, false, true]);
//! ```

use crate::transport::{InstrumentInfo, Transport};
use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Default test timeout (5 seconds)
pub const DEFAULT_TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Parse a string of '0'/'1' characters into a bit vector
///
/// Any other character (spaces, underscores) is skipped.
pub fn bits(s: &str) -> Vec<bool> {
    s.chars()
        .filter_map(|c| match c {
            '0' => Some(false),
            '1' => Some(true),
            _ => None,
        })
        .collect()
}

/// A validity mask of `len` set bits
pub fn all_valid(len: usize) -> Vec<bool> {
    vec![true; len]
}

/// Create a mock InstrumentInfo for testing
pub fn create_mock_instrument_info(index: usize) -> InstrumentInfo {
    InstrumentInfo {
        index,
        vendor_id: 0x0547,
        product_id: 0x1015,
        bus_number: 1,
        device_address: (index % 128) as u8 + 1,
        manufacturer: Some("Test Manufacturer".to_string()),
        product: Some(format!("MSA SLIM-USB {}", index)),
    }
}

#[derive(Debug, Default)]
struct MockState {
    connected: bool,
    devices: Vec<InstrumentInfo>,
    sent: Vec<Vec<u8>>,
    replies: VecDeque<Vec<u8>>,
    default_reply: Option<Vec<u8>>,
    fail_after: Option<usize>,
    send_delay: Option<Duration>,
    opened_index: Option<usize>,
}

/// Recording transport
///
/// Clones share state, so a test can hand one clone to the controller and
/// inspect traffic through another.
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    /// A transport with one enumerated instrument, not yet open
    pub fn new() -> Self {
        let transport = Self::default();
        transport.lock().devices = vec![create_mock_instrument_info(0)];
        transport
    }

    /// A transport that reports itself connected from the start
    pub fn connected() -> Self {
        let transport = Self::new();
        transport.set_connected(true);
        transport
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_connected(&self, connected: bool) {
        self.lock().connected = connected;
    }

    /// Every buffer written so far, in order (ADC triggers included)
    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.lock().sent.clone()
    }

    pub fn sent_count(&self) -> usize {
        self.lock().sent.len()
    }

    pub fn clear_sent(&self) {
        self.lock().sent.clear();
    }

    /// Queue a reply for the next transaction
    pub fn push_reply(&self, reply: Vec<u8>) {
        self.lock().replies.push_back(reply);
    }

    /// Reply used when no queued reply is left
    pub fn set_default_reply(&self, reply: Vec<u8>) {
        self.lock().default_reply = Some(reply);
    }

    /// Make every write fail once `count` writes have succeeded
    pub fn fail_after(&self, count: usize) {
        self.lock().fail_after = Some(count);
    }

    /// Make every `send` block for `delay` before it is recorded
    pub fn set_send_delay(&self, delay: Duration) {
        self.lock().send_delay = Some(delay);
    }

    pub fn opened_index(&self) -> Option<usize> {
        self.lock().opened_index
    }

    fn record(state: &mut MockState, bytes: &[u8]) -> crate::Result<()> {
        if !state.connected {
            return Err(crate::Error::NotConnected);
        }
        if let Some(limit) = state.fail_after
            && state.sent.len() >= limit
        {
            return Err(crate::Error::Usb("mock write failure".to_string()));
        }
        state.sent.push(bytes.to_vec());
        Ok(())
    }
}

impl Transport for MockTransport {
    fn list_devices(&self) -> crate::Result<Vec<InstrumentInfo>> {
        Ok(self.lock().devices.clone())
    }

    fn open(&mut self, index: usize) -> crate::Result<()> {
        let mut state = self.lock();
        if index >= state.devices.len() {
            return Err(crate::Error::Usb(format!("no instrument at index {}", index)));
        }
        state.connected = true;
        state.opened_index = Some(index);
        Ok(())
    }

    fn close(&mut self) {
        let mut state = self.lock();
        state.connected = false;
        state.opened_index = None;
    }

    fn is_connected(&self) -> bool {
        self.lock().connected
    }

    fn send(&mut self, bytes: &[u8]) -> crate::Result<()> {
        // Sleep unlocked so tests can inspect traffic meanwhile
        let delay = self.lock().send_delay;
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }
        let mut state = self.lock();
        Self::record(&mut state, bytes)
    }

    fn transact(&mut self, bytes: &[u8], reply: &mut [u8]) -> crate::Result<usize> {
        let mut state = self.lock();
        Self::record(&mut state, bytes)?;

        let answer = state
            .replies
            .pop_front()
            .or_else(|| state.default_reply.clone())
            .unwrap_or_default();
        let len = answer.len().min(reply.len());
        reply[..len].copy_from_slice(&answer[..len]);
        Ok(answer.len())
    }
}

/// Build an ADC reply of `len` bytes carrying the given readings
pub fn create_mock_adc_reply(len: usize, magnitude: u32, phase: u32) -> Vec<u8> {
    let mut reply = vec![0u8; len.max(8)];
    reply[0..4].copy_from_slice(&magnitude.to_le_bytes());
    reply[4..8].copy_from_slice(&phase.to_le_bytes());
    reply.truncate(len);
    reply
}

/// Timeout wrapper for async tests
///
/// Wraps an async operation with a timeout to prevent tests from hanging.
///
/// # Example
/// ```ignore
/// use common::test_utils::{with_timeout, DEFAULT_TEST_TIMEOUT};
///
/// #[tokio::test]
/// async fn test_with_timeout() {
///     let result = with_timeout(DEFAULT_TEST_TIMEOUT, async { 42 }).await.unwrap();
///     assert_eq!(result, 42);
/// }
/// ```
pub async fn with_timeout<T, F>(duration: Duration, future: F) -> Result<T, TimeoutError>
where
    F: Future<Output = T>,
{
    tokio::time::timeout(duration, future)
        .await
        .map_err(|_| TimeoutError { duration })
}

/// Error returned when a test times out
#[derive(Debug)]
pub struct TimeoutError {
    /// The timeout duration that was exceeded
    pub duration: Duration,
}

impl std::fmt::Display for TimeoutError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Test timed out after {:?}", self.duration)
    }
}

impl std::error::Error for TimeoutError {}
