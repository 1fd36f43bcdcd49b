//! Trace of writes issued while no instrument is connected
//!
//! With the link down, commands are not sent but recorded here (and logged
//! at debug level), so sequences can be inspected without hardware.

use protocol::{decode_header, hex_string};
use std::collections::VecDeque;
use tracing::debug;

/// Records kept before the oldest are discarded
pub const DEFAULT_DRY_RUN_CAPACITY: usize = 4096;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DryRunRecord {
    /// Monotonic counter across the controller's lifetime
    pub sequence: u64,
    pub bytes: Vec<u8>,
}

#[derive(Debug)]
pub struct DryRunLog {
    records: VecDeque<DryRunRecord>,
    capacity: usize,
    next_sequence: u64,
}

impl Default for DryRunLog {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_DRY_RUN_CAPACITY)
    }
}

impl DryRunLog {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            records: VecDeque::new(),
            capacity: capacity.max(1),
            next_sequence: 0,
        }
    }

    pub fn record(&mut self, bytes: &[u8]) {
        let sequence = self.next_sequence;
        self.next_sequence += 1;

        match decode_header(bytes) {
            Ok(header) => debug!(
                target: "msa_usb::dry_run",
                seq = sequence,
                latch = %header.latch,
                auto_clock = header.auto_clock,
                "{}",
                hex_string(bytes)
            ),
            Err(_) => debug!(target: "msa_usb::dry_run", seq = sequence, "{}", hex_string(bytes)),
        }

        if self.records.len() == self.capacity {
            self.records.pop_front();
        }
        self.records.push_back(DryRunRecord {
            sequence,
            bytes: bytes.to_vec(),
        });
    }

    pub fn records(&self) -> Vec<DryRunRecord> {
        self.records.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }
}
