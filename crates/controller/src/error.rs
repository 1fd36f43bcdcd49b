//! Controller error types

use crate::model::{DeviceSlot, StepIndex};
use protocol::{LogicalLatch, ProtocolError};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ControllerError {
    /// Two pins valid at the same bit position target different latches
    #[error(
        "Wiring conflict on {device} step {step} position {position}: pin '{first_pin}' targets {first_latch}, pin '{second_pin}' targets {second_latch}"
    )]
    WiringConflict {
        device: DeviceSlot,
        step: StepIndex,
        position: usize,
        first_pin: String,
        first_latch: LogicalLatch,
        second_pin: String,
        second_latch: LogicalLatch,
    },

    /// No wired pin carries a valid bit at a position of the sequence
    #[error("No wired pin active on {device} step {step} position {position}")]
    UnwiredPosition {
        device: DeviceSlot,
        step: StepIndex,
        position: usize,
    },

    /// A write failed or the link dropped mid-command
    #[error("Transport failure: {0}")]
    TransportFailure(String),

    #[error("Invalid step {step} (scan has {number_of_steps} steps)")]
    InvalidStep {
        step: StepIndex,
        number_of_steps: u32,
    },

    #[error("Scan definition has no steps")]
    EmptyScan,

    #[error("A scan loop is already running")]
    ScanActive,

    #[error("No scan loaded")]
    NoScanLoaded,

    #[error("Stepping loop did not stop within {0:?}")]
    StopTimeout(Duration),

    #[error("Failed to spawn stepper thread: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("Roster error: {0}")]
    Roster(String),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

impl From<common::Error> for ControllerError {
    fn from(e: common::Error) -> Self {
        ControllerError::TransportFailure(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ControllerError>;
