//! msa-usb controller
//!
//! Drives the instrument's shared latch bus over USB: pin model, wiring
//! table, bit packing of init sequences, per-step scan command cache, the
//! background stepper, and the rusb transport.

pub mod config;
pub mod dry_run;
pub mod error;
pub mod instrument;
pub mod link;
pub mod model;
pub mod packer;
pub mod roster_file;
pub mod scan;
pub mod usb;
pub mod wiring;

pub use config::ControllerConfig;
pub use error::{ControllerError, Result};
pub use instrument::{InitReport, Instrument, Timing};
pub use model::{
    ChipKind, DeviceFamily, DeviceSlot, INIT_STEP, LogicalDevice, Pin, PinData, PinFunction,
    PinRole, Roster, StepIndex,
};
pub use scan::{ScanCache, ScanDefinition, ScanState, StepPosition};
