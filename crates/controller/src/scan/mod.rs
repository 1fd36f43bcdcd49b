//! Scan sweep: cached step commands and the background stepper

pub mod cache;
pub mod stepper;

pub use cache::{ScanCache, ScanDefinition, combine_step};
pub use stepper::{ScanSlot, ScanState, StepPosition, StepperHandle, spawn_stepper};
