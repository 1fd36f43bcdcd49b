//! Common utilities for msa-usb
//!
//! This crate provides functionality shared by the controller library and its
//! tests: error handling, logging setup, the event channel that carries
//! instrument notifications to async callers, and the transport seam the
//! controller drives.

pub mod channel;
pub mod error;
pub mod logging;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod transport;

pub use channel::{ControllerEvent, EventReceiver, EventSender, create_event_channel};
pub use error::{Error, Result};
pub use logging::setup_logging;
pub use transport::{InstrumentInfo, Transport};
