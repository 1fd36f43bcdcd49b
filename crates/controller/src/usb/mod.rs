//! USB subsystem
//!
//! The rusb-backed [`Transport`](common::Transport) for the instrument, an
//! offline stand-in for dry runs, and the hot-plug watcher thread.

pub mod device;
pub mod filter;
pub mod hotplug;
pub mod offline;
pub mod transfers;

pub use device::{UsbInstrument, UsbSettings};
pub use filter::{DEFAULT_INSTRUMENT_FILTER, check_filter};
pub use hotplug::HotplugWatcher;
pub use offline::OfflineTransport;
