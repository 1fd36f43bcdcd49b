//! Bulk transfer helpers
//!
//! Synchronous rusb bulk writes and reads with rusb errors mapped onto the
//! transport error type.

use common::Error;
use rusb::{Context, DeviceHandle};
use std::time::Duration;
use tracing::{trace, warn};

/// Direction bit of an endpoint address
const ENDPOINT_DIR_IN: u8 = 0x80;

pub fn is_in_endpoint(endpoint: u8) -> bool {
    endpoint & ENDPOINT_DIR_IN != 0
}

/// Write all of `data` to a bulk OUT endpoint
pub fn bulk_write(
    handle: &DeviceHandle<Context>,
    endpoint: u8,
    data: &[u8],
    timeout: Duration,
) -> common::Result<()> {
    let written = handle
        .write_bulk(endpoint, data, timeout)
        .map_err(map_rusb_error)?;

    if written != data.len() {
        warn!(
            "Short bulk write on {:#04x}: {} of {} bytes",
            endpoint,
            written,
            data.len()
        );
        return Err(Error::Usb(format!(
            "short write: {} of {} bytes",
            written,
            data.len()
        )));
    }

    trace!("Bulk OUT {:#04x}: {} bytes", endpoint, written);
    Ok(())
}

/// Read from a bulk IN endpoint into `buf`, returning the byte count
pub fn bulk_read(
    handle: &DeviceHandle<Context>,
    endpoint: u8,
    buf: &mut [u8],
    timeout: Duration,
) -> common::Result<usize> {
    let read = handle
        .read_bulk(endpoint, buf, timeout)
        .map_err(map_rusb_error)?;
    trace!("Bulk IN {:#04x}: {} bytes", endpoint, read);
    Ok(read)
}

/// Map rusb::Error to the transport error
pub fn map_rusb_error(err: rusb::Error) -> Error {
    match err {
        rusb::Error::NoDevice => Error::NotConnected,
        rusb::Error::Timeout => Error::Usb("transfer timed out".to_string()),
        rusb::Error::Pipe => Error::Usb("endpoint stalled".to_string()),
        rusb::Error::Access => Error::Usb("permission denied".to_string()),
        rusb::Error::Busy => Error::Usb("device busy".to_string()),
        _ => Error::Usb(err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_rusb_error() {
        assert!(matches!(
            map_rusb_error(rusb::Error::NoDevice),
            Error::NotConnected
        ));
        assert!(matches!(map_rusb_error(rusb::Error::Timeout), Error::Usb(ref m) if m.contains("timed out")));
        assert!(matches!(map_rusb_error(rusb::Error::Overflow), Error::Usb(_)));
    }

    #[test]
    fn test_endpoint_direction() {
        assert!(is_in_endpoint(0x86));
        assert!(!is_in_endpoint(0x02));
    }
}
