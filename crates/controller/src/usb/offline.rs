//! Transport that never connects
//!
//! Used for `--dry-run` and on hosts without USB access; every command lands
//! in the dry-run trace.

use common::{Error, InstrumentInfo, Transport};

#[derive(Debug, Default, Clone, Copy)]
pub struct OfflineTransport;

impl Transport for OfflineTransport {
    fn list_devices(&self) -> common::Result<Vec<InstrumentInfo>> {
        Ok(Vec::new())
    }

    fn open(&mut self, index: usize) -> common::Result<()> {
        Err(Error::Usb(format!(
            "offline transport cannot open instrument {}",
            index
        )))
    }

    fn close(&mut self) {}

    fn is_connected(&self) -> bool {
        false
    }

    fn send(&mut self, _bytes: &[u8]) -> common::Result<()> {
        Err(Error::NotConnected)
    }

    fn transact(&mut self, _bytes: &[u8], _reply: &mut [u8]) -> common::Result<usize> {
        Err(Error::NotConnected)
    }
}
