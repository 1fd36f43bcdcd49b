//! rusb-backed instrument transport
//!
//! Enumerates devices matching the configured VID:PID filters, opens one by
//! index, claims the command interface and talks to it over one bulk OUT
//! (commands) and one bulk IN (ADC replies) endpoint.

use crate::usb::filter::{DEFAULT_INSTRUMENT_FILTER, check_filter};
use crate::usb::transfers::{bulk_read, bulk_write, map_rusb_error};
use common::{Error, InstrumentInfo, Transport};
use rusb::{Context, Device, DeviceHandle, UsbContext};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Endpoint and interface layout of the instrument
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsbSettings {
    pub filters: Vec<String>,
    pub interface: u8,
    pub out_endpoint: u8,
    pub in_endpoint: u8,
    pub timeout: Duration,
}

impl Default for UsbSettings {
    fn default() -> Self {
        Self {
            filters: vec![DEFAULT_INSTRUMENT_FILTER.to_string()],
            interface: 0,
            out_endpoint: 0x02,
            in_endpoint: 0x86,
            timeout: Duration::from_millis(1000),
        }
    }
}

struct OpenDevice {
    handle: DeviceHandle<Context>,
    index: usize,
    kernel_driver_detached: bool,
}

pub struct UsbInstrument {
    context: Context,
    settings: UsbSettings,
    open: Option<OpenDevice>,
}

impl UsbInstrument {
    pub fn new(settings: UsbSettings) -> Result<Self, rusb::Error> {
        let context = Context::new()?;
        Ok(Self {
            context,
            settings,
            open: None,
        })
    }

    pub fn settings(&self) -> &UsbSettings {
        &self.settings
    }

    fn matching_devices(&self) -> common::Result<Vec<Device<Context>>> {
        let devices = self.context.devices().map_err(map_rusb_error)?;
        Ok(devices
            .iter()
            .filter(|device| {
                device.device_descriptor().is_ok_and(|desc| {
                    check_filter(desc.vendor_id(), desc.product_id(), &self.settings.filters)
                })
            })
            .collect())
    }

    fn handle(&self) -> common::Result<&DeviceHandle<Context>> {
        self.open
            .as_ref()
            .map(|open| &open.handle)
            .ok_or(Error::NotConnected)
    }
}

impl Transport for UsbInstrument {
    fn list_devices(&self) -> common::Result<Vec<InstrumentInfo>> {
        let devices = self.matching_devices()?;
        Ok(devices
            .iter()
            .enumerate()
            .filter_map(|(index, device)| instrument_info(index, device))
            .collect())
    }

    fn open(&mut self, index: usize) -> common::Result<()> {
        self.close();

        let devices = self.matching_devices()?;
        let device = devices
            .get(index)
            .ok_or_else(|| Error::Usb(format!("no instrument at index {}", index)))?;

        let handle = device.open().map_err(|e| {
            warn!("Failed to open device: {}", e);
            map_rusb_error(e)
        })?;

        let interface = self.settings.interface;
        let kernel_driver_detached = match handle.kernel_driver_active(interface) {
            Ok(true) => {
                debug!("Detaching kernel driver from interface {}", interface);
                handle.detach_kernel_driver(interface).map_err(map_rusb_error)?;
                true
            }
            Ok(false) => false,
            Err(e) => {
                debug!("Could not check kernel driver status: {}", e);
                false
            }
        };

        handle.claim_interface(interface).map_err(|e| {
            warn!("Failed to claim interface {}: {}", interface, e);
            map_rusb_error(e)
        })?;

        info!(
            "Opened instrument {} (bus={}, addr={})",
            index,
            device.bus_number(),
            device.address()
        );
        self.open = Some(OpenDevice {
            handle,
            index,
            kernel_driver_detached,
        });
        Ok(())
    }

    fn close(&mut self) {
        let Some(open) = self.open.take() else {
            return;
        };
        let interface = self.settings.interface;

        if let Err(e) = open.handle.release_interface(interface) {
            warn!("Failed to release interface {}: {}", interface, e);
        }
        if open.kernel_driver_detached
            && let Err(e) = open.handle.attach_kernel_driver(interface)
        {
            debug!("Could not reattach kernel driver: {}", e);
        }
        debug!("Closed instrument {}", open.index);
    }

    fn is_connected(&self) -> bool {
        self.open.is_some()
    }

    fn send(&mut self, bytes: &[u8]) -> common::Result<()> {
        let handle = self.handle()?;
        bulk_write(handle, self.settings.out_endpoint, bytes, self.settings.timeout)
    }

    fn transact(&mut self, bytes: &[u8], reply: &mut [u8]) -> common::Result<usize> {
        let handle = self.handle()?;
        bulk_write(handle, self.settings.out_endpoint, bytes, self.settings.timeout)?;
        bulk_read(handle, self.settings.in_endpoint, reply, self.settings.timeout)
    }
}

impl Drop for UsbInstrument {
    fn drop(&mut self) {
        self.close();
    }
}

/// Describe a device, reading string descriptors when it can be opened
fn instrument_info(index: usize, device: &Device<Context>) -> Option<InstrumentInfo> {
    let descriptor = device.device_descriptor().ok()?;

    let (manufacturer, product) = match device.open() {
        Ok(handle) => (
            descriptor
                .manufacturer_string_index()
                .and_then(|idx| handle.read_string_descriptor_ascii(idx).ok()),
            descriptor
                .product_string_index()
                .and_then(|idx| handle.read_string_descriptor_ascii(idx).ok()),
        ),
        Err(_) => (None, None),
    };

    Some(InstrumentInfo {
        index,
        vendor_id: descriptor.vendor_id(),
        product_id: descriptor.product_id(),
        bus_number: device.bus_number(),
        device_address: device.address(),
        manufacturer,
        product,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = UsbSettings::default();
        assert_eq!(settings.filters, vec!["0x0547:0x1015".to_string()]);
        assert_eq!(settings.out_endpoint, 0x02);
        assert_eq!(settings.in_endpoint, 0x86);
    }

    #[test]
    fn test_unopened_instrument() {
        // Context creation may fail without USB access
        match UsbInstrument::new(UsbSettings::default()) {
            Ok(mut usb) => {
                assert!(!usb.is_connected());
                assert!(matches!(usb.send(&[0xA1, 0x00, 0x00]), Err(Error::NotConnected)));
            }
            Err(e) => eprintln!("USB context unavailable (expected without permissions): {}", e),
        }
    }
}
