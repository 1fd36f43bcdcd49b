//! Hot-plug watcher
//!
//! Runs the libusb event loop on a dedicated thread and publishes
//! `InstrumentArrived` / `InstrumentLeft` for devices matching the filters.

use crate::usb::filter::check_filter;
use common::{ControllerEvent, EventSender};
use rusb::{Context, Device, Hotplug, HotplugBuilder, Registration, UsbContext};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, info, warn};

const EVENT_POLL_TIMEOUT: Duration = Duration::from_millis(100);

struct HotplugCallback {
    events: EventSender,
    filters: Vec<String>,
}

impl HotplugCallback {
    fn matches<T: UsbContext>(&self, device: &Device<T>) -> bool {
        device
            .device_descriptor()
            .is_ok_and(|desc| check_filter(desc.vendor_id(), desc.product_id(), &self.filters))
    }
}

impl<T: UsbContext> Hotplug<T> for HotplugCallback {
    fn device_arrived(&mut self, device: Device<T>) {
        if !self.matches(&device) {
            return;
        }
        info!(
            "Instrument arrived (bus={}, addr={})",
            device.bus_number(),
            device.address()
        );
        self.events.publish(ControllerEvent::InstrumentArrived {
            bus_number: device.bus_number(),
            device_address: device.address(),
        });
    }

    fn device_left(&mut self, device: Device<T>) {
        if !self.matches(&device) {
            return;
        }
        info!(
            "Instrument left (bus={}, addr={})",
            device.bus_number(),
            device.address()
        );
        self.events.publish(ControllerEvent::InstrumentLeft {
            bus_number: device.bus_number(),
            device_address: device.address(),
        });
    }
}

pub struct HotplugWatcher {
    shutdown: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl HotplugWatcher {
    /// Start watching, or `None` when libusb has no hot-plug support
    pub fn spawn(filters: Vec<String>, events: EventSender) -> std::io::Result<Option<Self>> {
        if !rusb::has_hotplug() {
            warn!("libusb built without hot-plug support, watcher disabled");
            return Ok(None);
        }

        let shutdown = Arc::new(AtomicBool::new(false));
        let thread_shutdown = Arc::clone(&shutdown);
        let handle = std::thread::Builder::new()
            .name("usb-hotplug".to_string())
            .spawn(move || {
                if let Err(e) = run(filters, events, &thread_shutdown) {
                    warn!("Hot-plug watcher failed: {}", e);
                }
            })?;

        Ok(Some(Self {
            shutdown,
            handle: Some(handle),
        }))
    }

    pub fn shutdown(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            warn!("Hot-plug thread panicked");
        }
    }
}

impl Drop for HotplugWatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run(filters: Vec<String>, events: EventSender, shutdown: &AtomicBool) -> Result<(), rusb::Error> {
    let context = Context::new()?;
    let callback = HotplugCallback { events, filters };
    // Callbacks stay registered while this is alive
    let _registration: Registration<Context> = HotplugBuilder::new()
        .enumerate(false)
        .register(&context, Box::new(callback))?;
    debug!("Hot-plug callbacks registered");

    while !shutdown.load(Ordering::Acquire) {
        match context.handle_events(Some(EVENT_POLL_TIMEOUT)) {
            Ok(()) => {}
            Err(rusb::Error::Interrupted) => {
                debug!("USB event handling interrupted");
            }
            Err(e) => {
                warn!("Error handling USB events: {}", e);
                std::thread::sleep(EVENT_POLL_TIMEOUT);
            }
        }
    }

    debug!("Hot-plug watcher stopped");
    Ok(())
}
