//! Command link to the instrument
//!
//! Owns the transport and frames outgoing latch writes. While the transport
//! reports disconnected, writes are diverted to the [`DryRunLog`] instead of
//! failing. Open, close and every send go through one mutex, so opening or
//! closing never races an in-flight write.

use crate::dry_run::{DryRunLog, DryRunRecord};
use crate::error::{ControllerError, Result};
use crate::model::StepIndex;
use crate::scan::ScanCache;
use common::{ControllerEvent, EventSender, InstrumentInfo, Transport};
use protocol::{AdcReading, AdcTrigger, LatchWrite, decode_adc_reply};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info, warn};

pub struct Link {
    transport: Mutex<Box<dyn Transport>>,
    dry_run: Mutex<DryRunLog>,
    events: EventSender,
    last_commanded_step: AtomicU32,
}

impl Link {
    pub fn new(transport: Box<dyn Transport>, events: EventSender) -> Self {
        Self {
            transport: Mutex::new(transport),
            dry_run: Mutex::new(DryRunLog::default()),
            events,
            last_commanded_step: AtomicU32::new(0),
        }
    }

    fn transport(&self) -> MutexGuard<'_, Box<dyn Transport>> {
        self.transport.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn dry_run(&self) -> MutexGuard<'_, DryRunLog> {
        self.dry_run.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn list_devices(&self) -> Result<Vec<InstrumentInfo>> {
        Ok(self.transport().list_devices()?)
    }

    pub fn open(&self, index: usize) -> Result<()> {
        self.transport().open(index)?;
        info!("Instrument {} opened", index);
        self.events.publish(ControllerEvent::Connected);
        Ok(())
    }

    pub fn close(&self) {
        let mut transport = self.transport();
        if transport.is_connected() {
            transport.close();
            info!("Instrument closed");
            self.events.publish(ControllerEvent::Disconnected);
        }
    }

    pub fn is_connected(&self) -> bool {
        self.transport().is_connected()
    }

    /// Frame and send one latch write
    pub fn send_write(&self, write: &LatchWrite) -> Result<()> {
        let bytes = write.encode()?;
        self.send_framed(&bytes)
    }

    /// Send an already framed buffer
    ///
    /// A failed write marks the link lost and publishes `Disconnected`.
    pub fn send_framed(&self, bytes: &[u8]) -> Result<()> {
        let mut transport = self.transport();
        if !transport.is_connected() {
            self.dry_run().record(bytes);
            return Ok(());
        }

        if let Err(e) = transport.send(bytes) {
            warn!("USB write failed: {}", e);
            transport.close();
            drop(transport);
            self.events.publish(ControllerEvent::Disconnected);
            return Err(ControllerError::TransportFailure(e.to_string()));
        }
        Ok(())
    }

    /// Run an ADC transaction and publish the reading for `step`
    ///
    /// Faults publish `AdcFault` and are otherwise swallowed; they never
    /// stop a scan.
    pub fn read_adc(&self, trigger: &AdcTrigger, step: StepIndex) -> Option<AdcReading> {
        let mut transport = self.transport();
        if !transport.is_connected() {
            self.dry_run().record(trigger.payload());
            return None;
        }

        let mut reply = vec![0u8; trigger.expected_reply_len()];
        let received = transport.transact(trigger.payload(), &mut reply);
        drop(transport);

        let reading = match received {
            Ok(n) if n == reply.len() => decode_adc_reply(&reply, trigger.expected_reply_len())
                .map_err(|e| format!("ADC reply rejected: {}", e)),
            Ok(n) => Err(format!(
                "ADC reply has {} bytes, expected {}",
                n,
                reply.len()
            )),
            Err(e) => Err(format!("ADC transfer failed: {}", e)),
        };

        match reading {
            Ok(reading) => {
                self.events.publish(ControllerEvent::MeasurementReady {
                    step,
                    magnitude: reading.magnitude,
                    phase: reading.phase,
                });
                Some(reading)
            }
            Err(reason) => {
                warn!("Step {}: {}", step, reason);
                self.events.publish(ControllerEvent::AdcFault { step, reason });
                None
            }
        }
    }

    /// Send the cached command for `step`, wait `delay`, then trigger the ADCs
    pub fn command_step(&self, cache: &ScanCache, step: StepIndex, delay: Duration) -> Result<()> {
        let command = cache.command(step).ok_or(ControllerError::InvalidStep {
            step,
            number_of_steps: cache.number_of_steps(),
        })?;

        self.send_framed(command)?;
        self.last_commanded_step.store(step, Ordering::Release);
        std::thread::sleep(delay);
        self.read_adc(cache.adc_trigger(), step);

        debug!("Commanded step {}", step);
        Ok(())
    }

    pub fn events(&self) -> &EventSender {
        &self.events
    }

    pub fn last_commanded_step(&self) -> StepIndex {
        self.last_commanded_step.load(Ordering::Acquire)
    }

    pub fn dry_run_records(&self) -> Vec<DryRunRecord> {
        self.dry_run().records()
    }

    pub fn clear_dry_run(&self) {
        self.dry_run().clear();
    }
}
