//! Instrument controller
//!
//! Ties the pieces together: hardware bring-up through the packer, scan
//! loading into the command cache, and the stepper lifecycle
//! (Idle, Running, Paused). All operations except the stepping loop itself
//! run synchronously on the caller.

use crate::dry_run::DryRunRecord;
use crate::error::{ControllerError, Result};
use crate::link::Link;
use crate::model::{DeviceSlot, Roster, StepIndex};
use crate::packer::pack_init_sequence;
use crate::scan::{
    ScanCache, ScanDefinition, ScanSlot, ScanState, StepPosition, StepperHandle, spawn_stepper,
};
use crate::wiring::build_wiring;
use common::{EventReceiver, EventSender, InstrumentInfo, Transport, create_event_channel};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info};

/// Default pause between a step's write and its ADC read
pub const DEFAULT_WRITE_READ_DELAY: Duration = Duration::from_micros(100);
/// Default bound on waiting for the stepper to acknowledge a stop
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_millis(1000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    pub write_read_delay: Duration,
    pub stop_timeout: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            write_read_delay: DEFAULT_WRITE_READ_DELAY,
            stop_timeout: DEFAULT_STOP_TIMEOUT,
        }
    }
}

/// Summary of one hardware bring-up
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InitReport {
    pub wired_pins: usize,
    /// (device, init index, writes sent) in send order
    pub sequences: Vec<(DeviceSlot, StepIndex, usize)>,
}

impl InitReport {
    pub fn total_writes(&self) -> usize {
        self.sequences.iter().map(|(_, _, n)| n).sum()
    }
}

pub struct Instrument {
    link: Arc<Link>,
    slot: Arc<Mutex<ScanSlot>>,
    delay_us: Arc<AtomicU64>,
    stop_timeout: Duration,
    stepper: Option<StepperHandle>,
    paused: bool,
    events: EventReceiver,
}

impl Instrument {
    pub fn new(transport: Box<dyn Transport>, timing: Timing) -> Self {
        let (sender, events) = create_event_channel();
        Self {
            link: Arc::new(Link::new(transport, sender)),
            slot: Arc::new(Mutex::new(ScanSlot::default())),
            delay_us: Arc::new(AtomicU64::new(duration_micros(timing.write_read_delay))),
            stop_timeout: timing.stop_timeout,
            stepper: None,
            paused: false,
            events,
        }
    }

    /// Receiver for measurement and connection events
    pub fn events(&self) -> EventReceiver {
        self.events.clone()
    }

    /// Publishing end, for watchers that feed the same event stream
    pub fn event_sender(&self) -> EventSender {
        self.link.events().clone()
    }

    pub fn list_devices(&self) -> Result<Vec<InstrumentInfo>> {
        self.link.list_devices()
    }

    pub fn open(&self, index: usize) -> Result<()> {
        self.link.open(index)
    }

    pub fn close(&self) {
        self.link.close();
    }

    pub fn is_connected(&self) -> bool {
        self.link.is_connected()
    }

    /// Build the wiring table and replay every device's init sequences
    ///
    /// Devices go in bring-up order (PLL1, DDS1, PLL2, PLL3, DDS3); slots
    /// missing from the roster are skipped.
    pub fn initialize_hardware(&mut self, roster: &mut Roster) -> Result<InitReport> {
        self.ensure_not_running()?;

        let mut report = InitReport {
            wired_pins: build_wiring(roster),
            sequences: Vec::new(),
        };

        for slot in DeviceSlot::INIT_ORDER {
            let Some(device) = roster.get(slot) else {
                continue;
            };
            for &index in device.init_indexes() {
                let writes = pack_init_sequence(device, index)?;
                for write in &writes {
                    self.link.send_write(write)?;
                }
                debug!("{} init index {:#x}: {} writes", slot, index, writes.len());
                report.sequences.push((slot, index, writes.len()));
            }
        }

        info!(
            "Hardware initialized: {} sequences, {} writes",
            report.sequences.len(),
            report.total_writes()
        );
        Ok(report)
    }

    /// Rebuild the scan cache and reset the position to the sweep start
    ///
    /// The cache is built before the slot is locked, so a running stepper
    /// never sees a partial cache.
    pub fn load_scan(&self, definition: &ScanDefinition, roster: &Roster) -> Result<()> {
        let cache = Arc::new(ScanCache::build(definition, roster)?);
        let position = StepPosition::new(cache.number_of_steps(), definition.inverted);

        let mut slot = self.slot();
        slot.cache = Some(cache);
        slot.position = Some(position);
        info!(
            "Scan loaded: {} steps{}",
            definition.number_of_steps,
            if definition.inverted { ", inverted" } else { "" }
        );
        Ok(())
    }

    pub fn start_scanning(&mut self) -> Result<()> {
        self.ensure_not_running()?;
        if self.slot().cache.is_none() {
            return Err(ControllerError::NoScanLoaded);
        }

        let handle = spawn_stepper(
            Arc::clone(&self.link),
            Arc::clone(&self.slot),
            Arc::clone(&self.delay_us),
        )?;
        self.stepper = Some(handle);
        self.paused = false;
        info!("Scanning started at step {}", self.current_step().unwrap_or(0));
        Ok(())
    }

    pub fn resume(&mut self) -> Result<()> {
        self.start_scanning()
    }

    /// Stop the loop, keeping the position for `resume`
    pub fn pause(&mut self) -> Result<()> {
        let was_running = self.stepper.is_some();
        self.halt_stepper()?;
        if was_running {
            self.paused = true;
            info!("Scanning paused");
        }
        Ok(())
    }

    pub fn stop_scanning(&mut self) -> Result<()> {
        self.halt_stepper()?;
        self.paused = false;
        Ok(())
    }

    pub fn is_scanning(&self) -> bool {
        self.stepper.as_ref().is_some_and(|h| !h.is_finished())
    }

    pub fn state(&self) -> ScanState {
        if self.is_scanning() {
            ScanState::Running
        } else if self.paused {
            ScanState::Paused
        } else {
            ScanState::Idle
        }
    }

    /// Command the current step, then advance
    pub fn single_step_forward(&mut self) -> Result<StepIndex> {
        self.ensure_not_running()?;
        let (cache, step) = self.loaded()?;
        self.link.command_step(&cache, step, self.write_read_delay())?;

        let mut slot = self.slot();
        if let Some(position) = slot.position.as_mut() {
            position.advance();
        }
        Ok(step)
    }

    /// Retreat one step, then command it
    pub fn single_step_backward(&mut self) -> Result<StepIndex> {
        self.ensure_not_running()?;
        let (cache, step) = {
            let mut slot = self.slot();
            let cache = slot.cache.clone().ok_or(ControllerError::NoScanLoaded)?;
            let position = slot.position.as_mut().ok_or(ControllerError::NoScanLoaded)?;
            position.retreat();
            (cache, position.current())
        };
        self.link.command_step(&cache, step, self.write_read_delay())?;
        Ok(step)
    }

    /// Send the cached command for `step` and read the ADCs
    ///
    /// The position is left untouched.
    pub fn command_step(&mut self, step: StepIndex) -> Result<()> {
        self.ensure_not_running()?;
        let (cache, _) = self.loaded()?;
        if step >= cache.number_of_steps() {
            return Err(ControllerError::InvalidStep {
                step,
                number_of_steps: cache.number_of_steps(),
            });
        }
        self.link.command_step(&cache, step, self.write_read_delay())
    }

    /// Move the position without sending anything
    pub fn set_current_step(&mut self, step: StepIndex) -> Result<()> {
        let mut slot = self.slot();
        let position = slot.position.as_mut().ok_or(ControllerError::NoScanLoaded)?;
        position.set(step)
    }

    pub fn current_step(&self) -> Option<StepIndex> {
        self.slot().position.map(|p| p.current())
    }

    pub fn last_commanded_step(&self) -> StepIndex {
        self.link.last_commanded_step()
    }

    pub fn write_read_delay(&self) -> Duration {
        Duration::from_micros(self.delay_us.load(Ordering::Relaxed))
    }

    /// Takes effect from the next step, also while scanning
    pub fn set_write_read_delay(&self, delay: Duration) {
        self.delay_us.store(duration_micros(delay), Ordering::Relaxed);
    }

    pub fn dry_run_records(&self) -> Vec<DryRunRecord> {
        self.link.dry_run_records()
    }

    pub fn clear_dry_run(&self) {
        self.link.clear_dry_run();
    }

    fn slot(&self) -> MutexGuard<'_, ScanSlot> {
        self.slot.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn loaded(&self) -> Result<(Arc<ScanCache>, StepIndex)> {
        let slot = self.slot();
        match (&slot.cache, slot.position) {
            (Some(cache), Some(position)) => Ok((Arc::clone(cache), position.current())),
            _ => Err(ControllerError::NoScanLoaded),
        }
    }

    /// A loop that has not exited yet counts as running, even after a stop
    /// request timed out
    fn ensure_not_running(&mut self) -> Result<()> {
        if self.is_scanning() {
            return Err(ControllerError::ScanActive);
        }
        // Loop ended on its own (transport failure) or after a late stop
        if let Some(handle) = self.stepper.take() {
            handle.join();
        }
        Ok(())
    }

    /// The handle is only released once the thread has exited
    fn halt_stepper(&mut self) -> Result<()> {
        if let Some(handle) = &self.stepper {
            handle.stop(self.stop_timeout)?;
        }
        if let Some(handle) = self.stepper.take() {
            handle.join();
        }
        Ok(())
    }
}

impl Drop for Instrument {
    fn drop(&mut self) {
        if let Some(handle) = self.stepper.take()
            && handle.stop(self.stop_timeout).is_ok()
        {
            handle.join();
        }
    }
}

fn duration_micros(delay: Duration) -> u64 {
    u64::try_from(delay.as_micros()).unwrap_or(u64::MAX)
}
