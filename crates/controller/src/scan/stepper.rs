//! Background stepper
//!
//! Runs on a dedicated thread so the blocking USB writes and the write/read
//! delay never stall the async runtime. Each iteration commands the current
//! step, reads the ADCs and advances the position with wraparound.

use crate::error::{ControllerError, Result};
use crate::link::Link;
use crate::model::StepIndex;
use crate::scan::ScanCache;
use common::ControllerEvent;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const STOP_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Scan lifecycle as seen by callers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    Idle,
    Running,
    Paused,
}

/// Current step within a sweep of `number_of_steps`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepPosition {
    current: StepIndex,
    number_of_steps: u32,
    inverted: bool,
}

impl StepPosition {
    /// Start of a sweep: step 0, or the last step when inverted
    pub fn new(number_of_steps: u32, inverted: bool) -> Self {
        let current = if inverted {
            number_of_steps.saturating_sub(1)
        } else {
            0
        };
        Self {
            current,
            number_of_steps,
            inverted,
        }
    }

    pub fn current(&self) -> StepIndex {
        self.current
    }

    pub fn number_of_steps(&self) -> u32 {
        self.number_of_steps
    }

    pub fn inverted(&self) -> bool {
        self.inverted
    }

    /// Move one step in sweep direction
    pub fn advance(&mut self) {
        self.current = if self.inverted {
            self.previous()
        } else {
            self.next()
        };
    }

    /// Move one step against sweep direction
    pub fn retreat(&mut self) {
        self.current = if self.inverted {
            self.next()
        } else {
            self.previous()
        };
    }

    pub fn set(&mut self, step: StepIndex) -> Result<()> {
        if step >= self.number_of_steps {
            return Err(ControllerError::InvalidStep {
                step,
                number_of_steps: self.number_of_steps,
            });
        }
        self.current = step;
        Ok(())
    }

    fn next(&self) -> StepIndex {
        if self.current + 1 >= self.number_of_steps {
            0
        } else {
            self.current + 1
        }
    }

    fn previous(&self) -> StepIndex {
        if self.current == 0 {
            self.number_of_steps.saturating_sub(1)
        } else {
            self.current - 1
        }
    }
}

/// Loaded cache and position, swapped together under one lock
#[derive(Debug, Default)]
pub struct ScanSlot {
    pub cache: Option<Arc<ScanCache>>,
    pub position: Option<StepPosition>,
}

/// Handle to a running stepper thread
pub struct StepperHandle {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl StepperHandle {
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Request the thread to stop and wait up to `timeout` for it to exit
    ///
    /// On `Ok` the stepper issues no further writes and the handle can be
    /// joined. On `StopTimeout` the thread may still be mid-step; keep the
    /// handle so the loop is still accounted for.
    pub fn stop(&self, timeout: Duration) -> Result<()> {
        self.stop.store(true, Ordering::Release);

        let deadline = Instant::now() + timeout;
        while !self.handle.is_finished() {
            if Instant::now() >= deadline {
                warn!("Stepper did not stop within {:?}", timeout);
                return Err(ControllerError::StopTimeout(timeout));
            }
            std::thread::sleep(STOP_POLL_INTERVAL);
        }
        Ok(())
    }

    /// Reap a thread that has exited
    pub fn join(self) {
        if self.handle.join().is_err() {
            warn!("Stepper thread panicked");
        }
        debug!("Stepper stopped");
    }
}

/// Spawn the stepper over the cache currently in `slot`
///
/// `delay_us` is read every step so the write/read delay can be tuned while
/// scanning.
pub fn spawn_stepper(
    link: Arc<Link>,
    slot: Arc<Mutex<ScanSlot>>,
    delay_us: Arc<AtomicU64>,
) -> Result<StepperHandle> {
    let stop = Arc::new(AtomicBool::new(false));
    let thread_stop = Arc::clone(&stop);

    let handle = std::thread::Builder::new()
        .name("scan-stepper".to_string())
        .spawn(move || run(&link, &slot, &delay_us, &thread_stop))
        .map_err(ControllerError::Spawn)?;

    Ok(StepperHandle { stop, handle })
}

fn run(link: &Link, slot: &Mutex<ScanSlot>, delay_us: &AtomicU64, stop: &AtomicBool) {
    info!("Stepper started");

    while !stop.load(Ordering::Acquire) {
        let (cache, step) = {
            let slot = slot.lock().unwrap_or_else(|e| e.into_inner());
            match (&slot.cache, slot.position) {
                (Some(cache), Some(position)) => (Arc::clone(cache), position.current()),
                _ => {
                    warn!("Stepper has no scan loaded");
                    break;
                }
            }
        };

        let delay = Duration::from_micros(delay_us.load(Ordering::Relaxed));
        if let Err(e) = link.command_step(&cache, step, delay) {
            warn!("Scan halted at step {}: {}", step, e);
            link.events().publish(ControllerEvent::ScanHalted {
                step,
                reason: e.to_string(),
            });
            break;
        }

        let mut slot = slot.lock().unwrap_or_else(|e| e.into_inner());
        let unchanged = slot
            .cache
            .as_ref()
            .is_some_and(|current| Arc::ptr_eq(current, &cache));
        if unchanged && let Some(position) = slot.position.as_mut() {
            position.advance();
        }
    }

    info!("Stepper stopped at step {}", link.last_commanded_step());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advance_wraps_to_zero() {
        let mut position = StepPosition::new(4, false);
        position.set(3).unwrap();
        position.advance();
        assert_eq!(position.current(), 0);
    }

    #[test]
    fn test_inverted_starts_at_top_and_wraps() {
        let mut position = StepPosition::new(4, true);
        assert_eq!(position.current(), 3);

        position.set(0).unwrap();
        position.advance();
        assert_eq!(position.current(), 3);
    }

    #[test]
    fn test_retreat_is_opposite_of_advance() {
        let mut position = StepPosition::new(5, false);
        position.retreat();
        assert_eq!(position.current(), 4);
        position.advance();
        assert_eq!(position.current(), 0);

        let mut inverted = StepPosition::new(5, true);
        inverted.retreat();
        assert_eq!(inverted.current(), 0);
    }

    #[test]
    fn test_set_out_of_range() {
        let mut position = StepPosition::new(2, false);
        assert!(matches!(
            position.set(2),
            Err(ControllerError::InvalidStep {
                step: 2,
                number_of_steps: 2
            })
        ));
        assert_eq!(position.current(), 0);
    }

    #[test]
    fn test_single_step_sweep_stays_put() {
        let mut position = StepPosition::new(1, false);
        position.advance();
        assert_eq!(position.current(), 0);
        position.retreat();
        assert_eq!(position.current(), 0);
    }
}
