//! Scan command cache
//!
//! For every scan step the MAIN_DATA pins of all devices are merged into
//! one byte stream addressed to the virtual latch. Shorter sequences are
//! right-aligned against the longest one so every device finishes clocking
//! on the same byte. The framed buffers are built once per scan load, so
//! stepping is a lookup.

use crate::error::{ControllerError, Result};
use crate::model::{Pin, PinRole, Roster, StepIndex};
use bytes::Bytes;
use protocol::{AdcTrigger, VIRTUAL_LATCH, frame};
use tracing::{debug, info};

/// Parameters of one sweep
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanDefinition {
    pub number_of_steps: u32,
    /// Walk the steps from the top down
    pub inverted: bool,
    /// ADC averaging count sent with every trigger
    pub adc_averaging: u8,
}

/// Precomputed per-step command buffers plus the shared ADC trigger
#[derive(Debug, Clone)]
pub struct ScanCache {
    commands: Vec<Bytes>,
    adc_trigger: AdcTrigger,
    inverted: bool,
}

impl ScanCache {
    /// Build the cache for `definition` from the roster's pin data
    pub fn build(definition: &ScanDefinition, roster: &Roster) -> Result<Self> {
        if definition.number_of_steps == 0 {
            return Err(ControllerError::EmptyScan);
        }

        // Unwired data pins still count toward the step length
        let data_pins: Vec<&Pin> = roster
            .devices()
            .flat_map(|d| d.pins())
            .filter(|p| p.role() == PinRole::MainData)
            .collect();

        let commands = (0..definition.number_of_steps)
            .map(|step| {
                let payload = combine_step(&data_pins, step);
                frame(&payload, VIRTUAL_LATCH, false).map_err(ControllerError::from)
            })
            .collect::<Result<Vec<_>>>()?;

        let adc_trigger = AdcTrigger::new(roster.adc_resolution(), definition.adc_averaging);

        info!(
            "Scan cache built: {} steps from {} data pins, ADC {:?}",
            commands.len(),
            data_pins.len(),
            adc_trigger.resolution()
        );

        Ok(Self {
            commands,
            adc_trigger,
            inverted: definition.inverted,
        })
    }

    /// Framed command for `step`
    pub fn command(&self, step: StepIndex) -> Option<&Bytes> {
        self.commands.get(step as usize)
    }

    pub fn adc_trigger(&self) -> &AdcTrigger {
        &self.adc_trigger
    }

    pub fn number_of_steps(&self) -> u32 {
        self.commands.len() as u32
    }

    pub fn inverted(&self) -> bool {
        self.inverted
    }
}

/// Merge the pins' bits for `step` into one right-aligned byte stream
pub fn combine_step(pins: &[&Pin], step: StepIndex) -> Vec<u8> {
    let max_size = pins
        .iter()
        .filter_map(|p| p.data(step))
        .map(|d| d.data().len())
        .max()
        .unwrap_or(0);

    let mut out = Vec::with_capacity(max_size);
    for b in 0..max_size {
        let mut byte = 0u8;
        for pin in pins {
            let (Some(wiring), Some(data)) = (pin.wiring(), pin.data(step)) else {
                continue;
            };
            // Leading masked-out entries shift the pin's start further right
            let delta = (max_size + data.masked_out_count()).saturating_sub(data.data().len());
            if b < delta {
                continue;
            }
            if let Some(value) = data.data().get(b - delta) {
                byte = wiring.apply(byte, *value);
            }
        }
        out.push(byte);
    }

    debug!("step {}: {} combined bytes", step, out.len());
    out
}
