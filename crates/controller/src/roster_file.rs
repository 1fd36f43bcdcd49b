//! Device roster file
//!
//! TOML description of the fitted sub-devices, their pins and the per-step
//! bit data, standing in for the frequency-plan stage that normally
//! computes it:
//!
//! ```toml
//! [[device]]
//! slot = "pll1"
//! chip = "lmx2326"
//! init_indexes = ["init"]
//!
//! [[device.pin]]
//! name = "data"
//! function = "data"
//! role = "main_data"
//! data = { init = { bits = "1011" }, "0" = { bits = "0110", mask = "0011" } }
//! ```

use crate::error::{ControllerError, Result};
use crate::model::{
    ChipKind, DeviceSlot, INIT_STEP, LogicalDevice, Pin, PinData, PinFunction, PinRole, Roster,
    StepIndex,
};
use anyhow::Context;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;

const INIT_KEY: &str = "init";

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RosterFile {
    #[serde(rename = "device", default)]
    devices: Vec<DeviceEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct DeviceEntry {
    slot: DeviceSlot,
    chip: ChipKind,
    #[serde(default)]
    init_indexes: Vec<StepKey>,
    #[serde(rename = "pin", default)]
    pins: Vec<PinEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PinEntry {
    name: String,
    function: PinFunction,
    role: PinRole,
    #[serde(default)]
    data: BTreeMap<String, DataEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct DataEntry {
    bits: String,
    #[serde(default)]
    mask: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum StepKey {
    Index(u32),
    Name(String),
}

impl StepKey {
    fn resolve(&self) -> Result<StepIndex> {
        match self {
            StepKey::Index(step) => ordinary_step(*step),
            StepKey::Name(name) => parse_step_key(name),
        }
    }
}

/// Parse roster TOML text
pub fn parse_roster(content: &str) -> Result<Roster> {
    let file: RosterFile =
        toml::from_str(content).map_err(|e| ControllerError::Roster(e.to_string()))?;

    let mut roster = Roster::new();
    for entry in file.devices {
        let slot = entry.slot;
        let init_indexes = entry
            .init_indexes
            .iter()
            .map(StepKey::resolve)
            .collect::<Result<Vec<_>>>()?;

        let mut device = LogicalDevice::new(slot, entry.chip)?.with_init_indexes(init_indexes);
        for pin_entry in entry.pins {
            device = device.with_pin(build_pin(slot, pin_entry)?);
        }

        if roster.insert(device).is_some() {
            return Err(ControllerError::Roster(format!("{} listed twice", slot)));
        }
    }

    Ok(roster)
}

/// Read and parse a roster file
pub fn load_roster(path: &Path) -> anyhow::Result<Roster> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read roster file: {}", path.display()))?;
    let roster = parse_roster(&content)
        .with_context(|| format!("Failed to parse roster file: {}", path.display()))?;

    info!(
        "Loaded roster from {}: {} devices, {} scan steps",
        path.display(),
        roster.len(),
        roster.scan_step_count()
    );
    Ok(roster)
}

fn build_pin(slot: DeviceSlot, entry: PinEntry) -> Result<Pin> {
    let mut pin = Pin::new(entry.name, entry.function, entry.role);
    for (key, data) in &entry.data {
        let step = parse_step_key(key)?;
        let bits = parse_bits(&data.bits)?;
        let pin_data = match &data.mask {
            Some(mask) => PinData::new(bits, parse_bits(mask)?),
            None => PinData::fully_valid(bits),
        };
        if pin_data.mask().len() > pin_data.data().len() {
            return Err(ControllerError::Roster(format!(
                "{} pin '{}' step {}: mask longer than bits",
                slot,
                pin.name(),
                key
            )));
        }
        pin.set_data(step, pin_data);
    }
    Ok(pin)
}

/// Parse a bit string like `"1011"` (`_` and whitespace are ignored)
pub fn parse_bits(text: &str) -> Result<Vec<bool>> {
    text.chars()
        .filter(|c| *c != '_' && !c.is_whitespace())
        .map(|c| match c {
            '0' => Ok(false),
            '1' => Ok(true),
            other => Err(ControllerError::Roster(format!(
                "invalid bit '{}' in \"{}\"",
                other, text
            ))),
        })
        .collect()
}

/// Parse a step key: `"init"` or a decimal scan step
pub fn parse_step_key(key: &str) -> Result<StepIndex> {
    if key.eq_ignore_ascii_case(INIT_KEY) {
        return Ok(INIT_STEP);
    }
    let step = key
        .trim()
        .parse::<u32>()
        .map_err(|_| ControllerError::Roster(format!("invalid step key '{}'", key)))?;
    ordinary_step(step)
}

fn ordinary_step(step: u32) -> Result<StepIndex> {
    if step == INIT_STEP {
        return Err(ControllerError::Roster(format!(
            "step {} is reserved, use \"init\"",
            step
        )));
    }
    Ok(step)
}
