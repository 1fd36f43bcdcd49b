//! Device pin model
//!
//! The instrument is described as a roster of logical sub-devices (three
//! PLLs, two DDSs, two ADCs). Each owns a list of pins; each pin carries,
//! per scan step, the bit sequence to clock out and a validity mask.
//!
//! A missing `(pin, step)` entry means the pin is inactive at that step.

use crate::error::{ControllerError, Result};
use protocol::{AdcResolution, Wiring};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Index into the scan, or [`INIT_STEP`]
pub type StepIndex = u32;

/// Reserved step holding one-time device bring-up sequences
pub const INIT_STEP: StepIndex = StepIndex::MAX;

/// Logical sub-device instance on the control bus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceSlot {
    Pll1,
    Pll2,
    Pll3,
    Dds1,
    Dds3,
    AdcMag,
    AdcPh,
}

impl DeviceSlot {
    pub const ALL: [DeviceSlot; 7] = [
        DeviceSlot::Pll1,
        DeviceSlot::Pll2,
        DeviceSlot::Pll3,
        DeviceSlot::Dds1,
        DeviceSlot::Dds3,
        DeviceSlot::AdcMag,
        DeviceSlot::AdcPh,
    ];

    /// Order in which init sequences are replayed
    pub const INIT_ORDER: [DeviceSlot; 5] = [
        DeviceSlot::Pll1,
        DeviceSlot::Dds1,
        DeviceSlot::Pll2,
        DeviceSlot::Pll3,
        DeviceSlot::Dds3,
    ];

    pub fn family(self) -> DeviceFamily {
        match self {
            DeviceSlot::Pll1 | DeviceSlot::Pll2 | DeviceSlot::Pll3 => DeviceFamily::Pll,
            DeviceSlot::Dds1 | DeviceSlot::Dds3 => DeviceFamily::Dds,
            DeviceSlot::AdcMag | DeviceSlot::AdcPh => DeviceFamily::Adc,
        }
    }
}

impl fmt::Display for DeviceSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeviceSlot::Pll1 => "PLL1",
            DeviceSlot::Pll2 => "PLL2",
            DeviceSlot::Pll3 => "PLL3",
            DeviceSlot::Dds1 => "DDS1",
            DeviceSlot::Dds3 => "DDS3",
            DeviceSlot::AdcMag => "ADC_MAG",
            DeviceSlot::AdcPh => "ADC_PH",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceFamily {
    Pll,
    Dds,
    Adc,
}

/// Hardware part fitted in a slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChipKind {
    Lmx2326,
    Ad9850,
    Ad7685,
    Lt1865,
}

impl ChipKind {
    pub fn family(self) -> DeviceFamily {
        match self {
            ChipKind::Lmx2326 => DeviceFamily::Pll,
            ChipKind::Ad9850 => DeviceFamily::Dds,
            ChipKind::Ad7685 | ChipKind::Lt1865 => DeviceFamily::Adc,
        }
    }

    /// Trigger layout for converter chips, `None` for everything else
    pub fn adc_resolution(self) -> Option<AdcResolution> {
        match self {
            ChipKind::Ad7685 => Some(AdcResolution::Bits16),
            ChipKind::Lt1865 => Some(AdcResolution::Standard),
            _ => None,
        }
    }
}

/// Electrical role of a pin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PinRole {
    /// Serial data stream that takes part in combined scan writes
    MainData,
    GenInput,
    GenOutput,
    InputOutput,
    Clk,
    /// Carries auto-clock intent only; has no wire of its own
    VirtualClk,
}

/// Chip-level function of a pin, used to look up its wiring
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PinFunction {
    Data,
    Clk,
    /// PLL load enable
    Le,
    /// DDS word clock
    Wclk,
    /// DDS frequency update strobe
    FqUpdate,
    /// ADC conversion start
    Convert,
    /// Auto-clock request channel
    AutoClock,
}

/// Bit sequence and validity mask of one pin at one step
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PinData {
    data: Vec<bool>,
    mask: Vec<bool>,
}

impl PinData {
    pub fn new(data: Vec<bool>, mask: Vec<bool>) -> Self {
        Self { data, mask }
    }

    /// Every position of `data` is meaningful
    pub fn fully_valid(data: Vec<bool>) -> Self {
        let mask = vec![true; data.len()];
        Self { data, mask }
    }

    pub fn data(&self) -> &[bool] {
        &self.data
    }

    pub fn mask(&self) -> &[bool] {
        &self.mask
    }

    /// Number of positions this entry spans
    pub fn span(&self) -> usize {
        self.data.len().max(self.mask.len())
    }

    pub fn is_valid_at(&self, position: usize) -> bool {
        self.mask.get(position).copied().unwrap_or(false)
    }

    /// Bit value at `position`; positions past the data array read as 0
    pub fn bit(&self, position: usize) -> bool {
        self.data.get(position).copied().unwrap_or(false)
    }

    pub fn masked_out_count(&self) -> usize {
        self.mask.iter().filter(|valid| !**valid).count()
    }
}

#[derive(Debug, Clone)]
pub struct Pin {
    name: String,
    function: PinFunction,
    role: PinRole,
    wiring: Option<Wiring>,
    data: HashMap<StepIndex, PinData>,
}

impl Pin {
    pub fn new(name: impl Into<String>, function: PinFunction, role: PinRole) -> Self {
        Self {
            name: name.into(),
            function,
            role,
            wiring: None,
            data: HashMap::new(),
        }
    }

    pub fn with_data(mut self, step: StepIndex, data: PinData) -> Self {
        self.data.insert(step, data);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn function(&self) -> PinFunction {
        self.function
    }

    pub fn role(&self) -> PinRole {
        self.role
    }

    pub fn wiring(&self) -> Option<&Wiring> {
        self.wiring.as_ref()
    }

    pub(crate) fn set_wiring(&mut self, wiring: Option<Wiring>) {
        self.wiring = wiring;
    }

    pub fn data(&self, step: StepIndex) -> Option<&PinData> {
        self.data.get(&step)
    }

    pub fn set_data(&mut self, step: StepIndex, data: PinData) {
        self.data.insert(step, data);
    }

    /// Drop per-step scan data, keeping bring-up sequences
    pub fn clear_scan_data(&mut self) {
        self.data.retain(|step, _| *step == INIT_STEP);
    }

    /// Largest ordinary step this pin carries data for
    pub fn last_scan_step(&self) -> Option<StepIndex> {
        self.data.keys().copied().filter(|s| *s != INIT_STEP).max()
    }
}

/// One configured sub-device and its pins
#[derive(Debug, Clone)]
pub struct LogicalDevice {
    slot: DeviceSlot,
    chip: ChipKind,
    pins: Vec<Pin>,
    init_indexes: Vec<StepIndex>,
}

impl LogicalDevice {
    /// Create a device, rejecting chips that cannot sit in `slot`
    pub fn new(slot: DeviceSlot, chip: ChipKind) -> Result<Self> {
        if slot.family() != chip.family() {
            return Err(ControllerError::Roster(format!(
                "{:?} cannot be fitted as {}",
                chip, slot
            )));
        }

        Ok(Self {
            slot,
            chip,
            pins: Vec::new(),
            init_indexes: Vec::new(),
        })
    }

    pub fn with_pin(mut self, pin: Pin) -> Self {
        self.pins.push(pin);
        self
    }

    pub fn with_init_indexes(mut self, indexes: Vec<StepIndex>) -> Self {
        self.init_indexes = indexes;
        self
    }

    pub fn slot(&self) -> DeviceSlot {
        self.slot
    }

    pub fn chip(&self) -> ChipKind {
        self.chip
    }

    pub fn pins(&self) -> &[Pin] {
        &self.pins
    }

    pub fn pins_mut(&mut self) -> &mut [Pin] {
        &mut self.pins
    }

    pub fn pin(&self, function: PinFunction) -> Option<&Pin> {
        self.pins.iter().find(|p| p.function == function)
    }

    pub fn pin_mut(&mut self, function: PinFunction) -> Option<&mut Pin> {
        self.pins.iter_mut().find(|p| p.function == function)
    }

    /// Steps replayed through the packer during hardware init
    pub fn init_indexes(&self) -> &[StepIndex] {
        &self.init_indexes
    }
}

/// The configured device roster
///
/// Passed explicitly to wiring build and cache rebuild.
#[derive(Debug, Clone, Default)]
pub struct Roster {
    devices: BTreeMap<DeviceSlot, LogicalDevice>,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace the device in its slot
    pub fn insert(&mut self, device: LogicalDevice) -> Option<LogicalDevice> {
        self.devices.insert(device.slot, device)
    }

    pub fn with_device(mut self, device: LogicalDevice) -> Self {
        self.insert(device);
        self
    }

    pub fn get(&self, slot: DeviceSlot) -> Option<&LogicalDevice> {
        self.devices.get(&slot)
    }

    pub fn get_mut(&mut self, slot: DeviceSlot) -> Option<&mut LogicalDevice> {
        self.devices.get_mut(&slot)
    }

    pub fn devices(&self) -> impl Iterator<Item = &LogicalDevice> {
        self.devices.values()
    }

    pub fn devices_mut(&mut self) -> impl Iterator<Item = &mut LogicalDevice> {
        self.devices.values_mut()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Pins of the device in `slot`; empty when the slot is not fitted
    pub fn pins(&self, slot: DeviceSlot) -> &[Pin] {
        self.get(slot).map(|d| d.pins()).unwrap_or(&[])
    }

    /// Trigger layout, chosen by the magnitude ADC's chip
    pub fn adc_resolution(&self) -> AdcResolution {
        self.get(DeviceSlot::AdcMag)
            .and_then(|d| d.chip.adc_resolution())
            .unwrap_or(AdcResolution::Standard)
    }

    /// Number of scan steps covered by the loaded pin data
    pub fn scan_step_count(&self) -> u32 {
        self.devices()
            .flat_map(|d| d.pins())
            .filter_map(|p| p.last_scan_step())
            .max()
            .map(|s| s + 1)
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_family_must_match_chip() {
        assert!(LogicalDevice::new(DeviceSlot::Pll1, ChipKind::Lmx2326).is_ok());
        assert!(LogicalDevice::new(DeviceSlot::Pll1, ChipKind::Ad9850).is_err());
        assert!(LogicalDevice::new(DeviceSlot::AdcPh, ChipKind::Lt1865).is_ok());
    }

    #[test]
    fn test_pin_data_queries() {
        let data = PinData::new(vec![true, false, true], vec![false, true, true]);
        assert_eq!(data.span(), 3);
        assert!(!data.is_valid_at(0));
        assert!(data.is_valid_at(2));
        assert!(!data.is_valid_at(10));
        assert!(data.bit(2));
        assert!(!data.bit(10));
        assert_eq!(data.masked_out_count(), 1);
    }

    #[test]
    fn test_missing_step_is_inactive() {
        let pin = Pin::new("data", PinFunction::Data, PinRole::MainData)
            .with_data(0, PinData::fully_valid(vec![true]));
        assert!(pin.data(0).is_some());
        assert!(pin.data(1).is_none());
        assert!(pin.data(INIT_STEP).is_none());
    }

    #[test]
    fn test_clear_scan_data_keeps_init() {
        let mut pin = Pin::new("data", PinFunction::Data, PinRole::MainData)
            .with_data(INIT_STEP, PinData::fully_valid(vec![true]))
            .with_data(0, PinData::fully_valid(vec![false]));
        pin.clear_scan_data();
        assert!(pin.data(INIT_STEP).is_some());
        assert!(pin.data(0).is_none());
    }

    #[test]
    fn test_scan_step_count() {
        let pll = LogicalDevice::new(DeviceSlot::Pll1, ChipKind::Lmx2326)
            .unwrap()
            .with_pin(
                Pin::new("data", PinFunction::Data, PinRole::MainData)
                    .with_data(INIT_STEP, PinData::fully_valid(vec![true]))
                    .with_data(4, PinData::fully_valid(vec![true])),
            );
        let roster = Roster::new().with_device(pll);
        assert_eq!(roster.scan_step_count(), 5);
        assert_eq!(Roster::new().scan_step_count(), 0);
    }

    #[test]
    fn test_adc_resolution_follows_magnitude_adc() {
        let roster = Roster::new().with_device(
            LogicalDevice::new(DeviceSlot::AdcMag, ChipKind::Ad7685).unwrap(),
        );
        assert_eq!(roster.adc_resolution(), AdcResolution::Bits16);
        assert_eq!(Roster::new().adc_resolution(), AdcResolution::Standard);
    }

    #[test]
    fn test_slot_display() {
        assert_eq!(DeviceSlot::AdcMag.to_string(), "ADC_MAG");
        assert_eq!(DeviceSlot::Dds3.to_string(), "DDS3");
    }
}
