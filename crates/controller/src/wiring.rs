//! Wiring table builder
//!
//! Places every recognised pin of every fitted device on a (latch, bit) of
//! the shared control bus. The table mirrors the instrument schematic.
//! Some lines are physically shared (the serial clock on latch 1 bit 0,
//! the ADC clock and convert strobes), so several pins may legitimately
//! carry the same placement.

use crate::model::{DeviceSlot, PinFunction, Roster};
use protocol::{LogicalLatch, Wiring};
use tracing::{debug, info};

/// (slot, function, latch, bit)
const WIRING_TABLE: &[(DeviceSlot, PinFunction, u8, u8)] = &[
    (DeviceSlot::Pll1, PinFunction::Data, 1, 1),
    (DeviceSlot::Pll1, PinFunction::Le, 2, 0),
    (DeviceSlot::Pll1, PinFunction::Clk, 1, 0),
    (DeviceSlot::Pll2, PinFunction::Data, 1, 4),
    (DeviceSlot::Pll2, PinFunction::Le, 2, 4),
    (DeviceSlot::Pll2, PinFunction::Clk, 1, 0),
    (DeviceSlot::Pll3, PinFunction::Data, 1, 3),
    (DeviceSlot::Pll3, PinFunction::Le, 2, 2),
    (DeviceSlot::Pll3, PinFunction::Clk, 1, 0),
    (DeviceSlot::Dds1, PinFunction::Data, 1, 2),
    (DeviceSlot::Dds1, PinFunction::FqUpdate, 2, 1),
    (DeviceSlot::Dds1, PinFunction::Wclk, 1, 0),
    (DeviceSlot::Dds3, PinFunction::Data, 1, 4),
    (DeviceSlot::Dds3, PinFunction::FqUpdate, 2, 3),
    (DeviceSlot::Dds3, PinFunction::Wclk, 1, 0),
    (DeviceSlot::AdcMag, PinFunction::Data, 0, 4),
    (DeviceSlot::AdcMag, PinFunction::Clk, 3, 6),
    (DeviceSlot::AdcMag, PinFunction::Convert, 3, 7),
    (DeviceSlot::AdcPh, PinFunction::Data, 0, 5),
    (DeviceSlot::AdcPh, PinFunction::Clk, 3, 6),
    (DeviceSlot::AdcPh, PinFunction::Convert, 3, 7),
];

/// Look up the placement of `function` on the device in `slot`
pub fn wiring_for(slot: DeviceSlot, function: PinFunction) -> Option<Wiring> {
    WIRING_TABLE
        .iter()
        .find(|(s, f, _, _)| *s == slot && *f == function)
        .and_then(|(_, _, latch, bit)| Wiring::new(LogicalLatch(*latch), *bit).ok())
}

/// Assign wiring to every pin in the roster
///
/// Pins with no table entry are left unwired and take no part in packing.
/// Returns the number of wired pins.
pub fn build_wiring(roster: &mut Roster) -> usize {
    let mut wired = 0;

    for device in roster.devices_mut() {
        let slot = device.slot();
        for pin in device.pins_mut() {
            let wiring = wiring_for(slot, pin.function());
            match &wiring {
                Some(w) => {
                    debug!(
                        "{} pin '{}' -> {} bit {}",
                        slot,
                        pin.name(),
                        w.latch(),
                        w.bit()
                    );
                    wired += 1;
                }
                None => debug!("{} pin '{}' left unwired", slot, pin.name()),
            }
            pin.set_wiring(wiring);
        }
    }

    info!("Wiring table built: {} pins wired", wired);
    wired
}
