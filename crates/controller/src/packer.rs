//! Bit packer
//!
//! Turns one device's per-step pin sequences into latch writes. Position
//! `x` of every valid, wired pin is folded into one latch byte. A new write
//! starts whenever the target latch or the requested auto-clock mode changes,
//! so a sequence that clocks data on one latch and then strobes a load-enable
//! on another becomes the minimum number of framed writes.

use crate::error::{ControllerError, Result};
use crate::model::{LogicalDevice, Pin, PinData, PinRole, StepIndex};
use protocol::{LatchWrite, LogicalLatch, MAX_PAYLOAD_LEN};
use tracing::trace;

/// Pack the bit sequences of `device` at `step` into latch writes
///
/// Returns an empty list when no pin has data for `step`. Nothing is
/// returned on error, so a conflict never leaves a partial sequence behind.
pub fn pack_init_sequence(device: &LogicalDevice, step: StepIndex) -> Result<Vec<LatchWrite>> {
    let active: Vec<(&Pin, &PinData)> = device
        .pins()
        .iter()
        .filter_map(|pin| pin.data(step).map(|data| (pin, data)))
        .collect();

    let max_size = active.iter().map(|(_, d)| d.span()).max().unwrap_or(0);

    let mut writes = Vec::new();
    let mut current: Option<LatchWrite> = None;

    for x in 0..max_size {
        let latch = agreed_latch(device, step, x, &active)?;

        // Without a virtual clock pin at x the running mode carries on
        let auto_clock = active
            .iter()
            .filter(|(pin, data)| pin.role() == PinRole::VirtualClk && data.is_valid_at(x))
            .map(|(_, data)| data.bit(x))
            .last()
            .unwrap_or_else(|| current.as_ref().is_some_and(|w| w.auto_clock));

        let byte = active
            .iter()
            .filter(|(_, data)| data.is_valid_at(x))
            .filter_map(|(pin, data)| pin.wiring().map(|w| (w, data.bit(x))))
            .fold(0u8, |byte, (wiring, value)| wiring.apply(byte, value));

        let extends = current.as_ref().is_some_and(|w| {
            w.latch == latch && w.auto_clock == auto_clock && w.payload.len() < MAX_PAYLOAD_LEN
        });
        if extends && let Some(write) = current.as_mut() {
            write.payload.push(byte);
        } else {
            writes.extend(current.take());
            current = Some(LatchWrite::new(latch, auto_clock, vec![byte]));
        }
    }

    writes.extend(current);

    trace!(
        "{} step {:#x}: {} positions packed into {} writes",
        device.slot(),
        step,
        max_size,
        writes.len()
    );
    Ok(writes)
}

/// Latch shared by every wired pin valid at position `x`
fn agreed_latch(
    device: &LogicalDevice,
    step: StepIndex,
    x: usize,
    active: &[(&Pin, &PinData)],
) -> Result<LogicalLatch> {
    let mut first: Option<(&Pin, LogicalLatch)> = None;

    for &(pin, data) in active {
        if !data.is_valid_at(x) {
            continue;
        }
        let Some(wiring) = pin.wiring() else {
            continue;
        };

        match first {
            None => first = Some((pin, wiring.latch())),
            Some((first_pin, first_latch)) if first_latch != wiring.latch() => {
                return Err(ControllerError::WiringConflict {
                    device: device.slot(),
                    step,
                    position: x,
                    first_pin: first_pin.name().to_string(),
                    first_latch,
                    second_pin: pin.name().to_string(),
                    second_latch: wiring.latch(),
                });
            }
            Some(_) => {}
        }
    }

    first
        .map(|(_, latch)| latch)
        .ok_or(ControllerError::UnwiredPosition {
            device: device.slot(),
            step,
            position: x,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ChipKind, DeviceSlot, INIT_STEP, PinFunction, Roster};
    use crate::wiring::build_wiring;
    use common::test_utils::bits;

    fn wired(device: LogicalDevice) -> LogicalDevice {
        let slot = device.slot();
        let mut roster = Roster::new().with_device(device);
        build_wiring(&mut roster);
        roster.get(slot).cloned().unwrap()
    }

    #[test]
    fn test_no_data_packs_nothing() {
        let device = wired(
            LogicalDevice::new(DeviceSlot::Pll1, ChipKind::Lmx2326)
                .unwrap()
                .with_pin(Pin::new("data", PinFunction::Data, PinRole::MainData)),
        );
        assert!(pack_init_sequence(&device, INIT_STEP).unwrap().is_empty());
    }

    #[test]
    fn test_single_pin_one_write() {
        let device = wired(
            LogicalDevice::new(DeviceSlot::Pll3, ChipKind::Lmx2326)
                .unwrap()
                .with_pin(
                    Pin::new("data", PinFunction::Data, PinRole::MainData)
                        .with_data(INIT_STEP, PinData::fully_valid(bits("1011"))),
                ),
        );

        let writes = pack_init_sequence(&device, INIT_STEP).unwrap();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].latch, LogicalLatch(1));
        assert!(!writes[0].auto_clock);
        // PLL3 data is bit 3
        assert_eq!(writes[0].payload, vec![0x08, 0x00, 0x08, 0x08]);
    }

    #[test]
    fn test_latch_change_splits_write() {
        let device = wired(
            LogicalDevice::new(DeviceSlot::Pll1, ChipKind::Lmx2326)
                .unwrap()
                .with_pin(
                    Pin::new("data", PinFunction::Data, PinRole::MainData).with_data(
                        INIT_STEP,
                        PinData::new(bits("110"), bits("110")),
                    ),
                )
                .with_pin(
                    Pin::new("le", PinFunction::Le, PinRole::GenOutput)
                        .with_data(INIT_STEP, PinData::new(bits("001"), bits("001"))),
                ),
        );

        let writes = pack_init_sequence(&device, INIT_STEP).unwrap();
        assert_eq!(writes.len(), 2);
        assert_eq!(writes[0].latch, LogicalLatch(1));
        assert_eq!(writes[0].payload, vec![0x02, 0x02]);
        assert_eq!(writes[1].latch, LogicalLatch(2));
        assert_eq!(writes[1].payload, vec![0x01]);
    }

    #[test]
    fn test_conflict_is_reported() {
        let device = wired(
            LogicalDevice::new(DeviceSlot::Pll1, ChipKind::Lmx2326)
                .unwrap()
                .with_pin(
                    Pin::new("data", PinFunction::Data, PinRole::MainData)
                        .with_data(INIT_STEP, PinData::fully_valid(bits("11"))),
                )
                .with_pin(
                    Pin::new("le", PinFunction::Le, PinRole::GenOutput)
                        .with_data(INIT_STEP, PinData::new(bits("01"), bits("01"))),
                ),
        );

        match pack_init_sequence(&device, INIT_STEP) {
            Err(ControllerError::WiringConflict {
                device,
                position,
                first_pin,
                second_pin,
                ..
            }) => {
                assert_eq!(device, DeviceSlot::Pll1);
                assert_eq!(position, 1);
                assert_eq!(first_pin, "data");
                assert_eq!(second_pin, "le");
            }
            other => panic!("expected wiring conflict, got {:?}", other),
        }
    }
}
