//! Integration tests for the bit packer
//!
//! Covers clock-mode splitting, payload size limits, unwired positions and
//! the framed bytes produced for packed writes.

use common::test_utils::bits;
use controller::model::{ChipKind, DeviceSlot, INIT_STEP, LogicalDevice, Pin, PinData};
use controller::packer::pack_init_sequence;
use controller::wiring::build_wiring;
use controller::{ControllerError, PinFunction, PinRole, Roster};
use protocol::{LogicalLatch, MAX_PAYLOAD_LEN};

fn wired(device: LogicalDevice) -> LogicalDevice {
    let slot = device.slot();
    let mut roster = Roster::new().with_device(device);
    build_wiring(&mut roster);
    roster.get(slot).cloned().unwrap()
}

fn pll1_with(pins: Vec<Pin>) -> LogicalDevice {
    let device = pins.into_iter().fold(
        LogicalDevice::new(DeviceSlot::Pll1, ChipKind::Lmx2326).unwrap(),
        |device, pin| device.with_pin(pin),
    );
    wired(device)
}

fn data_pin(pattern: &str) -> Pin {
    Pin::new("data", PinFunction::Data, PinRole::MainData)
        .with_data(INIT_STEP, PinData::fully_valid(bits(pattern)))
}

fn clock_pin(pattern: &str, mask: &str) -> Pin {
    Pin::new("autoclk", PinFunction::AutoClock, PinRole::VirtualClk)
        .with_data(INIT_STEP, PinData::new(bits(pattern), bits(mask)))
}

mod auto_clock {
    use super::*;

    #[test]
    fn test_clock_change_splits_write() {
        let device = pll1_with(vec![data_pin("1111"), clock_pin("1100", "1111")]);

        let writes = pack_init_sequence(&device, INIT_STEP).unwrap();
        assert_eq!(writes.len(), 2);
        assert!(writes[0].auto_clock);
        assert!(!writes[1].auto_clock);
        assert_eq!(writes[0].latch, LogicalLatch(1));
        assert_eq!(writes[1].latch, LogicalLatch(1));
        assert_eq!(writes[0].payload, vec![0x02, 0x02]);
        assert_eq!(writes[1].payload, vec![0x02, 0x02]);
    }

    #[test]
    fn test_clock_mode_carries_over_unmasked_positions() {
        let device = pll1_with(vec![data_pin("1111"), clock_pin("1000", "1000")]);

        let writes = pack_init_sequence(&device, INIT_STEP).unwrap();
        assert_eq!(writes.len(), 1);
        assert!(writes[0].auto_clock);
        assert_eq!(writes[0].payload.len(), 4);
    }

    #[test]
    fn test_framed_bytes_carry_clock_flag() {
        let device = pll1_with(vec![data_pin("10"), clock_pin("11", "11")]);

        let writes = pack_init_sequence(&device, INIT_STEP).unwrap();
        let framed = writes[0].encode().unwrap();
        assert_eq!(framed.as_ref(), &[0xA1, 0x02, 0x01, 0x02, 0x00]);
    }
}

mod limits {
    use super::*;

    #[test]
    fn test_long_sequence_split_at_max_payload() {
        let pattern = "1".repeat(300);
        let device = pll1_with(vec![data_pin(&pattern)]);

        let writes = pack_init_sequence(&device, INIT_STEP).unwrap();
        assert_eq!(writes.len(), 2);
        assert_eq!(writes[0].payload.len(), MAX_PAYLOAD_LEN);
        assert_eq!(writes[1].payload.len(), 300 - MAX_PAYLOAD_LEN);
        assert!(writes.iter().all(|w| w.encode().is_ok()));
    }

    #[test]
    fn test_unwired_position_reported() {
        // CONVERT has no placement on a PLL
        let stray = Pin::new("convert", PinFunction::Convert, PinRole::GenOutput)
            .with_data(INIT_STEP, PinData::fully_valid(bits("1")));
        let device = pll1_with(vec![stray]);

        match pack_init_sequence(&device, INIT_STEP) {
            Err(ControllerError::UnwiredPosition {
                device,
                step,
                position,
            }) => {
                assert_eq!(device, DeviceSlot::Pll1);
                assert_eq!(step, INIT_STEP);
                assert_eq!(position, 0);
            }
            other => panic!("expected UnwiredPosition, got {:?}", other),
        }
    }

    #[test]
    fn test_masked_positions_leave_bits_clear() {
        let device = pll1_with(vec![
            Pin::new("data", PinFunction::Data, PinRole::MainData)
                .with_data(INIT_STEP, PinData::new(bits("111"), bits("101"))),
            Pin::new("clk", PinFunction::Clk, PinRole::Clk)
                .with_data(INIT_STEP, PinData::fully_valid(bits("111"))),
        ]);

        let writes = pack_init_sequence(&device, INIT_STEP).unwrap();
        assert_eq!(writes.len(), 1);
        // data bit 1 only where valid, clock bit 0 everywhere
        assert_eq!(writes[0].payload, vec![0x03, 0x01, 0x03]);
    }

    #[test]
    fn test_ordinary_step_independent_of_init() {
        let pin = data_pin("11").with_data(0, PinData::fully_valid(bits("0")));
        let device = pll1_with(vec![pin]);

        let writes = pack_init_sequence(&device, 0).unwrap();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].payload, vec![0x00]);
        assert!(pack_init_sequence(&device, 7).unwrap().is_empty());
    }
}
