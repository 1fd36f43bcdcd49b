//! Scan cache rebuild benchmark
//!
//! Builds a roster with every PLL and DDS carrying data for each step and
//! measures a full cache rebuild.

use controller::Roster;
use controller::model::{ChipKind, DeviceSlot, LogicalDevice, Pin, PinData, PinFunction, PinRole};
use controller::scan::{ScanCache, ScanDefinition};
use controller::wiring::build_wiring;
use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};

fn sweep_roster(steps: u32) -> Roster {
    let devices = [
        (DeviceSlot::Pll1, ChipKind::Lmx2326, 21),
        (DeviceSlot::Pll2, ChipKind::Lmx2326, 21),
        (DeviceSlot::Pll3, ChipKind::Lmx2326, 21),
        (DeviceSlot::Dds1, ChipKind::Ad9850, 40),
        (DeviceSlot::Dds3, ChipKind::Ad9850, 40),
    ];

    let mut roster = Roster::new();
    for (slot, chip, word_len) in devices {
        let mut pin = Pin::new("data", PinFunction::Data, PinRole::MainData);
        for step in 0..steps {
            let word = (0..word_len).map(|bit| (step >> (bit % 32)) & 1 == 1).collect();
            pin.set_data(step, PinData::fully_valid(word));
        }
        if let Ok(device) = LogicalDevice::new(slot, chip) {
            roster.insert(device.with_pin(pin));
        }
    }
    build_wiring(&mut roster);
    roster
}

fn bench_rebuild(c: &mut Criterion) {
    let mut group = c.benchmark_group("scan_cache_rebuild");
    for steps in [100u32, 1024] {
        let roster = sweep_roster(steps);
        let definition = ScanDefinition {
            number_of_steps: steps,
            inverted: false,
            adc_averaging: 1,
        };
        group.bench_with_input(BenchmarkId::from_parameter(steps), &definition, |b, def| {
            b.iter(|| ScanCache::build(black_box(def), black_box(&roster)))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_rebuild);
criterion_main!(benches);
