//! Benchmarks for the reset cycle and interrupt delivery.

use criterion::{Criterion, criterion_group, criterion_main};
use dvc2_usb_watchdog::HubResetHandler;
use dvc2_usb_watchdog::prelude::*;
use std::hint::black_box;
use std::sync::Arc;

fn bench_phase(c: &mut Criterion) {
    let mut group = c.benchmark_group("phase");

    group.bench_function("can_transition_to", |b| {
        b.iter(|| black_box(ResetPhase::Debounce).can_transition_to(black_box(ResetPhase::Pulsing)));
    });

    group.bench_function("from_raw", |b| {
        b.iter(|| ResetPhase::from_raw(black_box(3)));
    });

    group.finish();
}

fn bench_cycle(c: &mut Criterion) {
    let mut group = c.benchmark_group("cycle");

    group.bench_function("virtual_cycle_with_reset_line", |b| {
        let clock = VirtualClock::new();
        let chip = SimGpioChip::new("gpio3", 32, Arc::new(clock.clone()));
        let Ok(line) = chip.request(22, false) else {
            return;
        };
        let mut handler = HubResetHandler::new("bench", ResetLine::setup(Ok(line)), Arc::new(clock));
        b.iter(|| black_box(handler.run_cycle()));
    });

    group.bench_function("virtual_cycle_degraded", |b| {
        let reset = ResetLine::<dvc2_usb_watchdog::sim::SimGpioLine>::setup(Err(
            GpioError::not_found("reset"),
        ));
        let mut handler = HubResetHandler::new("bench", reset, Arc::new(VirtualClock::new()));
        b.iter(|| black_box(handler.run_cycle()));
    });

    group.finish();
}

fn bench_delivery(c: &mut Criterion) {
    let mut group = c.benchmark_group("delivery");

    group.bench_function("pulse_to_rearm", |b| {
        let clock = VirtualClock::new();
        let board = SimBoard::new(clock.clone());
        board.add_gpio_chip("gpio3", 32);
        let hub_det = board.add_irq_line(3);
        let node = DeviceNode::new("dvc2-usb-watchdog")
            .with_compatible("dvc2-usb-watchdog")
            .with_interrupt(3)
            .with_gpio("reset", GpioSpec::new("gpio3", 22));
        let pdev = board.platform_device("dvc2-usb-watchdog", Some(node));
        let Ok(device) = WatchdogDevice::probe(&pdev, &DriverConfig::default(), Arc::new(clock))
        else {
            return;
        };

        b.iter(|| {
            hub_det.pulse();
            hub_det.wait_idle();
        });

        device.remove();
    });

    group.finish();
}

criterion_group!(benches, bench_phase, bench_cycle, bench_delivery);
criterion_main!(benches);
