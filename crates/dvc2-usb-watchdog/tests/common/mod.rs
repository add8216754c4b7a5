//! Shared fixtures for integration tests.

#![allow(dead_code, reason = "each test binary uses a different subset")]

use crossbeam::channel::{self, Receiver, Sender};
use dvc2_usb_watchdog::prelude::*;
use std::sync::Arc;
use std::time::{Duration, Instant};

pub type TestResult = Result<(), Box<dyn std::error::Error>>;

/// Interrupt specifier and GPIO offset used by the reference device tree.
pub const HUB_DET_IRQ: u32 = 3;
pub const RESET_OFFSET: u32 = 22;

pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init()
        .ok();
}

/// The node from the board's device tree.
pub fn reference_node() -> DeviceNode {
    DeviceNode::new("dvc2-usb-watchdog")
        .with_compatible("dvc2-usb-watchdog")
        .with_interrupt(HUB_DET_IRQ)
        .with_gpio("reset", GpioSpec::new("gpio3", RESET_OFFSET))
}

/// A board with `gpio3` and the `USB_HUB_DET` line wired up.
pub struct Rig {
    pub clock: VirtualClock,
    pub board: SimBoard,
    pub gpio3: SimGpioChip,
    pub hub_det: Arc<IrqLine>,
}

impl Rig {
    pub fn new() -> Self {
        init_tracing();
        let clock = VirtualClock::new();
        Self::with_clock(clock.clone(), clock)
    }

    pub fn with_clock(clock: VirtualClock, board_clock: impl Clock + 'static) -> Self {
        let board = SimBoard::new(board_clock);
        let gpio3 = board.add_gpio_chip("gpio3", 32);
        let hub_det = board.add_irq_line(HUB_DET_IRQ);
        Self {
            clock,
            board,
            gpio3,
            hub_det,
        }
    }

    pub fn device(&self, node: Option<DeviceNode>) -> SimPlatformDevice {
        self.board.platform_device("dvc2-usb-watchdog", node)
    }

    pub fn reference_device(&self) -> SimPlatformDevice {
        self.device(Some(reference_node()))
    }

    pub fn clock_handle(&self) -> Arc<dyn Clock> {
        self.board.clock()
    }

    /// Logical levels written to the reset line with their times.
    pub fn reset_timeline(&self) -> Vec<(u64, Level)> {
        self.gpio3
            .history(RESET_OFFSET)
            .into_iter()
            .map(|event| (event.at_ms, event.level))
            .collect()
    }
}

/// A virtual clock whose sleeps block until the test hands out a permit.
#[derive(Debug, Clone)]
pub struct GatedClock {
    time: VirtualClock,
    permits: Receiver<()>,
}

impl GatedClock {
    pub fn new(time: VirtualClock) -> (Self, Sender<()>) {
        let (tx, rx) = channel::unbounded();
        (Self { time, permits: rx }, tx)
    }
}

impl Clock for GatedClock {
    fn now_ms(&self) -> u64 {
        self.time.now_ms()
    }

    fn sleep_ms(&self, ms: u64) {
        if self.permits.recv().is_ok() {
            self.time.sleep_ms(ms);
        }
    }
}

/// Poll `condition` for up to five seconds of real time.
pub fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    condition()
}

/// Start and end times of each low pulse in a timeline.
pub fn low_pulses(timeline: &[(u64, Level)]) -> Vec<(u64, u64)> {
    let mut pulses = Vec::new();
    let mut low_since = None;
    for &(at, level) in timeline {
        match (level, low_since) {
            (Level::Low, None) => low_since = Some(at),
            (Level::High, Some(start)) => {
                pulses.push((start, at));
                low_since = None;
            }
            _ => {}
        }
    }
    pulses
}
