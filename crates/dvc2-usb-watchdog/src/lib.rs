//! # dvc2-usb-watchdog
//!
//! USB hub watchdog for the RD DVC2 board.
//!
//! The hub signals a fault by pulling `USB_HUB_DET` low. This crate binds to
//! a device-tree node, requests that line as a threaded one-shot interrupt and
//! answers every fault with a timed pulse on `USB_RESET_N` (active low).
//!
//! - [`driver`] - probe/remove of a [`WatchdogDevice`] and the explicit
//!   [`DriverRegistration`] init/exit pair
//! - [`pulse`] - the reset pulse state machine run on each interrupt
//! - [`irq`] - threaded interrupt lines with one-shot masking and re-arm
//! - [`gpio`] - output line trait and the tagged reset handle
//! - [`platform`] - the device-model seam the driver consumes
//! - [`sim`] - software platform for tests and hardware-free environments
//!
//! ## Reset cycle
//!
//! ```text
//! Idle ──irq──► Debounce ──200ms──► Pulsing ──1ms──► Cooldown ──2000ms──► Idle
//!   │                                                   ▲
//!   └──────────── reset line unavailable ───────────────┘
//! ```
//!
//! The line stays masked for the whole cycle, so a second fault reported
//! while a cycle runs is handled only after the cooldown ends.
//!
//! ## Example
//!
//! ```rust
//! use dvc2_usb_watchdog::prelude::*;
//! use std::sync::Arc;
//!
//! let clock = VirtualClock::new();
//! let board = SimBoard::new(clock.clone());
//! let gpio3 = board.add_gpio_chip("gpio3", 32);
//! let hub_det = board.add_irq_line(3);
//!
//! let node = DeviceNode::new("dvc2-usb-watchdog")
//!     .with_compatible("dvc2-usb-watchdog")
//!     .with_interrupt(3)
//!     .with_gpio("reset", GpioSpec::new("gpio3", 22));
//! let pdev = board.platform_device("dvc2-usb-watchdog", Some(node));
//!
//! let device = WatchdogDevice::probe(&pdev, &DriverConfig::default(), Arc::new(clock.clone()))
//!     .expect("probe should succeed");
//! assert!(device.can_reset());
//!
//! hub_det.pulse();
//! hub_det.wait_idle();
//! assert_eq!(device.metrics().resets, 1);
//! assert_eq!(gpio3.level(22), Some(Level::High));
//!
//! device.remove();
//! ```

#![deny(
    unsafe_op_in_unsafe_fn,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic_in_result_fn,
    clippy::panic,
    missing_docs,
    missing_debug_implementations
)]
#![warn(clippy::pedantic)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod clock;
pub mod config;
pub mod driver;
pub mod error;
pub mod gpio;
pub mod irq;
pub mod platform;
pub mod prelude;
pub mod pulse;
pub mod sim;

pub use clock::{Clock, SystemClock};
pub use config::{DriverConfig, DriverConfigBuilder, PulseTiming};
pub use driver::{DriverRegistration, IRQ_FLAGS, ProbeFailure, WatchdogDevice};
pub use error::{
    ConfigError, ConfigResult, GpioError, GpioResult, IrqError, IrqResult, PhaseError,
    ResourceDegraded,
};
pub use gpio::{Level, OutputLine, ResetLine};
pub use irq::{IrqFlags, IrqLine, IrqRegistration, IrqReturn, IrqStats, ThreadedHandler};
pub use platform::{DeviceNode, GpioSpec, PlatformDevice};
pub use pulse::{
    CycleOutcome, HandlerMetrics, HubResetHandler, MetricsSnapshot, PhaseState, ResetPhase,
};
