//! Prelude for dvc2-usb-watchdog.
//!
//! This module re-exports the most commonly used types for convenient importing.
//!
//! # Example
//!
//! ```rust
//! use dvc2_usb_watchdog::prelude::*;
//!
//! let config = DriverConfig::builder().irq_index(0).build().expect("Valid config");
//! assert_eq!(config.of_match_table(), ["dvc2-usb-watchdog"]);
//! assert_eq!(PulseTiming::cycle_ms(), 2201);
//! ```

pub use crate::clock::{Clock, SystemClock};
pub use crate::config::{DriverConfig, DriverConfigBuilder, PulseTiming};
pub use crate::driver::{DriverRegistration, IRQ_FLAGS, ProbeFailure, WatchdogDevice};
pub use crate::error::{ConfigError, GpioError, IrqError, PhaseError, ResourceDegraded};
pub use crate::gpio::{Level, OutputLine, ResetLine};
pub use crate::irq::{IrqFlags, IrqLine, IrqReturn, IrqStats, ThreadedHandler};
pub use crate::platform::{DeviceNode, GpioSpec, PlatformDevice};
pub use crate::pulse::{CycleOutcome, MetricsSnapshot, ResetPhase};
pub use crate::sim::{SimBoard, SimGpioChip, SimPlatformDevice, VirtualClock};
