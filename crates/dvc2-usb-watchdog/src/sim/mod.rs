//! Software platform.
//!
//! In-process stand-ins for the pieces of a board the driver touches: a
//! virtual clock, GPIO controllers that record every write, interrupt lines
//! and platform devices built from [`DeviceNode`](crate::DeviceNode)
//! descriptions. Used by the test suite and for running the driver without
//! hardware.

pub mod board;
pub mod clock;
pub mod gpio;

pub use board::{SimBoard, SimPlatformDevice};
pub use clock::VirtualClock;
pub use gpio::{GpioEvent, SimGpioChip, SimGpioLine};
