//! Time source used by the reset cycle.
//!
//! The handler never calls `std::thread::sleep` directly. It sleeps through a
//! [`Clock`] so the software platform can run full cycles on virtual time.

use std::time::{Duration, Instant};

/// Monotonic time source with blocking sleep.
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// Milliseconds since an arbitrary fixed origin.
    fn now_ms(&self) -> u64;

    /// Block the calling thread for `ms` milliseconds.
    fn sleep_ms(&self, ms: u64);
}

/// Wall-clock implementation backed by `Instant` and `thread::sleep`.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    /// Create a clock whose origin is now.
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    #[expect(
        clippy::cast_possible_truncation,
        reason = "u64 milliseconds cover half a billion years"
    )]
    fn now_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }

    fn sleep_ms(&self, ms: u64) {
        std::thread::sleep(Duration::from_millis(ms));
    }
}
