//! Virtual time.

use portable_atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::clock::Clock;

/// A clock that only moves when slept on or advanced.
///
/// Clones share the same time. Sleeping returns immediately after moving
/// time forward, so a full reset cycle completes in microseconds of real
/// time while reporting its exact timeline.
#[derive(Debug, Clone, Default)]
pub struct VirtualClock {
    now_ms: Arc<AtomicU64>,
    slept_ms: Arc<AtomicU64>,
}

impl VirtualClock {
    /// A clock at time zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Move time forward without counting it as sleep.
    pub fn advance(&self, ms: u64) {
        self.now_ms.fetch_add(ms, Ordering::AcqRel);
    }

    /// Total time spent in [`Clock::sleep_ms`] across all clones.
    #[must_use]
    pub fn slept_ms(&self) -> u64 {
        self.slept_ms.load(Ordering::Acquire)
    }
}

impl Clock for VirtualClock {
    fn now_ms(&self) -> u64 {
        self.now_ms.load(Ordering::Acquire)
    }

    fn sleep_ms(&self, ms: u64) {
        self.slept_ms.fetch_add(ms, Ordering::AcqRel);
        self.now_ms.fetch_add(ms, Ordering::AcqRel);
    }
}
