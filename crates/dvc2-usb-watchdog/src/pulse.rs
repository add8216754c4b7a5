//! Reset pulse state machine.
//!
//! One interrupt delivery runs one full cycle on the interrupt's worker
//! thread. All waits are blocking sleeps on the handler's [`Clock`].
//!
//! ```text
//! Idle ──► Debounce ──► Pulsing ──► Cooldown ──► Idle
//!   │                                  ▲
//!   └────────── degraded ──────────────┘
//! ```

use portable_atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error, warn};

use crate::clock::Clock;
use crate::config::PulseTiming;
use crate::error::PhaseError;
use crate::gpio::{Level, OutputLine, ResetLine};
use crate::irq::{IrqReturn, ThreadedHandler};

/// Phase of the reset cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u32)]
pub enum ResetPhase {
    /// Waiting for a fault.
    #[default]
    Idle = 0,
    /// Waiting out glitches before acting.
    Debounce = 1,
    /// Reset line held low.
    Pulsing = 2,
    /// Quiet period with the interrupt masked.
    Cooldown = 3,
}

impl ResetPhase {
    /// Convert from raw u32 value.
    #[must_use]
    pub fn from_raw(value: u32) -> Option<Self> {
        match value {
            0 => Some(Self::Idle),
            1 => Some(Self::Debounce),
            2 => Some(Self::Pulsing),
            3 => Some(Self::Cooldown),
            _ => None,
        }
    }

    /// Convert to raw u32 value.
    #[must_use]
    pub fn to_raw(self) -> u32 {
        self as u32
    }

    /// Whether `self -> next` is a step of the cycle.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Idle, Self::Debounce | Self::Cooldown)
                | (Self::Debounce, Self::Pulsing)
                | (Self::Pulsing, Self::Cooldown)
                | (Self::Cooldown, Self::Idle)
        )
    }

    /// Get the phase as a string slice.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Debounce => "Debounce",
            Self::Pulsing => "Pulsing",
            Self::Cooldown => "Cooldown",
        }
    }
}

impl core::fmt::Display for ResetPhase {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Atomic cell holding the current phase.
///
/// Only the worker thread advances it; anyone may read it.
#[derive(Debug, Default)]
pub struct PhaseState {
    phase: AtomicU32,
}

impl PhaseState {
    /// A cell in [`ResetPhase::Idle`].
    #[must_use]
    pub fn new() -> Self {
        Self {
            phase: AtomicU32::new(ResetPhase::Idle.to_raw()),
        }
    }

    /// Current phase.
    #[must_use]
    pub fn phase(&self) -> ResetPhase {
        ResetPhase::from_raw(self.phase.load(Ordering::Acquire)).unwrap_or_default()
    }

    /// Move to `next`.
    ///
    /// # Errors
    ///
    /// Returns [`PhaseError::InvalidTransition`] if `next` does not follow
    /// the current phase, or if the phase changed concurrently.
    pub fn advance(&self, next: ResetPhase) -> Result<(), PhaseError> {
        let current = self.phase();
        if !current.can_transition_to(next) {
            return Err(PhaseError::invalid_transition(current.as_str(), next.as_str()));
        }
        self.phase
            .compare_exchange(
                current.to_raw(),
                next.to_raw(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .map(|_| ())
            .map_err(|raw| {
                let seen = ResetPhase::from_raw(raw).unwrap_or_default();
                PhaseError::invalid_transition(seen.as_str(), next.as_str())
            })
    }
}

/// How a cycle ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The pulse went out cleanly.
    Reset,
    /// A reset line write failed during the pulse.
    GpioFault,
    /// No reset line; only the cooldown ran.
    Degraded,
}

/// Counters shared between the worker and observers.
#[derive(Debug, Default)]
pub struct HandlerMetrics {
    cycles: AtomicU64,
    resets: AtomicU64,
    degraded_cycles: AtomicU64,
    gpio_errors: AtomicU64,
    last_cycle_ms: AtomicU64,
}

impl HandlerMetrics {
    /// Zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, outcome: CycleOutcome, elapsed_ms: u64) {
        self.cycles.fetch_add(1, Ordering::AcqRel);
        match outcome {
            CycleOutcome::Reset => {
                self.resets.fetch_add(1, Ordering::AcqRel);
            }
            CycleOutcome::Degraded => {
                self.degraded_cycles.fetch_add(1, Ordering::AcqRel);
            }
            CycleOutcome::GpioFault => {}
        }
        self.last_cycle_ms.store(elapsed_ms, Ordering::Release);
    }

    fn record_gpio_error(&self) {
        self.gpio_errors.fetch_add(1, Ordering::AcqRel);
    }

    /// Copy of the current values.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            cycles: self.cycles.load(Ordering::Acquire),
            resets: self.resets.load(Ordering::Acquire),
            degraded_cycles: self.degraded_cycles.load(Ordering::Acquire),
            gpio_errors: self.gpio_errors.load(Ordering::Acquire),
            last_cycle_ms: self.last_cycle_ms.load(Ordering::Acquire),
        }
    }
}

/// Point-in-time copy of [`HandlerMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Completed cycles of any kind.
    pub cycles: u64,
    /// Cycles that pulsed the reset line without error.
    pub resets: u64,
    /// Cycles run without a reset line.
    pub degraded_cycles: u64,
    /// Failed reset line writes.
    pub gpio_errors: u64,
    /// Duration of the last cycle in clock milliseconds.
    pub last_cycle_ms: u64,
}

/// Threaded handler that pulses the hub reset line.
#[derive(Debug)]
pub struct HubResetHandler<L> {
    device: String,
    reset: ResetLine<L>,
    clock: Arc<dyn Clock>,
    phase: Arc<PhaseState>,
    metrics: Arc<HandlerMetrics>,
}

impl<L: OutputLine> HubResetHandler<L> {
    /// Create a handler for `device` driving `reset`.
    #[must_use]
    pub fn new(device: impl Into<String>, reset: ResetLine<L>, clock: Arc<dyn Clock>) -> Self {
        Self {
            device: device.into(),
            reset,
            clock,
            phase: Arc::new(PhaseState::new()),
            metrics: Arc::new(HandlerMetrics::new()),
        }
    }

    /// Shared phase cell.
    #[must_use]
    pub fn phase(&self) -> Arc<PhaseState> {
        Arc::clone(&self.phase)
    }

    /// Shared counters.
    #[must_use]
    pub fn metrics(&self) -> Arc<HandlerMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Whether a reset line is held.
    #[must_use]
    pub fn can_reset(&self) -> bool {
        self.reset.is_ready()
    }

    /// Give back the reset handle, e.g. to release it on teardown.
    #[must_use]
    pub fn into_reset_line(self) -> ResetLine<L> {
        self.reset
    }

    /// Run one debounce, pulse and cooldown cycle.
    pub fn run_cycle(&mut self) -> CycleOutcome {
        let started = self.clock.now_ms();

        let outcome = match self.reset.line_mut() {
            Some(line) => {
                error!(device = %self.device, "resetting USB hub");
                enter(&self.phase, &self.device, ResetPhase::Debounce);
                self.clock.sleep_ms(PulseTiming::DEBOUNCE_MS);

                enter(&self.phase, &self.device, ResetPhase::Pulsing);
                let mut faulted = false;
                if let Err(e) = line.set_value(Level::Low) {
                    error!(device = %self.device, error = %e, "failed to assert USB_RESET_N");
                    self.metrics.record_gpio_error();
                    faulted = true;
                }
                self.clock.sleep_ms(PulseTiming::PULSE_MS);
                if let Err(e) = line.set_value(Level::High) {
                    error!(device = %self.device, error = %e, "failed to release USB_RESET_N");
                    self.metrics.record_gpio_error();
                    faulted = true;
                }
                if faulted {
                    CycleOutcome::GpioFault
                } else {
                    CycleOutcome::Reset
                }
            }
            None => {
                error!(device = %self.device, "unable to reset USB hub");
                CycleOutcome::Degraded
            }
        };

        enter(&self.phase, &self.device, ResetPhase::Cooldown);
        self.clock.sleep_ms(PulseTiming::COOLDOWN_MS);
        enter(&self.phase, &self.device, ResetPhase::Idle);

        let elapsed = self.clock.now_ms().saturating_sub(started);
        self.metrics.record(outcome, elapsed);
        debug!(device = %self.device, ?outcome, elapsed_ms = elapsed, "reset cycle complete");
        outcome
    }
}

fn enter(phase: &PhaseState, device: &str, next: ResetPhase) {
    if let Err(e) = phase.advance(next) {
        warn!(device = %device, error = %e, "reset phase out of sequence");
    }
}

impl<L: OutputLine> ThreadedHandler for HubResetHandler<L> {
    fn handle(&mut self, _irq: u32) -> IrqReturn {
        self.run_cycle();
        IrqReturn::Handled
    }
}
