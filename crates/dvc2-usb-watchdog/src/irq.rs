//! Threaded interrupt lines.
//!
//! An [`IrqLine`] is one interrupt input. Each [`request`](IrqLine::request)
//! attaches an action served by its own worker thread. Delivery is one-shot:
//! the line is masked when it fires and stays masked until every worker has
//! returned from its handler, at which point the line is explicitly re-armed.
//!
//! ```text
//! assert ──► masked? ──no──► mask, send to every worker ──► handlers run
//!               │                                              │
//!              yes                                 last one returns
//!               ▼                                              ▼
//!         latch pending ◄────── pending or still asserted? ◄── re-arm
//! ```

use bitflags::bitflags;
use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, error};

use crate::clock::Clock;
use crate::error::{IrqError, IrqResult};

bitflags! {
    /// Interrupt request flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct IrqFlags: u32 {
        /// Trigger on a rising edge.
        const TRIGGER_RISING = 0x0000_0001;
        /// Trigger on a falling edge.
        const TRIGGER_FALLING = 0x0000_0002;
        /// Trigger while the line is high.
        const TRIGGER_HIGH = 0x0000_0004;
        /// Trigger while the line is low.
        const TRIGGER_LOW = 0x0000_0008;
        /// Allow other actions on the same line.
        const SHARED = 0x0000_0080;
        /// Keep the line masked until the thread handler returns.
        const ONESHOT = 0x0000_2000;
    }
}

impl IrqFlags {
    /// All trigger-type bits.
    pub const TRIGGER_MASK: Self = Self::TRIGGER_RISING
        .union(Self::TRIGGER_FALLING)
        .union(Self::TRIGGER_HIGH)
        .union(Self::TRIGGER_LOW);

    /// Trigger-type bits only.
    #[must_use]
    pub fn trigger(self) -> Self {
        self & Self::TRIGGER_MASK
    }

    /// Whether the trigger bits describe one valid trigger type.
    ///
    /// Edges may be combined (both edges); a level stands alone.
    #[must_use]
    pub fn has_valid_trigger(self) -> bool {
        let trigger = self.trigger();
        let level = Self::TRIGGER_HIGH | Self::TRIGGER_LOW;
        if trigger.is_empty() {
            return false;
        }
        if trigger.intersects(level) {
            return trigger == Self::TRIGGER_HIGH || trigger == Self::TRIGGER_LOW;
        }
        true
    }
}

/// Result of running a handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrqReturn {
    /// The interrupt was not from this device.
    None,
    /// The interrupt was handled.
    Handled,
}

/// Handler run on an interrupt's worker thread.
///
/// The handler is owned by the worker, so it can hold resources without
/// locking. It may block; the line stays masked until it returns.
pub trait ThreadedHandler: Send + 'static {
    /// Handle one delivery of `irq`.
    fn handle(&mut self, irq: u32) -> IrqReturn;
}

/// Counters kept by a line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IrqStats {
    /// Deliveries to the attached actions.
    pub delivered: u64,
    /// Assertions seen while masked and latched for later.
    pub latched: u64,
    /// Times the line was unmasked after all handlers returned.
    pub rearmed: u64,
    /// Handler runs that returned [`IrqReturn::None`].
    pub unhandled: u64,
    /// Clock time of the last delivery, in milliseconds.
    pub last_delivery_ms: Option<u64>,
    /// Clock time of the last re-arm, in milliseconds.
    pub last_rearm_ms: Option<u64>,
}

#[derive(Debug)]
struct Action {
    id: u64,
    name: String,
    flags: IrqFlags,
    events: Sender<u32>,
}

#[derive(Debug, Default)]
struct LineState {
    asserted: bool,
    masked: bool,
    pending: bool,
    in_flight: usize,
    next_id: u64,
    actions: Vec<Action>,
    stats: IrqStats,
}

/// One interrupt input with threaded, one-shot delivery.
#[derive(Debug)]
pub struct IrqLine {
    irq: u32,
    clock: Arc<dyn Clock>,
    state: Mutex<LineState>,
    changed: Condvar,
}

impl IrqLine {
    /// Create an unasserted, unmasked line with no actions.
    #[must_use]
    pub fn new(irq: u32, clock: Arc<dyn Clock>) -> Arc<Self> {
        Arc::new(Self {
            irq,
            clock,
            state: Mutex::new(LineState::default()),
            changed: Condvar::new(),
        })
    }

    /// Interrupt number of this line.
    #[must_use]
    pub fn irq(&self) -> u32 {
        self.irq
    }

    /// Attach a threaded handler.
    ///
    /// # Errors
    ///
    /// - [`IrqError::OneshotRequired`] without [`IrqFlags::ONESHOT`]
    /// - [`IrqError::InvalidTrigger`] without exactly one trigger type
    /// - [`IrqError::Busy`] if the line has an action and the two do not
    ///   both allow sharing with the same trigger
    /// - [`IrqError::SpawnFailed`] if the worker thread cannot start
    pub fn request<H: ThreadedHandler>(
        self: &Arc<Self>,
        flags: IrqFlags,
        name: &str,
        handler: H,
    ) -> IrqResult<IrqRegistration<H>> {
        if !flags.contains(IrqFlags::ONESHOT) {
            return Err(IrqError::OneshotRequired);
        }
        if !flags.has_valid_trigger() {
            return Err(IrqError::InvalidTrigger);
        }

        let mut state = self.state.lock();
        if let Some(existing) = state.actions.first() {
            let both_shared =
                existing.flags.contains(IrqFlags::SHARED) && flags.contains(IrqFlags::SHARED);
            if !both_shared || existing.flags.trigger() != flags.trigger() {
                debug!(irq = self.irq, existing = %existing.name, "refusing to share line");
                return Err(IrqError::Busy(self.irq));
            }
        }

        let (events, receiver) = channel::unbounded();
        let id = state.next_id;
        state.next_id = state.next_id.wrapping_add(1);

        let line = Arc::clone(self);
        let worker = std::thread::Builder::new()
            .name(format!("irq/{}-{name}", self.irq))
            .spawn(move || run_worker(&line, id, &receiver, handler))
            .map_err(|e| IrqError::SpawnFailed(e.to_string()))?;

        state.actions.push(Action {
            id,
            name: name.to_string(),
            flags,
            events,
        });
        debug!(irq = self.irq, action = name, "threaded irq requested");

        if state.asserted && !state.masked {
            self.dispatch(&mut state);
        }

        Ok(IrqRegistration {
            line: Arc::clone(self),
            id,
            worker: Some(worker),
        })
    }

    /// Drive the line's trigger condition.
    ///
    /// Asserting an armed line delivers to every action. Asserting a masked
    /// line latches the event until the line is re-armed.
    pub fn set_asserted(&self, asserted: bool) {
        let mut state = self.state.lock();
        state.asserted = asserted;
        if asserted {
            if state.masked {
                state.pending = true;
                state.stats.latched = state.stats.latched.saturating_add(1);
            } else {
                self.dispatch(&mut state);
            }
        }
        self.changed.notify_all();
    }

    /// Assert and hold the trigger condition.
    pub fn assert_line(&self) {
        self.set_asserted(true);
    }

    /// Release the trigger condition.
    pub fn release_line(&self) {
        self.set_asserted(false);
    }

    /// Assert then immediately release: one fault report.
    pub fn pulse(&self) {
        self.set_asserted(true);
        self.set_asserted(false);
    }

    /// Whether the line is masked by an in-progress delivery.
    #[must_use]
    pub fn is_masked(&self) -> bool {
        self.state.lock().masked
    }

    /// Number of attached actions.
    #[must_use]
    pub fn action_count(&self) -> usize {
        self.state.lock().actions.len()
    }

    /// Snapshot of the line counters.
    #[must_use]
    pub fn stats(&self) -> IrqStats {
        self.state.lock().stats
    }

    /// Block until the line is armed with nothing latched.
    pub fn wait_idle(&self) {
        let mut state = self.state.lock();
        while state.masked || (state.pending && !state.actions.is_empty()) {
            self.changed.wait(&mut state);
        }
    }

    /// Block until at least `count` deliveries have happened.
    pub fn wait_deliveries(&self, count: u64) {
        let mut state = self.state.lock();
        while state.stats.delivered < count {
            self.changed.wait(&mut state);
        }
    }

    fn dispatch(&self, state: &mut LineState) {
        if state.actions.is_empty() {
            return;
        }
        state.masked = true;
        state.pending = false;
        state.in_flight = 0;
        for action in &state.actions {
            if action.events.send(self.irq).is_ok() {
                state.in_flight = state.in_flight.saturating_add(1);
            }
        }
        state.stats.delivered = state.stats.delivered.saturating_add(1);
        state.stats.last_delivery_ms = Some(self.clock.now_ms());
        if state.in_flight == 0 {
            self.rearm(state);
        }
    }

    fn rearm(&self, state: &mut LineState) {
        state.masked = false;
        state.stats.rearmed = state.stats.rearmed.saturating_add(1);
        state.stats.last_rearm_ms = Some(self.clock.now_ms());
    }

    fn complete(&self, result: IrqReturn) {
        let mut state = self.state.lock();
        if result == IrqReturn::None {
            state.stats.unhandled = state.stats.unhandled.saturating_add(1);
        }
        state.in_flight = state.in_flight.saturating_sub(1);
        if state.in_flight == 0 && state.masked {
            self.rearm(&mut state);
            if state.pending || state.asserted {
                self.dispatch(&mut state);
            }
        }
        self.changed.notify_all();
    }

    fn detach(&self, id: u64) {
        let mut state = self.state.lock();
        state.actions.retain(|action| action.id != id);
        if state.actions.is_empty() {
            state.pending = false;
        }
        self.changed.notify_all();
    }
}

fn run_worker<H: ThreadedHandler>(
    line: &IrqLine,
    id: u64,
    events: &Receiver<u32>,
    mut handler: H,
) -> H {
    for irq in events {
        let result = handler.handle(irq);
        line.complete(result);
    }
    debug!(irq = line.irq, action = id, "irq thread exiting");
    handler
}

/// A requested threaded interrupt.
///
/// Freeing (or dropping) the registration detaches the action and waits for
/// the worker to finish the cycle it is running.
#[derive(Debug)]
pub struct IrqRegistration<H> {
    line: Arc<IrqLine>,
    id: u64,
    worker: Option<JoinHandle<H>>,
}

impl<H> IrqRegistration<H> {
    /// Interrupt number this action is attached to.
    #[must_use]
    pub fn irq(&self) -> u32 {
        self.line.irq
    }

    /// The line this action is attached to.
    #[must_use]
    pub fn line(&self) -> &Arc<IrqLine> {
        &self.line
    }

    /// Detach, join the worker and hand the handler back.
    ///
    /// Returns `None` if the worker thread panicked.
    pub fn free(mut self) -> Option<H> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Option<H> {
        let worker = self.worker.take()?;
        self.line.detach(self.id);
        match worker.join() {
            Ok(handler) => Some(handler),
            Err(_) => {
                error!(irq = self.line.irq, "irq thread panicked");
                None
            }
        }
    }
}

impl<H> Drop for IrqRegistration<H> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::VirtualClock;
    use portable_atomic::{AtomicU32, Ordering};

    #[derive(Debug, Default)]
    struct Counting {
        runs: Arc<AtomicU32>,
    }

    impl ThreadedHandler for Counting {
        fn handle(&mut self, _irq: u32) -> IrqReturn {
            self.runs.fetch_add(1, Ordering::AcqRel);
            IrqReturn::Handled
        }
    }

    fn line() -> Arc<IrqLine> {
        IrqLine::new(7, Arc::new(VirtualClock::new()))
    }

    const FLAGS: IrqFlags = IrqFlags::TRIGGER_LOW
        .union(IrqFlags::SHARED)
        .union(IrqFlags::ONESHOT);

    #[test]
    fn test_trigger_validation() {
        assert!(IrqFlags::TRIGGER_LOW.has_valid_trigger());
        assert!((IrqFlags::TRIGGER_RISING | IrqFlags::TRIGGER_FALLING).has_valid_trigger());
        assert!(!(IrqFlags::TRIGGER_LOW | IrqFlags::TRIGGER_HIGH).has_valid_trigger());
        assert!(!(IrqFlags::TRIGGER_LOW | IrqFlags::TRIGGER_FALLING).has_valid_trigger());
        assert!(!IrqFlags::ONESHOT.has_valid_trigger());
    }

    #[test]
    fn test_request_requires_oneshot() {
        let line = line();
        let result = line.request(IrqFlags::TRIGGER_LOW, "t", Counting::default());
        assert!(matches!(result, Err(IrqError::OneshotRequired)));
        assert_eq!(line.action_count(), 0);
    }

    #[test]
    fn test_exclusive_line_is_busy() -> IrqResult<()> {
        let line = line();
        let _first = line.request(
            IrqFlags::TRIGGER_LOW | IrqFlags::ONESHOT,
            "first",
            Counting::default(),
        )?;
        let second = line.request(FLAGS, "second", Counting::default());
        assert!(matches!(second, Err(IrqError::Busy(7))));
        Ok(())
    }

    #[test]
    fn test_pulse_runs_handler_and_rearms() -> IrqResult<()> {
        let line = line();
        let runs = Arc::new(AtomicU32::new(0));
        let registration = line.request(
            FLAGS,
            "t",
            Counting {
                runs: Arc::clone(&runs),
            },
        )?;

        line.pulse();
        line.wait_idle();

        assert_eq!(runs.load(Ordering::Acquire), 1);
        let stats = line.stats();
        assert_eq!(stats.delivered, 1);
        assert_eq!(stats.rearmed, 1);
        assert!(!line.is_masked());

        let handler = registration.free();
        assert!(handler.is_some());
        assert_eq!(line.action_count(), 0);
        Ok(())
    }

    #[test]
    fn test_assert_without_actions_is_ignored() {
        let line = line();
        line.pulse();
        line.wait_idle();
        assert_eq!(line.stats().delivered, 0);
    }
}
