//! Simulated GPIO controller.

use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::clock::Clock;
use crate::error::{GpioError, GpioResult};
use crate::gpio::{Level, OutputLine};

/// One recorded write to a simulated line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GpioEvent {
    /// Clock time of the write, in milliseconds.
    pub at_ms: u64,
    /// Logical level written.
    pub level: Level,
    /// Electrical level after active-low inversion.
    pub physical: Level,
}

#[derive(Debug, Default)]
struct LineSlot {
    requested: bool,
    output: bool,
    level: Option<Level>,
    history: Vec<GpioEvent>,
    requests: u64,
}

#[derive(Debug, Default)]
struct ChipState {
    lines: BTreeMap<u32, LineSlot>,
    refuse_direction: BTreeSet<u32>,
    refuse_writes: BTreeSet<u32>,
}

#[derive(Debug)]
struct ChipInner {
    label: String,
    ngpio: u32,
    clock: Arc<dyn Clock>,
    state: Mutex<ChipState>,
}

/// A GPIO controller whose lines record every write.
///
/// Clones refer to the same controller.
#[derive(Debug, Clone)]
pub struct SimGpioChip {
    inner: Arc<ChipInner>,
}

impl SimGpioChip {
    /// A controller with `ngpio` lines labelled `label`.
    #[must_use]
    pub fn new(label: impl Into<String>, ngpio: u32, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(ChipInner {
                label: label.into(),
                ngpio,
                clock,
                state: Mutex::new(ChipState::default()),
            }),
        }
    }

    /// Controller label.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.inner.label
    }

    /// Request line `offset` for exclusive use.
    ///
    /// # Errors
    ///
    /// Returns [`GpioError::NotFound`] for an offset past the last line and
    /// [`GpioError::Busy`] if the line is already requested.
    pub fn request(&self, offset: u32, active_low: bool) -> GpioResult<SimGpioLine> {
        if offset >= self.inner.ngpio {
            return Err(GpioError::not_found(format!(
                "{}:{offset}",
                self.inner.label
            )));
        }
        let mut state = self.inner.state.lock();
        let slot = state.lines.entry(offset).or_default();
        if slot.requested {
            return Err(GpioError::Busy {
                chip: self.inner.label.clone(),
                offset,
            });
        }
        slot.requested = true;
        slot.requests = slot.requests.saturating_add(1);
        Ok(SimGpioLine {
            chip: self.clone(),
            offset,
            active_low,
        })
    }

    /// Last logical level driven on `offset`, kept after release.
    #[must_use]
    pub fn level(&self, offset: u32) -> Option<Level> {
        self.inner
            .state
            .lock()
            .lines
            .get(&offset)
            .and_then(|slot| slot.level)
    }

    /// Every write to `offset`, oldest first.
    #[must_use]
    pub fn history(&self, offset: u32) -> Vec<GpioEvent> {
        self.inner
            .state
            .lock()
            .lines
            .get(&offset)
            .map(|slot| slot.history.clone())
            .unwrap_or_default()
    }

    /// Number of `set_value` and `direction_output` writes to `offset`.
    #[must_use]
    pub fn write_count(&self, offset: u32) -> usize {
        self.history(offset).len()
    }

    /// Whether `offset` is currently requested.
    #[must_use]
    pub fn is_requested(&self, offset: u32) -> bool {
        self.inner
            .state
            .lock()
            .lines
            .get(&offset)
            .is_some_and(|slot| slot.requested)
    }

    /// Times `offset` has been requested.
    #[must_use]
    pub fn request_count(&self, offset: u32) -> u64 {
        self.inner
            .state
            .lock()
            .lines
            .get(&offset)
            .map_or(0, |slot| slot.requests)
    }

    /// Make `direction_output` on `offset` fail.
    pub fn refuse_direction(&self, offset: u32) {
        self.inner.state.lock().refuse_direction.insert(offset);
    }

    /// Make `set_value` on `offset` fail or succeed again.
    pub fn refuse_writes(&self, offset: u32, refuse: bool) {
        let mut state = self.inner.state.lock();
        if refuse {
            state.refuse_writes.insert(offset);
        } else {
            state.refuse_writes.remove(&offset);
        }
    }

    fn write(&self, offset: u32, active_low: bool, level: Level, direction: bool) -> GpioResult<()> {
        let at_ms = self.inner.clock.now_ms();
        let mut state = self.inner.state.lock();
        let refused = if direction {
            state.refuse_direction.contains(&offset)
        } else {
            state.refuse_writes.contains(&offset)
        };
        if refused {
            return Err(GpioError::io(format!(
                "{}:{offset} rejected write",
                self.inner.label
            )));
        }
        let slot = state.lines.entry(offset).or_default();
        if direction {
            slot.output = true;
        } else if !slot.output {
            return Err(GpioError::io(format!(
                "{}:{offset} is not an output",
                self.inner.label
            )));
        }
        let physical = if active_low { level.inverted() } else { level };
        slot.level = Some(level);
        slot.history.push(GpioEvent {
            at_ms,
            level,
            physical,
        });
        Ok(())
    }

    fn release(&self, offset: u32) {
        if let Some(slot) = self.inner.state.lock().lines.get_mut(&offset) {
            slot.requested = false;
            slot.output = false;
        }
    }
}

/// A requested line on a [`SimGpioChip`]. Dropping it releases the line.
#[derive(Debug)]
pub struct SimGpioLine {
    chip: SimGpioChip,
    offset: u32,
    active_low: bool,
}

impl SimGpioLine {
    /// Line offset on its controller.
    #[must_use]
    pub fn offset(&self) -> u32 {
        self.offset
    }
}

impl OutputLine for SimGpioLine {
    fn direction_output(&mut self, level: Level) -> GpioResult<()> {
        self.chip.write(self.offset, self.active_low, level, true)
    }

    fn set_value(&mut self, level: Level) -> GpioResult<()> {
        self.chip.write(self.offset, self.active_low, level, false)
    }

    fn label(&self) -> String {
        format!("{}:{}", self.chip.label(), self.offset)
    }
}

impl Drop for SimGpioLine {
    fn drop(&mut self) {
        self.chip.release(self.offset);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::VirtualClock;

    fn chip() -> SimGpioChip {
        SimGpioChip::new("gpio3", 32, Arc::new(VirtualClock::new()))
    }

    #[test]
    fn test_request_is_exclusive_until_drop() -> GpioResult<()> {
        let chip = chip();
        let line = chip.request(22, false)?;
        assert!(chip.is_requested(22));
        assert!(matches!(chip.request(22, false), Err(GpioError::Busy { .. })));

        drop(line);
        assert!(!chip.is_requested(22));
        let _again = chip.request(22, false)?;
        assert_eq!(chip.request_count(22), 2);
        Ok(())
    }

    #[test]
    fn test_out_of_range_offset() {
        let chip = chip();
        assert!(matches!(chip.request(32, false), Err(GpioError::NotFound(_))));
    }

    #[test]
    fn test_set_before_direction_fails() -> GpioResult<()> {
        let chip = chip();
        let mut line = chip.request(1, false)?;
        assert!(line.set_value(Level::Low).is_err());
        line.direction_output(Level::High)?;
        line.set_value(Level::Low)?;
        assert_eq!(chip.level(1), Some(Level::Low));
        Ok(())
    }

    #[test]
    fn test_active_low_inverts_physical_level() -> GpioResult<()> {
        let chip = chip();
        let mut line = chip.request(4, true)?;
        line.direction_output(Level::High)?;
        let history = chip.history(4);
        assert_eq!(history.len(), 1);
        assert_eq!(history.first().map(|e| e.physical), Some(Level::Low));
        Ok(())
    }

    #[test]
    fn test_refused_writes_leave_level() -> GpioResult<()> {
        let chip = chip();
        let mut line = chip.request(5, false)?;
        line.direction_output(Level::High)?;
        chip.refuse_writes(5, true);
        assert!(line.set_value(Level::Low).is_err());
        assert_eq!(chip.level(5), Some(Level::High));
        chip.refuse_writes(5, false);
        line.set_value(Level::Low)?;
        assert_eq!(chip.write_count(5), 2);
        Ok(())
    }
}
