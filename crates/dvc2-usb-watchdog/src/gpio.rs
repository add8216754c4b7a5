//! GPIO output lines and the reset handle.

use crate::error::{GpioResult, ResourceDegraded};

/// Logical line level.
///
/// Levels are logical: an active-low line driven `Low` asserts its signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Level {
    /// Logical 0.
    Low = 0,
    /// Logical 1.
    High = 1,
}

impl Level {
    /// The opposite level.
    #[must_use]
    pub fn inverted(self) -> Self {
        match self {
            Self::Low => Self::High,
            Self::High => Self::Low,
        }
    }

    /// Level as the 0/1 value written to the line.
    #[must_use]
    pub fn as_value(self) -> u8 {
        self as u8
    }
}

impl From<bool> for Level {
    fn from(high: bool) -> Self {
        if high { Self::High } else { Self::Low }
    }
}

impl core::fmt::Display for Level {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.as_value())
    }
}

/// A requested GPIO line configured for output.
///
/// Dropping the line releases it back to its controller.
pub trait OutputLine: Send + std::fmt::Debug + 'static {
    /// Switch the line to output and drive `level`.
    ///
    /// # Errors
    ///
    /// Returns an error if the controller rejects the direction change.
    fn direction_output(&mut self, level: Level) -> GpioResult<()>;

    /// Drive `level` on an output line.
    ///
    /// # Errors
    ///
    /// Returns an error if the controller rejects the write.
    fn set_value(&mut self, level: Level) -> GpioResult<()>;

    /// Human-readable line identity for logs.
    fn label(&self) -> String;
}

/// The hub reset output, present or degraded.
///
/// Every use checks the tag first, so a device whose reset line failed to set
/// up never touches GPIO at all.
#[derive(Debug)]
pub enum ResetLine<L> {
    /// Line acquired and driven inactive.
    Ready(L),
    /// Line unavailable; the device cannot reset the hub.
    Degraded(ResourceDegraded),
}

impl<L: OutputLine> ResetLine<L> {
    /// Configure an acquired line as output, inactive (high).
    ///
    /// A line that refuses the direction change is released and the handle
    /// is degraded.
    pub fn setup(acquired: GpioResult<L>) -> Self {
        match acquired {
            Ok(mut line) => match line.direction_output(Level::High) {
                Ok(()) => Self::Ready(line),
                Err(err) => {
                    drop(line);
                    Self::Degraded(err.into())
                }
            },
            Err(err) => Self::Degraded(err.into()),
        }
    }

    /// Whether a usable line is present.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready(_))
    }

    /// The degradation cause, if any.
    #[must_use]
    pub fn degraded(&self) -> Option<&ResourceDegraded> {
        match self {
            Self::Ready(_) => None,
            Self::Degraded(reason) => Some(reason),
        }
    }

    /// Mutable access to a present line.
    pub fn line_mut(&mut self) -> Option<&mut L> {
        match self {
            Self::Ready(line) => Some(line),
            Self::Degraded(_) => None,
        }
    }

    /// Release the line. Returns its label if one was held.
    pub fn release(self) -> Option<String> {
        match self {
            Self::Ready(line) => {
                let label = line.label();
                drop(line);
                Some(label)
            }
            Self::Degraded(_) => None,
        }
    }
}
