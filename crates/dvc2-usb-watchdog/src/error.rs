//! Error types for the USB hub watchdog.
//!
//! Probe failures are [`ConfigError`]s and keep the device from activating.
//! A reset line that cannot be set up is not an error at the probe level: it
//! is carried as [`ResourceDegraded`] inside the reset handle and the device
//! keeps consuming interrupts without reset capability.

use thiserror::Error;

/// `EINVAL`, the status every failed probe reports.
pub const EINVAL: i32 = 22;

/// Fatal errors found while binding a device.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// The platform device has no device-tree node.
    #[error("no dvc2-usb-watchdog device node")]
    MissingNode,

    /// No interrupt is assigned at the requested index.
    #[error("platform_get_irq() failed to get IRQ {index} for USB_HUB_DET")]
    MissingInterrupt {
        /// Interrupt index that was looked up.
        index: usize,
    },

    /// The platform returned an interrupt number that cannot be requested.
    #[error("invalid IRQ number {0} for USB_HUB_DET")]
    InvalidInterrupt(i64),

    /// The threaded interrupt could not be registered.
    #[error("unable to claim irq {irq}; error {source}")]
    IrqRequest {
        /// Interrupt number that was requested.
        irq: u32,
        /// Why the request failed.
        #[source]
        source: IrqError,
    },

    /// The driver descriptor is unusable.
    #[error("invalid driver descriptor: {0}")]
    InvalidDescriptor(String),
}

impl ConfigError {
    /// Create an interrupt request error.
    #[must_use]
    pub fn irq_request(irq: u32, source: IrqError) -> Self {
        Self::IrqRequest { irq, source }
    }

    /// Create an invalid descriptor error.
    #[must_use]
    pub fn invalid_descriptor(reason: impl Into<String>) -> Self {
        Self::InvalidDescriptor(reason.into())
    }

    /// Negative status reported through the device-model failure path.
    ///
    /// Every probe failure is reported as `-EINVAL`.
    #[must_use]
    pub fn errno(&self) -> i32 {
        -EINVAL
    }
}

/// A specialized `Result` type for probe and registration.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Errors raised by GPIO acquisition or line operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GpioError {
    /// No GPIO is bound under this connection id.
    #[error("no GPIO bound as '{0}'")]
    NotFound(String),

    /// The line is already requested by another consumer.
    #[error("GPIO {chip}:{offset} is busy")]
    Busy {
        /// Owning chip label.
        chip: String,
        /// Line offset on the chip.
        offset: u32,
    },

    /// The controller rejected the operation.
    #[error("GPIO I/O error: {0}")]
    Io(String),
}

impl GpioError {
    /// Create a not-found error.
    #[must_use]
    pub fn not_found(con_id: impl Into<String>) -> Self {
        Self::NotFound(con_id.into())
    }

    /// Create an I/O error.
    #[must_use]
    pub fn io(msg: impl Into<String>) -> Self {
        Self::Io(msg.into())
    }
}

/// A specialized `Result` type for GPIO operations.
pub type GpioResult<T> = std::result::Result<T, GpioError>;

/// The reset line could not be set up; the device runs without it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("failed to set up USB_HUB_RESET gpio: {source}")]
pub struct ResourceDegraded {
    /// Underlying GPIO failure.
    #[source]
    pub source: GpioError,
}

impl From<GpioError> for ResourceDegraded {
    fn from(source: GpioError) -> Self {
        Self { source }
    }
}

/// Errors raised by the threaded interrupt facility.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IrqError {
    /// The interrupt number is not mapped on this platform.
    #[error("IRQ {0} is not mapped")]
    NotFound(u32),

    /// The line is taken by an action that does not allow sharing.
    #[error("IRQ {0} is busy")]
    Busy(u32),

    /// A threaded handler without a primary handler must be one-shot.
    #[error("threaded IRQ without primary handler requires ONESHOT")]
    OneshotRequired,

    /// The flags name no trigger, or more than one level.
    #[error("invalid trigger type")]
    InvalidTrigger,

    /// The worker thread could not be started.
    #[error("failed to spawn IRQ thread: {0}")]
    SpawnFailed(String),
}

/// A specialized `Result` type for interrupt operations.
pub type IrqResult<T> = std::result::Result<T, IrqError>;

/// Errors raised by the reset phase state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PhaseError {
    /// The requested transition is not part of the reset cycle.
    #[error("invalid reset phase transition: {from} -> {to}")]
    InvalidTransition {
        /// Current phase.
        from: &'static str,
        /// Attempted target phase.
        to: &'static str,
    },
}

impl PhaseError {
    /// Create an invalid transition error.
    #[must_use]
    pub fn invalid_transition(from: &'static str, to: &'static str) -> Self {
        Self::InvalidTransition { from, to }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        assert_eq!(
            ConfigError::MissingNode.to_string(),
            "no dvc2-usb-watchdog device node"
        );
        let err = ConfigError::irq_request(42, IrqError::Busy(42));
        assert_eq!(err.to_string(), "unable to claim irq 42; error IRQ 42 is busy");
    }

    #[test]
    fn test_every_config_error_is_negative() {
        let errors = [
            ConfigError::MissingNode,
            ConfigError::MissingInterrupt { index: 0 },
            ConfigError::InvalidInterrupt(0),
            ConfigError::irq_request(7, IrqError::OneshotRequired),
            ConfigError::invalid_descriptor("empty"),
        ];
        for err in errors {
            assert_eq!(err.errno(), -EINVAL);
        }
    }

    #[test]
    fn test_degraded_wraps_gpio_error() {
        let degraded = ResourceDegraded::from(GpioError::not_found("reset"));
        assert!(degraded.to_string().contains("USB_HUB_RESET"));
        assert!(degraded.to_string().contains("'reset'"));
    }
}
