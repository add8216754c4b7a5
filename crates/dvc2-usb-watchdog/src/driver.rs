//! Device binding and driver registration.
//!
//! [`WatchdogDevice::probe`] binds one platform device: it sets up the reset
//! GPIO (degrading instead of failing when it is missing), resolves the fault
//! interrupt and installs a [`HubResetHandler`] as a threaded one-shot
//! handler. [`WatchdogDevice::remove`] undoes it in reverse order.
//!
//! [`DriverRegistration`] is the explicit init/exit pair that matches and
//! probes every device carrying the driver's compatible string.

use std::sync::Arc;
use tracing::{debug, error, info};

use crate::clock::Clock;
use crate::config::DriverConfig;
use crate::error::{ConfigError, ConfigResult};
use crate::gpio::{OutputLine, ResetLine};
use crate::irq::{IrqFlags, IrqLine, IrqRegistration};
use crate::platform::PlatformDevice;
use crate::pulse::{HandlerMetrics, HubResetHandler, MetricsSnapshot, PhaseState, ResetPhase};

/// Flags the fault interrupt is requested with.
pub const IRQ_FLAGS: IrqFlags = IrqFlags::TRIGGER_LOW
    .union(IrqFlags::SHARED)
    .union(IrqFlags::ONESHOT);

/// A bound USB hub watchdog.
#[derive(Debug)]
pub struct WatchdogDevice<L: OutputLine> {
    name: String,
    can_reset: bool,
    phase: Arc<PhaseState>,
    metrics: Arc<HandlerMetrics>,
    registration: IrqRegistration<HubResetHandler<L>>,
}

impl<L: OutputLine> WatchdogDevice<L> {
    /// Bind `pdev`.
    ///
    /// A reset GPIO that cannot be acquired or configured is logged and the
    /// device is bound without reset capability.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::InvalidDescriptor`] if `config` does not validate
    /// - [`ConfigError::MissingNode`] if the device has no device-tree node
    /// - [`ConfigError::MissingInterrupt`] if no interrupt is assigned
    /// - [`ConfigError::InvalidInterrupt`] if the interrupt number is below 1
    /// - [`ConfigError::IrqRequest`] if the handler cannot be installed
    pub fn probe<P>(pdev: &P, config: &DriverConfig, clock: Arc<dyn Clock>) -> ConfigResult<Self>
    where
        P: PlatformDevice<Line = L>,
    {
        config.validate()?;
        let name = pdev.name().to_string();

        if pdev.of_node().is_none() {
            error!(device = %name, "no dvc2-usb-watchdog device node");
            return Err(ConfigError::MissingNode);
        }

        let reset = ResetLine::setup(pdev.gpiod_get(&config.reset_con_id));
        if let Some(reason) = reset.degraded() {
            error!(device = %name, error = %reason.source, "failed to set up USB_HUB_RESET gpio");
        }

        let index = config.irq_index;
        let Some(raw) = pdev.get_irq(index) else {
            error!(device = %name, index, "platform_get_irq() failed to get IRQ for USB_HUB_DET");
            return Err(ConfigError::MissingInterrupt { index });
        };
        let irq = match u32::try_from(raw) {
            Ok(irq) if irq >= 1 => irq,
            _ => {
                error!(device = %name, irq = raw, "platform_get_irq() failed to get IRQ for USB_HUB_DET");
                return Err(ConfigError::InvalidInterrupt(raw));
            }
        };

        let handler = HubResetHandler::new(name.clone(), reset, clock);
        let can_reset = handler.can_reset();
        let phase = handler.phase();
        let metrics = handler.metrics();

        let registration = pdev
            .request_threaded_irq(irq, IRQ_FLAGS, &name, handler)
            .map_err(|source| {
                error!(device = %name, irq, error = %source, "unable to claim irq");
                ConfigError::irq_request(irq, source)
            })?;

        info!(device = %name, irq, can_reset, "USB hub watchdog initialised");

        Ok(Self {
            name,
            can_reset,
            phase,
            metrics,
            registration,
        })
    }

    /// Unbind: free the interrupt, then release the reset GPIO.
    ///
    /// Blocks until a cycle in progress has finished.
    pub fn remove(self) {
        let Self {
            name, registration, ..
        } = self;

        let released = registration
            .free()
            .map(HubResetHandler::into_reset_line)
            .and_then(ResetLine::release);

        match released {
            Some(label) => info!(device = %name, line = %label, "USB hub watchdog removed"),
            None => info!(device = %name, "USB hub watchdog removed"),
        }
    }

    /// Device name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Interrupt number the handler is installed on.
    #[must_use]
    pub fn irq(&self) -> u32 {
        self.registration.irq()
    }

    /// The fault interrupt line.
    #[must_use]
    pub fn irq_line(&self) -> &Arc<IrqLine> {
        self.registration.line()
    }

    /// Whether the device holds a reset line.
    #[must_use]
    pub fn can_reset(&self) -> bool {
        self.can_reset
    }

    /// Current phase of the reset cycle.
    #[must_use]
    pub fn phase(&self) -> ResetPhase {
        self.phase.phase()
    }

    /// Handler counters.
    #[must_use]
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}

/// A device that matched but failed to probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeFailure {
    /// Device name.
    pub device: String,
    /// Why probe failed.
    pub error: ConfigError,
}

/// The registered driver and every device it bound.
#[derive(Debug)]
pub struct DriverRegistration<L: OutputLine> {
    config: DriverConfig,
    devices: Vec<WatchdogDevice<L>>,
    failures: Vec<ProbeFailure>,
}

impl<L: OutputLine> DriverRegistration<L> {
    /// Register the driver and probe every matching device.
    ///
    /// A device matches if its node lists the configured compatible string
    /// or its name equals the driver name. A failed probe is logged with its
    /// status and recorded; it does not fail registration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidDescriptor`] if `config` does not
    /// validate.
    pub fn init<'a, P, I>(
        config: DriverConfig,
        clock: Arc<dyn Clock>,
        devices: I,
    ) -> ConfigResult<Self>
    where
        P: PlatformDevice<Line = L> + 'a,
        I: IntoIterator<Item = &'a P>,
    {
        config.validate()?;
        info!(driver = %config.name, "USB hub watchdog init");

        let mut bound = Vec::new();
        let mut failures = Vec::new();
        for pdev in devices {
            if !Self::matches(&config, pdev) {
                debug!(driver = %config.name, device = pdev.name(), "no match");
                continue;
            }
            match WatchdogDevice::probe(pdev, &config, Arc::clone(&clock)) {
                Ok(device) => bound.push(device),
                Err(e) => {
                    error!(
                        driver = %config.name,
                        device = pdev.name(),
                        status = e.errno(),
                        error = %e,
                        "probe failed"
                    );
                    failures.push(ProbeFailure {
                        device: pdev.name().to_string(),
                        error: e,
                    });
                }
            }
        }

        Ok(Self {
            config,
            devices: bound,
            failures,
        })
    }

    fn matches<P: PlatformDevice>(config: &DriverConfig, pdev: &P) -> bool {
        let by_node = pdev.of_node().is_some_and(|node| {
            config
                .of_match_table()
                .iter()
                .any(|compatible| node.is_compatible(compatible))
        });
        by_node || pdev.name() == config.name
    }

    /// The driver descriptor.
    #[must_use]
    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// Devices bound at init.
    #[must_use]
    pub fn devices(&self) -> &[WatchdogDevice<L>] {
        &self.devices
    }

    /// The bound device named `name`.
    #[must_use]
    pub fn device(&self, name: &str) -> Option<&WatchdogDevice<L>> {
        self.devices.iter().find(|device| device.name() == name)
    }

    /// Matching devices whose probe failed.
    #[must_use]
    pub fn failures(&self) -> &[ProbeFailure] {
        &self.failures
    }

    /// Unregister: remove every bound device.
    pub fn exit(self) {
        info!(driver = %self.config.name, "USB hub watchdog exit");
        for device in self.devices {
            device.remove();
        }
    }
}
