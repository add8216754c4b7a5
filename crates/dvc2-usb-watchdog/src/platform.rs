//! The device-model seam consumed by the driver.
//!
//! A [`PlatformDevice`] is what the host hands to probe: an optional
//! device-tree node plus lookups for the GPIOs and interrupts the node
//! references.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::{GpioResult, IrqError, IrqResult};
use crate::gpio::OutputLine;
use crate::irq::{IrqFlags, IrqLine, IrqRegistration, ThreadedHandler};

/// One entry of a `<con-id>-gpios` property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GpioSpec {
    /// Label of the controller providing the line.
    pub chip: String,
    /// Line offset on the controller.
    pub offset: u32,
    /// Whether the line is electrically inverted.
    pub active_low: bool,
}

impl GpioSpec {
    /// An active-high reference to `chip` line `offset`.
    #[must_use]
    pub fn new(chip: impl Into<String>, offset: u32) -> Self {
        Self {
            chip: chip.into(),
            offset,
            active_low: false,
        }
    }

    /// Mark the reference as active-low.
    #[must_use]
    pub fn active_low(mut self) -> Self {
        self.active_low = true;
        self
    }
}

/// The parts of a device-tree node the driver reads.
///
/// ```text
/// dvc2-usb-watchdog {
///         compatible = "dvc2-usb-watchdog";
///         interrupt-parent = <&gpio1>;
///         interrupts = <3 4>;
///         reset-gpios = <&gpio3 22 0>;
/// };
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceNode {
    name: String,
    compatible: Vec<String>,
    interrupts: Vec<u32>,
    gpios: BTreeMap<String, GpioSpec>,
}

impl DeviceNode {
    /// An empty node named `name`.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Append a compatible string.
    #[must_use]
    pub fn with_compatible(mut self, compatible: impl Into<String>) -> Self {
        self.compatible.push(compatible.into());
        self
    }

    /// Append an interrupt specifier.
    #[must_use]
    pub fn with_interrupt(mut self, hwirq: u32) -> Self {
        self.interrupts.push(hwirq);
        self
    }

    /// Add a `<con_id>-gpios` property.
    #[must_use]
    pub fn with_gpio(mut self, con_id: &str, spec: GpioSpec) -> Self {
        self.gpios.insert(format!("{con_id}-gpios"), spec);
        self
    }

    /// Add a property under its full name, e.g. the legacy `reset-gpio`.
    #[must_use]
    pub fn with_gpio_property(mut self, property: impl Into<String>, spec: GpioSpec) -> Self {
        self.gpios.insert(property.into(), spec);
        self
    }

    /// Node name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Compatible strings, most specific first.
    #[must_use]
    pub fn compatible(&self) -> &[String] {
        &self.compatible
    }

    /// Whether any compatible string equals `compatible`.
    #[must_use]
    pub fn is_compatible(&self, compatible: &str) -> bool {
        self.compatible.iter().any(|c| c == compatible)
    }

    /// The `index`-th interrupt specifier.
    #[must_use]
    pub fn interrupt(&self, index: usize) -> Option<u32> {
        self.interrupts.get(index).copied()
    }

    /// The GPIO referenced as `con_id`.
    ///
    /// Looks up `<con_id>-gpios` first and falls back to `<con_id>-gpio`.
    #[must_use]
    pub fn gpio(&self, con_id: &str) -> Option<&GpioSpec> {
        self.gpios
            .get(&format!("{con_id}-gpios"))
            .or_else(|| self.gpios.get(&format!("{con_id}-gpio")))
    }
}

/// A platform device as seen by probe.
pub trait PlatformDevice {
    /// Output line type handed out by [`gpiod_get`](Self::gpiod_get).
    type Line: OutputLine;

    /// Device name, used as the log scope and interrupt action name.
    fn name(&self) -> &str;

    /// The device-tree node this device was created from.
    fn of_node(&self) -> Option<&DeviceNode>;

    /// Request the GPIO bound as `con_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if nothing is bound under `con_id` or the line is
    /// already requested.
    fn gpiod_get(&self, con_id: &str) -> GpioResult<Self::Line>;

    /// Interrupt number at `index`, unvalidated, or `None` if unassigned.
    fn get_irq(&self, index: usize) -> Option<i64>;

    /// The line behind interrupt number `irq`.
    fn irq_line(&self, irq: u32) -> Option<Arc<IrqLine>>;

    /// Attach a threaded handler to interrupt `irq`.
    ///
    /// # Errors
    ///
    /// Returns [`IrqError::NotFound`] if `irq` is not mapped, otherwise
    /// whatever [`IrqLine::request`] reports.
    fn request_threaded_irq<H: ThreadedHandler>(
        &self,
        irq: u32,
        flags: IrqFlags,
        name: &str,
        handler: H,
    ) -> IrqResult<IrqRegistration<H>> {
        let line = self.irq_line(irq).ok_or(IrqError::NotFound(irq))?;
        line.request(flags, name, handler)
    }
}
