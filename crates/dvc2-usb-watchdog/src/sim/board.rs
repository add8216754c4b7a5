//! Simulated board and platform devices.

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::clock::Clock;
use crate::error::{GpioError, GpioResult};
use crate::irq::IrqLine;
use crate::platform::{DeviceNode, PlatformDevice};
use crate::sim::gpio::{SimGpioChip, SimGpioLine};

#[derive(Debug, Default)]
struct BoardState {
    chips: BTreeMap<String, SimGpioChip>,
    irqs: BTreeMap<u32, Arc<IrqLine>>,
}

/// A board: GPIO controllers and interrupt lines sharing one clock.
///
/// Interrupt specifiers map one-to-one onto interrupt numbers. Clones refer
/// to the same board.
#[derive(Debug, Clone)]
pub struct SimBoard {
    clock: Arc<dyn Clock>,
    state: Arc<Mutex<BoardState>>,
}

impl SimBoard {
    /// An empty board driven by `clock`.
    #[must_use]
    pub fn new(clock: impl Clock + 'static) -> Self {
        Self {
            clock: Arc::new(clock),
            state: Arc::new(Mutex::new(BoardState::default())),
        }
    }

    /// The board clock.
    #[must_use]
    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }

    /// Add a GPIO controller, replacing any with the same label.
    pub fn add_gpio_chip(&self, label: &str, ngpio: u32) -> SimGpioChip {
        let chip = SimGpioChip::new(label, ngpio, Arc::clone(&self.clock));
        self.state
            .lock()
            .chips
            .insert(label.to_string(), chip.clone());
        chip
    }

    /// Add an interrupt line for specifier `hwirq`, or return the existing one.
    pub fn add_irq_line(&self, hwirq: u32) -> Arc<IrqLine> {
        let mut state = self.state.lock();
        Arc::clone(
            state
                .irqs
                .entry(hwirq)
                .or_insert_with(|| IrqLine::new(hwirq, Arc::clone(&self.clock))),
        )
    }

    /// The controller labelled `label`.
    #[must_use]
    pub fn gpio_chip(&self, label: &str) -> Option<SimGpioChip> {
        self.state.lock().chips.get(label).cloned()
    }

    /// The line for interrupt number `irq`.
    #[must_use]
    pub fn irq_line(&self, irq: u32) -> Option<Arc<IrqLine>> {
        self.state.lock().irqs.get(&irq).cloned()
    }

    /// A platform device on this board.
    #[must_use]
    pub fn platform_device(&self, name: &str, node: Option<DeviceNode>) -> SimPlatformDevice {
        SimPlatformDevice {
            name: name.to_string(),
            node,
            board: self.clone(),
        }
    }
}

/// A platform device whose resources resolve against a [`SimBoard`].
#[derive(Debug, Clone)]
pub struct SimPlatformDevice {
    name: String,
    node: Option<DeviceNode>,
    board: SimBoard,
}

impl PlatformDevice for SimPlatformDevice {
    type Line = SimGpioLine;

    fn name(&self) -> &str {
        &self.name
    }

    fn of_node(&self) -> Option<&DeviceNode> {
        self.node.as_ref()
    }

    fn gpiod_get(&self, con_id: &str) -> GpioResult<SimGpioLine> {
        let spec = self
            .node
            .as_ref()
            .and_then(|node| node.gpio(con_id))
            .ok_or_else(|| GpioError::not_found(con_id))?;
        let chip = self
            .board
            .gpio_chip(&spec.chip)
            .ok_or_else(|| GpioError::not_found(format!("{con_id} on {}", spec.chip)))?;
        chip.request(spec.offset, spec.active_low)
    }

    fn get_irq(&self, index: usize) -> Option<i64> {
        self.node
            .as_ref()
            .and_then(|node| node.interrupt(index))
            .map(i64::from)
    }

    fn irq_line(&self, irq: u32) -> Option<Arc<IrqLine>> {
        self.board.irq_line(irq)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::GpioSpec;
    use crate::sim::VirtualClock;

    #[test]
    fn test_resources_resolve_through_node() -> GpioResult<()> {
        let board = SimBoard::new(VirtualClock::new());
        let chip = board.add_gpio_chip("gpio3", 32);
        let line = board.add_irq_line(3);

        let node = DeviceNode::new("wd")
            .with_interrupt(3)
            .with_gpio("reset", GpioSpec::new("gpio3", 22));
        let pdev = board.platform_device("wd", Some(node));

        let _reset = pdev.gpiod_get("reset")?;
        assert!(chip.is_requested(22));
        assert_eq!(pdev.get_irq(0), Some(3));
        assert!(pdev.irq_line(3).is_some_and(|l| Arc::ptr_eq(&l, &line)));
        Ok(())
    }

    #[test]
    fn test_missing_chip_is_not_found() {
        let board = SimBoard::new(VirtualClock::new());
        let node = DeviceNode::new("wd").with_gpio("reset", GpioSpec::new("gpio9", 1));
        let pdev = board.platform_device("wd", Some(node));
        assert!(matches!(pdev.gpiod_get("reset"), Err(GpioError::NotFound(_))));
    }

    #[test]
    fn test_nodeless_device_has_no_resources() {
        let board = SimBoard::new(VirtualClock::new());
        let pdev = board.platform_device("wd", None);
        assert!(pdev.of_node().is_none());
        assert_eq!(pdev.get_irq(0), None);
        assert!(pdev.gpiod_get("reset").is_err());
    }
}
