//! Driver descriptor and fixed reset timing.
//!
//! [`DriverConfig`] is the platform-driver descriptor: the name the driver
//! registers under, the compatible string it matches, and where it finds its
//! resources on the node. The pulse timing is not configurable and lives in
//! [`PulseTiming`] as constants.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{ConfigError, ConfigResult};

/// Compatible string matched against device-tree nodes.
pub const COMPATIBLE: &str = "dvc2-usb-watchdog";

/// Connection id of the reset GPIO (`reset-gpios` on the node).
pub const RESET_CON_ID: &str = "reset";

/// Fixed timing of one reset cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PulseTiming;

impl PulseTiming {
    /// Wait before acting on a fault, in milliseconds.
    pub const DEBOUNCE_MS: u64 = 200;
    /// Time the reset line is held low, in milliseconds.
    pub const PULSE_MS: u64 = 1;
    /// Quiet period before the interrupt is re-armed, in milliseconds.
    pub const COOLDOWN_MS: u64 = 2000;

    /// Length of a full cycle with a working reset line.
    #[must_use]
    pub const fn cycle_ms() -> u64 {
        Self::DEBOUNCE_MS + Self::PULSE_MS + Self::COOLDOWN_MS
    }

    /// Debounce as a `Duration`.
    #[must_use]
    pub const fn debounce() -> Duration {
        Duration::from_millis(Self::DEBOUNCE_MS)
    }

    /// Pulse width as a `Duration`.
    #[must_use]
    pub const fn pulse() -> Duration {
        Duration::from_millis(Self::PULSE_MS)
    }

    /// Cooldown as a `Duration`.
    #[must_use]
    pub const fn cooldown() -> Duration {
        Duration::from_millis(Self::COOLDOWN_MS)
    }
}

/// Platform-driver descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Driver name, also used to name interrupt threads.
    pub name: String,
    /// Compatible string in the OF match table.
    pub compatible: String,
    /// Connection id of the reset output line.
    pub reset_con_id: String,
    /// Index of the fault interrupt among the node's interrupts.
    pub irq_index: usize,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            name: COMPATIBLE.to_string(),
            compatible: COMPATIBLE.to_string(),
            reset_con_id: RESET_CON_ID.to_string(),
            irq_index: 0,
        }
    }
}

impl DriverConfig {
    /// Create a configuration builder.
    #[must_use]
    pub fn builder() -> DriverConfigBuilder {
        DriverConfigBuilder::default()
    }

    /// Validate the descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidDescriptor`] if a name is empty or the
    /// connection id carries the `-gpios` suffix.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::invalid_descriptor("name must not be empty"));
        }
        if self.compatible.trim().is_empty() {
            return Err(ConfigError::invalid_descriptor(
                "compatible must not be empty",
            ));
        }
        if self.reset_con_id.trim().is_empty() {
            return Err(ConfigError::invalid_descriptor(
                "reset_con_id must not be empty",
            ));
        }
        if self.reset_con_id.ends_with("-gpios") || self.reset_con_id.ends_with("-gpio") {
            return Err(ConfigError::invalid_descriptor(
                "reset_con_id is the bare connection id, without the -gpios suffix",
            ));
        }
        Ok(())
    }

    /// The OF match table for this descriptor.
    #[must_use]
    pub fn of_match_table(&self) -> [&str; 1] {
        [self.compatible.as_str()]
    }
}

/// Builder for `DriverConfig`.
#[derive(Debug, Default)]
pub struct DriverConfigBuilder {
    config: DriverConfig,
}

impl DriverConfigBuilder {
    /// Set the driver name.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = name.into();
        self
    }

    /// Set the compatible string.
    #[must_use]
    pub fn compatible(mut self, compatible: impl Into<String>) -> Self {
        self.config.compatible = compatible.into();
        self
    }

    /// Set the reset GPIO connection id.
    #[must_use]
    pub fn reset_con_id(mut self, con_id: impl Into<String>) -> Self {
        self.config.reset_con_id = con_id.into();
        self
    }

    /// Set the interrupt index.
    #[must_use]
    pub fn irq_index(mut self, index: usize) -> Self {
        self.config.irq_index = index;
        self
    }

    /// Build the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn build(self) -> ConfigResult<DriverConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DriverConfig::default();
        assert_eq!(config.name, "dvc2-usb-watchdog");
        assert_eq!(config.of_match_table(), ["dvc2-usb-watchdog"]);
        assert_eq!(config.reset_con_id, "reset");
        assert_eq!(config.irq_index, 0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_cycle_length() {
        assert_eq!(PulseTiming::cycle_ms(), 2201);
        assert_eq!(
            PulseTiming::debounce() + PulseTiming::pulse() + PulseTiming::cooldown(),
            Duration::from_millis(2201)
        );
    }

    #[test]
    fn test_builder_rejects_suffixed_con_id() {
        let result = DriverConfig::builder().reset_con_id("reset-gpios").build();
        assert!(matches!(result, Err(ConfigError::InvalidDescriptor(_))));
    }

    #[test]
    fn test_builder_rejects_empty_compatible() {
        let result = DriverConfig::builder().compatible("  ").build();
        assert!(result.is_err());
    }

    #[test]
    fn test_partial_json_fills_defaults() -> Result<(), serde_json::Error> {
        let config: DriverConfig = serde_json::from_str(r#"{ "irq_index": 1 }"#)?;
        assert_eq!(config.irq_index, 1);
        assert_eq!(config.compatible, COMPATIBLE);
        Ok(())
    }
}
