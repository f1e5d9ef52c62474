//! Tool configuration.

use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::protocol::constants::{
    CC1800_CONFIGURATION, CC1800_INTERFACE, CC1800_PRODUCT_ID, CC1800_VENDOR_ID,
    DEFAULT_TIMEOUT_MS,
};

/// Device selection and transfer settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolConfig {
    /// USB vendor ID of the boot ROM.
    pub vendor_id: u16,
    /// USB product ID of the boot ROM.
    pub product_id: u16,
    /// Per-transfer timeout in milliseconds.
    pub timeout_ms: u64,
    /// Configuration value to select.
    pub configuration: u8,
    /// Interface to claim.
    pub interface: u8,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            vendor_id: CC1800_VENDOR_ID,
            product_id: CC1800_PRODUCT_ID,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            configuration: CC1800_CONFIGURATION,
            interface: CC1800_INTERFACE,
        }
    }
}

impl ToolConfig {
    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: ToolConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<std::path::Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ToolConfig::default();
        assert_eq!(config.vendor_id, 0x2009);
        assert_eq!(config.product_id, 0x1218);
        assert_eq!(config.timeout(), Duration::from_millis(5000));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: ToolConfig = toml::from_str("timeout_ms = 250\n").unwrap();
        assert_eq!(config.timeout_ms, 250);
        assert_eq!(config.vendor_id, CC1800_VENDOR_ID);
        assert_eq!(config.interface, 0);
    }

    #[test]
    fn test_save_and_load() {
        let path = std::env::temp_dir().join(format!("cc1800-config-{}.toml", std::process::id()));
        let config = ToolConfig {
            product_id: 0xBEEF,
            ..Default::default()
        };
        config.save_to_file(&path).unwrap();
        let loaded = ToolConfig::load_from_file(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(loaded, config);
    }
}
