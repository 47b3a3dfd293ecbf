//! Configuration loading and validation

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub daemon: DaemonConfig,
    #[serde(default)]
    pub device: DeviceConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Bind address for web server
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0:7125".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// SMBus adapter number (`/dev/i2c-<smbus_id>`)
    #[serde(default)]
    pub smbus_id: u32,
    /// 7-bit address of the filament manager (required)
    #[serde(default)]
    pub dev_address: Option<u8>,
    /// Presence watcher period in milliseconds, 0 disables it
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    /// Use an in-memory device instead of the i2c bus
    #[serde(default)]
    pub simulate: bool,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            smbus_id: 0,
            dev_address: None,
            poll_interval_ms: default_poll_interval(),
            simulate: false,
        }
    }
}

fn default_poll_interval() -> u64 {
    500
}

impl Config {
    /// Check values that serde cannot
    pub fn validate(&self) -> Result<()> {
        match self.device.dev_address {
            None => bail!("device.dev_address is required"),
            Some(addr) if addr > 0x7F => {
                bail!("device.dev_address 0x{:02x} is not a 7-bit address", addr)
            }
            Some(_) => Ok(()),
        }
    }

    /// Validated device address
    pub fn device_address(&self) -> Result<u8> {
        self.validate()?;
        Ok(self.device.dev_address.unwrap_or_default())
    }
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<Config> {
    if path.exists() {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    } else {
        info!(
            path = %path.display(),
            "Configuration file not found, using defaults"
        );
        Ok(Config::default())
    }
}
