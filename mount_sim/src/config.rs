/*!
Configuration management for the mount simulator.
*/

use crate::status::StatusFormat;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub simulator: SimulatorConfig,
    pub beacon: BeaconConfig,
    pub status: StatusConfig,
}

impl AppConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self {
            simulator: SimulatorConfig::default(),
            beacon: BeaconConfig::default(),
            status: StatusConfig::default(),
        }
    }

    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: AppConfig = toml::from_str(&content)
            .with_context(|| "Failed to parse config file as TOML")?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .with_context(|| "Failed to serialize config to TOML")?;

        std::fs::write(path.as_ref(), content)
            .with_context(|| format!("Failed to write config file: {}", path.as_ref().display()))?;

        Ok(())
    }

    /// Reject settings the simulator cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.simulator.devices == 0 {
            anyhow::bail!("simulator.devices must be at least 1");
        }
        if self.simulator.tick_interval_ms == 0 {
            anyhow::bail!("simulator.tick_interval_ms must be greater than 0");
        }
        if self.simulator.port != 0
            && self.simulator.port as usize + self.simulator.devices as usize - 1 > u16::MAX as usize
        {
            anyhow::bail!("simulator.port + devices exceeds the port range");
        }
        if self.beacon.interval_ms == 0 {
            anyhow::bail!("beacon.interval_ms must be greater than 0");
        }
        self.simulator.bind_ip()?;
        self.beacon.broadcast_ip()?;
        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Listener and model settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    /// TCP bind address
    pub bind_addr: String,

    /// TCP port of the first device; device `i` listens on `port + i`
    pub port: u16,

    /// Number of independent simulated mounts
    pub devices: u16,

    /// Motion integration period in milliseconds
    pub tick_interval_ms: u64,
}

impl SimulatorConfig {
    pub fn bind_ip(&self) -> Result<IpAddr> {
        self.bind_addr
            .parse()
            .with_context(|| format!("Invalid bind address: {}", self.bind_addr))
    }

    /// Listen address of device `index`; port 0 lets the OS pick
    pub fn device_addr(&self, index: u16) -> Result<SocketAddr> {
        let port = if self.port == 0 { 0 } else { self.port + index };
        Ok(SocketAddr::new(self.bind_ip()?, port))
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0".to_string(),
            port: 2000,
            devices: 1,
            tick_interval_ms: 100,
        }
    }
}

/// Discovery beacon settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BeaconConfig {
    /// Broadcast until the first application completes the handshake
    pub enabled: bool,

    /// UDP destination port
    pub port: u16,

    /// Destination address of the datagrams
    pub broadcast_addr: String,

    /// Pause between datagrams in milliseconds
    pub interval_ms: u64,

    /// Filler bytes per datagram
    pub payload_len: usize,
}

impl BeaconConfig {
    pub fn broadcast_ip(&self) -> Result<IpAddr> {
        self.broadcast_addr
            .parse()
            .with_context(|| format!("Invalid broadcast address: {}", self.broadcast_addr))
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl Default for BeaconConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 55555,
            broadcast_addr: "255.255.255.255".to_string(),
            interval_ms: 1000,
            payload_len: 110,
        }
    }
}

/// Status output settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusConfig {
    /// Print mount status to stdout
    pub enabled: bool,

    /// Text block or one JSON object per line
    pub format: StatusFormat,

    /// Render period in milliseconds
    pub interval_ms: u64,
}

impl StatusConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            format: StatusFormat::Text,
            interval_ms: 1000,
        }
    }
}
