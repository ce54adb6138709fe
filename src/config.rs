//! Endpoint configuration
//!
//! One `MarstekConfig` describes one device endpoint. The struct is immutable
//! once built; the transport, poller and validator borrow it at construction
//! and never write back. Values can come from a YAML file layered with
//! `MARSTEK_`-prefixed environment variables, or be filled in directly by an
//! embedding application.

use figment::providers::{Env, Format, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{Error, Result};

/// Configuration for a single Marstek device endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarstekConfig {
    /// Device IP address or hostname
    pub device_ip: String,
    /// Port the device listens on
    #[serde(default = "default_remote_port")]
    pub remote_port: u16,
    /// Local port to bind (0 for ephemeral)
    #[serde(default = "default_local_port")]
    pub local_port: u16,
    /// Device id sent in request params
    #[serde(default)]
    pub device_id: u32,
    /// BLE MAC string addressing `Marstek.GetDevice`; the status commands
    /// do not need it
    #[serde(default)]
    pub ble_mac: Option<String>,
    /// Per-call response deadline in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Minimum delay between consecutive device calls in milliseconds
    #[serde(default = "default_command_gap_ms")]
    pub min_command_gap_ms: u64,
    /// Polling cycle period in seconds
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Connection validation attempts at setup time
    #[serde(default = "default_setup_retries")]
    pub setup_retries: u32,
}

fn default_remote_port() -> u16 {
    30000
}

fn default_local_port() -> u16 {
    30000
}

fn default_timeout_ms() -> u64 {
    5000
}

fn default_command_gap_ms() -> u64 {
    2000
}

fn default_poll_interval_secs() -> u64 {
    60
}

fn default_setup_retries() -> u32 {
    3
}

impl MarstekConfig {
    /// Build a configuration for `device_ip` with all defaults.
    pub fn new(device_ip: impl Into<String>) -> Self {
        Self {
            device_ip: device_ip.into(),
            remote_port: default_remote_port(),
            local_port: default_local_port(),
            device_id: 0,
            ble_mac: None,
            timeout_ms: default_timeout_ms(),
            min_command_gap_ms: default_command_gap_ms(),
            poll_interval_secs: default_poll_interval_secs(),
            setup_retries: default_setup_retries(),
        }
    }

    /// Load from a YAML file, then apply `MARSTEK_` environment overrides.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let config: MarstekConfig = Figment::new()
            .merge(Yaml::file(path.as_ref()))
            .merge(Env::prefixed("MARSTEK_"))
            .extract()
            .map_err(|e| Error::config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the transport cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.device_ip.trim().is_empty() {
            return Err(Error::config("device_ip must not be empty"));
        }
        if self.timeout_ms == 0 {
            return Err(Error::config("timeout_ms must be greater than zero"));
        }
        Ok(())
    }

    /// `host:port` string for the device side of the exchange.
    pub fn remote_addr(&self) -> String {
        format!("{}:{}", self.device_ip, self.remote_port)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn command_gap(&self) -> Duration {
        Duration::from_millis(self.min_command_gap_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_device_conventions() {
        let config = MarstekConfig::new("192.168.1.100");
        assert_eq!(config.remote_port, 30000);
        assert_eq!(config.local_port, 30000);
        assert_eq!(config.timeout(), Duration::from_secs(5));
        assert_eq!(config.command_gap(), Duration::from_secs(2));
        assert_eq!(config.poll_interval(), Duration::from_secs(60));
        assert_eq!(config.setup_retries, 3);
        assert_eq!(config.remote_addr(), "192.168.1.100:30000");
    }

    #[test]
    fn from_file_fills_defaults() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(file, "device_ip: 10.0.0.7\nremote_port: 31000").expect("write yaml");

        let config = MarstekConfig::from_file(file.path()).expect("load config");
        assert_eq!(config.device_ip, "10.0.0.7");
        assert_eq!(config.remote_port, 31000);
        assert_eq!(config.local_port, 30000);
        assert_eq!(config.timeout_ms, 5000);
    }

    #[test]
    fn rejects_empty_address() {
        let config = MarstekConfig::new("   ");
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn rejects_zero_timeout() {
        let mut config = MarstekConfig::new("10.0.0.7");
        config.timeout_ms = 0;
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }
}
