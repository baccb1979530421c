//! Configuration for the poller.
//!
//! [`PollerConfig`] is the JSON5 file format read by the binary.
//! [`CoordinatorConfig`] is what [`crate::PollCoordinator`] is constructed
//! from; hosts embedding the library can build it directly.
//!
//! ```json5
//! {
//!   device: { host: "192.168.86.188", port: 8899, unit_id: 18 },
//!   polling: { scan_interval_secs: 10, retry_attempts: 2, retry_delay_ms: 150 },
//!   register_file: "registers.json5",   // or `registers: [...]` inline
//!   logging: { level: "info" },
//! }
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_HOST, DEFAULT_PORT, DEFAULT_RETRY_ATTEMPTS, DEFAULT_RETRY_DELAY_MS,
    DEFAULT_SCAN_INTERVAL_SECS, DEFAULT_TIMEOUT_MS, DEFAULT_UNIT_ID, MIN_SCAN_INTERVAL_SECS,
};
use crate::descriptor::{DescriptorTable, RegisterDescriptor};
use crate::error::{ModbusError, ModbusResult};
use crate::logging::LoggingConfig;
use crate::protocol::UnitId;

/// Complete poller configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PollerConfig {
    #[serde(default)]
    pub device: DeviceConfig,

    #[serde(default)]
    pub polling: PollingConfig,

    /// Inline register table
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub registers: Vec<RegisterDescriptor>,

    /// Path to a separate register table, relative to the config file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub register_file: Option<PathBuf>,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Connection settings for the device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_unit_id")]
    pub unit_id: UnitId,

    /// Connect/read/write timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Fail responses whose transaction id differs from the request
    #[serde(default)]
    pub strict_transaction_id: bool,

    /// Log every frame as hex
    #[serde(default)]
    pub packet_logging: bool,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            unit_id: default_unit_id(),
            timeout_ms: default_timeout_ms(),
            strict_transaction_id: false,
            packet_logging: false,
        }
    }
}

/// Poll scheduling and retry policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    #[serde(default = "default_scan_interval_secs")]
    pub scan_interval_secs: u64,

    /// Attempts per register bank
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,

    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            scan_interval_secs: default_scan_interval_secs(),
            retry_attempts: default_retry_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_unit_id() -> UnitId {
    DEFAULT_UNIT_ID
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

fn default_scan_interval_secs() -> u64 {
    DEFAULT_SCAN_INTERVAL_SECS
}

fn default_retry_attempts() -> u32 {
    DEFAULT_RETRY_ATTEMPTS
}

fn default_retry_delay_ms() -> u64 {
    DEFAULT_RETRY_DELAY_MS
}

impl PollerConfig {
    /// Load configuration from a JSON5 file.
    ///
    /// A relative `register_file` is resolved against the config file's
    /// directory.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> ModbusResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            ModbusError::configuration(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        let mut config = Self::from_json5_str(&content)?;

        if let (Some(file), Some(dir)) = (config.register_file.as_mut(), path.parent()) {
            if file.is_relative() {
                *file = dir.join(&*file);
            }
        }
        Ok(config)
    }

    /// Parse and validate a JSON5 document.
    pub fn from_json5_str(content: &str) -> ModbusResult<Self> {
        let config: PollerConfig = json5::from_str(content)
            .map_err(|e| ModbusError::configuration(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> ModbusResult<()> {
        if !self.registers.is_empty() && self.register_file.is_some() {
            return Err(ModbusError::configuration(
                "Specify either registers or register_file, not both",
            ));
        }
        self.coordinator_config().validate()
    }

    /// Register table: inline, from `register_file`, or the bundled
    /// EnsolarX map when neither is set.
    pub fn descriptor_table(&self) -> ModbusResult<DescriptorTable> {
        if !self.registers.is_empty() {
            return DescriptorTable::from_records(self.registers.clone());
        }
        match &self.register_file {
            Some(path) => DescriptorTable::load_from_file(path),
            None => DescriptorTable::ensolarx_default(),
        }
    }

    pub fn coordinator_config(&self) -> CoordinatorConfig {
        CoordinatorConfig::new(self.device.host.clone(), self.device.port, self.device.unit_id)
            .with_timeout(Duration::from_millis(self.device.timeout_ms))
            .with_scan_interval(Duration::from_secs(self.polling.scan_interval_secs))
            .with_retry(
                self.polling.retry_attempts,
                Duration::from_millis(self.polling.retry_delay_ms),
            )
            .with_strict_transaction_id(self.device.strict_transaction_id)
            .with_packet_logging(self.device.packet_logging)
    }
}

/// Construction parameters of a poll coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordinatorConfig {
    pub host: String,
    pub port: u16,
    pub unit_id: UnitId,
    pub timeout: Duration,
    pub scan_interval: Duration,
    /// Attempts per bank, at least 1
    pub retry_attempts: u32,
    /// Pause between attempts on the same bank
    pub retry_delay: Duration,
    pub strict_transaction_id: bool,
    pub packet_logging: bool,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self::new(DEFAULT_HOST, DEFAULT_PORT, DEFAULT_UNIT_ID)
    }
}

impl CoordinatorConfig {
    /// Defaults everywhere except the device address.
    pub fn new<S: Into<String>>(host: S, port: u16, unit_id: UnitId) -> Self {
        Self {
            host: host.into(),
            port,
            unit_id,
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            scan_interval: Duration::from_secs(DEFAULT_SCAN_INTERVAL_SECS),
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            retry_delay: Duration::from_millis(DEFAULT_RETRY_DELAY_MS),
            strict_transaction_id: false,
            packet_logging: false,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_scan_interval(mut self, interval: Duration) -> Self {
        self.scan_interval = interval;
        self
    }

    pub fn with_retry(mut self, attempts: u32, delay: Duration) -> Self {
        self.retry_attempts = attempts;
        self.retry_delay = delay;
        self
    }

    pub fn with_strict_transaction_id(mut self, strict: bool) -> Self {
        self.strict_transaction_id = strict;
        self
    }

    pub fn with_packet_logging(mut self, enabled: bool) -> Self {
        self.packet_logging = enabled;
        self
    }

    /// # Errors
    ///
    /// `ModbusError::Configuration` for an empty host, port 0, a zero
    /// timeout, zero retry attempts, or a scan interval under 5 seconds.
    pub fn validate(&self) -> ModbusResult<()> {
        if self.host.trim().is_empty() {
            return Err(ModbusError::configuration("Device host cannot be empty"));
        }
        if self.port == 0 {
            return Err(ModbusError::configuration("Device port cannot be 0"));
        }
        if self.timeout.is_zero() {
            return Err(ModbusError::configuration("Timeout must be greater than 0"));
        }
        if self.retry_attempts == 0 {
            return Err(ModbusError::configuration(
                "retry_attempts must be at least 1",
            ));
        }
        if self.scan_interval < Duration::from_secs(MIN_SCAN_INTERVAL_SECS) {
            return Err(ModbusError::configuration(format!(
                "Scan interval {}s is below the minimum of {}s",
                self.scan_interval.as_secs_f64(),
                MIN_SCAN_INTERVAL_SECS
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::LogFormat;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = PollerConfig::from_json5_str("{}").unwrap();
        assert_eq!(config.device.host, "192.168.86.188");
        assert_eq!(config.device.port, 8899);
        assert_eq!(config.device.unit_id, 18);
        assert_eq!(config.device.timeout_ms, 3000);
        assert_eq!(config.polling.scan_interval_secs, 10);
        assert_eq!(config.polling.retry_attempts, 2);
        assert_eq!(config.polling.retry_delay_ms, 150);
        assert_eq!(config.logging.level, "info");

        let coordinator = config.coordinator_config();
        assert_eq!(coordinator, CoordinatorConfig::default());
    }

    #[test]
    fn test_parse_full_config() {
        let json = r#"{
            device: { host: "10.0.0.5", port: 502, unit_id: 1, timeout_ms: 1500,
                      strict_transaction_id: true },
            polling: { scan_interval_secs: 30, retry_attempts: 3, retry_delay_ms: 250 },
            registers: [
                { name: "grid_voltage", address: 8, scale: 0.1, precision: 1 },
            ],
            logging: { level: "debug", format: "json" },
        }"#;

        let config = PollerConfig::from_json5_str(json).unwrap();
        let coordinator = config.coordinator_config();
        assert_eq!(coordinator.host, "10.0.0.5");
        assert_eq!(coordinator.timeout, Duration::from_millis(1500));
        assert_eq!(coordinator.scan_interval, Duration::from_secs(30));
        assert_eq!(coordinator.retry_attempts, 3);
        assert_eq!(coordinator.retry_delay, Duration::from_millis(250));
        assert!(coordinator.strict_transaction_id);
        assert_eq!(config.logging.format, LogFormat::Json);

        let table = config.descriptor_table().unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.get("grid_voltage").unwrap().scale, 0.1);
    }

    #[test]
    fn test_scan_interval_minimum() {
        let result = PollerConfig::from_json5_str("{ polling: { scan_interval_secs: 4 } }");
        assert!(matches!(result, Err(ModbusError::Configuration { .. })));
        assert!(PollerConfig::from_json5_str("{ polling: { scan_interval_secs: 5 } }").is_ok());
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(PollerConfig::from_json5_str("{ polling: { retry_attempts: 0 } }").is_err());
        assert!(PollerConfig::from_json5_str(r#"{ device: { host: "" } }"#).is_err());
        assert!(PollerConfig::from_json5_str("{ device: { timeout_ms: 0 } }").is_err());
        assert!(PollerConfig::from_json5_str("{ device: { port: 70000 } }").is_err());
        assert!(PollerConfig::from_json5_str(
            r#"{ registers: [{ name: "a", address: 1 }], register_file: "x.json5" }"#
        )
        .is_err());
    }

    #[test]
    fn test_default_table_is_bundled_map() {
        let config = PollerConfig::default();
        let table = config.descriptor_table().unwrap();
        assert!(table.get("battery_voltage").is_some());
    }

    #[test]
    fn test_builder() {
        let config = CoordinatorConfig::new("127.0.0.1", 1502, 3)
            .with_scan_interval(Duration::from_secs(1));
        assert!(config.validate().is_err());
        assert!(config
            .with_scan_interval(Duration::from_secs(5))
            .validate()
            .is_ok());
    }
}
