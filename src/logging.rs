//! Logging helpers: packet hex dumps for the transport and subscriber
//! installation for binaries.
//!
//! The library only emits `tracing` events. Installing a subscriber is the
//! host's decision; [`init_tracing`] is what the bundled binary uses.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{ModbusError, ModbusResult};

/// Output format for the fmt subscriber.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Logging section of the poller configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level or filter directive: "info", "ensolarx_modbus=debug", ...
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Install a global fmt subscriber. `RUST_LOG` takes precedence over the
/// configured level.
pub fn init_tracing(config: &LoggingConfig) -> ModbusResult<()> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let result = match config.format {
        LogFormat::Text => tracing_subscriber::registry()
            .with(fmt::layer())
            .with(filter)
            .try_init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .try_init(),
    };

    result.map_err(|e| ModbusError::configuration(format!("Failed to initialize tracing: {}", e)))
}

/// Format raw bytes as a space-separated hex string
pub fn format_hex_packet(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Log a frame with its direction ("send"/"receive") and unit id
pub fn log_packet(direction: &str, data: &[u8], unit_id: u8) {
    info!(
        "[MODBUS-TCP] {} unit:{} {}",
        direction,
        unit_id,
        format_hex_packet(data)
    );
}
