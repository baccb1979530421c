//! # EnsolarX Modbus - Solar inverter / BMS poller over Modbus TCP
//!
//! A small Modbus TCP client plus a poll coordinator that turns a table of
//! register descriptors into periodic snapshots of scaled readings for an
//! EnsolarX hybrid inverter with integrated BMS (reached through its Wi-Fi
//! gateway, typically port 8899, unit 18).
//!
//! ## Features
//!
//! - **Modbus TCP transport**: MBAP framing, wrapping transaction ids,
//!   exception responses, bounded timeouts, lazy reconnect
//! - **Typed decoding**: uint16, int16, uint32 and float32 with optional
//!   word swap, scaling and rounding
//! - **Resilient polling**: per-register retry, holding/input bank
//!   fallback, last-known-good backfill
//! - **Dual-keyed snapshots**: every value by name and by address string
//!
//! ## Supported Function Codes
//!
//! | Code | Function | Client |
//! |------|----------|--------|
//! | 0x01 | Read Coils | ✅ |
//! | 0x03 | Read Holding Registers | ✅ |
//! | 0x04 | Read Input Registers | ✅ |
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ensolarx_modbus::{CoordinatorConfig, DescriptorTable, ModbusResult, PollCoordinator};
//!
//! #[tokio::main]
//! async fn main() -> ModbusResult<()> {
//!     let config = CoordinatorConfig::new("192.168.86.188", 8899, 18);
//!     let table = DescriptorTable::ensolarx_default()?;
//!     let mut coordinator = PollCoordinator::new(config, table)?;
//!
//!     let snapshot = coordinator.poll_cycle().await?;
//!     println!("battery: {:?}", snapshot.get("battery_voltage"));
//!     println!("same value: {:?}", snapshot.get("17"));
//!     Ok(())
//! }
//! ```
//!
//! Decoding helpers work without a device:
//!
//! ```rust
//! use ensolarx_modbus::{apply_scale, decode, DataType, ModbusValue, Reading};
//!
//! let raw = decode(&[0xFFFE], DataType::Int16, false).unwrap();
//! assert_eq!(raw, ModbusValue::I16(-2));
//! assert_eq!(apply_scale(raw, 0.1, Some(1)), Reading::Float(-0.2));
//! ```

// ============================================================================
// Core modules
// ============================================================================

/// Core error types and result handling
pub mod error;

/// Modbus protocol constants and device defaults
pub mod constants;

/// Stack-allocated PDU
pub mod pdu;

/// MBAP framing and request/response types
pub mod protocol;

/// Modbus TCP transport
pub mod transport;

/// Modbus client implementations
pub mod client;

/// Tracing setup and packet logging
pub mod logging;

// ============================================================================
// Data handling
// ============================================================================

/// Decoded register values and published readings
pub mod value;

/// Word order for 32-bit values
pub mod bytes;

/// Register decoding and scaling
pub mod codec;

/// Register descriptors and descriptor tables
pub mod descriptor;

// ============================================================================
// Polling
// ============================================================================

/// Configuration files and coordinator settings
pub mod config;

/// Snapshots and the last-known-good cache
pub mod snapshot;

/// Poll cycles, retry and fallback
pub mod coordinator;

// ============================================================================
// Re-exports for convenience
// ============================================================================

// === Async runtime (users can use ensolarx_modbus::tokio) ===
pub use tokio;

// === Core client API ===
pub use client::{GenericModbusClient, ModbusClient, ModbusTcpClient};

// === Error handling ===
pub use error::{ModbusError, ModbusResult};

// === Core types ===
pub use bytes::WordOrder;
pub use protocol::{MbapHeader, ModbusFunction, ModbusRequest, ModbusResponse, UnitId};
pub use value::{ModbusValue, Reading};

// === Decoding ===
pub use codec::{apply_scale, decode, round_to};
pub use descriptor::{DataType, DescriptorTable, RegisterBank, RegisterDescriptor};

// === Polling ===
pub use config::{CoordinatorConfig, DeviceConfig, PollerConfig, PollingConfig};
pub use coordinator::{
    CoordinatorHandle, CycleEvent, CycleReport, DescriptorOutcome, PollCoordinator,
    ReadDiagnostic,
};
pub use snapshot::Snapshot;

// === Monitoring ===
pub use transport::{ConnectionInfo, ModbusTransport, TcpTransport, TransportStats};

// === Protocol limits ===
pub use constants::{MAX_PDU_SIZE, MAX_READ_COILS, MAX_READ_REGISTERS};

// === Logging ===
pub use logging::{init_tracing, LogFormat, LoggingConfig};

// === PDU (advanced usage) ===
pub use pdu::{ModbusPdu, PduBuilder};
