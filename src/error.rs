//! Error types for the Modbus transport and the poll coordinator.
//!
//! Every fallible operation in the crate returns [`ModbusResult`]. The
//! variants line up with how the coordinator treats them:
//!
//! | Variant | Raised by | Coordinator policy |
//! |---------|-----------|--------------------|
//! | `Connection` | socket connect | retried on next request |
//! | `Timeout`, `Io`, `Frame` | request/response exchange | retry, then bank fallback |
//! | `Exception` | device rejected the request | same as transport errors |
//! | `TransactionMismatch` | strict transaction-id check | same as transport errors |
//! | `Decode` | register decoding | cache backfill or absent |
//! | `CycleFailed` | end of an empty cycle | propagated to the host |

use thiserror::Error;

use crate::constants;

/// Result alias used throughout the crate.
pub type ModbusResult<T> = Result<T, ModbusError>;

/// Crate-wide error type.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModbusError {
    /// The TCP socket could not be established.
    #[error("Connection error: {message}")]
    Connection { message: String },

    /// A socket read or write did not complete within the configured timeout.
    #[error("Timeout during {operation} after {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    /// Socket failure in the middle of an exchange.
    #[error("I/O error: {message}")]
    Io { message: String },

    /// The response frame violated MBAP/PDU framing.
    #[error("Frame error: {message}")]
    Frame { message: String },

    /// The device answered with a Modbus exception response.
    #[error("Device exception (function=0x{function:02X}, code=0x{code:02X}): {message}")]
    Exception {
        function: u8,
        code: u8,
        message: String,
    },

    /// Response transaction id did not match the request.
    #[error("Transaction id mismatch: expected {expected}, got {actual}")]
    TransactionMismatch { expected: u16, actual: u16 },

    /// Register words could not be decoded into the declared data type.
    #[error("Decode error: {message}")]
    Decode { message: String },

    /// Invalid request arguments (quantity out of range, ...).
    #[error("Invalid data: {message}")]
    InvalidData { message: String },

    /// Invalid configuration or descriptor table.
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// No descriptor produced a value this cycle and at least one failed.
    #[error("Poll cycle failed: no register could be read ({failures} failed)")]
    CycleFailed { failures: usize },
}

impl ModbusError {
    pub fn connection<S: Into<String>>(message: S) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    pub fn timeout<S: Into<String>>(operation: S, timeout_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms,
        }
    }

    pub fn io<S: Into<String>>(message: S) -> Self {
        Self::Io {
            message: message.into(),
        }
    }

    pub fn frame<S: Into<String>>(message: S) -> Self {
        Self::Frame {
            message: message.into(),
        }
    }

    /// Build an exception error from the raw function and exception codes.
    pub fn exception(function: u8, code: u8) -> Self {
        Self::Exception {
            function,
            code,
            message: exception_description(code).to_string(),
        }
    }

    pub fn decode<S: Into<String>>(message: S) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    pub fn invalid_data<S: Into<String>>(message: S) -> Self {
        Self::InvalidData {
            message: message.into(),
        }
    }

    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Errors raised while exchanging a frame with the device.
    pub fn is_transport_error(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. }
                | Self::Timeout { .. }
                | Self::Io { .. }
                | Self::Frame { .. }
                | Self::TransactionMismatch { .. }
        )
    }

    /// The device explicitly rejected the request.
    pub fn is_exception(&self) -> bool {
        matches!(self, Self::Exception { .. })
    }

    /// Whether repeating the same request may succeed.
    ///
    /// Device exceptions count as recoverable: some inverters answer
    /// "server busy" or "gateway target failed" transiently.
    pub fn is_recoverable(&self) -> bool {
        self.is_transport_error() || self.is_exception()
    }

    /// Short name of the error kind, used in diagnostic records.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Connection { .. } => "ConnectionError",
            Self::Timeout { .. } | Self::Io { .. } | Self::Frame { .. } => "TransportError",
            Self::Exception { .. } => "DeviceExceptionError",
            Self::TransactionMismatch { .. } => "ProtocolMismatchError",
            Self::Decode { .. } => "DecodeError",
            Self::InvalidData { .. } => "InvalidData",
            Self::Configuration { .. } => "ConfigurationError",
            Self::CycleFailed { .. } => "CycleFailed",
        }
    }
}

impl From<std::io::Error> for ModbusError {
    fn from(err: std::io::Error) -> Self {
        Self::io(err.to_string())
    }
}

/// Human-readable name of a standard Modbus exception code.
pub fn exception_description(code: u8) -> &'static str {
    match code {
        constants::EXCEPTION_ILLEGAL_FUNCTION => "Illegal Function",
        constants::EXCEPTION_ILLEGAL_DATA_ADDRESS => "Illegal Data Address",
        constants::EXCEPTION_ILLEGAL_DATA_VALUE => "Illegal Data Value",
        constants::EXCEPTION_SERVER_DEVICE_FAILURE => "Server Device Failure",
        constants::EXCEPTION_ACKNOWLEDGE => "Acknowledge",
        constants::EXCEPTION_SERVER_DEVICE_BUSY => "Server Device Busy",
        constants::EXCEPTION_MEMORY_PARITY_ERROR => "Memory Parity Error",
        constants::EXCEPTION_GATEWAY_PATH_UNAVAILABLE => "Gateway Path Unavailable",
        constants::EXCEPTION_GATEWAY_TARGET_FAILED => "Gateway Target Device Failed to Respond",
        _ => "Unknown Exception",
    }
}
