//! Protocol limits, function and exception codes, and EnsolarX defaults.
//!
//! A PDU never exceeds 253 bytes; the read quantity limits follow from how
//! many data bytes fit behind the function code and byte count.

// ============================================================================
// Frame Size Constants
// ============================================================================

/// MBAP header: transaction id, protocol id, length (2 bytes each), unit id
pub const MBAP_HEADER_LEN: usize = 7;

/// Modbus protocol identifier carried in every MBAP header
pub const MODBUS_PROTOCOL_ID: u16 = 0;

/// Largest PDU, function code included
pub const MAX_PDU_SIZE: usize = 253;

/// Largest MBAP length field: unit id plus a full PDU
pub const MAX_MBAP_LENGTH: usize = 1 + MAX_PDU_SIZE;

/// Length of a read request PDU: function code + address + quantity
pub const READ_REQUEST_PDU_LEN: usize = 5;

// ============================================================================
// Read Operation Limits
// ============================================================================

/// Register limit for FC03/FC04: 2 bytes each behind fc + byte count
pub const MAX_READ_REGISTERS: usize = 125;

/// Maximum number of coils for FC01 (Read Coils)
///
/// ceil(N / 8) ≤ 251 gives N ≤ 2008; the protocol rounds down to 2000.
pub const MAX_READ_COILS: usize = 2000;

// ============================================================================
// Modbus Function Codes
// ============================================================================

pub const FC_READ_COILS: u8 = 0x01;

pub const FC_READ_HOLDING_REGISTERS: u8 = 0x03;

pub const FC_READ_INPUT_REGISTERS: u8 = 0x04;

/// High bit set on the function code of an exception response
pub const EXCEPTION_FLAG: u8 = 0x80;

// ============================================================================
// Modbus Exception Codes
// ============================================================================
// Names live in `error::exception_description`.

pub const EXCEPTION_ILLEGAL_FUNCTION: u8 = 0x01;
pub const EXCEPTION_ILLEGAL_DATA_ADDRESS: u8 = 0x02;
pub const EXCEPTION_ILLEGAL_DATA_VALUE: u8 = 0x03;
pub const EXCEPTION_SERVER_DEVICE_FAILURE: u8 = 0x04;
pub const EXCEPTION_ACKNOWLEDGE: u8 = 0x05;
pub const EXCEPTION_SERVER_DEVICE_BUSY: u8 = 0x06;
pub const EXCEPTION_MEMORY_PARITY_ERROR: u8 = 0x08;
pub const EXCEPTION_GATEWAY_PATH_UNAVAILABLE: u8 = 0x0A;
pub const EXCEPTION_GATEWAY_TARGET_FAILED: u8 = 0x0B;

// ============================================================================
// Polling Policy Defaults
// ============================================================================

/// Default host of the EnsolarX Wi-Fi/Modbus gateway
pub const DEFAULT_HOST: &str = "192.168.86.188";

/// Default TCP port of the EnsolarX gateway (not the IANA 502)
pub const DEFAULT_PORT: u16 = 8899;

/// Default unit id of the inverter behind the gateway
pub const DEFAULT_UNIT_ID: u8 = 18;

/// Default socket timeout in milliseconds
pub const DEFAULT_TIMEOUT_MS: u64 = 3000;

/// Default number of attempts per register bank
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 2;

/// Default delay between attempts in milliseconds
pub const DEFAULT_RETRY_DELAY_MS: u64 = 150;

/// Default poll interval in seconds
pub const DEFAULT_SCAN_INTERVAL_SECS: u64 = 10;

/// Shortest poll interval accepted
pub const MIN_SCAN_INTERVAL_SECS: u64 = 5;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_size_constants() {
        assert_eq!(MBAP_HEADER_LEN, 7);
        assert_eq!(MAX_PDU_SIZE, 253);
        assert_eq!(MAX_MBAP_LENGTH, 254);
    }

    #[test]
    fn test_read_limits() {
        let read_pdu_size = 1 + 1 + (MAX_READ_REGISTERS * 2);
        assert!(read_pdu_size <= MAX_PDU_SIZE);

        let read_coil_pdu = 1 + 1 + MAX_READ_COILS.div_ceil(8);
        assert!(read_coil_pdu <= MAX_PDU_SIZE);
    }

    #[test]
    fn test_policy_defaults() {
        assert!(DEFAULT_SCAN_INTERVAL_SECS >= MIN_SCAN_INTERVAL_SECS);
        assert_eq!(DEFAULT_RETRY_ATTEMPTS, 2);
        assert_eq!(DEFAULT_RETRY_DELAY_MS, 150);
    }
}
