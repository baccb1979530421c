//! Protocol data unit: function code plus payload, held in a fixed
//! 253-byte array so request building and response parsing stay off the
//! heap.

use tracing::debug;

use crate::constants::{
    EXCEPTION_FLAG, FC_READ_COILS, FC_READ_HOLDING_REGISTERS, FC_READ_INPUT_REGISTERS,
    MAX_PDU_SIZE,
};
use crate::error::{ModbusError, ModbusResult};

/// PDU with stack-allocated fixed array
#[derive(Debug, Clone)]
pub struct ModbusPdu {
    /// Fixed-size buffer (stack)
    data: [u8; MAX_PDU_SIZE],
    /// Actual data length
    len: usize,
}

impl ModbusPdu {
    /// Create an empty PDU
    #[inline]
    pub fn new() -> Self {
        Self {
            data: [0; MAX_PDU_SIZE],
            len: 0,
        }
    }

    /// Create a PDU from a byte slice
    pub fn from_slice(data: &[u8]) -> ModbusResult<Self> {
        if data.len() > MAX_PDU_SIZE {
            return Err(ModbusError::frame(format!(
                "PDU too large: {} bytes (max {})",
                data.len(),
                MAX_PDU_SIZE
            )));
        }

        let mut pdu = Self::new();
        pdu.data[..data.len()].copy_from_slice(data);
        pdu.len = data.len();

        if let Some(fc) = pdu.function_code() {
            debug!(
                "PDU in: {} fc=0x{:02X} exception={} len={}",
                Self::function_code_description(fc),
                fc,
                pdu.is_exception(),
                pdu.len
            );
        }

        Ok(pdu)
    }

    /// Push a single byte
    #[inline]
    pub fn push(&mut self, byte: u8) -> ModbusResult<()> {
        if self.len >= MAX_PDU_SIZE {
            return Err(ModbusError::frame("PDU buffer full"));
        }
        self.data[self.len] = byte;
        self.len += 1;
        Ok(())
    }

    /// Push u16 in big-endian
    #[inline]
    pub fn push_u16(&mut self, value: u16) -> ModbusResult<()> {
        for byte in value.to_be_bytes() {
            self.push(byte)?;
        }
        Ok(())
    }

    /// Get immutable data slice
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.data[..self.len]
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn function_code(&self) -> Option<u8> {
        self.as_slice().first().copied()
    }

    #[inline]
    pub fn is_exception(&self) -> bool {
        matches!(self.function_code(), Some(fc) if fc & EXCEPTION_FLAG != 0)
    }

    /// Exception code of an exception response.
    #[inline]
    pub fn exception_code(&self) -> Option<u8> {
        self.is_exception()
            .then(|| self.as_slice().get(1).copied())
            .flatten()
    }

    /// Turn an exception response into a [`ModbusError::Exception`].
    ///
    /// The function code has its high bit cleared; a missing exception
    /// byte is reported as code 0.
    pub fn check_exception(&self) -> ModbusResult<()> {
        match self.function_code() {
            Some(fc) if fc & EXCEPTION_FLAG != 0 => Err(ModbusError::exception(
                fc & !EXCEPTION_FLAG,
                self.exception_code().unwrap_or(0),
            )),
            Some(_) => Ok(()),
            None => Err(ModbusError::frame("Empty response PDU")),
        }
    }

    /// Data bytes of a read response (`[fc, byte_count, data...]`).
    ///
    /// A byte count larger than the bytes actually received is clamped to
    /// what arrived; callers detect the shortfall from the returned length.
    pub fn read_payload(&self, expected_fc: u8) -> ModbusResult<&[u8]> {
        self.check_exception()?;

        let data = self.as_slice();
        if data[0] != expected_fc {
            return Err(ModbusError::frame(format!(
                "Function code mismatch: expected {:02X}, got {:02X}",
                expected_fc, data[0]
            )));
        }
        if data.len() < 2 {
            return Err(ModbusError::frame("Read response missing byte count"));
        }

        let byte_count = data[1] as usize;
        let available = data.len() - 2;
        if byte_count > available {
            debug!(
                "Response byte count {} exceeds received data {}, truncating",
                byte_count, available
            );
        }
        Ok(&data[2..2 + byte_count.min(available)])
    }

    /// Parse FC03/FC04 response data into big-endian 16-bit words.
    pub fn parse_registers(&self, expected_fc: u8) -> ModbusResult<Vec<u16>> {
        let payload = self.read_payload(expected_fc)?;
        Ok(payload
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect())
    }

    /// Parse FC01 response data into `quantity` booleans, LSB of byte 0 first.
    pub fn parse_coils(&self, expected_fc: u8, quantity: u16) -> ModbusResult<Vec<bool>> {
        let payload = self.read_payload(expected_fc)?;
        let quantity = quantity as usize;
        if payload.len() * 8 < quantity {
            return Err(ModbusError::decode(format!(
                "Coil response too short: {} bytes for {} coils",
                payload.len(),
                quantity
            )));
        }
        Ok((0..quantity)
            .map(|i| (payload[i / 8] >> (i % 8)) & 0x01 != 0)
            .collect())
    }

    /// Name of a supported function code, exception bit ignored
    pub fn function_code_description(fc: u8) -> &'static str {
        match fc & !EXCEPTION_FLAG {
            0x01 => "Read Coils",
            0x03 => "Read Holding Registers",
            0x04 => "Read Input Registers",
            _ => "Unsupported Function",
        }
    }
}

impl Default for ModbusPdu {
    fn default() -> Self {
        Self::new()
    }
}

/// Appends big-endian fields to a PDU.
#[derive(Default)]
pub struct PduBuilder {
    pdu: ModbusPdu,
}

impl PduBuilder {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn byte(mut self, value: u8) -> ModbusResult<Self> {
        self.pdu.push(value)?;
        Ok(self)
    }

    #[inline]
    pub fn word(mut self, value: u16) -> ModbusResult<Self> {
        self.pdu.push_u16(value)?;
        Ok(self)
    }

    #[inline]
    pub fn build(self) -> ModbusPdu {
        self.pdu
    }

    /// `[fc, address, quantity]` for FC01, FC03 or FC04.
    pub fn build_read_request(fc: u8, address: u16, quantity: u16) -> ModbusResult<ModbusPdu> {
        if !matches!(fc, FC_READ_COILS | FC_READ_HOLDING_REGISTERS | FC_READ_INPUT_REGISTERS) {
            return Err(ModbusError::invalid_data(format!(
                "Unsupported read function code: 0x{:02X}",
                fc
            )));
        }
        let pdu = Self::new().byte(fc)?.word(address)?.word(quantity)?.build();
        debug!(
            "PDU out: {} address={} quantity={}",
            ModbusPdu::function_code_description(fc),
            address,
            quantity
        );
        Ok(pdu)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pdu_basic_operations() {
        let mut pdu = ModbusPdu::new();
        assert!(pdu.is_empty());

        pdu.push(0x03).unwrap();
        assert_eq!(pdu.function_code(), Some(0x03));
        assert!(!pdu.is_exception());

        pdu.push_u16(0x0100).unwrap();
        pdu.push_u16(0x000A).unwrap();

        assert_eq!(pdu.len(), 5);
        assert_eq!(pdu.as_slice(), &[0x03, 0x01, 0x00, 0x00, 0x0A]);
    }

    #[test]
    fn test_build_read_request() {
        let pdu = PduBuilder::build_read_request(0x04, 0x006B, 3).unwrap();
        assert_eq!(pdu.as_slice(), &[0x04, 0x00, 0x6B, 0x00, 0x03]);
    }

    #[test]
    fn test_build_read_request_rejects_write_codes() {
        assert!(PduBuilder::build_read_request(0x06, 0, 1).is_err());
        assert!(PduBuilder::build_read_request(0x02, 0, 1).is_err());
    }

    #[test]
    fn test_exception_response() {
        let pdu = ModbusPdu::from_slice(&[0x83, 0x02]).unwrap();
        assert!(pdu.is_exception());
        assert_eq!(pdu.exception_code(), Some(0x02));

        match pdu.check_exception() {
            Err(ModbusError::Exception { function, code, .. }) => {
                assert_eq!(function, 0x03);
                assert_eq!(code, 0x02);
            }
            other => panic!("expected exception, got {:?}", other),
        }
    }

    #[test]
    fn test_exception_without_code_byte() {
        let pdu = ModbusPdu::from_slice(&[0x84]).unwrap();
        match pdu.check_exception() {
            Err(ModbusError::Exception { function, code, .. }) => {
                assert_eq!(function, 0x04);
                assert_eq!(code, 0);
            }
            other => panic!("expected exception, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_registers() {
        let pdu = ModbusPdu::from_slice(&[0x03, 0x04, 0x12, 0x34, 0xFF, 0xFF]).unwrap();
        assert_eq!(pdu.parse_registers(0x03).unwrap(), vec![0x1234, 0xFFFF]);
    }

    #[test]
    fn test_parse_registers_truncated_payload() {
        // byte count claims 4 bytes, only 3 arrived: one whole word survives
        let pdu = ModbusPdu::from_slice(&[0x04, 0x04, 0x00, 0x01, 0x02]).unwrap();
        assert_eq!(pdu.parse_registers(0x04).unwrap(), vec![0x0001]);
    }

    #[test]
    fn test_parse_registers_function_mismatch() {
        let pdu = ModbusPdu::from_slice(&[0x04, 0x02, 0x00, 0x01]).unwrap();
        assert!(matches!(
            pdu.parse_registers(0x03),
            Err(ModbusError::Frame { .. })
        ));
    }

    #[test]
    fn test_parse_coils() {
        let pdu = ModbusPdu::from_slice(&[0x01, 0x02, 0b0000_0101, 0b0000_0001]).unwrap();
        let coils = pdu.parse_coils(0x01, 10).unwrap();
        assert_eq!(
            coils,
            vec![true, false, true, false, false, false, false, false, true, false]
        );
    }

    #[test]
    fn test_parse_coils_short_payload() {
        let pdu = ModbusPdu::from_slice(&[0x01, 0x01, 0xFF]).unwrap();
        assert!(matches!(
            pdu.parse_coils(0x01, 9),
            Err(ModbusError::Decode { .. })
        ));
    }
}
