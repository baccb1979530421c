//! Modbus TCP protocol definitions: MBAP header, read functions, request
//! and response types.
//!
//! A Modbus TCP frame is an MBAP header followed by the PDU:
//!
//! ```text
//! +----------------+-------------+--------+---------+-----------------+
//! | transaction id | protocol id | length | unit id | PDU             |
//! | u16 BE         | u16 BE (0)  | u16 BE | u8      | fc + payload    |
//! +----------------+-------------+--------+---------+-----------------+
//! ```
//!
//! `length` counts the unit id byte plus the PDU.

use std::fmt;

use bytes::{BufMut, BytesMut};

use crate::constants::{
    FC_READ_COILS, FC_READ_HOLDING_REGISTERS, FC_READ_INPUT_REGISTERS, MAX_MBAP_LENGTH,
    MAX_PDU_SIZE, MAX_READ_COILS, MAX_READ_REGISTERS, MBAP_HEADER_LEN, MODBUS_PROTOCOL_ID,
    READ_REQUEST_PDU_LEN,
};
use crate::error::{ModbusError, ModbusResult};
use crate::pdu::{ModbusPdu, PduBuilder};

/// Modbus unit (slave) identifier
pub type UnitId = u8;

/// Read functions issued by this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModbusFunction {
    /// FC01
    ReadCoils,
    /// FC03
    ReadHoldingRegisters,
    /// FC04
    ReadInputRegisters,
}

impl ModbusFunction {
    pub fn to_u8(self) -> u8 {
        match self {
            Self::ReadCoils => FC_READ_COILS,
            Self::ReadHoldingRegisters => FC_READ_HOLDING_REGISTERS,
            Self::ReadInputRegisters => FC_READ_INPUT_REGISTERS,
        }
    }

    pub fn from_u8(code: u8) -> ModbusResult<Self> {
        match code {
            FC_READ_COILS => Ok(Self::ReadCoils),
            FC_READ_HOLDING_REGISTERS => Ok(Self::ReadHoldingRegisters),
            FC_READ_INPUT_REGISTERS => Ok(Self::ReadInputRegisters),
            _ => Err(ModbusError::invalid_data(format!(
                "Unsupported function code: {:02X}",
                code
            ))),
        }
    }

    /// Largest quantity accepted in one request.
    pub fn max_quantity(self) -> u16 {
        match self {
            Self::ReadCoils => MAX_READ_COILS as u16,
            Self::ReadHoldingRegisters | Self::ReadInputRegisters => MAX_READ_REGISTERS as u16,
        }
    }
}

impl fmt::Display for ModbusFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(ModbusPdu::function_code_description(self.to_u8()))
    }
}

/// MBAP header (7 bytes, big-endian)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MbapHeader {
    pub transaction_id: u16,
    pub protocol_id: u16,
    /// Unit id byte + PDU length
    pub length: u16,
    pub unit_id: UnitId,
}

impl MbapHeader {
    /// Header for a request carrying `pdu_len` PDU bytes.
    pub fn for_pdu(transaction_id: u16, unit_id: UnitId, pdu_len: usize) -> Self {
        Self {
            transaction_id,
            protocol_id: MODBUS_PROTOCOL_ID,
            length: (pdu_len + 1) as u16,
            unit_id,
        }
    }

    pub fn encode(&self) -> [u8; MBAP_HEADER_LEN] {
        let tid = self.transaction_id.to_be_bytes();
        let pid = self.protocol_id.to_be_bytes();
        let len = self.length.to_be_bytes();
        [tid[0], tid[1], pid[0], pid[1], len[0], len[1], self.unit_id]
    }

    pub fn decode(buf: &[u8; MBAP_HEADER_LEN]) -> Self {
        Self {
            transaction_id: u16::from_be_bytes([buf[0], buf[1]]),
            protocol_id: u16::from_be_bytes([buf[2], buf[3]]),
            length: u16::from_be_bytes([buf[4], buf[5]]),
            unit_id: buf[6],
        }
    }

    /// Number of PDU bytes that follow the header.
    pub fn pdu_len(&self) -> ModbusResult<usize> {
        let length = self.length as usize;
        if length < 2 {
            return Err(ModbusError::frame(format!(
                "MBAP length {} too short for a PDU",
                length
            )));
        }
        if length > MAX_MBAP_LENGTH {
            return Err(ModbusError::frame(format!(
                "MBAP length {} exceeds maximum {}",
                length, MAX_MBAP_LENGTH
            )));
        }
        Ok(length - 1)
    }
}

/// A read request addressed to the transport's unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModbusRequest {
    pub function: ModbusFunction,
    pub address: u16,
    pub quantity: u16,
}

impl ModbusRequest {
    pub fn new_read(function: ModbusFunction, address: u16, quantity: u16) -> Self {
        Self {
            function,
            address,
            quantity,
        }
    }

    /// Reject zero or over-limit quantities before anything touches the wire.
    pub fn validate(&self) -> ModbusResult<()> {
        if self.quantity == 0 || self.quantity > self.function.max_quantity() {
            return Err(ModbusError::invalid_data(format!(
                "Invalid quantity {} for {} (1-{})",
                self.quantity,
                self.function,
                self.function.max_quantity()
            )));
        }
        Ok(())
    }

    pub fn to_pdu(&self) -> ModbusResult<ModbusPdu> {
        PduBuilder::build_read_request(self.function.to_u8(), self.address, self.quantity)
    }

    /// Encode the full MBAP + PDU frame.
    pub fn encode_frame(&self, transaction_id: u16, unit_id: UnitId) -> ModbusResult<BytesMut> {
        let pdu = self.to_pdu()?;
        let header = MbapHeader::for_pdu(transaction_id, unit_id, pdu.len());

        debug_assert_eq!(pdu.len(), READ_REQUEST_PDU_LEN);
        let mut frame = BytesMut::with_capacity(MBAP_HEADER_LEN + READ_REQUEST_PDU_LEN);
        frame.put_slice(&header.encode());
        frame.put_slice(pdu.as_slice());
        Ok(frame)
    }
}

/// A decoded response: header plus PDU.
#[derive(Debug, Clone)]
pub struct ModbusResponse {
    pub header: MbapHeader,
    pub pdu: ModbusPdu,
}

impl ModbusResponse {
    pub fn new(header: MbapHeader, pdu: ModbusPdu) -> Self {
        Self { header, pdu }
    }

    /// Build a success response for register reads (used by tests and mocks).
    pub fn registers(function: ModbusFunction, unit_id: UnitId, values: &[u16]) -> Self {
        let mut data = Vec::with_capacity(2 + values.len() * 2);
        data.push(function.to_u8());
        data.push((values.len() * 2) as u8);
        for value in values {
            data.extend_from_slice(&value.to_be_bytes());
        }
        Self::from_pdu_bytes(unit_id, &data)
    }

    /// Build a response around raw PDU bytes.
    pub fn from_pdu_bytes(unit_id: UnitId, data: &[u8]) -> Self {
        let len = data.len().min(MAX_PDU_SIZE);
        let pdu = ModbusPdu::from_slice(&data[..len]).unwrap_or_default();
        Self {
            header: MbapHeader::for_pdu(0, unit_id, pdu.len()),
            pdu,
        }
    }

    pub fn parse_registers(&self, function: ModbusFunction) -> ModbusResult<Vec<u16>> {
        self.pdu.parse_registers(function.to_u8())
    }

    pub fn parse_coils(&self, quantity: u16) -> ModbusResult<Vec<bool>> {
        self.pdu.parse_coils(FC_READ_COILS, quantity)
    }
}
