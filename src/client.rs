//! High-level Modbus client
//!
//! A client is bound to one transport, and the transport to one unit id, so
//! the read methods take only an address and a quantity.
//!
//! # API Naming Convention
//!
//! | Function Code | Primary Name | Semantic Alias |
//! |---------------|--------------|----------------|
//! | 0x01 | `read_01()` | `read_coils()` |
//! | 0x03 | `read_03()` | `read_holding_registers()` |
//! | 0x04 | `read_04()` | `read_input_registers()` |
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use ensolarx_modbus::{ModbusClient, ModbusResult, ModbusTcpClient};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> ModbusResult<()> {
//!     let mut client = ModbusTcpClient::new("192.168.86.188", 8899, 18, Duration::from_secs(3));
//!     client.connect().await?;
//!
//!     // Battery voltage lives in holding register 17
//!     let registers = client.read_03(17, 1).await?;
//!     println!("Registers: {:?}", registers);
//!
//!     client.close().await?;
//!     Ok(())
//! }
//! ```
use std::time::Duration;

use tracing::debug;

use crate::codec::decode;
use crate::descriptor::DataType;
use crate::error::{ModbusError, ModbusResult};
use crate::protocol::{ModbusFunction, ModbusRequest, ModbusResponse, UnitId};
use crate::transport::{ConnectionInfo, ModbusTransport, TcpTransport, TransportStats};
use crate::value::ModbusValue;

/// Read operations against a single Modbus unit.
///
/// # Implemented By
///
/// - [`ModbusTcpClient`] - Modbus TCP client
/// - [`GenericModbusClient`] - Generic client for custom transports
///
/// # Protocol Limits
///
/// | Operation | Limit |
/// |-----------|-------|
/// | Read Coils (0x01) | 2000 coils |
/// | Read Holding Registers (0x03) | 125 registers |
/// | Read Input Registers (0x04) | 125 registers |
pub trait ModbusClient: Send + Sync {
    /// Read coils (function code 0x01).
    ///
    /// Returns `quantity` booleans, bit 0 of the first data byte first.
    fn read_01(
        &mut self,
        address: u16,
        quantity: u16,
    ) -> impl std::future::Future<Output = ModbusResult<Vec<bool>>> + Send;

    /// Read holding registers (function code 0x03).
    ///
    /// # Arguments
    ///
    /// * `address` - Starting register address (0-65535)
    /// * `quantity` - Number of registers to read (1-125)
    fn read_03(
        &mut self,
        address: u16,
        quantity: u16,
    ) -> impl std::future::Future<Output = ModbusResult<Vec<u16>>> + Send;

    /// Read input registers (function code 0x04).
    fn read_04(
        &mut self,
        address: u16,
        quantity: u16,
    ) -> impl std::future::Future<Output = ModbusResult<Vec<u16>>> + Send;

    /// Open the connection. No-op when already connected.
    fn connect(&mut self) -> impl std::future::Future<Output = ModbusResult<()>> + Send;

    /// Check if the client is connected.
    fn is_connected(&self) -> bool;

    /// Close the client connection.
    fn close(&mut self) -> impl std::future::Future<Output = ModbusResult<()>> + Send;

    /// Get transport statistics.
    fn get_stats(&self) -> TransportStats;

    /// Host, port and unit id, for diagnostics.
    fn connection_info(&self) -> ConnectionInfo;

    /// Read registers with FC03 or FC04 chosen at runtime.
    fn read_registers(
        &mut self,
        function: ModbusFunction,
        address: u16,
        quantity: u16,
    ) -> impl std::future::Future<Output = ModbusResult<Vec<u16>>> + Send
    where
        Self: Sized,
    {
        async move {
            match function {
                ModbusFunction::ReadHoldingRegisters => self.read_03(address, quantity).await,
                ModbusFunction::ReadInputRegisters => self.read_04(address, quantity).await,
                ModbusFunction::ReadCoils => Err(ModbusError::invalid_data(
                    "Coils cannot be read as registers",
                )),
            }
        }
    }

    /// Read and decode one typed value.
    ///
    /// Reads `data_type.register_count()` registers and decodes them,
    /// swapping the two words of 32-bit values when `word_swap` is set.
    fn read_value(
        &mut self,
        function: ModbusFunction,
        address: u16,
        data_type: DataType,
        word_swap: bool,
    ) -> impl std::future::Future<Output = ModbusResult<ModbusValue>> + Send
    where
        Self: Sized,
    {
        async move {
            let words = self
                .read_registers(function, address, data_type.register_count())
                .await?;
            decode(&words, data_type, word_swap)
        }
    }

    // ===== Semantic name aliases (for readability) =====

    /// Alias for `read_01` - Read coils
    #[inline]
    fn read_coils(
        &mut self,
        address: u16,
        quantity: u16,
    ) -> impl std::future::Future<Output = ModbusResult<Vec<bool>>> + Send {
        self.read_01(address, quantity)
    }

    /// Alias for `read_03` - Read holding registers
    #[inline]
    fn read_holding_registers(
        &mut self,
        address: u16,
        quantity: u16,
    ) -> impl std::future::Future<Output = ModbusResult<Vec<u16>>> + Send {
        self.read_03(address, quantity)
    }

    /// Alias for `read_04` - Read input registers
    #[inline]
    fn read_input_registers(
        &mut self,
        address: u16,
        quantity: u16,
    ) -> impl std::future::Future<Output = ModbusResult<Vec<u16>>> + Send {
        self.read_04(address, quantity)
    }
}

/// Generic Modbus client that works with any transport
///
/// Builds read PDUs and parses responses; framing and socket handling stay
/// in the transport.
pub struct GenericModbusClient<T: ModbusTransport> {
    transport: T,
}

impl<T: ModbusTransport> GenericModbusClient<T> {
    /// Create a new generic client with the specified transport
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    /// Get a reference to the underlying transport
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Get a mutable reference to the underlying transport
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Execute a raw request
    pub async fn execute_request(
        &mut self,
        request: ModbusRequest,
    ) -> ModbusResult<ModbusResponse> {
        request.validate()?;
        debug!(
            "Request: {} address={} quantity={}",
            request.function, request.address, request.quantity
        );

        let response = self.transport.request(&request).await?;

        debug!(
            "Response: {} pdu_len={}",
            request.function,
            response.pdu.len()
        );
        Ok(response)
    }
}

impl<T: ModbusTransport + Send + Sync> ModbusClient for GenericModbusClient<T> {
    async fn read_01(&mut self, address: u16, quantity: u16) -> ModbusResult<Vec<bool>> {
        let request = ModbusRequest::new_read(ModbusFunction::ReadCoils, address, quantity);
        let response = self.execute_request(request).await?;
        response.parse_coils(quantity)
    }

    async fn read_03(&mut self, address: u16, quantity: u16) -> ModbusResult<Vec<u16>> {
        let request =
            ModbusRequest::new_read(ModbusFunction::ReadHoldingRegisters, address, quantity);
        let response = self.execute_request(request).await?;
        response.parse_registers(ModbusFunction::ReadHoldingRegisters)
    }

    async fn read_04(&mut self, address: u16, quantity: u16) -> ModbusResult<Vec<u16>> {
        let request =
            ModbusRequest::new_read(ModbusFunction::ReadInputRegisters, address, quantity);
        let response = self.execute_request(request).await?;
        response.parse_registers(ModbusFunction::ReadInputRegisters)
    }

    async fn connect(&mut self) -> ModbusResult<()> {
        self.transport.connect().await
    }

    fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    async fn close(&mut self) -> ModbusResult<()> {
        self.transport.close().await
    }

    fn get_stats(&self) -> TransportStats {
        self.transport.get_stats()
    }

    fn connection_info(&self) -> ConnectionInfo {
        self.transport.connection_info()
    }
}

/// Modbus TCP client implementation using the generic client
pub struct ModbusTcpClient {
    inner: GenericModbusClient<TcpTransport>,
}

impl ModbusTcpClient {
    /// Create a client. The socket is opened lazily on the first request or
    /// by an explicit [`ModbusClient::connect`].
    pub fn new<S: Into<String>>(host: S, port: u16, unit_id: UnitId, timeout: Duration) -> Self {
        Self::from_transport(TcpTransport::new(host, port, unit_id, timeout))
    }

    /// Create a client and open the connection right away.
    pub async fn connect_to<S: Into<String>>(
        host: S,
        port: u16,
        unit_id: UnitId,
        timeout: Duration,
    ) -> ModbusResult<Self> {
        let mut client = Self::new(host, port, unit_id, timeout);
        client.connect().await?;
        Ok(client)
    }

    /// Create a new TCP client from transport
    pub fn from_transport(transport: TcpTransport) -> Self {
        Self {
            inner: GenericModbusClient::new(transport),
        }
    }

    /// Enable or disable packet logging on existing client
    pub fn set_packet_logging(&mut self, enabled: bool) {
        self.inner.transport_mut().set_packet_logging(enabled);
    }

    /// Fail responses whose transaction id does not echo the request's.
    pub fn set_strict_transaction_id(&mut self, strict: bool) {
        self.inner.transport_mut().set_strict_transaction_id(strict);
    }

    /// Execute a raw request
    pub async fn execute_request(
        &mut self,
        request: ModbusRequest,
    ) -> ModbusResult<ModbusResponse> {
        self.inner.execute_request(request).await
    }
}

impl ModbusClient for ModbusTcpClient {
    async fn read_01(&mut self, address: u16, quantity: u16) -> ModbusResult<Vec<bool>> {
        self.inner.read_01(address, quantity).await
    }

    async fn read_03(&mut self, address: u16, quantity: u16) -> ModbusResult<Vec<u16>> {
        self.inner.read_03(address, quantity).await
    }

    async fn read_04(&mut self, address: u16, quantity: u16) -> ModbusResult<Vec<u16>> {
        self.inner.read_04(address, quantity).await
    }

    async fn connect(&mut self) -> ModbusResult<()> {
        self.inner.connect().await
    }

    fn is_connected(&self) -> bool {
        self.inner.is_connected()
    }

    async fn close(&mut self) -> ModbusResult<()> {
        self.inner.close().await
    }

    fn get_stats(&self) -> TransportStats {
        self.inner.get_stats()
    }

    fn connection_info(&self) -> ConnectionInfo {
        self.inner.connection_info()
    }
}
