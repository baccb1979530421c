//! Network transport for Modbus TCP.
//!
//! [`TcpTransport`] owns a single TCP connection to one unit id and performs
//! one request/response exchange at a time:
//!
//! 1. advance the transaction id (wrapping at 16 bits, 0 included)
//! 2. write MBAP header + PDU as one frame and wait for the write to finish
//! 3. read exactly 7 header bytes, then exactly `length - 1` PDU bytes
//! 4. turn exception responses into [`ModbusError::Exception`]
//!
//! Every socket operation is bounded by the configured timeout. A failed
//! exchange drops the socket, since unread response bytes would otherwise be
//! taken as the answer to the next request; the next request connects again
//! (once). Retrying is left to the caller.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::constants::{MBAP_HEADER_LEN, MODBUS_PROTOCOL_ID};
use crate::error::{ModbusError, ModbusResult};
use crate::logging::log_packet;
use crate::pdu::ModbusPdu;
use crate::protocol::{MbapHeader, ModbusRequest, ModbusResponse, UnitId};

/// Transport layer abstraction for Modbus communication.
///
/// The poll coordinator is generic over this trait (through
/// [`crate::client::GenericModbusClient`]) so tests can script device
/// behavior without a socket.
pub trait ModbusTransport: Send + Sync {
    /// Send a request and wait for its response.
    ///
    /// # Errors
    ///
    /// - `ModbusError::Connection` - socket could not be opened
    /// - `ModbusError::Timeout` / `ModbusError::Io` - exchange failed
    /// - `ModbusError::Frame` - malformed response frame
    /// - `ModbusError::Exception` - device returned an exception response
    fn request(
        &mut self,
        request: &ModbusRequest,
    ) -> impl Future<Output = ModbusResult<ModbusResponse>> + Send;

    /// Open the connection if it is not already open.
    fn connect(&mut self) -> impl Future<Output = ModbusResult<()>> + Send;

    /// Whether the transport currently holds an open connection.
    fn is_connected(&self) -> bool;

    /// Close the connection. Best-effort and safe to call repeatedly.
    fn close(&mut self) -> impl Future<Output = ModbusResult<()>> + Send;

    /// Communication counters.
    fn get_stats(&self) -> TransportStats;

    /// Identity of the remote endpoint, used in diagnostics.
    fn connection_info(&self) -> ConnectionInfo;
}

/// Transport layer statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransportStats {
    pub requests_sent: u64,
    pub responses_received: u64,
    pub errors: u64,
    pub timeouts: u64,
    pub exceptions: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub connects: u64,
}

/// Host, port and unit id of a device connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    pub host: String,
    pub port: u16,
    pub unit_id: UnitId,
}

impl fmt::Display for ConnectionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "host={} port={} unit_id={}",
            self.host, self.port, self.unit_id
        )
    }
}

/// Modbus TCP transport implementation
pub struct TcpTransport {
    host: String,
    port: u16,
    unit_id: UnitId,
    timeout: Duration,
    stream: Option<TcpStream>,
    transaction_id: u16,
    stats: TransportStats,
    /// Enable packet logging for debugging
    packet_logging: bool,
    /// Fail responses whose transaction id differs from the request
    strict_transaction_id: bool,
    /// Set while an exchange is running. Still set on entry means the
    /// previous request future was dropped mid-exchange.
    in_flight: bool,
}

impl TcpTransport {
    /// Create a disconnected transport. The socket opens on [`connect`] or
    /// on the first request.
    ///
    /// [`connect`]: ModbusTransport::connect
    pub fn new<S: Into<String>>(host: S, port: u16, unit_id: UnitId, timeout: Duration) -> Self {
        Self {
            host: host.into(),
            port,
            unit_id,
            timeout,
            stream: None,
            transaction_id: 0,
            stats: TransportStats::default(),
            packet_logging: false,
            strict_transaction_id: false,
            in_flight: false,
        }
    }

    /// Enable or disable packet logging
    pub fn set_packet_logging(&mut self, enabled: bool) {
        self.packet_logging = enabled;
    }

    /// Require response transaction ids to echo the request's.
    ///
    /// Off by default: several Wi-Fi gateways answer with a fixed or
    /// stale transaction id.
    pub fn set_strict_transaction_id(&mut self, strict: bool) {
        self.strict_transaction_id = strict;
    }

    pub fn unit_id(&self) -> UnitId {
        self.unit_id
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Transaction id used by the most recent request.
    pub fn transaction_id(&self) -> u16 {
        self.transaction_id
    }

    /// Advance the transaction id modulo 65536.
    fn next_transaction_id(&mut self) -> u16 {
        self.transaction_id = self.transaction_id.wrapping_add(1);
        self.transaction_id
    }

    fn timeout_ms(&self) -> u64 {
        self.timeout.as_millis() as u64
    }

    /// Drop a stream whose last exchange was cancelled; its reply may still
    /// be unread.
    fn discard_interrupted(&mut self) {
        if self.in_flight {
            self.in_flight = false;
            if self.stream.take().is_some() {
                debug!(
                    "Previous exchange with {}:{} was cancelled, dropping connection",
                    self.host, self.port
                );
            }
        }
    }

    fn record_failure(&mut self, err: &ModbusError) {
        self.stats.errors += 1;
        if matches!(err, ModbusError::Timeout { .. }) {
            self.stats.timeouts += 1;
        }
    }

    /// Write one frame and read back one response frame.
    async fn exchange(
        stream: &mut TcpStream,
        frame: &[u8],
        limit: Duration,
    ) -> ModbusResult<(MbapHeader, Vec<u8>)> {
        let limit_ms = limit.as_millis() as u64;

        timeout(limit, async {
            stream.write_all(frame).await?;
            stream.flush().await
        })
        .await
        .map_err(|_| ModbusError::timeout("send request", limit_ms))??;

        let mut header_buf = [0u8; MBAP_HEADER_LEN];
        timeout(limit, stream.read_exact(&mut header_buf))
            .await
            .map_err(|_| ModbusError::timeout("read response header", limit_ms))??;
        let header = MbapHeader::decode(&header_buf);

        let mut pdu_buf = vec![0u8; header.pdu_len()?];
        timeout(limit, stream.read_exact(&mut pdu_buf))
            .await
            .map_err(|_| ModbusError::timeout("read response data", limit_ms))??;

        Ok((header, pdu_buf))
    }
}

impl ModbusTransport for TcpTransport {
    async fn request(&mut self, request: &ModbusRequest) -> ModbusResult<ModbusResponse> {
        request.validate()?;
        self.connect().await?;

        let transaction_id = self.next_transaction_id();
        let frame = request.encode_frame(transaction_id, self.unit_id)?;

        self.stats.requests_sent += 1;
        self.stats.bytes_sent += frame.len() as u64;
        if self.packet_logging {
            log_packet("send", &frame, self.unit_id);
        }

        let limit = self.timeout;
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| ModbusError::connection("Not connected"))?;

        self.in_flight = true;
        let exchanged = Self::exchange(stream, &frame, limit).await;
        self.in_flight = false;

        let (header, pdu_bytes) = match exchanged {
            Ok(exchanged) => exchanged,
            Err(err) => {
                self.record_failure(&err);
                self.stream = None;
                debug!(
                    "Exchange with {}:{} failed, dropping connection: {}",
                    self.host, self.port, err
                );
                return Err(err);
            }
        };

        self.stats.responses_received += 1;
        self.stats.bytes_received += (MBAP_HEADER_LEN + pdu_bytes.len()) as u64;
        if self.packet_logging {
            let mut raw = header.encode().to_vec();
            raw.extend_from_slice(&pdu_bytes);
            log_packet("receive", &raw, header.unit_id);
        }

        if header.transaction_id != transaction_id {
            if self.strict_transaction_id {
                self.stats.errors += 1;
                self.stream = None;
                return Err(ModbusError::TransactionMismatch {
                    expected: transaction_id,
                    actual: header.transaction_id,
                });
            }
            debug!(
                "Transaction id mismatch ignored: sent {}, received {}",
                transaction_id, header.transaction_id
            );
        }
        if header.protocol_id != MODBUS_PROTOCOL_ID {
            debug!("Unexpected protocol id {} in response", header.protocol_id);
        }

        let pdu = ModbusPdu::from_slice(&pdu_bytes)?;
        if let Err(err) = pdu.check_exception() {
            self.stats.errors += 1;
            self.stats.exceptions += 1;
            return Err(err);
        }

        Ok(ModbusResponse::new(header, pdu))
    }

    async fn connect(&mut self) -> ModbusResult<()> {
        self.discard_interrupted();
        if self.stream.is_some() {
            return Ok(());
        }

        debug!(
            "Connecting Modbus TCP to {}:{} (unit={})",
            self.host, self.port, self.unit_id
        );

        let stream = timeout(
            self.timeout,
            TcpStream::connect((self.host.as_str(), self.port)),
        )
        .await
        .map_err(|_| {
            ModbusError::connection(format!(
                "Timed out connecting to {}:{} after {}ms",
                self.host,
                self.port,
                self.timeout_ms()
            ))
        })?
        .map_err(|e| {
            ModbusError::connection(format!(
                "Failed to connect to {}:{}: {}",
                self.host, self.port, e
            ))
        })?;

        if let Err(e) = stream.set_nodelay(true) {
            warn!("Failed to set TCP_NODELAY: {}", e);
        }

        self.stats.connects += 1;
        self.stream = Some(stream);
        info!("Connected to {}:{} (unit={})", self.host, self.port, self.unit_id);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some() && !self.in_flight
    }

    async fn close(&mut self) -> ModbusResult<()> {
        self.in_flight = false;
        if let Some(mut stream) = self.stream.take() {
            match timeout(self.timeout, stream.shutdown()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => debug!("Error while shutting down socket: {}", e),
                Err(_) => debug!("Timed out shutting down socket"),
            }
            info!("Closed connection to {}:{}", self.host, self.port);
        }
        Ok(())
    }

    fn get_stats(&self) -> TransportStats {
        self.stats.clone()
    }

    fn connection_info(&self) -> ConnectionInfo {
        ConnectionInfo {
            host: self.host.clone(),
            port: self.port,
            unit_id: self.unit_id,
        }
    }
}
