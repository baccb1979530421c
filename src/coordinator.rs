//! Poll coordinator.
//!
//! One cycle reads every descriptor in table order over the single shared
//! connection. Each descriptor runs through the same small state machine:
//!
//! ```text
//! primary bank, up to N attempts ──ok──────────────────────┐
//!        │ exhausted                                        │
//!        ├─ fallback allowed: other bank, up to N attempts ─ok─┤
//!        │ exhausted                                        ▼
//!        ▼                                             decode ──ok──> Decoded
//! cached value? ── yes ──> CacheBackfilled                   │ error
//!        │ no                                                ▼
//!        ▼                                            cached value? ...
//!     Absent
//! ```
//!
//! A connection failure marks the link down for the rest of the cycle:
//! later descriptors skip their reads and go straight to backfill.
//!
//! Per-descriptor failures never abort a cycle. The cycle fails with
//! [`ModbusError::CycleFailed`] only when the snapshot ends up empty and at
//! least one descriptor reported an error.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{broadcast, watch};
use tokio::time::{interval, sleep, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::client::{ModbusClient, ModbusTcpClient};
use crate::codec::{apply_scale, decode};
use crate::config::CoordinatorConfig;
use crate::descriptor::{DataType, DescriptorTable, RegisterBank, RegisterDescriptor};
use crate::error::{ModbusError, ModbusResult};
use crate::snapshot::{CacheStage, LastGoodCache, Snapshot, SnapshotBuilder};
use crate::transport::{ConnectionInfo, TcpTransport};

/// Capacity of the cycle event channel. Slow subscribers skip events.
const EVENT_CHANNEL_CAPACITY: usize = 16;

/// Terminal state of one descriptor in one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorOutcome {
    /// Fresh value read and decoded this cycle
    Decoded,
    /// Read or decode failed; last known good value republished
    CacheBackfilled,
    /// Read or decode failed and nothing was cached
    Absent,
}

impl fmt::Display for DescriptorOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Decoded => write!(f, "decoded"),
            Self::CacheBackfilled => write!(f, "cache-backfilled"),
            Self::Absent => write!(f, "absent"),
        }
    }
}

/// Record of a descriptor that hit at least one error during a cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadDiagnostic {
    pub name: String,
    pub address: u16,
    pub data_type: DataType,
    /// One label per attempt, e.g. `holding[1w]`
    pub tried: Vec<String>,
    /// Last error on the primary bank
    pub primary_error: Option<ModbusError>,
    /// Last error on the fallback bank
    pub fallback_error: Option<ModbusError>,
    pub decode_error: Option<ModbusError>,
    pub connection: ConnectionInfo,
    pub outcome: DescriptorOutcome,
}

impl ReadDiagnostic {
    fn new(descriptor: &RegisterDescriptor, connection: ConnectionInfo) -> Self {
        Self {
            name: descriptor.name.clone(),
            address: descriptor.address,
            data_type: descriptor.data_type,
            tried: Vec::new(),
            primary_error: None,
            fallback_error: None,
            decode_error: None,
            connection,
            outcome: DescriptorOutcome::Absent,
        }
    }

    fn has_error(&self) -> bool {
        self.primary_error.is_some() || self.fallback_error.is_some() || self.decode_error.is_some()
    }

    /// The read ultimately succeeded on a retry or on the fallback bank.
    pub fn recovered(&self) -> bool {
        self.outcome == DescriptorOutcome::Decoded
    }
}

fn describe(error: &Option<ModbusError>) -> String {
    match error {
        Some(e) => format!("{}: {}", e.kind(), e),
        None => String::new(),
    }
}

impl fmt::Display for ReadDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tried = if self.tried.is_empty() {
            "-".to_string()
        } else {
            self.tried.join(",")
        };
        write!(
            f,
            "{} addr={} dtype={} tried={} | {} / {}",
            self.name,
            self.address,
            self.data_type,
            tried,
            describe(&self.primary_error),
            describe(&self.fallback_error)
        )?;
        if self.decode_error.is_some() {
            write!(f, " | {}", describe(&self.decode_error))?;
        }
        write!(f, " | {} -> {}", self.connection, self.outcome)
    }
}

/// Summary of one poll cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    pub cycle: u64,
    pub decoded: usize,
    pub backfilled: usize,
    pub absent: usize,
    pub diagnostics: Vec<ReadDiagnostic>,
    pub elapsed: Duration,
}

impl CycleReport {
    fn new(cycle: u64) -> Self {
        Self {
            cycle,
            decoded: 0,
            backfilled: 0,
            absent: 0,
            diagnostics: Vec::new(),
            elapsed: Duration::ZERO,
        }
    }

    fn record(&mut self, outcome: DescriptorOutcome) {
        match outcome {
            DescriptorOutcome::Decoded => self.decoded += 1,
            DescriptorOutcome::CacheBackfilled => self.backfilled += 1,
            DescriptorOutcome::Absent => self.absent += 1,
        }
    }

    /// Descriptors that hit any error, recovered or not.
    pub fn error_count(&self) -> usize {
        self.diagnostics.len()
    }

    pub fn diagnostic(&self, name: &str) -> Option<&ReadDiagnostic> {
        self.diagnostics.iter().find(|d| d.name == name)
    }
}

/// Notification sent after every cycle.
#[derive(Debug, Clone)]
pub enum CycleEvent {
    Updated {
        snapshot: Arc<Snapshot>,
        report: Arc<CycleReport>,
    },
    Failed {
        report: Arc<CycleReport>,
        error: ModbusError,
    },
}

impl CycleEvent {
    pub fn report(&self) -> &CycleReport {
        match self {
            Self::Updated { report, .. } | Self::Failed { report, .. } => report,
        }
    }
}

/// Read-only view of a running coordinator.
///
/// Consumers see the cache only through published snapshots.
#[derive(Debug, Clone)]
pub struct CoordinatorHandle {
    snapshot: watch::Receiver<Option<Arc<Snapshot>>>,
    events: broadcast::Sender<CycleEvent>,
}

impl CoordinatorHandle {
    /// Last successfully published snapshot, possibly stale.
    pub fn current_snapshot(&self) -> Option<Arc<Snapshot>> {
        self.snapshot.borrow().clone()
    }

    /// Receive one event per completed cycle.
    pub fn subscribe(&self) -> broadcast::Receiver<CycleEvent> {
        self.events.subscribe()
    }

    /// Watch channel carrying the current snapshot.
    pub fn snapshot_watch(&self) -> watch::Receiver<Option<Arc<Snapshot>>> {
        self.snapshot.clone()
    }
}

/// Polls a descriptor table over one client.
///
/// Owns the client exclusively, so cycles never overlap and the transaction
/// id counter has a single writer.
pub struct PollCoordinator<C: ModbusClient = ModbusTcpClient> {
    client: C,
    config: CoordinatorConfig,
    table: Arc<DescriptorTable>,
    cache: LastGoodCache,
    cycle: u64,
    /// Connection failure seen earlier in the running cycle. Remaining
    /// reads fail with it instead of reconnecting.
    link_error: Option<ModbusError>,
    snapshot_tx: watch::Sender<Option<Arc<Snapshot>>>,
    events_tx: broadcast::Sender<CycleEvent>,
}

impl PollCoordinator<ModbusTcpClient> {
    /// Coordinator with a Modbus TCP client built from `config`.
    pub fn new(config: CoordinatorConfig, table: DescriptorTable) -> ModbusResult<Self> {
        let mut transport =
            TcpTransport::new(config.host.clone(), config.port, config.unit_id, config.timeout);
        transport.set_strict_transaction_id(config.strict_transaction_id);
        transport.set_packet_logging(config.packet_logging);
        Self::with_client(ModbusTcpClient::from_transport(transport), config, table)
    }
}

impl<C: ModbusClient> PollCoordinator<C> {
    pub fn with_client(
        client: C,
        config: CoordinatorConfig,
        table: DescriptorTable,
    ) -> ModbusResult<Self> {
        config.validate()?;
        let (snapshot_tx, _) = watch::channel(None);
        let (events_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Ok(Self {
            client,
            config,
            table: Arc::new(table),
            cache: LastGoodCache::new(),
            cycle: 0,
            link_error: None,
            snapshot_tx,
            events_tx,
        })
    }

    pub fn handle(&self) -> CoordinatorHandle {
        CoordinatorHandle {
            snapshot: self.snapshot_tx.subscribe(),
            events: self.events_tx.clone(),
        }
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Number of cycles started so far.
    pub fn cycles(&self) -> u64 {
        self.cycle
    }

    /// Close the device connection. Failures are logged and swallowed.
    pub async fn close(&mut self) {
        if let Err(e) = self.client.close().await {
            warn!("Failed to close connection: {}", e);
        }
    }

    /// Run one cycle, publish the result, and return it.
    ///
    /// # Errors
    ///
    /// `ModbusError::CycleFailed` when no descriptor produced a value and
    /// at least one failed. Individual descriptor failures are only
    /// reported through the cycle report.
    pub async fn poll_cycle(&mut self) -> ModbusResult<Arc<Snapshot>> {
        let (result, report) = self.run_cycle().await;
        let report = Arc::new(report);

        match result {
            Ok(snapshot) => {
                let snapshot = Arc::new(snapshot);
                self.snapshot_tx.send_replace(Some(Arc::clone(&snapshot)));
                let _ = self.events_tx.send(CycleEvent::Updated {
                    snapshot: Arc::clone(&snapshot),
                    report,
                });
                Ok(snapshot)
            }
            Err(error) => {
                let _ = self.events_tx.send(CycleEvent::Failed {
                    report,
                    error: error.clone(),
                });
                Err(error)
            }
        }
    }

    /// Poll until `shutdown` resolves, then close the connection.
    ///
    /// Connects eagerly (a failure is logged, the first cycle retries),
    /// runs the first cycle immediately and then one per scan interval. A
    /// cycle still running at shutdown is dropped without touching the
    /// cache.
    pub async fn run<F>(mut self, shutdown: F) -> ModbusResult<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        info!(
            "Starting poll coordinator for {} ({} registers, interval {}s)",
            self.client.connection_info(),
            self.table.len(),
            self.config.scan_interval.as_secs()
        );

        if let Err(e) = self.client.connect().await {
            warn!("Initial connection failed: {}", e);
        }

        let mut ticker = interval(self.config.scan_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = ticker.tick() => {}
            }

            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown during poll cycle, discarding partial results");
                    break;
                }
                result = self.poll_cycle() => {
                    if let Err(e) = result {
                        error!("Poll cycle failed: {}", e);
                    }
                }
            }
        }

        info!("Poll coordinator stopping");
        self.close().await;
        Ok(())
    }

    async fn run_cycle(&mut self) -> (ModbusResult<Snapshot>, CycleReport) {
        self.cycle += 1;
        self.link_error = None;
        let started = Instant::now();
        let table = Arc::clone(&self.table);

        let mut report = CycleReport::new(self.cycle);
        let mut builder = SnapshotBuilder::new();
        let mut stage = self.cache.stage();

        for descriptor in table.iter() {
            let (outcome, diagnostic) = self
                .poll_descriptor(descriptor, &mut builder, &mut stage)
                .await;
            report.record(outcome);
            if let Some(diagnostic) = diagnostic {
                if diagnostic.recovered() {
                    debug!("Recovered read: {}", diagnostic);
                } else {
                    warn!("Register read problem: {}", diagnostic);
                }
                report.diagnostics.push(diagnostic);
            }
        }

        self.cache.commit(stage);
        report.elapsed = started.elapsed();

        info!(
            cycle = report.cycle,
            decoded = report.decoded,
            backfilled = report.backfilled,
            absent = report.absent,
            errors = report.error_count(),
            cached = self.cache.len(),
            elapsed_ms = report.elapsed.as_millis() as u64,
            "Poll cycle complete"
        );

        if builder.is_empty() && report.error_count() > 0 {
            let error = ModbusError::CycleFailed {
                failures: report.error_count(),
            };
            return (Err(error), report);
        }

        (Ok(builder.build(self.cycle, Utc::now())), report)
    }

    async fn poll_descriptor(
        &mut self,
        descriptor: &RegisterDescriptor,
        builder: &mut SnapshotBuilder,
        stage: &mut CacheStage,
    ) -> (DescriptorOutcome, Option<ReadDiagnostic>) {
        let mut diagnostic = ReadDiagnostic::new(descriptor, self.client.connection_info());

        let words = match self
            .read_bank(descriptor, descriptor.bank, &mut diagnostic.tried)
            .await
        {
            Ok(words) => Some(words),
            Err(primary) => {
                diagnostic.primary_error = Some(primary);
                if descriptor.allow_fallback {
                    match self
                        .read_bank(descriptor, descriptor.bank.other(), &mut diagnostic.tried)
                        .await
                    {
                        Ok(words) => Some(words),
                        Err(fallback) => {
                            diagnostic.fallback_error = Some(fallback);
                            None
                        }
                    }
                } else {
                    None
                }
            }
        };

        let outcome = match words.map(|w| decode(&w, descriptor.data_type, descriptor.word_swap)) {
            Some(Ok(raw)) => {
                let value = apply_scale(raw, descriptor.scale, descriptor.precision);
                builder.insert(descriptor, value);
                stage.record(&descriptor.name, value);
                DescriptorOutcome::Decoded
            }
            Some(Err(decode_error)) => {
                diagnostic.decode_error = Some(decode_error);
                self.backfill(descriptor, builder)
            }
            None => self.backfill(descriptor, builder),
        };

        diagnostic.outcome = outcome;
        let diagnostic = diagnostic.has_error().then_some(diagnostic);
        (outcome, diagnostic)
    }

    /// Up to `retry_attempts` reads on one bank, pausing between attempts.
    /// Returns the last error when every attempt fails, or the first
    /// connection error without further attempts.
    async fn read_bank(
        &mut self,
        descriptor: &RegisterDescriptor,
        bank: RegisterBank,
        tried: &mut Vec<String>,
    ) -> ModbusResult<Vec<u16>> {
        let count = descriptor.register_count();
        let attempts = self.config.retry_attempts.max(1);
        let mut last_error = None;

        for attempt in 1..=attempts {
            if let Some(err) = &self.link_error {
                return Err(err.clone());
            }
            tried.push(bank.attempt_label(count));
            match self
                .client
                .read_registers(bank.function(), descriptor.address, count)
                .await
            {
                Ok(words) => return Ok(words),
                Err(e @ ModbusError::Connection { .. }) => {
                    warn!(
                        "Link to {} is down, skipping remaining reads this cycle: {}",
                        self.client.connection_info(),
                        e
                    );
                    self.link_error = Some(e.clone());
                    return Err(e);
                }
                Err(e) => {
                    debug!(
                        "{} {} attempt {}/{} failed: {}",
                        descriptor.name, bank, attempt, attempts, e
                    );
                    last_error = Some(e);
                    if attempt < attempts {
                        sleep(self.config.retry_delay).await;
                    }
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| ModbusError::invalid_data("No read attempts were made")))
    }

    fn backfill(
        &self,
        descriptor: &RegisterDescriptor,
        builder: &mut SnapshotBuilder,
    ) -> DescriptorOutcome {
        match self.cache.get(&descriptor.name) {
            Some(value) => {
                builder.insert(descriptor, value);
                DescriptorOutcome::CacheBackfilled
            }
            None => DescriptorOutcome::Absent,
        }
    }
}
