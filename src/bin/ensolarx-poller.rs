//! EnsolarX poller.
//!
//! Polls an EnsolarX inverter over Modbus TCP and logs every snapshot as a
//! JSON line. With `--once` it runs a single cycle, prints the snapshot to
//! stdout and exits non-zero if the cycle failed.
//!
//! Usage: ensolarx-poller [--config poller.json5] [--host 192.168.86.188] [--once]

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, warn};

use ensolarx_modbus::{init_tracing, CycleEvent, PollCoordinator, PollerConfig};

/// Poll an EnsolarX inverter/BMS over Modbus TCP.
#[derive(Parser, Debug)]
#[command(name = "ensolarx-poller")]
#[command(about = "Polls an EnsolarX inverter and prints register snapshots")]
#[command(version)]
struct Args {
    /// Path to configuration file (JSON5 format). Built-in defaults when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override device host
    #[arg(long)]
    host: Option<String>,

    /// Override device port
    #[arg(long)]
    port: Option<u16>,

    /// Override Modbus unit id
    #[arg(long)]
    unit_id: Option<u8>,

    /// Override scan interval in seconds (minimum 5)
    #[arg(long)]
    interval: Option<u64>,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long)]
    log_level: Option<String>,

    /// Run one poll cycle, print the snapshot and exit
    #[arg(long)]
    once: bool,
}

impl Args {
    fn apply(&self, config: &mut PollerConfig) {
        if let Some(host) = &self.host {
            config.device.host = host.clone();
        }
        if let Some(port) = self.port {
            config.device.port = port;
        }
        if let Some(unit_id) = self.unit_id {
            config.device.unit_id = unit_id;
        }
        if let Some(interval) = self.interval {
            config.polling.scan_interval_secs = interval;
        }
        if let Some(level) = &self.log_level {
            config.logging.level = level.clone();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => PollerConfig::load_from_file(path)
            .with_context(|| format!("Failed to load config from {:?}", path))?,
        None => PollerConfig::default(),
    };
    args.apply(&mut config);
    config.validate().context("Invalid configuration")?;

    init_tracing(&config.logging).context("Failed to init tracing")?;

    let table = config
        .descriptor_table()
        .context("Failed to load register table")?;
    let mut coordinator = PollCoordinator::new(config.coordinator_config(), table)
        .context("Failed to create poll coordinator")?;

    if args.once {
        let result = coordinator.poll_cycle().await;
        coordinator.close().await;
        let snapshot = result.context("Poll cycle failed")?;
        println!("{}", serde_json::to_string_pretty(&snapshot.to_json())?);
        return Ok(());
    }

    let handle = coordinator.handle();
    let mut events = handle.subscribe();
    let printer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(CycleEvent::Updated { snapshot, .. }) => {
                    println!("{}", snapshot.to_json());
                }
                Ok(CycleEvent::Failed { .. }) => {}
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Snapshot printer lagged, skipped {} cycle(s)", skipped);
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    coordinator
        .run(async {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("Received shutdown signal"),
                Err(e) => {
                    warn!("Failed to listen for shutdown signal, polling until killed: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        })
        .await
        .context("Poller stopped with an error")?;

    printer.abort();
    info!("EnsolarX poller stopped");
    Ok(())
}
