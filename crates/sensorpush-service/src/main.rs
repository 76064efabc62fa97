//! SensorPush Service - advertisement ingestion and live feeds.
//!
//! Run with: `cargo run -p sensorpush-service`

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use sensorpush_core::device::ConnectionConfig;
use sensorpush_core::{BleRadio, Radio, SharedRadio};
use sensorpush_service::{AppState, Config, SamplePipeline, queue};
use sensorpush_store::Store;

/// SensorPush Service - advertisement ingestion and live feeds.
#[derive(Parser, Debug)]
#[command(name = "sensorpush-service")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Database path (overrides config).
    #[arg(short, long)]
    database: Option<PathBuf>,

    /// Identity read timeout in seconds (overrides config).
    #[arg(long)]
    read_timeout: Option<u64>,

    /// Bluetooth adapter index (overrides config).
    #[arg(long)]
    adapter: Option<usize>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("sensorpush_service=info".parse()?),
        )
        .init();

    let config = load_config(&args)?;

    let store = Store::open(&config.storage.path)
        .with_context(|| format!("Failed to open database {}", config.storage.path.display()))?;

    let state = AppState::new(store, config);
    run(state).await
}

fn load_config(args: &Args) -> anyhow::Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::load_default().unwrap_or_default(),
    };

    if let Some(db_path) = &args.database {
        config.storage.path = db_path.clone();
    }
    if let Some(secs) = args.read_timeout {
        config.radio.identity_read_timeout_secs = secs;
    }
    if let Some(index) = args.adapter {
        config.radio.adapter_index = index;
    }

    config.validate()?;
    Ok(config)
}

async fn run(state: Arc<AppState>) -> anyhow::Result<()> {
    // The resolver abandons reads after this budget; keep every stage inside it.
    let connection = ConnectionConfig::within(state.config.radio.identity_read_timeout());
    let radio = BleRadio::open(state.config.radio.adapter_index, connection)
        .await
        .context("Failed to open Bluetooth adapter")?;

    let pipeline = Arc::new(SamplePipeline::new(
        Arc::clone(&state),
        Arc::new(radio.clone()) as SharedRadio,
    ));
    {
        let store = state.store.lock().await;
        let known = pipeline.resolver().preload(&store)?;
        info!("{} device(s) already registered", known);
    }

    let (ingest, receiver) = queue::channel();
    let cancel = CancellationToken::new();

    let pump = radio
        .advertisement_pump(ingest.sender())
        .start(cancel.child_token());
    let consumer = Arc::clone(&pipeline).start(receiver, cancel.child_token());
    drop(ingest);

    radio.resume_scan().await.context("Failed to start scanning")?;
    info!("Listening for SensorPush advertisements (Ctrl-C to stop)");

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");

    cancel.cancel();
    if let Err(e) = consumer.await {
        warn!("Sample pipeline task failed: {}", e);
    }
    if let Err(e) = radio.pause_scan().await {
        warn!("Failed to stop scanning: {}", e);
    }
    match pump.await {
        Ok(Err(e)) => warn!("Advertisement pump failed: {}", e),
        Err(e) => warn!("Advertisement pump task failed: {}", e),
        Ok(Ok(())) => {}
    }

    state.hub.shutdown();
    info!("Pipeline stats: {:?}", state.stats.snapshot());

    drop(pipeline);
    match Arc::try_unwrap(state) {
        Ok(state) => state.into_store().close().context("Failed to close database")?,
        Err(_) => warn!("Database still in use at shutdown, leaving it to drop"),
    }

    Ok(())
}
