//! FuelWatch - fleet fuel efficiency and consumption anomaly detection
//!
//! # Usage
//!
//! ```bash
//! # Replay a JSON array of refuel events into the on-disk store
//! fuelwatch replay --input refuels.json
//!
//! # Inspect one vehicle
//! fuelwatch status --vehicle ABC1D23
//!
//! # Expected efficiency, compared against a trip of 420 km on 38.5 L
//! fuelwatch predict --vehicle ABC1D23 --distance-km 420 --liters 38.5
//!
//! # Print the effective configuration
//! fuelwatch config
//! ```
//!
//! # Environment Variables
//!
//! - `FUELWATCH_CONFIG`: Path to a TOML config file (default: ./fuelwatch.toml)
//! - `FUELWATCH_DATA_DIR`: sled directory (overrides `storage.data_dir`)
//! - `RUST_LOG`: Logging level (default: info)

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::info;

use fuelwatch::alerts::{alert_channel, AlertDispatcher, WebhookAlertEmitter};
use fuelwatch::config::{self, FuelWatchConfig};
use fuelwatch::pipeline::PipelineOutcome;
use fuelwatch::{
    predict_consumption, AlertEmitter, AnomalyVerdict, EfficiencyPipeline, InMemoryStore,
    LogAlertEmitter, ModelStore, RefuelEvent, SledStore, VehicleRegistry,
};

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "fuelwatch")]
#[command(about = "Fleet fuel efficiency estimation and anomaly detection")]
#[command(version)]
struct CliArgs {
    /// Path to a TOML config file (overrides FUELWATCH_CONFIG and ./fuelwatch.toml)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// sled directory for vehicle state
    #[arg(long, global = true, env = "FUELWATCH_DATA_DIR", value_name = "PATH")]
    data_dir: Option<PathBuf>,

    /// Keep all state in memory (nothing is persisted)
    #[arg(long, global = true)]
    in_memory: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: SubCommand,
}

#[derive(clap::Subcommand, Debug)]
enum SubCommand {
    /// Run a JSON array of refuel events through the pipeline
    Replay {
        /// JSON file containing `[RefuelEvent, ...]`
        #[arg(long, value_name = "FILE")]
        input: PathBuf,

        /// Print each classified reading as a JSON line
        #[arg(long)]
        json: bool,
    },

    /// Show a vehicle's detection stage, history length and control limits
    Status {
        #[arg(long)]
        vehicle: String,
    },

    /// Forecast a vehicle's consumption
    Predict {
        #[arg(long)]
        vehicle: String,

        /// Distance of the current trip (km)
        #[arg(long, requires = "liters")]
        distance_km: Option<f64>,

        /// Fuel used on the current trip (liters)
        #[arg(long, requires = "distance_km")]
        liters: Option<f64>,
    },

    /// Print the effective configuration as TOML
    Config,
}

// ============================================================================
// Setup
// ============================================================================

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_config(args: &CliArgs) -> Result<FuelWatchConfig> {
    let mut cfg = match &args.config {
        Some(path) => FuelWatchConfig::load_from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => FuelWatchConfig::load(),
    };
    if let Some(dir) = &args.data_dir {
        cfg.storage.data_dir = dir.clone();
    }
    Ok(cfg)
}

fn open_store(cfg: &FuelWatchConfig, in_memory: bool) -> Result<Arc<dyn ModelStore>> {
    if in_memory {
        return Ok(Arc::new(InMemoryStore::new()));
    }
    std::fs::create_dir_all(&cfg.storage.data_dir).with_context(|| {
        format!(
            "Failed to create data directory {}",
            cfg.storage.data_dir.display()
        )
    })?;
    let store = SledStore::open(&cfg.storage.data_dir, cfg.model_settings())
        .context("Failed to open vehicle state store")?;
    Ok(Arc::new(store))
}

fn downstream_emitter(cfg: &FuelWatchConfig) -> Result<Arc<dyn AlertEmitter>> {
    match &cfg.alerts.webhook_url {
        Some(url) => {
            let timeout = Duration::from_secs(cfg.alerts.http_timeout_secs);
            let emitter = WebhookAlertEmitter::new(url, timeout)
                .context("Failed to build webhook client")?;
            info!(url = %url, "Alerts delivered to webhook");
            Ok(Arc::new(emitter))
        }
        None => Ok(Arc::new(LogAlertEmitter)),
    }
}

// ============================================================================
// Commands
// ============================================================================

async fn run_replay(
    cfg: &FuelWatchConfig,
    registry: Arc<VehicleRegistry>,
    input: &Path,
    json: bool,
) -> Result<()> {
    let raw = std::fs::read_to_string(input)
        .with_context(|| format!("Failed to read {}", input.display()))?;
    let events: Vec<RefuelEvent> = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse refuel events from {}", input.display()))?;

    let (emitter, rx) = alert_channel(cfg.alerts.channel_capacity);
    let cancel_token = CancellationToken::new();
    let dispatcher =
        AlertDispatcher::new(rx, downstream_emitter(cfg)?, cancel_token.clone()).spawn();

    let pipeline = EfficiencyPipeline::new(registry, Arc::new(emitter), cfg.alerts.min_severity);
    let (summary, outcomes) = pipeline.replay(events).await?;

    for outcome in &outcomes {
        let PipelineOutcome::Classified { reading, result, .. } = outcome else {
            continue;
        };
        if json {
            println!("{}", serde_json::to_string(result)?);
            continue;
        }
        let verdict = match result.verdict {
            AnomalyVerdict::NotReady => "not ready".to_string(),
            AnomalyVerdict::Normal => "normal".to_string(),
            AnomalyVerdict::Anomalous { severity, .. } => format!("ANOMALY {severity}"),
        };
        println!(
            "{:<12} #{:<4} {:>7.2} km/L  {:<16} {}",
            reading.vehicle_id,
            reading.sequence_index,
            reading.value,
            result.stage.to_string(),
            verdict
        );
    }

    // Explicit teardown: drop every sender, then drain the queue.
    drop(pipeline);
    cancel_token.cancel();
    let dispatch_stats = dispatcher.await.context("Alert dispatcher panicked")?;

    println!();
    println!(
        "  {} vehicles, {} events, {} readings",
        summary.vehicles, summary.events, summary.readings
    );
    println!(
        "  {} anomalies ({} HIGH), {} alerts delivered, {} failed",
        summary.anomalies, summary.high_severity, dispatch_stats.delivered, dispatch_stats.failed
    );
    Ok(())
}

fn run_status(registry: &VehicleRegistry, vehicle: &str) -> Result<()> {
    let Some(state) = registry.snapshot(vehicle)? else {
        bail!("No history for vehicle {vehicle}");
    };
    let stage = registry.stage(vehicle)?;

    println!("  Vehicle:   {}", state.vehicle_id);
    println!("  Stage:     {stage}");
    println!("  Readings:  {}", state.len());
    match state.statistical {
        Some(limits) => println!(
            "  Limits:    {:.2} .. {:.2} km/L (mean {:.2}, std {:.2})",
            limits.lower, limits.upper, limits.mean, limits.std
        ),
        None => println!("  Limits:    not computed yet"),
    }
    match &state.robust {
        Some(model) => println!("  Forest:    trained on {} readings", model.trained_on),
        None => println!("  Forest:    not trained yet"),
    }
    if let Some(trained_at) = state.trained_at {
        println!("  Trained:   {}", trained_at.to_rfc3339());
    }
    Ok(())
}

fn run_predict(
    registry: &VehicleRegistry,
    vehicle: &str,
    current: Option<(f64, f64)>,
) -> Result<()> {
    let Some(state) = registry.snapshot(vehicle)? else {
        bail!("No history for vehicle {vehicle}");
    };
    let forecast = predict_consumption(&state, current);
    println!("{}", serde_json::to_string_pretty(&forecast)?);
    Ok(())
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    init_tracing(args.json_logs);

    config::init(load_config(&args)?);
    let cfg = config::get();

    if let SubCommand::Config = args.command {
        print!("{}", cfg.to_toml()?);
        return Ok(());
    }

    let store = open_store(cfg, args.in_memory)?;
    let registry = Arc::new(VehicleRegistry::new(store, cfg.model_settings()));

    match &args.command {
        SubCommand::Replay { input, json } => run_replay(cfg, registry, input, *json).await,
        SubCommand::Status { vehicle } => run_status(&registry, vehicle),
        SubCommand::Predict {
            vehicle,
            distance_km,
            liters,
        } => run_predict(&registry, vehicle, distance_km.zip(*liters)),
        SubCommand::Config => Ok(()),
    }
}
