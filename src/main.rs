//! Flowsight - flow-measurement instrument core
//!
//! Runs the signal-processing pipeline against a block source and
//! drives the front-panel display tick.
//!
//! # Usage
//!
//! ```bash
//! # Built-in synthetic pump scenario (default)
//! cargo run --release
//!
//! # Piped from the simulator binary
//! cargo run --release --bin simulate -- --seconds 120 | flowsight --stdin
//!
//! # Replay a recorded raw-voltage CSV
//! flowsight --csv bench_run.csv
//! ```
//!
//! # Environment Variables
//!
//! - `FLOWSIGHT_CONFIG`: path to the instrument TOML (default:
//!   `./instrument.toml`, falling back to built-in defaults)
//! - `RUST_LOG`: logging level (default: info)

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use flowsight::acquisition::{self, PumpSignalSynth, SynthConfig};
use flowsight::config::InstrumentConfig;
use flowsight::pipeline::{
    AggregatorSettings, ChannelLayout, DisplayLoop, FlowAggregator, InstrumentPipeline,
    ProcessingLoop, ReplaySource, SimulatedSource, StdinSource,
};
use flowsight::recorder::CsvRecorder;

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "flowsight")]
#[command(about = "Flowsight flow-measurement instrument core")]
#[command(version)]
struct CliArgs {
    /// Read JSON block batches from stdin (one per line).
    /// Use with the simulator: simulate | flowsight --stdin
    #[arg(long)]
    stdin: bool,

    /// Replay a recorded raw-voltage CSV (flow_voltage,temp_voltage).
    #[arg(long, value_name = "PATH", conflicts_with = "stdin")]
    csv: Option<String>,

    /// Synthetic scenario length in seconds (simulated source only).
    #[arg(long, default_value = "120")]
    seconds: u64,

    /// Run the simulated source at driver cadence instead of flat out.
    #[arg(long)]
    pace: bool,

    /// Explicit record output path (overrides the timestamped default).
    #[arg(long, value_name = "PATH")]
    output: Option<String>,

    /// Disable record persistence for this run.
    #[arg(long)]
    no_record: bool,

    /// Config file path (overrides the search order).
    #[arg(long, value_name = "PATH", env = "FLOWSIGHT_CONFIG")]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = CliArgs::parse();

    let config = match &args.config {
        Some(path) => InstrumentConfig::from_file(path)
            .with_context(|| format!("loading config from {path}"))?,
        None => InstrumentConfig::load().context("loading instrument config")?,
    };
    let profile = config.pump_profile().context("resolving pump profile")?;

    info!("Flowsight starting");
    info!(
        profile = %profile.name,
        estimator = ?profile.estimator,
        stages = profile.decimation_stages,
        "Pump profile resolved"
    );

    // Record sink (the pipeline's persistence collaborator).
    let recorder = if args.no_record || !config.recording.enabled {
        None
    } else {
        let recorder = match &args.output {
            Some(path) => CsvRecorder::create(path),
            None => CsvRecorder::create_in_dir(&config.recording.directory),
        }
        .context("creating record sink")?;
        info!(path = %recorder.path().display(), "Recording to");
        Some(recorder)
    };

    let layout = ChannelLayout {
        flow_channel: config.acquisition.flow_channel,
        temp_channel: config.acquisition.temp_channel,
        flow_scale: config.acquisition.flow_scale,
    };
    let pipeline = InstrumentPipeline::new(profile.clone(), layout, config.buffer_capacity());

    let aggregator = FlowAggregator::new(
        AggregatorSettings {
            min_valid: config.display.min_valid,
            max_cv: config.display.max_cv,
            trim_fraction: config.display.trim_fraction,
            idle_timeout_s: config.display.idle_timeout_s,
        },
        profile.estimator,
    );

    let snapshot = Arc::new(RwLock::new(None));
    let cancel_token = CancellationToken::new();

    // Ctrl-C -> orderly shutdown of both loops.
    {
        let cancel_token = cancel_token.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Ctrl-C received, shutting down");
                cancel_token.cancel();
            }
        });
    }

    let display = DisplayLoop::new(
        aggregator,
        Arc::clone(&snapshot),
        config.display.tick_ms,
        cancel_token.clone(),
    );
    let display_task = tokio::spawn(display.run());

    let processing = ProcessingLoop::new(pipeline, snapshot, recorder, cancel_token.clone());

    let stats = if args.stdin {
        let mut source = StdinSource::new();
        processing.run(&mut source).await
    } else if let Some(path) = &args.csv {
        let batches = acquisition::load_raw_csv(path, config.acquisition.block_len)
            .with_context(|| format!("loading raw CSV from {path}"))?;
        let mut source = ReplaySource::new(batches, 0);
        processing.run(&mut source).await
    } else {
        let synth_cfg = SynthConfig {
            raw_rate_hz: config.acquisition.raw_rate_hz,
            block_len: config.acquisition.block_len,
            run_s: args.seconds as f64,
            cal_hz_per_unit: profile.flow_cal_hz_per_unit,
            ..SynthConfig::default()
        };
        let mut source = SimulatedSource::new(PumpSignalSynth::new(synth_cfg), args.pace);
        info!(seconds = args.seconds, "Running built-in synthetic scenario");
        processing.run(&mut source).await
    };

    // Stop the display tick once the source is drained.
    cancel_token.cancel();
    let _ = display_task.await;

    info!(
        batches = stats.batches_processed,
        records = stats.records_emitted,
        "Run complete"
    );
    Ok(())
}
