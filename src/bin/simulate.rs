//! Synthetic pump-signal simulator
//!
//! Generates raw-rate voltage block batches for a scripted delivery
//! cycle and prints them as JSON lines, one driver batch per line.
//!
//! # Usage
//! ```bash
//! ./simulate --seconds 120 --flow-units 300 | ./flowsight --stdin
//! ```

use clap::Parser;
use std::io::{self, Write};

use flowsight::acquisition::{PumpSignalSynth, SynthConfig};

#[derive(Parser, Debug)]
#[command(name = "simulate")]
#[command(about = "Synthetic pump signal generator for Flowsight")]
#[command(version)]
struct Args {
    /// Steady running-flow duration in seconds.
    #[arg(long, default_value = "120")]
    seconds: u64,

    /// Simulated flow rate in device flow units.
    #[arg(long, default_value = "300.0")]
    flow_units: f64,

    /// Driver sample clock in Hz.
    #[arg(long, default_value = "10000.0")]
    raw_rate: f64,

    /// Samples per driver block and channel.
    #[arg(long, default_value = "1000")]
    block_len: usize,

    /// Gaussian sensor-noise sigma in volts.
    #[arg(long, default_value = "0.002")]
    noise: f64,

    /// Random seed for reproducibility.
    #[arg(long, default_value = "7")]
    seed: u64,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let cfg = SynthConfig {
        raw_rate_hz: args.raw_rate,
        block_len: args.block_len,
        run_s: args.seconds as f64,
        flow_units: args.flow_units,
        noise_volts: args.noise,
        seed: args.seed,
        ..SynthConfig::default()
    };

    eprintln!(
        "simulate: {:.0} s scenario at {} Hz, flow {} units",
        cfg.duration_s(),
        cfg.raw_rate_hz,
        cfg.flow_units
    );

    let mut synth = PumpSignalSynth::new(cfg);
    let stdout = io::stdout();
    let mut out = io::BufWriter::new(stdout.lock());

    while let Some(batch) = synth.next_batch() {
        serde_json::to_writer(&mut out, &batch)?;
        out.write_all(b"\n")?;
    }
    out.flush()?;
    Ok(())
}
