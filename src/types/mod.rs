//! Shared data structures for the flow-measurement pipeline
//!
//! This module defines the core types flowing between pipeline stages:
//! - SampleBlock (raw driver blocks, acquisition boundary)
//! - DecimatedSample (low-rate analysis stream)
//! - FlowCandidate (per-frame / per-sample flow estimates)
//! - FlowRecord (persisted tabular output)
//! - DisplayState (aggregator output for the front panel)

mod profile;

pub use profile::*;

use serde::{Deserialize, Serialize};

/// Logical channel index as wired on the acquisition front end.
pub type ChannelId = u8;

/// Synthetic time step between decimated samples (seconds).
///
/// Both front-end revisions land at 10 Hz after decimation
/// (10 kHz / 10^3 and 100 Hz / 10), so the analysis stream always
/// advances in 0.1 s ticks.
pub const DECIMATED_PERIOD_S: f64 = 0.1;

// ============================================================================
// Acquisition boundary
// ============================================================================

/// One fixed-size block of raw voltages for a single channel.
///
/// Produced by the acquisition collaborator at the driver cadence and
/// immutable from then on. `seq` is the driver's arrival counter; gaps
/// indicate dropped blocks (a known, non-fatal discontinuity).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SampleBlock {
    pub channel: ChannelId,
    pub seq: u64,
    pub samples: Vec<f64>,
}

impl SampleBlock {
    pub fn new(channel: ChannelId, seq: u64, samples: Vec<f64>) -> Self {
        Self {
            channel,
            seq,
            samples,
        }
    }
}

// ============================================================================
// Analysis stream
// ============================================================================

/// One sample of the decimated analysis stream.
///
/// `tick` counts decimated samples since acquisition start; wall-clock
/// alignment is synthetic (`tick * DECIMATED_PERIOD_S`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DecimatedSample {
    pub tick: u64,
    pub value: f64,
}

impl DecimatedSample {
    /// Synthetic timestamp in seconds since acquisition start.
    pub fn time_s(&self) -> f64 {
        self.tick as f64 * DECIMATED_PERIOD_S
    }
}

/// Flow-rate estimate emitted by a strategy.
///
/// "No usable peak" and "outside the calibrated range" are expected,
/// frequent outcomes and flow through the pipeline as values, never as
/// errors.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum FlowCandidate {
    /// Instantaneous flow-rate estimate in device flow units.
    Flow(f64),
    /// No cyclic signature found in the current frame.
    Indeterminate,
    /// Voltage delta outside the device's linear calibration range.
    OutOfRange,
}

impl FlowCandidate {
    /// Numeric value for consensus computation, if this candidate has one.
    pub fn value(&self) -> Option<f64> {
        match self {
            FlowCandidate::Flow(v) => Some(*v),
            FlowCandidate::OutOfRange => Some(0.0),
            FlowCandidate::Indeterminate => None,
        }
    }

    pub fn is_indeterminate(&self) -> bool {
        matches!(self, FlowCandidate::Indeterminate)
    }
}

// ============================================================================
// Persisted record
// ============================================================================

/// Flat tabular record emitted once per decimated sample.
///
/// Handed to the recorder collaborator for storage; the pipeline itself
/// performs no file I/O. `temperature_c` is `None` when the thermistor
/// conversion is undefined for the sampled voltage (the raw voltage is
/// still retained).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowRecord {
    /// Wall-clock timestamp (epoch milliseconds).
    pub timestamp_ms: i64,
    /// Synthetic sequence time (seconds, 0.1 s steps).
    pub time_s: f64,
    /// Decimated flow-sensor voltage (mV).
    pub flow_voltage: f64,
    /// Decimated thermistor voltage (V).
    pub temp_voltage: f64,
    /// Derived temperature (°C), if the conversion was defined.
    pub temperature_c: Option<f64>,
}

// ============================================================================
// Display output
// ============================================================================

/// Aggregator output for the front-panel display, refreshed on the
/// 500 ms tick.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum DisplayState {
    /// No flow for longer than the idle timeout; panel shows zero.
    Idle,
    /// Estimate not yet stable; panel blinks a placeholder.
    Calculating { blink_on: bool },
    /// Stable consensus value in device flow units.
    Steady { flow: f64 },
}

impl DisplayState {
    /// Panel rendering: an integer flow rate or a placeholder token.
    pub fn render(&self) -> String {
        match self {
            DisplayState::Idle => "0".to_string(),
            DisplayState::Calculating { blink_on: true } => "---".to_string(),
            DisplayState::Calculating { blink_on: false } => String::new(),
            DisplayState::Steady { flow } => format!("{}", flow.round() as i64),
        }
    }

    pub fn is_steady(&self) -> bool {
        matches!(self, DisplayState::Steady { .. })
    }
}

impl std::fmt::Display for DisplayState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DisplayState::Idle => write!(f, "Idle"),
            DisplayState::Calculating { .. } => write!(f, "Calculating"),
            DisplayState::Steady { .. } => write!(f, "Steady"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decimated_time_advances_in_fixed_steps() {
        let a = DecimatedSample { tick: 0, value: 0.0 };
        let b = DecimatedSample { tick: 1, value: 0.0 };
        let c = DecimatedSample { tick: 42, value: 0.0 };
        assert!((b.time_s() - a.time_s() - DECIMATED_PERIOD_S).abs() < 1e-12);
        assert!((c.time_s() - 4.2).abs() < 1e-12);
    }

    #[test]
    fn display_render_tokens() {
        assert_eq!(DisplayState::Idle.render(), "0");
        assert_eq!(DisplayState::Calculating { blink_on: true }.render(), "---");
        assert_eq!(DisplayState::Calculating { blink_on: false }.render(), "");
        assert_eq!(DisplayState::Steady { flow: 247.4 }.render(), "247");
    }

    #[test]
    fn out_of_range_counts_as_zero_flow() {
        assert_eq!(FlowCandidate::OutOfRange.value(), Some(0.0));
        assert_eq!(FlowCandidate::Indeterminate.value(), None);
    }
}
