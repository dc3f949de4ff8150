//! Flow aggregator / display smoother
//!
//! Runs on the fixed 500 ms wall-clock tick, decoupled from the
//! sample-arrival cadence, and turns the stream of per-sample flow
//! candidates into a debounced front-panel value. The instantaneous
//! estimates jitter (peak picking rides the noise floor, edges are
//! non-stationary); the panel must not.
//!
//! Stability gate: coefficient of variation over the estimate window.
//! Consensus: trimmed mean of the sorted window, which strips outliers
//! and non-stationary edges from the moving population. The only state
//! carried between ticks is the blink-phase flag.

use statrs::statistics::Statistics;
use std::collections::VecDeque;

use crate::types::{DisplayState, EstimatorKind, FlowCandidate, DECIMATED_PERIOD_S};

use super::state::DisplaySnapshot;
use crate::pipeline::edge::EdgeState;

// ============================================================================
// Estimate window
// ============================================================================

/// Bounded ring buffer of recent flow candidates, oldest evicted first.
#[derive(Debug, Clone)]
pub struct FlowEstimateWindow {
    buf: VecDeque<FlowCandidate>,
    capacity: usize,
}

impl FlowEstimateWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, candidate: FlowCandidate) {
        if self.buf.len() == self.capacity {
            self.buf.pop_front();
        }
        self.buf.push_back(candidate);
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }

    /// Window contents, oldest first (snapshot copy for the display tick).
    pub fn contents(&self) -> Vec<FlowCandidate> {
        self.buf.iter().copied().collect()
    }
}

// ============================================================================
// Aggregator
// ============================================================================

/// Tunables for the display smoother.
#[derive(Debug, Clone, Copy)]
pub struct AggregatorSettings {
    /// Minimum valid candidates before a consensus is attempted.
    pub min_valid: usize,
    /// Coefficient-of-variation ceiling for a "Steady" verdict.
    pub max_cv: f64,
    /// Fraction trimmed from each end of the sorted window.
    pub trim_fraction: f64,
    /// Seconds without flow (since the last stop) before the panel
    /// falls back to idle/zero.
    pub idle_timeout_s: f64,
}

impl Default for AggregatorSettings {
    fn default() -> Self {
        Self {
            min_valid: 20,
            max_cv: 0.5,
            trim_fraction: 0.15,
            idle_timeout_s: 10.0,
        }
    }
}

/// Display smoother; one per instrument.
pub struct FlowAggregator {
    settings: AggregatorSettings,
    estimator_kind: EstimatorKind,
    blink_on: bool,
}

impl FlowAggregator {
    pub fn new(settings: AggregatorSettings, estimator_kind: EstimatorKind) -> Self {
        Self {
            settings,
            estimator_kind,
            blink_on: false,
        }
    }

    /// Evaluate one display tick against the latest published snapshot.
    pub fn tick(&mut self, snapshot: &DisplaySnapshot) -> DisplayState {
        match self.estimator_kind {
            EstimatorKind::VoltageDrop => self.tick_voltage_drop(snapshot),
            EstimatorKind::SpectralPeak => self.tick_spectral(snapshot),
        }
    }

    /// Voltage-drop devices bypass consensus: the latest reading goes
    /// straight to the panel each tick.
    fn tick_voltage_drop(&mut self, snapshot: &DisplaySnapshot) -> DisplayState {
        if !matches!(snapshot.edge_state, EdgeState::FlowDetected { .. }) {
            return DisplayState::Idle;
        }
        match snapshot.latest_candidate {
            Some(FlowCandidate::Flow(f)) => DisplayState::Steady { flow: f },
            Some(FlowCandidate::OutOfRange) => DisplayState::Steady { flow: 0.0 },
            _ => {
                self.blink_on = !self.blink_on;
                DisplayState::Calculating {
                    blink_on: self.blink_on,
                }
            }
        }
    }

    fn tick_spectral(&mut self, snapshot: &DisplaySnapshot) -> DisplayState {
        // Idle timeout overrides everything, blink included: no flow
        // since the last stop (or since start) for long enough means
        // the pump is off and the panel shows zero.
        if !matches!(snapshot.edge_state, EdgeState::FlowDetected { .. }) {
            let reference = snapshot.last_stop_tick.unwrap_or(0);
            let elapsed_s =
                snapshot.latest_tick.saturating_sub(reference) as f64 * DECIMATED_PERIOD_S;
            if elapsed_s > self.settings.idle_timeout_s {
                return DisplayState::Idle;
            }
        }

        let window = &snapshot.window;
        let has_sentinel = window.iter().any(FlowCandidate::is_indeterminate);
        let values: Vec<f64> = window.iter().filter_map(FlowCandidate::value).collect();

        if values.len() < self.settings.min_valid || has_sentinel || !self.is_stable(&values) {
            self.blink_on = !self.blink_on;
            return DisplayState::Calculating {
                blink_on: self.blink_on,
            };
        }

        DisplayState::Steady {
            flow: trimmed_mean(&values, self.settings.trim_fraction),
        }
    }

    /// Coefficient of variation (population std / mean) under the
    /// stability ceiling.
    fn is_stable(&self, values: &[f64]) -> bool {
        let mean = values.iter().mean();
        if !mean.is_finite() || mean <= 0.0 {
            return false;
        }
        let std_dev = values.iter().population_std_dev();
        std_dev / mean <= self.settings.max_cv
    }
}

/// Mean of the sorted values with `fraction` trimmed from each end.
fn trimmed_mean(values: &[f64], fraction: f64) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let trim = (sorted.len() as f64 * fraction).floor() as usize;
    let kept = &sorted[trim..sorted.len() - trim];
    if kept.is_empty() {
        return sorted.iter().mean();
    }
    kept.iter().mean()
}
