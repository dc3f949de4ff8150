//! Trend edge detector
//!
//! Watches the regression slope of the newest `block_len` decimated
//! samples and drives the per-channel flow state machine. A flow start
//! pulls the sensor voltage down (negative slope); a stop lets it
//! recover (positive slope). Two distinct thresholds give hysteresis
//! so the state never flickers around a single crossing point.
//!
//! A failed or ill-conditioned fit skips the cycle and retains the
//! previous state; the detector can never fail the pipeline.

use crate::dsp::trend::fit_line;
use crate::types::{EstimatorKind, PumpProfile};

/// Per-channel flow detection state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EdgeState {
    /// No flow observed since acquisition start.
    Idle,
    /// Flow in progress. For voltage-drop profiles the base voltage is
    /// the pre-transition reference the flow law measures against.
    FlowDetected { base_voltage: Option<f64> },
    /// Flow previously detected and since stopped.
    FlowStopped,
}

impl std::fmt::Display for EdgeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EdgeState::Idle => write!(f, "Idle"),
            EdgeState::FlowDetected { .. } => write!(f, "FlowDetected"),
            EdgeState::FlowStopped => write!(f, "FlowStopped"),
        }
    }
}

/// State-machine transition reported to the caller for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeTransition {
    FlowDetected,
    FlowStopped,
}

/// Slope-driven hysteresis state machine, one per channel.
#[derive(Debug, Clone)]
pub struct TrendEdgeDetector {
    block_len: usize,
    start_slope: f64,
    stop_slope: f64,
    base_window: usize,
    wants_base: bool,
    state: EdgeState,
    last_stop_tick: Option<u64>,
}

impl TrendEdgeDetector {
    pub fn new(profile: &PumpProfile) -> Self {
        Self {
            block_len: profile.block_len,
            start_slope: profile.start_slope,
            stop_slope: profile.stop_slope,
            base_window: profile.base_window,
            wants_base: profile.estimator == EstimatorKind::VoltageDrop,
            state: EdgeState::Idle,
            last_stop_tick: None,
        }
    }

    pub fn reset(&mut self) {
        self.state = EdgeState::Idle;
        self.last_stop_tick = None;
    }

    pub fn state(&self) -> EdgeState {
        self.state
    }

    /// Base voltage captured on the last start transition, if any.
    pub fn base_voltage(&self) -> Option<f64> {
        match self.state {
            EdgeState::FlowDetected { base_voltage } => base_voltage,
            _ => None,
        }
    }

    /// Tick of the most recent stop transition.
    pub fn last_stop_tick(&self) -> Option<u64> {
        self.last_stop_tick
    }

    /// Evaluate the newest decimated sample (already appended to
    /// `history`, oldest first). At most one transition per call.
    pub fn update(&mut self, history: &[f64], tick: u64) -> Option<EdgeTransition> {
        if history.len() < self.block_len {
            return None;
        }
        let block = &history[history.len() - self.block_len..];
        let Some(fit) = fit_line(block) else {
            // Ill-conditioned fit: skip this cycle, keep the state.
            return None;
        };

        match self.state {
            EdgeState::Idle | EdgeState::FlowStopped => {
                if fit.slope < self.start_slope {
                    let base_voltage = if self.wants_base {
                        self.snapshot_base(history)
                    } else {
                        None
                    };
                    self.state = EdgeState::FlowDetected { base_voltage };
                    return Some(EdgeTransition::FlowDetected);
                }
            }
            EdgeState::FlowDetected { .. } => {
                if fit.slope > self.stop_slope {
                    self.state = EdgeState::FlowStopped;
                    self.last_stop_tick = Some(tick);
                    return Some(EdgeTransition::FlowStopped);
                }
            }
        }
        None
    }

    /// Mean of the historical window preceding the detection block —
    /// the steady level before the voltage started dropping.
    fn snapshot_base(&self, history: &[f64]) -> Option<f64> {
        let preceding = &history[..history.len() - self.block_len];
        if preceding.is_empty() {
            return None;
        }
        let start = preceding.len().saturating_sub(self.base_window);
        let window = &preceding[start..];
        Some(window.iter().sum::<f64>() / window.len() as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_profile(estimator: EstimatorKind) -> PumpProfile {
        PumpProfile {
            block_len: 32,
            start_slope: -0.10,
            stop_slope: 0.05,
            base_window: 16,
            estimator,
            ..PumpProfile::rotary_peristaltic()
        }
    }

    /// Feed samples one at a time, returning the tick of the first
    /// transition, if any.
    fn first_transition(
        detector: &mut TrendEdgeDetector,
        samples: &[f64],
    ) -> Option<(u64, EdgeTransition)> {
        let mut history = Vec::new();
        for (i, &v) in samples.iter().enumerate() {
            history.push(v);
            if let Some(t) = detector.update(&history, i as u64) {
                return Some((i as u64, t));
            }
        }
        None
    }

    #[test]
    fn ramp_triggers_at_or_after_block_boundary() {
        let profile = test_profile(EstimatorKind::SpectralPeak);
        let mut detector = TrendEdgeDetector::new(&profile);

        // 200 flat samples, then a descending ramp steeper than the
        // start threshold.
        let flat_len = 200usize;
        let mut samples = vec![5.0; flat_len];
        for i in 0..100 {
            samples.push(5.0 - 0.3 * (i + 1) as f64);
        }

        let (tick, transition) =
            first_transition(&mut detector, &samples).expect("ramp must be detected");
        assert_eq!(transition, EdgeTransition::FlowDetected);
        // Never before the ramp starts; at latest one full block into it.
        assert!(tick >= flat_len as u64, "fired during flat segment at {tick}");
        assert!(
            tick < (flat_len + profile.block_len) as u64,
            "fired too late at {tick}"
        );
    }

    #[test]
    fn hysteresis_prevents_oscillation() {
        let profile = test_profile(EstimatorKind::SpectralPeak);
        let mut detector = TrendEdgeDetector::new(&profile);

        let mut history: Vec<f64> = (0..64).map(|i| 10.0 - 0.3 * i as f64).collect();
        detector.update(&history, 63);
        assert!(matches!(detector.state(), EdgeState::FlowDetected { .. }));

        // A mild recovery below the stop threshold must not stop flow.
        for i in 0..64u64 {
            history.push(history[history.len() - 1] + 0.02);
            assert_eq!(detector.update(&history, 64 + i), None);
        }
        assert!(matches!(detector.state(), EdgeState::FlowDetected { .. }));

        // A strong recovery above the stop threshold does.
        let mut transition = None;
        for i in 0..64u64 {
            history.push(history[history.len() - 1] + 0.3);
            if let Some(t) = detector.update(&history, 128 + i) {
                transition = Some(t);
                break;
            }
        }
        assert_eq!(transition, Some(EdgeTransition::FlowStopped));
        assert!(detector.last_stop_tick().is_some());
    }

    #[test]
    fn failed_fit_retains_state() {
        let profile = test_profile(EstimatorKind::SpectralPeak);
        let mut detector = TrendEdgeDetector::new(&profile);

        let mut history: Vec<f64> = (0..64).map(|i| 10.0 - 0.3 * i as f64).collect();
        detector.update(&history, 63);
        let before = detector.state();
        assert!(matches!(before, EdgeState::FlowDetected { .. }));

        history.push(f64::NAN);
        assert_eq!(detector.update(&history, 64), None);
        assert_eq!(detector.state(), before);
    }

    #[test]
    fn voltage_drop_profile_captures_base_voltage() {
        let profile = test_profile(EstimatorKind::VoltageDrop);
        let mut detector = TrendEdgeDetector::new(&profile);

        // Steady level 8.0, then a sharp drop filling one block.
        let mut history = vec![8.0; 100];
        for i in 0..profile.block_len {
            history.push(8.0 - 0.5 * (i + 1) as f64);
            detector.update(&history, (100 + i) as u64);
        }
        let base = detector.base_voltage().expect("base captured on start");
        // The 16 samples preceding the detection block all sit near the
        // steady level.
        assert!((base - 8.0).abs() < 0.5, "base {base}");
    }

    #[test]
    fn spectral_profile_keeps_no_base() {
        let profile = test_profile(EstimatorKind::SpectralPeak);
        let mut detector = TrendEdgeDetector::new(&profile);
        let history: Vec<f64> = (0..64).map(|i| 10.0 - 0.3 * i as f64).collect();
        detector.update(&history, 63);
        assert!(matches!(
            detector.state(),
            EdgeState::FlowDetected { base_voltage: None }
        ));
    }
}
