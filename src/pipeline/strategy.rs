//! Flow-estimation strategies
//!
//! Different delivery devices expose different physics, so flow
//! estimation is polymorphic: the profile selects a strategy once at
//! acquisition start and the pipeline invokes it through one interface
//! from then on.
//!
//! - [`SpectralPeakEstimator`] reads the ripple frequency out of the
//!   spectral frame (rotary pumps).
//! - [`VoltageDropEstimator`] reads the steady offset against the base
//!   voltage captured by the edge detector (linear drives).

use crate::dsp::{find_peaks, SpectralFrame};
use crate::physics::{self, VoltageDropFlow};
use crate::types::{EstimatorKind, FlowCandidate, PumpProfile, VoltageDropSettings};

use super::edge::TrendEdgeDetector;

/// Everything a strategy may consult for one decimated sample.
pub struct EstimatorContext<'a> {
    /// Spectral frame, present when the rolling buffer holds >= N1
    /// samples (recomputed for this very sample).
    pub frame: Option<&'a SpectralFrame>,
    /// Decimated history, oldest first.
    pub history: &'a [f64],
    /// Edge detector state after this sample.
    pub edge: &'a TrendEdgeDetector,
}

/// Strategy interface: one candidate per decimated sample, or `None`
/// while the strategy has nothing to say yet (e.g. spectrum not
/// filled).
pub trait FlowEstimator: Send {
    fn on_sample(&mut self, ctx: &EstimatorContext<'_>) -> Option<FlowCandidate>;
    fn name(&self) -> &'static str;
}

/// Select the strategy for a profile. Called once at acquisition start.
pub fn build_estimator(profile: &PumpProfile) -> Box<dyn FlowEstimator> {
    match profile.estimator {
        EstimatorKind::SpectralPeak => Box::new(SpectralPeakEstimator::new(profile)),
        EstimatorKind::VoltageDrop => Box::new(VoltageDropEstimator::new(profile)),
    }
}

// ============================================================================
// Spectral peak strategy
// ============================================================================

/// Peak-picking on the retained sub-band of the spectral frame.
pub struct SpectralPeakEstimator {
    dc_guard_bins: usize,
    min_prominence: f64,
    cal_hz_per_unit: f64,
}

impl SpectralPeakEstimator {
    pub fn new(profile: &PumpProfile) -> Self {
        Self {
            dc_guard_bins: profile.spectral.dc_guard_bins,
            min_prominence: profile.spectral.min_prominence,
            cal_hz_per_unit: profile.flow_cal_hz_per_unit,
        }
    }
}

impl FlowEstimator for SpectralPeakEstimator {
    fn on_sample(&mut self, ctx: &EstimatorContext<'_>) -> Option<FlowCandidate> {
        let frame = ctx.frame?;

        // Peaks below the guard are residual low-frequency leakage,
        // not a cyclic flow signature.
        let winner = find_peaks(&frame.magnitudes, self.min_prominence)
            .into_iter()
            .filter(|p| p.index >= self.dc_guard_bins)
            .max_by(|a, b| {
                a.height
                    .partial_cmp(&b.height)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });

        Some(match winner {
            Some(peak) => FlowCandidate::Flow(physics::spectral_flow(
                frame.frequency_hz(peak.index),
                self.cal_hz_per_unit,
            )),
            None => FlowCandidate::Indeterminate,
        })
    }

    fn name(&self) -> &'static str {
        "spectral-peak"
    }
}

// ============================================================================
// Voltage-drop strategy
// ============================================================================

/// Steady-state offset against the edge detector's base voltage.
pub struct VoltageDropEstimator {
    settings: VoltageDropSettings,
}

impl VoltageDropEstimator {
    pub fn new(profile: &PumpProfile) -> Self {
        Self {
            settings: profile.voltage_drop,
        }
    }
}

impl FlowEstimator for VoltageDropEstimator {
    fn on_sample(&mut self, ctx: &EstimatorContext<'_>) -> Option<FlowCandidate> {
        let Some(base) = ctx.edge.base_voltage() else {
            // No flow in progress (or no usable base): nothing to measure.
            return Some(FlowCandidate::Indeterminate);
        };

        let window = self.settings.recent_window.min(ctx.history.len());
        if window == 0 {
            return Some(FlowCandidate::Indeterminate);
        }
        let recent = &ctx.history[ctx.history.len() - window..];
        let recent_avg = recent.iter().sum::<f64>() / recent.len() as f64;

        Some(match physics::voltage_drop_flow(recent_avg, base, &self.settings) {
            VoltageDropFlow::Flow(f) => FlowCandidate::Flow(f),
            VoltageDropFlow::OutOfRange => FlowCandidate::OutOfRange,
        })
    }

    fn name(&self) -> &'static str {
        "voltage-drop"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SpectralSettings;

    fn spectral_profile() -> PumpProfile {
        PumpProfile {
            spectral: SpectralSettings {
                dc_guard_bins: 30,
                min_prominence: 0.03,
                ..SpectralSettings::default()
            },
            flow_cal_hz_per_unit: 5.8e-4,
            ..PumpProfile::rotary_peristaltic()
        }
    }

    fn frame_with_peaks(peaks: &[(usize, f64)]) -> SpectralFrame {
        let mut magnitudes = vec![0.0; 512];
        for &(i, h) in peaks {
            magnitudes[i] = h;
        }
        SpectralFrame {
            bin_hz: 1.0 / 409.6,
            magnitudes,
        }
    }

    fn ctx_with_frame<'a>(
        frame: &'a SpectralFrame,
        edge: &'a TrendEdgeDetector,
    ) -> EstimatorContext<'a> {
        EstimatorContext {
            frame: Some(frame),
            history: &[],
            edge,
        }
    }

    #[test]
    fn highest_peak_past_the_guard_wins() {
        let profile = spectral_profile();
        let mut estimator = SpectralPeakEstimator::new(&profile);
        let edge = TrendEdgeDetector::new(&profile);

        // Strong leakage below the guard, genuine signature above it.
        let frame = frame_with_peaks(&[(10, 2.0), (120, 0.6), (300, 0.4)]);
        let candidate = estimator
            .on_sample(&ctx_with_frame(&frame, &edge))
            .expect("frame present");

        let expected = physics::spectral_flow(120.0 / 409.6, profile.flow_cal_hz_per_unit);
        match candidate {
            FlowCandidate::Flow(f) => assert!((f - expected).abs() < 1e-9, "flow {f}"),
            other => panic!("expected flow, got {other:?}"),
        }
    }

    #[test]
    fn no_qualifying_peak_is_indeterminate() {
        let profile = spectral_profile();
        let mut estimator = SpectralPeakEstimator::new(&profile);
        let edge = TrendEdgeDetector::new(&profile);

        // Only sub-guard and sub-prominence content.
        let frame = frame_with_peaks(&[(5, 1.0), (200, 0.01)]);
        let candidate = estimator
            .on_sample(&ctx_with_frame(&frame, &edge))
            .expect("frame present");
        assert_eq!(candidate, FlowCandidate::Indeterminate);
    }

    #[test]
    fn spectral_strategy_is_silent_without_a_frame() {
        let profile = spectral_profile();
        let mut estimator = SpectralPeakEstimator::new(&profile);
        let edge = TrendEdgeDetector::new(&profile);
        let ctx = EstimatorContext {
            frame: None,
            history: &[],
            edge: &edge,
        };
        assert!(estimator.on_sample(&ctx).is_none());
    }

    #[test]
    fn voltage_drop_without_base_is_indeterminate() {
        let profile = PumpProfile::syringe_drive();
        let mut estimator = VoltageDropEstimator::new(&profile);
        let edge = TrendEdgeDetector::new(&profile);
        let history = vec![2500.0; 64];
        let ctx = EstimatorContext {
            frame: None,
            history: &history,
            edge: &edge,
        };
        assert_eq!(
            estimator.on_sample(&ctx),
            Some(FlowCandidate::Indeterminate)
        );
    }

    #[test]
    fn voltage_drop_with_base_follows_the_flow_law() {
        let mut profile = PumpProfile::syringe_drive();
        profile.block_len = 16;
        profile.base_window = 8;
        let mut estimator = VoltageDropEstimator::new(&profile);
        let mut edge = TrendEdgeDetector::new(&profile);

        // Drive the detector into FlowDetected with a captured base.
        let mut history = vec![2500.0; 40];
        for i in 0..profile.block_len {
            history.push(2500.0 - 5.0 * (i + 1) as f64);
            edge.update(&history, (40 + i) as u64);
        }
        let base = edge.base_voltage().expect("base captured");

        // Settle at a constant offset so the recent average is clean.
        let settled = 2380.0;
        for _ in 0..profile.voltage_drop.recent_window {
            history.push(settled);
        }
        let ctx = EstimatorContext {
            frame: None,
            history: &history,
            edge: &edge,
        };
        let candidate = estimator.on_sample(&ctx).expect("candidate emitted");

        let expected = ((base - settled).abs() + profile.voltage_drop.offset_mv)
            / profile.voltage_drop.scale_mv;
        match candidate {
            FlowCandidate::Flow(f) => {
                assert!((f - expected.exp()).abs() < 1e-9, "flow {f}");
            }
            other => panic!("expected flow, got {other:?}"),
        }
    }
}
