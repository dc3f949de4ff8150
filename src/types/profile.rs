//! Pump profiles: per-device calibration and estimator selection
//!
//! Different mechanical delivery devices expose different exploitable
//! dynamics. A rotary pump imprints a cyclic ripple on the sensor
//! voltage (spectral strategy); a linear drive only offsets the steady
//! voltage (voltage-drop strategy). The profile bundles everything the
//! pipeline needs to know about the device: block lengths, slope
//! thresholds, and bench-calibrated constants.
//!
//! All numeric values here are calibration parameters tied to a
//! hardware revision, not universal truths. Re-validate when the
//! sensor board or the pump head changes.

use serde::{Deserialize, Serialize};

/// Which flow-estimation strategy the profile activates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EstimatorKind {
    /// Peak-picking on the magnitude spectrum of the decimated stream.
    SpectralPeak,
    /// Steady-state voltage offset against a detected base voltage.
    VoltageDrop,
}

/// Spectral-estimator settings (spectral strategy only, but always
/// populated so the display spectrum works for any profile).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SpectralSettings {
    /// Analysis window length N1 (decimated samples).
    pub window_len: usize,
    /// Zero-padded FFT length N2.
    pub fft_len: usize,
    /// Retained low-frequency sub-band (bins of the half-spectrum).
    pub sub_band_bins: usize,
    /// Peaks below this bin index are residual DC leakage, not flow.
    pub dc_guard_bins: usize,
    /// Minimum peak prominence for a bin to count as a flow signature.
    pub min_prominence: f64,
}

impl Default for SpectralSettings {
    fn default() -> Self {
        Self {
            window_len: 1024,
            fft_len: 16 * 1024,
            // First eighth of the 8192-bin half-spectrum; flow-relevant
            // frequencies live entirely below this.
            sub_band_bins: 1024,
            dc_guard_bins: 30,
            min_prominence: 0.03,
        }
    }
}

/// Voltage-drop flow-law constants (voltage-drop strategy only).
///
/// `flow = exp((|recent_avg - base_voltage| + offset_mv) / scale_mv)`
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct VoltageDropSettings {
    /// Additive term A of the flow law (mV).
    pub offset_mv: f64,
    /// Divisor B of the flow law (mV).
    pub scale_mv: f64,
    /// Deltas beyond this are outside the linear calibration range (mV).
    pub max_delta_mv: f64,
    /// Samples averaged for the "recent" voltage.
    pub recent_window: usize,
}

impl Default for VoltageDropSettings {
    fn default() -> Self {
        Self {
            offset_mv: 12.5,
            scale_mv: 78.0,
            max_delta_mv: 600.0,
            recent_window: 20,
        }
    }
}

/// Immutable per-device configuration, chosen externally before
/// acquisition start and read-only to the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PumpProfile {
    /// Profile identifier (e.g. "rotary_peristaltic").
    pub name: String,
    /// Active flow-estimation strategy.
    pub estimator: EstimatorKind,
    /// Decimate-by-10 stages between the raw stream and the analysis
    /// stream (3 for the 10 kHz rev-B front end, 1 for 100 Hz rev-A).
    pub decimation_stages: usize,
    /// Regression window for the trend edge detector (decimated samples).
    pub block_len: usize,
    /// Slope below this (mV per decimated sample) starts flow detection.
    pub start_slope: f64,
    /// Slope above this (mV per decimated sample) stops flow detection.
    pub stop_slope: f64,
    /// Historical window averaged into the base voltage on detection.
    pub base_window: usize,
    /// Spectral calibration: ripple frequency (Hz) per device flow unit.
    pub flow_cal_hz_per_unit: f64,
    pub spectral: SpectralSettings,
    pub voltage_drop: VoltageDropSettings,
}

impl PumpProfile {
    /// Rotary peristaltic head: roller ripple carries the flow rate.
    pub fn rotary_peristaltic() -> Self {
        Self {
            name: "rotary_peristaltic".to_string(),
            estimator: EstimatorKind::SpectralPeak,
            decimation_stages: 3,
            block_len: 128,
            start_slope: -0.10,
            stop_slope: 0.05,
            base_window: 200,
            flow_cal_hz_per_unit: 5.8e-4,
            spectral: SpectralSettings::default(),
            voltage_drop: VoltageDropSettings::default(),
        }
    }

    /// Syringe-style linear drive: no cyclic signature, flow derived
    /// from the steady voltage offset.
    pub fn syringe_drive() -> Self {
        Self {
            name: "syringe_drive".to_string(),
            estimator: EstimatorKind::VoltageDrop,
            decimation_stages: 3,
            block_len: 256,
            start_slope: -0.05,
            stop_slope: 0.025,
            base_window: 200,
            flow_cal_hz_per_unit: 5.8e-4,
            spectral: SpectralSettings::default(),
            voltage_drop: VoltageDropSettings::default(),
        }
    }

    /// Look up a built-in profile by name.
    pub fn by_name(name: &str) -> Option<Self> {
        match name {
            "rotary_peristaltic" => Some(Self::rotary_peristaltic()),
            "syringe_drive" => Some(Self::syringe_drive()),
            _ => None,
        }
    }

    /// Total decimation factor from the raw stream to the analysis stream.
    pub fn decimation_factor(&self) -> usize {
        10usize.pow(self.decimation_stages as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_profiles_resolve_by_name() {
        let p = PumpProfile::by_name("rotary_peristaltic").expect("builtin profile");
        assert_eq!(p.estimator, EstimatorKind::SpectralPeak);
        assert_eq!(p.decimation_factor(), 1000);

        let s = PumpProfile::by_name("syringe_drive").expect("builtin profile");
        assert_eq!(s.estimator, EstimatorKind::VoltageDrop);
        assert!(PumpProfile::by_name("unknown").is_none());
    }

    #[test]
    fn hysteresis_thresholds_are_ordered() {
        for p in [
            PumpProfile::rotary_peristaltic(),
            PumpProfile::syringe_drive(),
        ] {
            assert!(p.start_slope < 0.0);
            assert!(p.stop_slope > 0.0);
            assert!(p.block_len >= 2);
        }
    }
}
