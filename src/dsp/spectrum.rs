//! Windowed spectral estimation
//!
//! Magnitude spectrum of the most recent N1 decimated samples:
//! mean-removed, Hann-tapered, zero-padded to N2 and transformed with
//! a pre-planned FFT. Recomputed on every new decimated sample so the
//! display and the peak picker track the live signal sample-by-sample.
//!
//! Only the low-frequency sub-band is retained; flow-relevant ripple
//! frequencies occupy it exclusively and the rest of the half-spectrum
//! is never inspected.

use ndarray::Array1;
use num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use std::sync::Arc;
use thiserror::Error;

use crate::types::{SpectralSettings, DECIMATED_PERIOD_S};

#[derive(Debug, Error)]
pub enum SpectrumError {
    #[error("insufficient data: needed {needed}, available {available}")]
    InsufficientData { needed: usize, available: usize },
}

/// Magnitude spectrum over the retained low-frequency sub-band.
#[derive(Debug, Clone)]
pub struct SpectralFrame {
    /// Frequency resolution (Hz per bin) = 1 / (N2 * 0.1 s).
    pub bin_hz: f64,
    /// Magnitudes of bins `0..sub_band_bins`, scaled by 2/N1.
    pub magnitudes: Vec<f64>,
}

impl SpectralFrame {
    /// Physical frequency of a bin index.
    pub fn frequency_hz(&self, bin: usize) -> f64 {
        bin as f64 * self.bin_hz
    }
}

/// Pre-planned estimator, built once per acquisition run.
pub struct SpectralEstimator {
    fft: Arc<dyn Fft<f64>>,
    window_len: usize,
    fft_len: usize,
    sub_band_bins: usize,
    taper: Vec<f64>,
}

impl SpectralEstimator {
    pub fn new(settings: &SpectralSettings) -> Self {
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(settings.fft_len);
        Self {
            fft,
            window_len: settings.window_len,
            fft_len: settings.fft_len,
            sub_band_bins: settings.sub_band_bins.min(settings.fft_len / 2),
            taper: hann(settings.window_len),
        }
    }

    /// Analysis window length N1.
    pub fn window_len(&self) -> usize {
        self.window_len
    }

    /// Compute the spectral frame for the newest `window_len` samples
    /// of `recent` (older samples first).
    pub fn compute(&self, recent: &[f64]) -> Result<SpectralFrame, SpectrumError> {
        if recent.len() < self.window_len {
            return Err(SpectrumError::InsufficientData {
                needed: self.window_len,
                available: recent.len(),
            });
        }
        let newest = &recent[recent.len() - self.window_len..];

        let mean = newest.iter().sum::<f64>() / self.window_len as f64;
        let centered: Array1<f64> = newest.iter().map(|&v| v - mean).collect();

        let mut buffer: Vec<Complex<f64>> = vec![Complex::new(0.0, 0.0); self.fft_len];
        for (i, (&v, &w)) in centered.iter().zip(self.taper.iter()).enumerate() {
            buffer[i] = Complex::new(v * w, 0.0);
        }

        self.fft.process(&mut buffer);

        let scale = 2.0 / self.window_len as f64;
        let magnitudes: Vec<f64> = buffer
            .iter()
            .take(self.sub_band_bins)
            .map(|c| c.norm() * scale)
            .collect();

        Ok(SpectralFrame {
            bin_hz: 1.0 / (self.fft_len as f64 * DECIMATED_PERIOD_S),
            magnitudes,
        })
    }
}

/// Symmetric Hann taper.
fn hann(len: usize) -> Vec<f64> {
    if len <= 1 {
        return vec![1.0; len];
    }
    let denom = (len - 1) as f64;
    (0..len)
        .map(|n| 0.5 - 0.5 * (2.0 * std::f64::consts::PI * n as f64 / denom).cos())
        .collect()
}
