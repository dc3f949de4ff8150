//! Least-squares line fitting for trend detection
//!
//! Fits `y = slope * i + intercept` over an index-addressed window.
//! A failed fit is an expected outcome, not an error: callers skip the
//! cycle and keep their previous state.

/// Result of a successful line fit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineFit {
    /// Slope in value units per sample index.
    pub slope: f64,
    pub intercept: f64,
}

/// Least-squares fit over `values` against their indices.
///
/// Returns `None` for windows that are too short or numerically
/// degenerate (non-finite samples, collapsed denominator).
pub fn fit_line(values: &[f64]) -> Option<LineFit> {
    let n = values.len();
    if n < 2 {
        return None;
    }

    let n_f = n as f64;
    // Index mean and spread are closed-form for 0..n.
    let x_mean = (n_f - 1.0) / 2.0;
    let y_mean = values.iter().sum::<f64>() / n_f;

    let mut sxy = 0.0;
    let mut sxx = 0.0;
    for (i, &y) in values.iter().enumerate() {
        let dx = i as f64 - x_mean;
        sxy += dx * (y - y_mean);
        sxx += dx * dx;
    }

    if !sxy.is_finite() || !sxx.is_finite() || sxx <= f64::EPSILON {
        return None;
    }

    let slope = sxy / sxx;
    let intercept = y_mean - slope * x_mean;
    if !slope.is_finite() || !intercept.is_finite() {
        return None;
    }

    Some(LineFit { slope, intercept })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_line_is_recovered() {
        let values: Vec<f64> = (0..64).map(|i| 3.0 - 0.25 * i as f64).collect();
        let fit = fit_line(&values).expect("fit succeeds");
        assert!((fit.slope + 0.25).abs() < 1e-12);
        assert!((fit.intercept - 3.0).abs() < 1e-12);
    }

    #[test]
    fn flat_window_has_zero_slope() {
        let fit = fit_line(&[7.0; 128]).expect("fit succeeds");
        assert!(fit.slope.abs() < 1e-12);
    }

    #[test]
    fn degenerate_windows_do_not_fit() {
        assert!(fit_line(&[]).is_none());
        assert!(fit_line(&[1.0]).is_none());
        assert!(fit_line(&[1.0, f64::NAN, 2.0]).is_none());
        assert!(fit_line(&[f64::INFINITY, 0.0, 1.0]).is_none());
    }

    #[test]
    fn noise_does_not_flip_a_clear_trend() {
        // Deterministic +/- jitter on a descending ramp.
        let values: Vec<f64> = (0..128)
            .map(|i| 10.0 - 0.1 * i as f64 + if i % 2 == 0 { 0.03 } else { -0.03 })
            .collect();
        let fit = fit_line(&values).expect("fit succeeds");
        assert!(fit.slope < -0.09 && fit.slope > -0.11, "slope {}", fit.slope);
    }
}
