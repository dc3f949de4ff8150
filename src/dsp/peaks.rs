//! Local-maximum extraction with prominence
//!
//! Prominence measures how far a peak rises above the higher of the
//! two valleys separating it from larger neighbours, which is what
//! separates a genuine cyclic flow signature from ripple on the noise
//! floor. Matches the conventional definition: walk outward from the
//! peak on each side until a higher sample (or the edge), take the
//! minimum over each stretch, and subtract the higher of the two.

/// A qualifying local maximum.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Peak {
    pub index: usize,
    pub height: f64,
    pub prominence: f64,
}

/// Find local maxima whose prominence exceeds `min_prominence`.
///
/// Plateaus count once (first sample of the plateau). NaN samples
/// never qualify and never terminate a walk; they simply compare as
/// "not higher".
pub fn find_peaks(data: &[f64], min_prominence: f64) -> Vec<Peak> {
    let mut peaks = Vec::new();
    if data.len() < 3 {
        return peaks;
    }

    for i in 1..data.len() - 1 {
        let h = data[i];
        if !h.is_finite() || !(h > data[i - 1]) || !(h >= data[i + 1]) {
            continue;
        }

        let left_min = walk_min(data[..i].iter().rev(), h);
        let right_min = walk_min(data[i + 1..].iter(), h);
        let base = left_min.max(right_min);
        let prominence = h - base;

        if prominence > min_prominence {
            peaks.push(Peak {
                index: i,
                height: h,
                prominence,
            });
        }
    }

    peaks
}

/// Minimum over the stretch from the peak outward until a sample
/// exceeds the peak height (or the edge).
fn walk_min<'a>(samples: impl Iterator<Item = &'a f64>, peak_height: f64) -> f64 {
    let mut min = peak_height;
    for &v in samples {
        if v > peak_height {
            break;
        }
        if v < min {
            min = v;
        }
    }
    min
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prominence_is_measured_to_the_higher_valley() {
        let data = [0.0, 1.0, 3.0, 1.0, 0.0, 5.0, 0.0, 2.0, 0.0];
        let peaks = find_peaks(&data, 0.0);
        let by_index: Vec<(usize, f64)> =
            peaks.iter().map(|p| (p.index, p.prominence)).collect();
        assert_eq!(by_index, vec![(2, 3.0), (5, 5.0), (7, 2.0)]);
    }

    #[test]
    fn sub_threshold_peaks_are_dropped() {
        let data = [0.0, 0.02, 0.0, 0.5, 0.0];
        let peaks = find_peaks(&data, 0.03);
        assert_eq!(peaks.len(), 1);
        assert_eq!(peaks[0].index, 3);
    }

    #[test]
    fn monotone_data_has_no_peaks() {
        let data: Vec<f64> = (0..32).map(|i| i as f64).collect();
        assert!(find_peaks(&data, 0.0).is_empty());
    }

    #[test]
    fn shoulder_on_a_larger_peak_keeps_local_prominence() {
        // Small bump on the flank of a dominant peak: its prominence is
        // only the dip separating it from the big one.
        let data = [0.0, 10.0, 4.0, 4.5, 0.0];
        let peaks = find_peaks(&data, 0.0);
        assert_eq!(peaks.len(), 2);
        let small = peaks.iter().find(|p| p.index == 3).expect("shoulder peak");
        assert!((small.prominence - 0.5).abs() < 1e-12);
    }

    #[test]
    fn nan_samples_never_qualify() {
        let data = [0.0, f64::NAN, 0.0, 1.0, 0.0];
        let peaks = find_peaks(&data, 0.0);
        assert_eq!(peaks.len(), 1);
        assert_eq!(peaks[0].index, 3);
    }
}
