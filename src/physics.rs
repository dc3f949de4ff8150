//! Engineering-unit conversions
//!
//! Voltage-to-physical-unit formulas for the sensor board: thermistor
//! temperature, the voltage-drop flow law, and the spectral flow
//! calibration. Conversion failures are local: an undefined result
//! maps to `None` (or an out-of-range flag) and the raw sample is
//! retained upstream.

use crate::types::VoltageDropSettings;

// ============================================================================
// Thermistor (temperature channel)
// ============================================================================

/// Thermistor beta constant (K).
const THERMISTOR_BETA: f64 = 3760.0;
/// Fixed divider resistor on the temperature channel (Ω).
const DIVIDER_OHMS: f64 = 9990.0;
/// Divider supply voltage (V).
const SUPPLY_VOLTS: f64 = 5.0;
/// Thermistor nominal resistance at 25 °C (Ω).
const NOMINAL_OHMS: f64 = 12_000.0;
/// Reference temperature for the nominal resistance (K).
const REFERENCE_KELVIN: f64 = 298.15;

/// Convert the thermistor divider voltage (V) to °C.
///
/// Returns `None` when the conversion is undefined: a saturated or
/// non-positive divider voltage, a non-positive inferred resistance,
/// or a log argument that collapses the formula. Callers keep the raw
/// voltage and record the temperature as missing.
pub fn thermistor_celsius(temp_voltage: f64) -> Option<f64> {
    if !temp_voltage.is_finite() || temp_voltage <= 0.0 || temp_voltage >= SUPPLY_VOLTS {
        return None;
    }

    let resistance = DIVIDER_OHMS / (SUPPLY_VOLTS / temp_voltage - 1.0);
    if !resistance.is_finite() || resistance <= 0.0 {
        return None;
    }

    let r_inf = NOMINAL_OHMS * (-THERMISTOR_BETA / REFERENCE_KELVIN).exp();
    let log_term = (resistance / r_inf).ln();
    if !log_term.is_finite() || log_term <= 0.0 {
        return None;
    }

    Some(THERMISTOR_BETA / log_term - 273.15)
}

// ============================================================================
// Voltage-drop flow law (linear drives)
// ============================================================================

/// Flow derived from the steady-state offset against the base voltage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VoltageDropFlow {
    Flow(f64),
    /// Delta outside the device's linear calibration range; the value
    /// is reported as zero rather than extrapolated.
    OutOfRange,
}

/// `flow = exp((|recent_avg - base_voltage| + A) / B)`, guarded by the
/// calibration range.
pub fn voltage_drop_flow(
    recent_avg: f64,
    base_voltage: f64,
    settings: &VoltageDropSettings,
) -> VoltageDropFlow {
    let delta = (recent_avg - base_voltage).abs();
    if !delta.is_finite() || delta > settings.max_delta_mv {
        return VoltageDropFlow::OutOfRange;
    }
    VoltageDropFlow::Flow(((delta + settings.offset_mv) / settings.scale_mv).exp())
}

// ============================================================================
// Spectral flow calibration (rotary pumps)
// ============================================================================

/// Convert a ripple frequency (Hz) to device flow units using the
/// bench-calibrated per-device constant.
pub fn spectral_flow(frequency_hz: f64, cal_hz_per_unit: f64) -> f64 {
    frequency_hz / cal_hz_per_unit
}
