//! Instrument configuration
//!
//! Every operator-tunable value is a field in this module, with
//! defaults matching the bench constants, so behaviour is unchanged
//! when no config file is present.
//!
//! Load order:
//! 1. `$FLOWSIGHT_CONFIG` environment variable
//! 2. `./instrument.toml` in the current working directory
//! 3. Built-in defaults

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::{info, warn};

use crate::types::PumpProfile;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("unknown pump profile '{0}'")]
    UnknownProfile(String),
}

// ============================================================================
// Sections
// ============================================================================

/// Acquisition front-end parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcquisitionConfig {
    /// Driver sample clock (Hz).
    pub raw_rate_hz: f64,
    /// Samples per driver block and channel.
    pub block_len: usize,
    /// Channel wired to the flow sensor.
    pub flow_channel: u8,
    /// Channel wired to the thermistor divider.
    pub temp_channel: u8,
    /// Gain applied to the raw flow voltage before analysis (V -> mV).
    pub flow_scale: f64,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            raw_rate_hz: 10_000.0,
            block_len: 1000,
            flow_channel: 0,
            temp_channel: 1,
            flow_scale: 1000.0,
        }
    }
}

/// Rolling-buffer bounds for the decimated stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BufferConfig {
    /// Keep the whole run in memory (bench "full scale" mode).
    pub full_scale: bool,
    /// Bound in decimated samples when not in full-scale mode
    /// (36 000 = one hour at 10 Hz).
    pub capacity: usize,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            full_scale: false,
            capacity: 36_000,
        }
    }
}

/// Display smoothing parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayConfig {
    /// Wall-clock refresh tick (ms).
    pub tick_ms: u64,
    /// Seconds without flow before the panel shows zero.
    pub idle_timeout_s: f64,
    /// Minimum valid estimates before a consensus is attempted.
    pub min_valid: usize,
    /// Coefficient-of-variation ceiling for a steady verdict.
    pub max_cv: f64,
    /// Fraction trimmed from each end of the sorted window.
    pub trim_fraction: f64,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            tick_ms: 500,
            idle_timeout_s: 10.0,
            min_valid: 20,
            max_cv: 0.5,
            trim_fraction: 0.15,
        }
    }
}

/// Record persistence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordingConfig {
    pub enabled: bool,
    /// Directory for the timestamped run files.
    pub directory: String,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            directory: ".".to_string(),
        }
    }
}

/// Pump selection plus optional per-site calibration overrides on top
/// of the built-in profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PumpConfig {
    /// Built-in profile name ("rotary_peristaltic", "syringe_drive").
    pub profile: String,
    pub block_len: Option<usize>,
    pub start_slope: Option<f64>,
    pub stop_slope: Option<f64>,
    pub flow_cal_hz_per_unit: Option<f64>,
    pub decimation_stages: Option<usize>,
}

impl Default for PumpConfig {
    fn default() -> Self {
        Self {
            profile: "rotary_peristaltic".to_string(),
            block_len: None,
            start_slope: None,
            stop_slope: None,
            flow_cal_hz_per_unit: None,
            decimation_stages: None,
        }
    }
}

// ============================================================================
// Top-level config
// ============================================================================

/// Root configuration for an instrument deployment.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InstrumentConfig {
    #[serde(default)]
    pub acquisition: AcquisitionConfig,
    #[serde(default)]
    pub buffer: BufferConfig,
    #[serde(default)]
    pub display: DisplayConfig,
    #[serde(default)]
    pub recording: RecordingConfig,
    #[serde(default)]
    pub pump: PumpConfig,
}

impl InstrumentConfig {
    /// Load configuration using the standard search order.
    pub fn load() -> Result<Self, ConfigError> {
        if let Ok(path) = std::env::var("FLOWSIGHT_CONFIG") {
            info!(path = %path, "Loading config from FLOWSIGHT_CONFIG");
            return Self::from_file(&path);
        }
        let default_path = Path::new("instrument.toml");
        if default_path.exists() {
            info!("Loading config from ./instrument.toml");
            return Self::from_file(default_path);
        }
        info!("No config file found, using built-in defaults");
        Ok(Self::default())
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&text)?)
    }

    /// Resolve the pump profile with site overrides applied.
    pub fn pump_profile(&self) -> Result<PumpProfile, ConfigError> {
        let mut profile = PumpProfile::by_name(&self.pump.profile)
            .ok_or_else(|| ConfigError::UnknownProfile(self.pump.profile.clone()))?;

        if let Some(v) = self.pump.block_len {
            profile.block_len = v;
        }
        if let Some(v) = self.pump.start_slope {
            profile.start_slope = v;
        }
        if let Some(v) = self.pump.stop_slope {
            profile.stop_slope = v;
        }
        if let Some(v) = self.pump.flow_cal_hz_per_unit {
            profile.flow_cal_hz_per_unit = v;
        }
        if let Some(v) = self.pump.decimation_stages {
            profile.decimation_stages = v;
        }

        if profile.start_slope >= 0.0 || profile.stop_slope <= 0.0 {
            warn!(
                start = profile.start_slope,
                stop = profile.stop_slope,
                "Slope thresholds lost their hysteresis ordering; detection may flicker"
            );
        }
        Ok(profile)
    }

    /// Rolling-buffer bound for the channel pipelines.
    pub fn buffer_capacity(&self) -> Option<usize> {
        if self.buffer.full_scale {
            None
        } else {
            Some(self.buffer.capacity)
        }
    }
}
