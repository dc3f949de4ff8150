//! Streaming signal-processing primitives
//!
//! The numeric core of the pipeline: stateful decimation filtering,
//! windowed spectral estimation, peak extraction, and trend fitting.
//! Everything here is synchronous and allocation-light; it runs inside
//! the acquisition callback and must finish well inside the
//! inter-block interval.

pub mod decimate;
pub mod peaks;
pub mod spectrum;
pub mod trend;

pub use decimate::{DecimationCascade, FilterStage, DECIMATION_FACTOR};
pub use peaks::{find_peaks, Peak};
pub use spectrum::{SpectralEstimator, SpectralFrame, SpectrumError};
pub use trend::{fit_line, LineFit};
