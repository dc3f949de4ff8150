//! Flowsight: flow-instrument signal-processing core
//!
//! Continuous, hardware-clocked analysis pipeline for a flow-measurement
//! instrument: raw voltage blocks are decimated through stateful
//! Chebyshev cascades, spectrally analysed for the pump's cyclic flow
//! signature, watched for start/stop voltage trends, and smoothed into
//! a debounced front-panel value.
//!
//! ## Architecture
//!
//! - **dsp**: decimation cascade, windowed spectral estimator, peak
//!   extraction, trend fitting
//! - **pipeline**: per-channel analysis state, edge detection, flow
//!   strategies, display aggregator, async wiring
//! - **acquisition**: synthetic scenario generator and raw CSV ingestion
//! - **recorder**: CSV record sink (the pipeline's persistence collaborator)

pub mod acquisition;
pub mod config;
pub mod dsp;
pub mod physics;
pub mod pipeline;
pub mod recorder;
pub mod types;

// Re-export the instrument-level surface
pub use config::InstrumentConfig;
pub use pipeline::{
    AggregatorSettings, ChannelLayout, ChannelPipeline, DisplayLoop, DisplaySnapshot, EdgeState,
    EdgeTransition, FlowAggregator, InstrumentPipeline, ProcessingLoop,
};
pub use recorder::CsvRecorder;
pub use types::{
    DecimatedSample, DisplayState, FlowCandidate, FlowRecord, PumpProfile, SampleBlock,
};
