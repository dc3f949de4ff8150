//! Flow-analysis pipeline
//!
//! Per-channel streaming analysis (decimation, spectral estimation,
//! edge detection, flow strategies), the display aggregator, and the
//! async loops that wire them to a block source and the wall-clock
//! tick.

pub mod aggregator;
pub mod edge;
pub mod processing_loop;
pub mod processor;
pub mod source;
pub mod state;
pub mod strategy;

pub use aggregator::{AggregatorSettings, FlowAggregator, FlowEstimateWindow};
pub use edge::{EdgeState, EdgeTransition, TrendEdgeDetector};
pub use processing_loop::{DisplayLoop, ProcessingLoop};
pub use processor::{ChannelLayout, ChannelPipeline, InstrumentPipeline};
pub use source::{BlockEvent, BlockSource, ReplaySource, SimulatedSource, StdinSource};
pub use state::{DisplaySnapshot, PipelineStats, SharedSnapshot};
pub use strategy::{build_estimator, EstimatorContext, FlowEstimator};
