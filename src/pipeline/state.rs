//! Published pipeline state
//!
//! The hot numeric path owns all mutable filter/buffer state and never
//! shares it. What crosses the boundary to the display tick (and any
//! other read-side consumer) is an immutable snapshot published after
//! each processed block — one-directional, no locks on the hot path.

use std::sync::Arc;
use tokio::sync::RwLock;

use crate::dsp::SpectralFrame;
use crate::types::FlowCandidate;

use super::edge::EdgeState;

/// Immutable view of the pipeline published after each block.
#[derive(Debug, Clone)]
pub struct DisplaySnapshot {
    /// Tick of the newest decimated sample.
    pub latest_tick: u64,
    /// Flow-estimate window contents, oldest first.
    pub window: Vec<FlowCandidate>,
    /// Edge detector state (carries the base voltage when detected).
    pub edge_state: EdgeState,
    /// Tick of the most recent stop transition.
    pub last_stop_tick: Option<u64>,
    /// Most recent per-sample candidate (voltage-drop display path).
    pub latest_candidate: Option<FlowCandidate>,
    /// Most recent spectral frame, for display consumers.
    pub latest_frame: Option<SpectralFrame>,
}

/// Shared handle the processing loop writes and the display tick reads.
pub type SharedSnapshot = Arc<RwLock<Option<DisplaySnapshot>>>;

/// Counters reported when the processing loop finishes.
#[derive(Debug, Clone, Copy, Default)]
pub struct PipelineStats {
    pub batches_processed: u64,
    pub batches_dropped: u64,
    pub records_emitted: u64,
    pub starts_detected: u64,
    pub stops_detected: u64,
}
