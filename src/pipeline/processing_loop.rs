//! Block processing loop and display tick
//!
//! Two independent temporal sources drive the pipeline: the driver
//! cadence (batches from a [`BlockSource`]) and the fixed 500 ms
//! wall-clock display tick. The processing loop owns every piece of
//! mutable analysis state and publishes immutable snapshots; the
//! display loop only ever reads them. Neither side takes a lock the
//! other holds across work.

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::recorder::CsvRecorder;
use crate::types::DisplayState;

use super::aggregator::FlowAggregator;
use super::edge::EdgeTransition;
use super::processor::InstrumentPipeline;
use super::source::{BlockEvent, BlockSource};
use super::state::{PipelineStats, SharedSnapshot};

// ============================================================================
// Processing loop
// ============================================================================

/// Owns the instrument pipeline and the record sink for one
/// acquisition run.
pub struct ProcessingLoop {
    pipeline: InstrumentPipeline,
    snapshot: SharedSnapshot,
    recorder: Option<CsvRecorder>,
    cancel_token: CancellationToken,
}

impl ProcessingLoop {
    pub fn new(
        mut pipeline: InstrumentPipeline,
        snapshot: SharedSnapshot,
        recorder: Option<CsvRecorder>,
        cancel_token: CancellationToken,
    ) -> Self {
        // Acquisition start is a discrete transition: all pipeline
        // state is recreated fresh.
        pipeline.reset();
        Self {
            pipeline,
            snapshot,
            recorder,
            cancel_token,
        }
    }

    /// Run until the source is exhausted or cancellation. Returns the
    /// final counters.
    pub async fn run<S: BlockSource>(mut self, source: &mut S) -> PipelineStats {
        let mut stats = PipelineStats::default();

        info!("Processing raw blocks from {} source...", source.source_name());

        loop {
            let event = tokio::select! {
                _ = self.cancel_token.cancelled() => {
                    info!("[Pipeline] Shutdown signal received");
                    break;
                }
                result = source.next_batch() => {
                    match result {
                        Ok(ev) => ev,
                        Err(e) => {
                            // Acquisition read failure: drop the block,
                            // keep all pipeline state.
                            warn!("[Pipeline] Source read failed, block dropped: {e}");
                            stats.batches_dropped += 1;
                            continue;
                        }
                    }
                }
            };

            let batch = match event {
                BlockEvent::Batch(b) => b,
                BlockEvent::Eof => {
                    info!(
                        "[Pipeline] Source reached end ({} batches processed)",
                        stats.batches_processed
                    );
                    break;
                }
            };

            let output = self.pipeline.process_batch(&batch);
            stats.batches_processed += 1;

            for (tick, transition) in &output.transitions {
                match transition {
                    EdgeTransition::FlowDetected => {
                        stats.starts_detected += 1;
                        info!(tick = tick, "Flow detected.");
                    }
                    EdgeTransition::FlowStopped => {
                        stats.stops_detected += 1;
                        info!(tick = tick, "Flow stopped.");
                    }
                }
            }

            if let Some(recorder) = &mut self.recorder {
                if let Err(e) = recorder.append(&output.records) {
                    warn!("Failed to persist records: {e}");
                }
            }
            stats.records_emitted += output.records.len() as u64;

            *self.snapshot.write().await = Some(self.pipeline.snapshot());
        }

        if let Some(recorder) = &mut self.recorder {
            if let Err(e) = recorder.flush() {
                warn!("Failed to flush record sink: {e}");
            }
        }

        info!("");
        info!("FINAL STATISTICS");
        info!("   Batches Processed: {}", stats.batches_processed);
        info!("   Batches Dropped:   {}", stats.batches_dropped);
        info!("   Records Emitted:   {}", stats.records_emitted);
        info!("   Starts Detected:   {}", stats.starts_detected);
        info!("   Stops Detected:    {}", stats.stops_detected);

        stats
    }
}

// ============================================================================
// Display loop
// ============================================================================

/// Runs the aggregator on the fixed wall-clock tick, reading published
/// snapshots only.
pub struct DisplayLoop {
    aggregator: FlowAggregator,
    snapshot: SharedSnapshot,
    tick_ms: u64,
    cancel_token: CancellationToken,
}

impl DisplayLoop {
    pub fn new(
        aggregator: FlowAggregator,
        snapshot: SharedSnapshot,
        tick_ms: u64,
        cancel_token: CancellationToken,
    ) -> Self {
        Self {
            aggregator,
            snapshot,
            tick_ms,
            cancel_token,
        }
    }

    pub async fn run(mut self) {
        let mut interval =
            tokio::time::interval(tokio::time::Duration::from_millis(self.tick_ms));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        let mut previous: Option<DisplayState> = None;
        loop {
            tokio::select! {
                _ = self.cancel_token.cancelled() => break,
                _ = interval.tick() => {}
            }

            let Some(snap) = self.snapshot.read().await.clone() else {
                continue;
            };
            let state = self.aggregator.tick(&snap);

            // State-change log lines; the per-tick value stays at trace
            // so the journal is not flooded at 2 Hz.
            let changed = !matches!(
                (previous, state),
                (Some(DisplayState::Idle), DisplayState::Idle)
                    | (
                        Some(DisplayState::Calculating { .. }),
                        DisplayState::Calculating { .. }
                    )
                    | (Some(DisplayState::Steady { .. }), DisplayState::Steady { .. })
            );
            if changed {
                match state {
                    DisplayState::Steady { flow } => {
                        info!(flow = format!("{flow:.1}"), "Steady flow detected.");
                    }
                    DisplayState::Calculating { .. } => info!("Calculating..."),
                    DisplayState::Idle => info!("Flow idle."),
                }
            }
            tracing::trace!(display = %state.render(), "display tick");
            previous = Some(state);
        }
    }
}
