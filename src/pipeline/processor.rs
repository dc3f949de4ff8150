//! Per-channel pipeline and instrument assembly
//!
//! `ChannelPipeline` owns every piece of mutable analysis state for one
//! physical channel — decimation cascade, rolling decimated buffer,
//! spectral estimator, edge detector, strategy, estimate window —
//! arena-style, never shared. `InstrumentPipeline` pairs the flow
//! channel with the temperature channel and emits the persisted record
//! stream.
//!
//! Everything here runs synchronously inside the acquisition callback
//! and must complete well inside the inter-block interval.

use tracing::debug;

use crate::dsp::{DecimationCascade, SpectralEstimator, SpectralFrame};
use crate::physics;
use crate::types::{ChannelId, DecimatedSample, FlowCandidate, FlowRecord, PumpProfile};

use super::aggregator::FlowEstimateWindow;
use super::edge::{EdgeTransition, TrendEdgeDetector};
use super::state::DisplaySnapshot;
use super::strategy::{build_estimator, EstimatorContext, FlowEstimator};

/// Default flow-estimate window capacity.
pub const ESTIMATE_WINDOW_CAPACITY: usize = 600;

/// Samples averaged by the manual calibration capture.
pub const CALIBRATE_WINDOW: usize = 200;

// ============================================================================
// Channel pipeline
// ============================================================================

/// Outcome of pushing one raw block through a channel.
#[derive(Debug, Default)]
pub struct ChannelOutcome {
    /// Decimated samples produced by this block, in order.
    pub new_samples: Vec<DecimatedSample>,
    /// Edge transitions fired while processing, with their ticks.
    pub transitions: Vec<(u64, EdgeTransition)>,
}

/// Full analysis pipeline for one physical channel.
pub struct ChannelPipeline {
    profile: PumpProfile,
    cascade: DecimationCascade,
    /// Decimated history, oldest first; bounded unless in full-scale mode.
    history: Vec<f64>,
    capacity: Option<usize>,
    tick: u64,
    estimator: SpectralEstimator,
    strategy: Box<dyn FlowEstimator>,
    edge: TrendEdgeDetector,
    window: FlowEstimateWindow,
    latest_frame: Option<SpectralFrame>,
    latest_candidate: Option<FlowCandidate>,
    reference_voltage: Option<f64>,
}

impl ChannelPipeline {
    /// `capacity`: rolling-buffer bound in decimated samples, `None`
    /// for full-scale (unbounded) mode. The bound is clamped so the
    /// spectral window and the edge detector always have enough
    /// history to work with.
    pub fn new(profile: PumpProfile, capacity: Option<usize>) -> Self {
        let floor = profile
            .spectral
            .window_len
            .max(profile.block_len + profile.base_window);
        let capacity = capacity.map(|c| c.max(floor));
        Self {
            cascade: DecimationCascade::new(profile.decimation_stages),
            estimator: SpectralEstimator::new(&profile.spectral),
            strategy: build_estimator(&profile),
            edge: TrendEdgeDetector::new(&profile),
            window: FlowEstimateWindow::new(ESTIMATE_WINDOW_CAPACITY),
            history: Vec::new(),
            capacity,
            tick: 0,
            latest_frame: None,
            latest_candidate: None,
            reference_voltage: None,
            profile,
        }
    }

    /// Discard all carried state — fresh filters, emptied buffers.
    /// Called on every acquisition start.
    pub fn reset(&mut self) {
        self.cascade.reset();
        self.edge.reset();
        self.window.clear();
        self.history.clear();
        self.tick = 0;
        self.latest_frame = None;
        self.latest_candidate = None;
        self.reference_voltage = None;
    }

    /// Manual calibration capture (the front panel's Calibrate action):
    /// snapshot the mean of the most recent [`CALIBRATE_WINDOW`]
    /// decimated samples as the operator reference voltage. Returns
    /// `None` (and stores nothing) until enough data has been seen.
    pub fn calibrate(&mut self) -> Option<f64> {
        if self.history.len() < CALIBRATE_WINDOW {
            return None;
        }
        let window = &self.history[self.history.len() - CALIBRATE_WINDOW..];
        let reference = window.iter().sum::<f64>() / window.len() as f64;
        self.reference_voltage = Some(reference);
        self.reference_voltage
    }

    pub fn reference_voltage(&self) -> Option<f64> {
        self.reference_voltage
    }

    pub fn profile(&self) -> &PumpProfile {
        &self.profile
    }

    pub fn edge(&self) -> &TrendEdgeDetector {
        &self.edge
    }

    pub fn latest_frame(&self) -> Option<&SpectralFrame> {
        self.latest_frame.as_ref()
    }

    pub fn latest_candidate(&self) -> Option<FlowCandidate> {
        self.latest_candidate
    }

    pub fn estimate_window(&self) -> &FlowEstimateWindow {
        &self.window
    }

    pub fn latest_tick(&self) -> u64 {
        self.tick
    }

    /// Push one raw block through decimation and the per-sample
    /// analysis chain.
    pub fn push_block(&mut self, samples: &[f64]) -> ChannelOutcome {
        let mut outcome = ChannelOutcome::default();

        for value in self.cascade.process(samples) {
            let sample = DecimatedSample {
                tick: self.tick,
                value,
            };
            self.tick += 1;

            self.history.push(value);
            if let Some(cap) = self.capacity {
                if self.history.len() > cap {
                    self.history.remove(0);
                }
            }

            if let Some(transition) = self.edge.update(&self.history, sample.tick) {
                outcome.transitions.push((sample.tick, transition));
            }

            // Sliding spectral update: recompute on every sample once
            // the window is filled. The display spectrum is maintained
            // for every profile, not just spectral-strategy ones.
            if self.history.len() >= self.estimator.window_len() {
                match self.estimator.compute(&self.history) {
                    Ok(frame) => self.latest_frame = Some(frame),
                    Err(e) => debug!("spectral frame skipped: {e}"),
                }
            }

            let ctx = EstimatorContext {
                frame: self.latest_frame.as_ref(),
                history: &self.history,
                edge: &self.edge,
            };
            if let Some(candidate) = self.strategy.on_sample(&ctx) {
                self.window.push(candidate);
                self.latest_candidate = Some(candidate);
            }

            outcome.new_samples.push(sample);
        }

        outcome
    }
}

// ============================================================================
// Instrument pipeline
// ============================================================================

/// Outcome of one driver batch across all channels.
#[derive(Debug, Default)]
pub struct BatchOutput {
    pub records: Vec<FlowRecord>,
    pub transitions: Vec<(u64, EdgeTransition)>,
}

/// Channel wiring for the instrument front end.
#[derive(Debug, Clone, Copy)]
pub struct ChannelLayout {
    pub flow_channel: ChannelId,
    pub temp_channel: ChannelId,
    /// Gain applied to the raw flow voltage before analysis (the flow
    /// channel is analysed in mV).
    pub flow_scale: f64,
}

impl Default for ChannelLayout {
    fn default() -> Self {
        Self {
            flow_channel: 0,
            temp_channel: 1,
            flow_scale: 1000.0,
        }
    }
}

/// The full instrument: flow-channel analysis plus temperature
/// decimation, zipped into the persisted record stream.
pub struct InstrumentPipeline {
    flow: ChannelPipeline,
    temp_cascade: DecimationCascade,
    layout: ChannelLayout,
    last_temp_voltage: f64,
}

impl InstrumentPipeline {
    pub fn new(profile: PumpProfile, layout: ChannelLayout, capacity: Option<usize>) -> Self {
        let temp_cascade = DecimationCascade::new(profile.decimation_stages);
        Self {
            flow: ChannelPipeline::new(profile, capacity),
            temp_cascade,
            layout,
            last_temp_voltage: 0.0,
        }
    }

    /// Fresh filter state and emptied buffers on acquisition start.
    pub fn reset(&mut self) {
        self.flow.reset();
        self.temp_cascade.reset();
        self.last_temp_voltage = 0.0;
    }

    pub fn flow_channel(&self) -> &ChannelPipeline {
        &self.flow
    }

    /// Manual calibration capture on the flow channel.
    pub fn calibrate(&mut self) -> Option<f64> {
        self.flow.calibrate()
    }

    /// Process one driver batch (one block per channel).
    pub fn process_batch(&mut self, blocks: &[crate::types::SampleBlock]) -> BatchOutput {
        let mut output = BatchOutput::default();

        // Temperature first so records can pair sample-for-sample.
        let temp_decimated: Vec<f64> = blocks
            .iter()
            .find(|b| b.channel == self.layout.temp_channel)
            .map(|b| self.temp_cascade.process(&b.samples))
            .unwrap_or_default();

        let Some(flow_block) = blocks
            .iter()
            .find(|b| b.channel == self.layout.flow_channel)
        else {
            return output;
        };

        let scaled: Vec<f64> = flow_block
            .samples
            .iter()
            .map(|v| v * self.layout.flow_scale)
            .collect();
        let outcome = self.flow.push_block(&scaled);
        output.transitions = outcome.transitions;

        let timestamp_ms = chrono::Utc::now().timestamp_millis();
        for (i, sample) in outcome.new_samples.iter().enumerate() {
            if let Some(&t) = temp_decimated.get(i) {
                self.last_temp_voltage = t;
            }
            let temp_voltage = self.last_temp_voltage;
            output.records.push(FlowRecord {
                timestamp_ms,
                time_s: sample.time_s(),
                flow_voltage: sample.value,
                temp_voltage,
                temperature_c: physics::thermistor_celsius(temp_voltage),
            });
        }

        output
    }

    /// Immutable state view for the display tick.
    pub fn snapshot(&self) -> DisplaySnapshot {
        DisplaySnapshot {
            latest_tick: self.flow.latest_tick(),
            window: self.flow.estimate_window().contents(),
            edge_state: self.flow.edge().state(),
            last_stop_tick: self.flow.edge().last_stop_tick(),
            latest_candidate: self.flow.latest_candidate(),
            latest_frame: self.flow.latest_frame().cloned(),
        }
    }
}
