//! Block source abstraction for raw-sample ingestion
//!
//! Unified trait for the places driver batches come from: the
//! in-process simulator, a recorded raw CSV replay, and stdin (JSON
//! lines, one batch per line, as emitted by the `simulate` binary).
//! Implementations handle parsing and pacing internally; the
//! processing loop calls [`next_batch`](BlockSource::next_batch) in a
//! `select!` with cancellation.

use anyhow::Result;
use async_trait::async_trait;

use crate::acquisition::PumpSignalSynth;
use crate::types::SampleBlock;

/// Events produced by a block source.
pub enum BlockEvent {
    /// One driver batch: one block per channel.
    Batch(Vec<SampleBlock>),
    /// Source exhausted (end of file / scenario complete).
    Eof,
}

/// Where driver batches come from.
#[async_trait]
pub trait BlockSource: Send + 'static {
    /// Read the next batch. `Err` means an unrecoverable source
    /// failure; per-batch read errors are handled internally (logged,
    /// block dropped).
    async fn next_batch(&mut self) -> Result<BlockEvent>;

    /// Human-readable name for logging (e.g. "simulated", "stdin").
    fn source_name(&self) -> &str;
}

// ============================================================================
// Simulated source (in-process synthetic scenario)
// ============================================================================

/// Generates the scripted pump scenario in-process.
pub struct SimulatedSource {
    synth: PumpSignalSynth,
    /// Sleep one block period between batches to mimic the driver
    /// cadence; disable for fast replay.
    pace: bool,
}

impl SimulatedSource {
    pub fn new(synth: PumpSignalSynth, pace: bool) -> Self {
        Self { synth, pace }
    }
}

#[async_trait]
impl BlockSource for SimulatedSource {
    async fn next_batch(&mut self) -> Result<BlockEvent> {
        if self.pace {
            let period = self.synth.block_period_s();
            tokio::time::sleep(tokio::time::Duration::from_secs_f64(period)).await;
        }
        match self.synth.next_batch() {
            Some(batch) => Ok(BlockEvent::Batch(batch)),
            None => Ok(BlockEvent::Eof),
        }
    }

    fn source_name(&self) -> &str {
        "simulated"
    }
}

// ============================================================================
// Replay source (pre-loaded raw CSV)
// ============================================================================

/// Replays pre-loaded batches with optional inter-batch delay.
pub struct ReplaySource {
    batches: std::vec::IntoIter<Vec<SampleBlock>>,
    delay_ms: u64,
    yielded_first: bool,
}

impl ReplaySource {
    pub fn new(batches: Vec<Vec<SampleBlock>>, delay_ms: u64) -> Self {
        Self {
            batches: batches.into_iter(),
            delay_ms,
            yielded_first: false,
        }
    }
}

#[async_trait]
impl BlockSource for ReplaySource {
    async fn next_batch(&mut self) -> Result<BlockEvent> {
        if self.yielded_first && self.delay_ms > 0 {
            tokio::time::sleep(tokio::time::Duration::from_millis(self.delay_ms)).await;
        }
        match self.batches.next() {
            Some(batch) => {
                self.yielded_first = true;
                Ok(BlockEvent::Batch(batch))
            }
            None => Ok(BlockEvent::Eof),
        }
    }

    fn source_name(&self) -> &str {
        "replay"
    }
}

// ============================================================================
// Stdin source (JSON batches, one per line)
// ============================================================================

/// Reads JSON-formatted batches from stdin.
///
/// Used with the simulator binary:
/// `simulate --seconds 120 | flowsight --stdin`
pub struct StdinSource {
    reader: tokio::io::BufReader<tokio::io::Stdin>,
    line_buffer: String,
}

impl StdinSource {
    pub fn new() -> Self {
        Self {
            reader: tokio::io::BufReader::new(tokio::io::stdin()),
            line_buffer: String::with_capacity(16 * 1024),
        }
    }
}

impl Default for StdinSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BlockSource for StdinSource {
    async fn next_batch(&mut self) -> Result<BlockEvent> {
        use tokio::io::AsyncBufReadExt;
        loop {
            self.line_buffer.clear();
            let bytes = self.reader.read_line(&mut self.line_buffer).await?;
            if bytes == 0 {
                return Ok(BlockEvent::Eof);
            }
            let line = self.line_buffer.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<Vec<SampleBlock>>(line) {
                Ok(batch) => return Ok(BlockEvent::Batch(batch)),
                Err(e) => {
                    // Skip malformed lines and keep reading; the block
                    // is dropped, pipeline state is untouched.
                    tracing::warn!("[StdinSource] Failed to parse batch: {e}");
                }
            }
        }
    }

    fn source_name(&self) -> &str {
        "stdin"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::SynthConfig;

    #[tokio::test]
    async fn simulated_source_ends_with_eof() {
        let cfg = SynthConfig {
            raw_rate_hz: 100.0,
            block_len: 50,
            idle_s: 0.5,
            ramp_s: 0.5,
            run_s: 0.5,
            ..SynthConfig::default()
        };
        let mut source = SimulatedSource::new(PumpSignalSynth::new(cfg), false);
        let mut batches = 0;
        loop {
            match source.next_batch().await.expect("source never errors") {
                BlockEvent::Batch(b) => {
                    assert_eq!(b.len(), 2);
                    batches += 1;
                }
                BlockEvent::Eof => break,
            }
        }
        assert!(batches > 0);
    }

    #[tokio::test]
    async fn replay_source_preserves_order() {
        let batches = vec![
            vec![SampleBlock::new(0, 0, vec![1.0])],
            vec![SampleBlock::new(0, 1, vec![2.0])],
        ];
        let mut source = ReplaySource::new(batches, 0);
        let mut seqs = Vec::new();
        while let BlockEvent::Batch(b) = source.next_batch().await.expect("no errors") {
            seqs.push(b[0].seq);
        }
        assert_eq!(seqs, vec![0, 1]);
    }
}
