//! Acquisition-side collaborators
//!
//! The pipeline consumes raw blocks through a synchronous callback
//! boundary; everything upstream of that boundary lives here: the
//! synthetic signal generator and the raw-voltage CSV loader used for
//! bench replays.

pub mod simulator;

pub use simulator::{PumpSignalSynth, SynthConfig};

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use thiserror::Error;
use tracing::{info, warn};

use crate::types::SampleBlock;

#[derive(Debug, Error)]
pub enum AcquisitionError {
    #[error("failed to open raw CSV: {0}")]
    Io(#[from] std::io::Error),
    #[error("raw CSV contains no usable rows")]
    Empty,
}

/// Load a two-column raw-voltage CSV (`flow_voltage,temp_voltage`,
/// volts at the raw rate) and chunk it into driver-sized batches.
///
/// Malformed lines are logged and skipped, matching the driver's
/// behaviour of dropping unreadable blocks rather than failing the
/// run.
pub fn load_raw_csv<P: AsRef<Path>>(
    path: P,
    block_len: usize,
) -> Result<Vec<Vec<SampleBlock>>, AcquisitionError> {
    let file = File::open(path.as_ref())?;
    let reader = BufReader::new(file);

    let mut flow = Vec::new();
    let mut temp = Vec::new();
    let mut line_num = 0usize;

    for line_result in reader.lines() {
        line_num += 1;
        let line = match line_result {
            Ok(l) => l,
            Err(e) => {
                warn!(line = line_num, error = %e, "Error reading raw CSV line");
                continue;
            }
        };

        // Skip header and empty lines.
        if line_num == 1 && line.starts_with("flow_voltage") {
            continue;
        }
        if line.trim().is_empty() {
            continue;
        }

        match parse_raw_line(&line) {
            Ok((f, t)) => {
                flow.push(f);
                temp.push(t);
            }
            Err(e) => {
                warn!(line = line_num, error = %e, "Error parsing raw CSV line");
            }
        }
    }

    if flow.is_empty() {
        return Err(AcquisitionError::Empty);
    }

    let mut batches = Vec::new();
    let mut seq = 0u64;
    for (f_chunk, t_chunk) in flow.chunks(block_len).zip(temp.chunks(block_len)) {
        batches.push(vec![
            SampleBlock::new(0, seq, f_chunk.to_vec()),
            SampleBlock::new(1, seq, t_chunk.to_vec()),
        ]);
        seq += 1;
    }

    info!(
        samples = flow.len(),
        batches = batches.len(),
        "Loaded raw voltage CSV"
    );
    Ok(batches)
}

fn parse_raw_line(line: &str) -> Result<(f64, f64), String> {
    let mut fields = line.split(',');
    let flow = fields
        .next()
        .ok_or("missing flow_voltage field")?
        .trim()
        .parse::<f64>()
        .map_err(|e| format!("flow_voltage: {e}"))?;
    let temp = fields
        .next()
        .ok_or("missing temp_voltage field")?
        .trim()
        .parse::<f64>()
        .map_err(|e| format!("temp_voltage: {e}"))?;
    Ok((flow, temp))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn csv_rows_chunk_into_batches() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(file, "flow_voltage,temp_voltage").expect("write header");
        for i in 0..25 {
            writeln!(file, "{},{}", 2.5 + i as f64 * 0.001, 2.7).expect("write row");
        }
        writeln!(file, "garbage,row,here").expect("write bad row");
        file.flush().expect("flush");

        let batches = load_raw_csv(file.path(), 10).expect("load csv");
        assert_eq!(batches.len(), 3); // 10 + 10 + 5
        assert_eq!(batches[0][0].samples.len(), 10);
        assert_eq!(batches[2][0].samples.len(), 5);
        assert_eq!(batches[1][0].seq, 1);
    }

    #[test]
    fn empty_file_is_an_error() {
        let file = tempfile::NamedTempFile::new().expect("temp file");
        assert!(matches!(
            load_raw_csv(file.path(), 10),
            Err(AcquisitionError::Empty)
        ));
    }
}
