//! Record sink
//!
//! CSV persistence collaborator for the pipeline's flat record stream.
//! The pipeline hands [`FlowRecord`] rows to this sink and performs no
//! file I/O itself. One file per acquisition run, named with the start
//! timestamp the way the bench software always has
//! (`YYYY-MM-DD HH-MM-SS data.csv`).

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::types::FlowRecord;

#[derive(Debug, Error)]
pub enum RecorderError {
    #[error("record sink I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Buffered CSV writer for flow records.
pub struct CsvRecorder {
    writer: BufWriter<File>,
    path: PathBuf,
    rows: u64,
}

impl CsvRecorder {
    /// Create the sink at an explicit path, writing the header row.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self, RecorderError> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path)?;
        let mut writer = BufWriter::new(file);
        writeln!(
            writer,
            "timestamp,time,flow_voltage,temp_voltage,temperature"
        )?;
        Ok(Self {
            writer,
            path,
            rows: 0,
        })
    }

    /// Create the sink in `directory` with the timestamped default
    /// filename.
    pub fn create_in_dir<P: AsRef<Path>>(directory: P) -> Result<Self, RecorderError> {
        let name = format!(
            "{} data.csv",
            chrono::Local::now().format("%Y-%m-%d %H-%M-%S")
        );
        Self::create(directory.as_ref().join(name))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn rows_written(&self) -> u64 {
        self.rows
    }

    /// Append a batch of records. An undefined temperature renders as
    /// an empty field; the raw voltages are always present.
    pub fn append(&mut self, records: &[FlowRecord]) -> Result<(), RecorderError> {
        for r in records {
            match r.temperature_c {
                Some(t) => writeln!(
                    self.writer,
                    "{},{:.4},{:.6},{:.6},{:.3}",
                    r.timestamp_ms, r.time_s, r.flow_voltage, r.temp_voltage, t
                )?,
                None => writeln!(
                    self.writer,
                    "{},{:.4},{:.6},{:.6},",
                    r.timestamp_ms, r.time_s, r.flow_voltage, r.temp_voltage
                )?,
            }
            self.rows += 1;
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), RecorderError> {
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(time_s: f64, temperature_c: Option<f64>) -> FlowRecord {
        FlowRecord {
            timestamp_ms: 1_700_000_000_000,
            time_s,
            flow_voltage: 2500.123456,
            temp_voltage: 2.728,
            temperature_c,
        }
    }

    #[test]
    fn rows_round_trip_through_the_csv() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("run data.csv");
        let mut recorder = CsvRecorder::create(&path).expect("create sink");
        recorder
            .append(&[record(0.1, Some(25.043)), record(0.2, None)])
            .expect("append rows");
        recorder.flush().expect("flush");
        assert_eq!(recorder.rows_written(), 2);

        let contents = std::fs::read_to_string(&path).expect("read back");
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(
            lines[0],
            "timestamp,time,flow_voltage,temp_voltage,temperature"
        );
        assert!(lines[1].ends_with(",25.043"));
        // Undefined temperature leaves the final field empty.
        assert!(lines[2].ends_with(","));
    }

    #[test]
    fn default_filename_carries_the_start_stamp() {
        let dir = tempfile::tempdir().expect("temp dir");
        let recorder = CsvRecorder::create_in_dir(dir.path()).expect("create sink");
        let name = recorder
            .path()
            .file_name()
            .and_then(|n| n.to_str())
            .expect("utf8 name");
        assert!(name.ends_with(" data.csv"), "name {name}");
    }
}
