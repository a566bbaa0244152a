//! CSV log writers for aggregate and per-frame BPM output.
//!
//! Two writers are always open once `log_path_prefix` is set: the
//! aggregate `_bpm.csv` and the raw per-estimate `_bpmAll.csv`. A third,
//! optional pair of per-window trace files is opened only when
//! `Config.log_mode` is set, with columns that vary by
//! [`crate::config::RppgAlgorithm`].

use std::fs::File;
use std::path::Path;

use csv::{Writer, WriterBuilder};

use crate::error::Result;

fn writer_for<P: AsRef<Path>>(path: P) -> Result<Writer<File>> {
    Ok(WriterBuilder::new().delimiter(b';').from_path(path)?)
}

/// Writes `<prefix>_bpm.csv` (periodic aggregate) and `<prefix>_bpmAll.csv`
/// (every spectral estimate), flushing after each row.
pub struct BpmLogWriter {
    bpm: Writer<File>,
    bpm_all: Writer<File>,
}

impl BpmLogWriter {
    pub fn create<P: AsRef<Path>>(prefix: P) -> Result<Self> {
        let prefix = prefix.as_ref();
        let mut bpm = writer_for(format!("{}_bpm.csv", prefix.display()))?;
        bpm.write_record(["time", "face_valid", "mean", "min", "max"])?;
        bpm.flush()?;

        let mut bpm_all = writer_for(format!("{}_bpmAll.csv", prefix.display()))?;
        bpm_all.write_record(["time", "face_valid", "bpm"])?;
        bpm_all.flush()?;

        Ok(Self { bpm, bpm_all })
    }

    pub fn log_aggregate(&mut self, t: i64, face_valid: bool, mean: f64, min: f64, max: f64) -> Result<()> {
        self.bpm.write_record(&[
            t.to_string(),
            face_valid.to_string(),
            mean.to_string(),
            min.to_string(),
            max.to_string(),
        ])?;
        self.bpm.flush()?;
        Ok(())
    }

    pub fn log_estimate(&mut self, t: i64, face_valid: bool, bpm: f64) -> Result<()> {
        self.bpm_all
            .write_record(&[t.to_string(), face_valid.to_string(), bpm.to_string()])?;
        self.bpm_all.flush()?;
        Ok(())
    }
}

/// One `_signal_<t>.csv` / `_estimation_<t>.csv` pair per processed window,
/// opened only under `log_mode`. The estimation trace's extra columns vary
/// by algorithm -- `xminay` carries `alpha`, `pca` carries the chosen
/// component index, `g` carries none -- via the caller-supplied `extra`
/// columns (see [`crate::signal::ExtractorTrace::columns`]).
pub struct TraceLogWriter;

impl TraceLogWriter {
    pub fn new() -> Self {
        Self
    }

    pub fn write_signal_trace<P: AsRef<Path>>(&self, prefix: P, t: i64, s_f: &[f64]) -> Result<()> {
        let path = format!("{}_signal_{}.csv", prefix.as_ref().display(), t);
        let mut writer = writer_for(path)?;
        writer.write_record(["index", "value"])?;
        for (i, v) in s_f.iter().enumerate() {
            writer.write_record(&[i.to_string(), v.to_string()])?;
        }
        writer.flush()?;
        Ok(())
    }

    pub fn write_estimation_trace<P: AsRef<Path>>(
        &self,
        prefix: P,
        t: i64,
        power_spectrum: &[f64],
        extra: &[(&str, f64)],
    ) -> Result<()> {
        let path = format!("{}_estimation_{}.csv", prefix.as_ref().display(), t);
        let mut writer = writer_for(path)?;
        let mut header = vec!["bin".to_string(), "power".to_string()];
        header.extend(extra.iter().map(|(name, _)| name.to_string()));
        writer.write_record(&header)?;
        for (i, p) in power_spectrum.iter().enumerate() {
            let mut row = vec![i.to_string(), p.to_string()];
            if i == 0 {
                row.extend(extra.iter().map(|(_, v)| v.to_string()));
            } else {
                row.extend(extra.iter().map(|_| String::new()));
            }
            writer.write_record(&row)?;
        }
        writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn bpm_log_writer_creates_headered_files() {
        let dir = tempdir().unwrap();
        let prefix = dir.path().join("Heartbeat");
        let mut writer = BpmLogWriter::create(&prefix).unwrap();
        writer.log_aggregate(1000, true, 72.0, 70.0, 75.0).unwrap();
        writer.log_estimate(1000, true, 72.0).unwrap();

        let bpm_path = format!("{}_bpm.csv", prefix.display());
        let content = std::fs::read_to_string(bpm_path).unwrap();
        assert!(content.starts_with("time;face_valid;mean;min;max"));
    }

    #[test]
    fn trace_log_writer_writes_power_spectrum_rows() {
        let dir = tempdir().unwrap();
        let prefix = dir.path().join("Heartbeat");
        let writer = TraceLogWriter::new();
        writer
            .write_estimation_trace(&prefix, 1000, &[0.1, 0.2, 0.3], &[("alpha", 1.2)])
            .unwrap();
        let path = format!("{}_estimation_1000.csv", prefix.display());
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("bin;power;alpha"));
    }
}
