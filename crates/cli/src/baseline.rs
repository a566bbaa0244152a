//! Reference BPM series loaded from an external CSV for side-by-side
//! comparison against the live estimate. Never touches `rppg-core`.

use std::path::Path;

use anyhow::{Context, Result};

/// One `(time_ms, bpm)` row of a reference trace.
#[derive(Debug, Clone, Copy)]
struct BaselineSample {
    time_ms: i64,
    bpm: f64,
}

/// A loaded baseline trace, queried by nearest timestamp.
pub struct Baseline {
    samples: Vec<BaselineSample>,
}

impl Baseline {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_path(path.as_ref())
            .with_context(|| format!("opening baseline csv {}", path.as_ref().display()))?;

        let mut samples = Vec::new();
        for record in reader.records() {
            let record = record?;
            let time_ms: i64 = record
                .get(0)
                .context("missing time column")?
                .parse()
                .context("parsing time column")?;
            let bpm: f64 = record
                .get(1)
                .context("missing bpm column")?
                .parse()
                .context("parsing bpm column")?;
            samples.push(BaselineSample { time_ms, bpm });
        }
        samples.sort_by_key(|s| s.time_ms);
        Ok(Self { samples })
    }

    /// The reference BPM closest in time to `time_ms`, or `None` if the
    /// baseline is empty.
    pub fn nearest(&self, time_ms: i64) -> Option<f64> {
        self.samples
            .iter()
            .min_by_key(|s| (s.time_ms - time_ms).abs())
            .map(|s| s.bpm)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn nearest_picks_closest_timestamp() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "time,bpm").unwrap();
        writeln!(file, "0,70.0").unwrap();
        writeln!(file, "1000,72.0").unwrap();
        writeln!(file, "2000,75.0").unwrap();
        file.flush().unwrap();

        let baseline = Baseline::load(file.path()).unwrap();
        assert_eq!(baseline.nearest(900), Some(72.0));
        assert_eq!(baseline.nearest(50), Some(70.0));
    }
}
