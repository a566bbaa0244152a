//! Spectral heart-rate estimation and periodic aggregation.
//!
//! Shares its general shape (spectral peak within a band -> BPM, tracked
//! aggregate state) with `detect_bpm` in
//! `crates/dj/src/library/analysis.rs`, but reads a spectrum the caller
//! already windowed and band-masked, rather than recomputing an
//! onset-envelope autocorrelation.

use crate::config::TimeBase;
use crate::dsp;

/// A periodic `(mean, min, max)` BPM report.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AggregateReport {
    pub mean: f64,
    pub min: f64,
    pub max: f64,
}

/// Estimator state that must survive tracking failures.
#[derive(Debug, Clone, Default)]
pub struct Estimator {
    bpms: Vec<f64>,
    last_sampling_time: Option<i64>,
    power_spectrum: Vec<f64>,
    last_bpm: Option<f64>,
}

impl Estimator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn power_spectrum(&self) -> &[f64] {
        &self.power_spectrum
    }

    pub fn last_bpm(&self) -> Option<f64> {
        self.last_bpm
    }

    /// Compute the magnitude DFT of `s_f`, locate the masked peak within
    /// `[low, high]`, append the resulting BPM, then emit an aggregate
    /// report if `sampling_frequency`'s interval has elapsed.
    pub fn update(
        &mut self,
        s_f: &[f64],
        fps: f64,
        low: usize,
        high: usize,
        t: i64,
        time_base: TimeBase,
        sampling_frequency: f64,
    ) -> Option<AggregateReport> {
        let n = s_f.len();
        if n == 0 {
            return None;
        }

        self.power_spectrum = dsp::magnitude_spectrum(s_f);

        let lo = low.min(n.saturating_sub(1));
        let hi = high.min(n.saturating_sub(1));
        if lo <= hi {
            if let Some((p_max, _)) = self.power_spectrum[lo..=hi]
                .iter()
                .enumerate()
                .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
            {
                let bin = lo + p_max;
                let bpm = bin as f64 * fps * 60.0 / n as f64;
                self.bpms.push(bpm);
                self.last_bpm = Some(bpm);
            }
        }

        // Anchored at 0, not at the first observed `t` (matching
        // `RPPG.cpp`'s `lastSamplingTime = 0` initializer): the first frame
        // is due only once `t` itself has crossed the sampling interval,
        // not unconditionally.
        let last = self.last_sampling_time.unwrap_or(0);
        let due = time_base.to_seconds(t - last) >= 1.0 / sampling_frequency;

        if !due || self.bpms.is_empty() {
            if due {
                self.last_sampling_time = Some(t);
            }
            return None;
        }

        self.bpms.sort_by(|a, b| a.partial_cmp(b).unwrap());
        let min = self.bpms[0];
        let max = *self.bpms.last().unwrap();
        let mean = self.bpms.iter().sum::<f64>() / self.bpms.len() as f64;

        self.bpms.clear();
        self.last_sampling_time = Some(t);

        Some(AggregateReport { mean, min, max })
    }

    /// Reset all estimator state; called when the face becomes invalid.
    pub fn clear(&mut self) {
        self.bpms.clear();
        self.power_spectrum.clear();
        // last_sampling_time and last_bpm intentionally survive
        // invalidation: the last reported BPM should remain unchanged
        // when no new peak is found, and aggregate cadence should not
        // reset on every brief tracking loss.
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TB: TimeBase = TimeBase { num: 1, den: 1000 };

    fn sinusoid(n: usize, fps: f64, hz: f64) -> Vec<f64> {
        (0..n)
            .map(|i| (2.0 * std::f64::consts::PI * hz * i as f64 / fps).sin())
            .collect()
    }

    #[test]
    fn peak_bpm_matches_sinusoid_frequency() {
        let fps = 30.0;
        let n = 150;
        let s_f = sinusoid(n, fps, 1.25); // 75 BPM
        let (low, high) = crate::signal::band_bins(n, fps);
        let mut estimator = Estimator::new();
        estimator.update(&s_f, fps, low, high, 0, TB, 1.0);
        let bpm = estimator.last_bpm().unwrap();
        assert!((72.0..=78.0).contains(&bpm), "bpm={bpm}");
    }

    #[test]
    fn aggregate_emits_after_sampling_interval() {
        let fps = 30.0;
        let n = 150;
        let (low, high) = crate::signal::band_bins(n, fps);
        let mut estimator = Estimator::new();

        let bpm_values = [74.0, 76.0, 75.0, 77.0, 75.0];
        let mut report = None;
        for (i, &target_bpm) in bpm_values.iter().enumerate() {
            let hz = target_bpm / 60.0;
            let s_f = sinusoid(n, fps, hz);
            let t = i as i64 * 250; // 250ms apart; last frame lands at t=1000ms, past the 1s anchor.
            report = estimator.update(&s_f, fps, low, high, t, TB, 1.0);
        }

        let report = report.expect("expected an aggregate after 1s elapsed");
        assert!((report.min - 74.0).abs() < 2.0);
        assert!((report.max - 77.0).abs() < 2.0);
        assert!((report.mean - 75.4).abs() < 2.0);
    }

    #[test]
    fn clear_empties_power_spectrum_but_keeps_last_bpm() {
        let fps = 30.0;
        let n = 150;
        let s_f = sinusoid(n, fps, 1.25);
        let (low, high) = crate::signal::band_bins(n, fps);
        let mut estimator = Estimator::new();
        estimator.update(&s_f, fps, low, high, 0, TB, 1.0);
        let bpm_before = estimator.last_bpm();
        estimator.clear();
        assert!(estimator.power_spectrum().is_empty());
        assert_eq!(estimator.last_bpm(), bpm_before);
    }
}
