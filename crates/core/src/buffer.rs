//! Sliding-window time-series buffer of per-frame channel means.

use nalgebra::DMatrix;

use crate::config::TimeBase;

/// Parallel append-only columns trimmed by time: per-frame channel means,
/// timestamps, and a rescan marker.
///
/// Invariant: `s.rows == t.len() == re.len()`; samples are in strict
/// timestamp order (enforced by the controller, which only ever appends).
#[derive(Debug, Clone, Default)]
pub struct SignalBuffer {
    /// Row-major `N x 3` channel means (B, G, R or R, G, B -- the caller's
    /// channel order is preserved verbatim).
    s: Vec<[f64; 3]>,
    t: Vec<i64>,
    re: Vec<bool>,
}

impl SignalBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.s.len()
    }

    pub fn is_empty(&self) -> bool {
        self.s.is_empty()
    }

    pub fn timestamps(&self) -> &[i64] {
        &self.t
    }

    pub fn rescan_flags(&self) -> &[bool] {
        &self.re
    }

    /// Append a sample, then evict the earliest rows while the window
    /// exceeds `fps * max_signal_size_sec`.
    pub fn push(&mut self, mean_rgb: [f64; 3], t: i64, rescan: bool, time_base: TimeBase, max_signal_size_sec: f64) {
        debug_assert!(
            self.t.last().map_or(true, |&last| t >= last),
            "timestamps must be non-decreasing"
        );
        self.s.push(mean_rgb);
        self.t.push(t);
        self.re.push(rescan);

        let fps = self.fps(time_base);
        if fps.is_finite() {
            let max_rows = (fps * max_signal_size_sec).round() as usize;
            while self.s.len() > max_rows.max(1) {
                self.s.remove(0);
                self.t.remove(0);
                self.re.remove(0);
            }
        }
    }

    /// Clear all columns, e.g. when a face box can no longer be found and
    /// every buffered signal is discarded along with it.
    pub fn clear(&mut self) {
        self.s.clear();
        self.t.clear();
        self.re.clear();
    }

    /// `rows / ((t[last] - t[0]) * time_base)`, or `+inf` when there are
    /// fewer than 2 rows or the timestamp span is zero.
    pub fn fps(&self, time_base: TimeBase) -> f64 {
        if self.s.len() <= 1 {
            return f64::INFINITY;
        }
        let first = self.t[0];
        let last = *self.t.last().unwrap();
        let span = time_base.to_seconds(last - first);
        if span == 0.0 {
            f64::INFINITY
        } else {
            self.s.len() as f64 / span
        }
    }

    /// The channel-means column as an `N x 3` matrix (samples as rows).
    pub fn channel_matrix(&self) -> DMatrix<f64> {
        let rows = self.s.len();
        let mut m = DMatrix::<f64>::zeros(rows, 3);
        for (r, sample) in self.s.iter().enumerate() {
            for c in 0..3 {
                m[(r, c)] = sample[c];
            }
        }
        m
    }

    /// A single channel as an `N x 1` matrix.
    pub fn channel(&self, idx: usize) -> DMatrix<f64> {
        DMatrix::from_iterator(self.s.len(), 1, self.s.iter().map(|sample| sample[idx]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TB: TimeBase = TimeBase { num: 1, den: 1000 };

    #[test]
    fn append_keeps_columns_in_sync() {
        let mut buf = SignalBuffer::new();
        buf.push([1.0, 2.0, 3.0], 0, false, TB, 100.0);
        buf.push([1.0, 2.0, 3.0], 33, true, TB, 100.0);
        assert_eq!(buf.len(), 2);
        assert_eq!(buf.timestamps().len(), 2);
        assert_eq!(buf.rescan_flags().len(), 2);
    }

    #[test]
    fn fps_is_infinite_with_fewer_than_two_rows() {
        let mut buf = SignalBuffer::new();
        assert!(buf.fps(TB).is_infinite());
        buf.push([0.0, 0.0, 0.0], 0, false, TB, 100.0);
        assert!(buf.fps(TB).is_infinite());
    }

    #[test]
    fn fps_matches_rows_over_span() {
        let mut buf = SignalBuffer::new();
        for i in 0..30 {
            buf.push([0.0, 0.0, 0.0], i * 33, false, TB, 1000.0);
        }
        let fps = buf.fps(TB);
        let span = TB.to_seconds(29 * 33);
        let expected = 30.0 / span;
        assert!((fps - expected).abs() < 1e-6);
    }

    #[test]
    fn eviction_bounds_window_to_fps_times_max_seconds() {
        let mut buf = SignalBuffer::new();
        // ~30fps for 200 frames at 5s max window -> should settle at <= 150 rows.
        for i in 0..200i64 {
            buf.push([0.0, 0.0, 0.0], i * 33, false, TB, 5.0);
        }
        assert!(buf.len() <= 151, "len={}", buf.len());
    }

    #[test]
    fn clear_empties_all_columns() {
        let mut buf = SignalBuffer::new();
        buf.push([1.0, 1.0, 1.0], 0, false, TB, 10.0);
        buf.clear();
        assert!(buf.is_empty());
        assert!(buf.timestamps().is_empty());
        assert!(buf.rescan_flags().is_empty());
    }
}
