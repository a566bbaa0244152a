//! DSP kernels shared by the three signal-extraction algorithms.
//!
//! Multi-channel signals are represented as `nalgebra::DMatrix<f64>` with one
//! row per sample and one column per channel (the same "samples as rows"
//! convention the original smoothness-priors detrend and PCA step use).
//! Spectral kernels operate on plain `&[f64]` slices via `rustfft`, the same
//! crate `crates/dj/src/library/analysis.rs` and
//! `crates/dj/src/library/qm_tempo.rs` use for their own spectral analysis.

use nalgebra::DMatrix;
use rustfft::num_complex::Complex;
use rustfft::FftPlanner;

/// Per-column normalize: subtract the column mean, divide by the column
/// standard deviation (population, matching OpenCV's `meanStdDev`).
pub fn normalize(a: &DMatrix<f64>) -> DMatrix<f64> {
    let mut b = a.clone();
    let rows = a.nrows() as f64;
    for c in 0..a.ncols() {
        let col = a.column(c);
        let mean = col.sum() / rows;
        let variance = col.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / rows;
        let std_dev = variance.sqrt();
        let mut out = b.column_mut(c);
        if std_dev > 0.0 {
            for (v, src) in out.iter_mut().zip(col.iter()) {
                *v = (src - mean) / std_dev;
            }
        } else {
            for v in out.iter_mut() {
                *v = 0.0;
            }
        }
    }
    b
}

/// Remove step discontinuities at rescan boundaries.
///
/// For every row `i` where `re[i]` is true, subtract the first difference
/// `x[i] - x[i-1]` (per column) from all rows `j >= i`.
pub fn denoise(a: &DMatrix<f64>, re: &[bool]) -> DMatrix<f64> {
    let mut b = a.clone();
    let rows = a.nrows();
    for i in 1..rows {
        if i >= re.len() || !re[i] {
            continue;
        }
        for c in 0..a.ncols() {
            let diff = a[(i, c)] - a[(i - 1, c)];
            for j in i..rows {
                b[(j, c)] -= diff;
            }
        }
    }
    b
}

/// Smoothness-priors detrending: `x' = (I - (I + lambda^2 * D^T D)^-1) x`,
/// with `D` the `(N-2) x N` second-difference operator. `lambda` is the
/// current `fps`, carried as `f64` throughout rather than truncated to an
/// integer.
pub fn detrend(a: &DMatrix<f64>, lambda: f64) -> DMatrix<f64> {
    let rows = a.nrows();
    if rows < 3 {
        return a.clone();
    }

    let mut d2 = DMatrix::<f64>::zeros(rows - 2, rows);
    for i in 0..rows - 2 {
        d2[(i, i)] = 1.0;
        d2[(i, i + 1)] = -2.0;
        d2[(i, i + 2)] = 1.0;
    }

    let identity = DMatrix::<f64>::identity(rows, rows);
    let m = &identity + (lambda * lambda) * d2.transpose() * &d2;

    let chol = match m.cholesky() {
        Some(c) => c,
        None => return a.clone(),
    };
    let trend = chol.solve(a);
    a - trend
}

/// Box-blur low-pass filter applied `n` times with window size `s`.
/// Operates per column along the row (time)
/// axis with replicated edge samples, matching `cv::blur`'s effect on the
/// single-column signals this pipeline always passes through it.
pub fn moving_average(a: &DMatrix<f64>, n: usize, s: usize) -> DMatrix<f64> {
    assert!(s > 0, "moving_average window size must be > 0");
    let mut b = a.clone();
    for _ in 0..n {
        b = box_blur_columns(&b, s);
    }
    b
}

fn box_blur_columns(a: &DMatrix<f64>, s: usize) -> DMatrix<f64> {
    let rows = a.nrows();
    let mut out = a.clone();
    let half = (s / 2) as isize;
    for c in 0..a.ncols() {
        for i in 0..rows {
            let mut sum = 0.0;
            for k in -half..=half {
                let idx = (i as isize + k).clamp(0, rows as isize - 1) as usize;
                sum += a[(idx, c)];
            }
            out[(i, c)] = sum / s as f64;
        }
    }
    out
}

/// 1D real-valued Butterworth bandpass magnitude mask, indexed directly by
/// row/bin number rather than a centered frequency coordinate -- do not
/// reuse this against a 2D signal.
pub fn butterworth_bandpass(cutin: f64, cutoff: f64, order: i32, length: usize) -> Vec<f64> {
    let lowpass = |cutoff: f64| -> Vec<f64> {
        (0..length)
            .map(|i| 1.0 / (1.0 + (i as f64 / cutoff).powi(2 * order)))
            .collect()
    };
    let off = lowpass(cutoff);
    let on = lowpass(cutin);
    off.iter().zip(on.iter()).map(|(a, b)| a - b).collect()
}

/// Forward real-to-complex DFT.
pub fn time_to_frequency(x: &[f64]) -> Vec<Complex<f64>> {
    let mut buffer: Vec<Complex<f64>> = x.iter().map(|&v| Complex::new(v, 0.0)).collect();
    let mut planner = FftPlanner::new();
    let fft = planner.plan_fft_forward(buffer.len());
    fft.process(&mut buffer);
    buffer
}

/// Magnitude of the forward DFT.
pub fn magnitude_spectrum(x: &[f64]) -> Vec<f64> {
    time_to_frequency(x).iter().map(|c| c.norm()).collect()
}

/// Inverse complex-to-real DFT, taking the real part and min-max
/// normalizing the result to `[0, 1]`.
pub fn frequency_to_time(x: &[Complex<f64>]) -> Vec<f64> {
    let mut buffer = x.to_vec();
    let mut planner = FftPlanner::new();
    let ifft = planner.plan_fft_inverse(buffer.len());
    ifft.process(&mut buffer);
    let n = buffer.len() as f64;
    let real: Vec<f64> = buffer.iter().map(|c| c.re / n).collect();
    min_max_normalize(&real)
}

fn min_max_normalize(x: &[f64]) -> Vec<f64> {
    let min = x.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = x.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let span = max - min;
    if span <= 0.0 {
        return vec![0.0; x.len()];
    }
    x.iter().map(|v| (v - min) / span).collect()
}

/// DFT -> Butterworth-bandpass mask -> inverse DFT -> min-max normalize.
/// Fixed order 8.
pub fn bandpass(x: &[f64], low_bin: f64, high_bin: f64) -> Vec<f64> {
    if x.len() < 3 {
        return x.to_vec();
    }
    let spectrum = time_to_frequency(x);
    let mask = butterworth_bandpass(low_bin, high_bin, 8, spectrum.len());
    let filtered: Vec<Complex<f64>> = spectrum
        .iter()
        .zip(mask.iter())
        .map(|(c, m)| c * m)
        .collect();
    frequency_to_time(&filtered)
}

/// Center columns, compute principal components (samples as rows), project
/// to PC space, and return the PC whose DFT magnitude peaks highest within
/// `[low, high]`, its column index, and the full projected PC matrix.
pub fn pca_component(a: &DMatrix<f64>, low: usize, high: usize) -> (Vec<f64>, usize, DMatrix<f64>) {
    let rows = a.nrows();
    let cols = a.ncols();

    let mut centered = a.clone();
    for c in 0..cols {
        let mean = a.column(c).sum() / rows as f64;
        for r in 0..rows {
            centered[(r, c)] -= mean;
        }
    }

    // Covariance matrix (cols x cols) and its eigenvectors.
    let cov = (&centered.transpose() * &centered) / (rows.max(1) as f64 - 1.0).max(1.0);
    let eig = cov.symmetric_eigen();
    // Eigenvectors as rows, largest-variance first.
    let mut order: Vec<usize> = (0..cols).collect();
    order.sort_by(|&i, &j| eig.eigenvalues[j].partial_cmp(&eig.eigenvalues[i]).unwrap());
    let mut eigenvectors = DMatrix::<f64>::zeros(cols, cols);
    for (new_idx, &old_idx) in order.iter().enumerate() {
        eigenvectors.set_column(new_idx, &eig.eigenvectors.column(old_idx));
    }

    let pcs = &centered * &eigenvectors;

    let low_c = low.min(rows.saturating_sub(1));
    let high_c = high.min(rows.saturating_sub(1));

    let mut best_idx = 0usize;
    let mut best_val = f64::NEG_INFINITY;
    for c in 0..pcs.ncols() {
        let col: Vec<f64> = pcs.column(c).iter().cloned().collect();
        let mag = magnitude_spectrum(&col);
        let band = &mag[low_c..=high_c];
        let peak = band.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        if peak > best_val {
            best_val = peak;
            best_idx = c;
        }
    }

    let chosen: Vec<f64> = pcs.column(best_idx).iter().cloned().collect();
    (chosen, best_idx, pcs)
}

/// L1-normalize `p` over `[low, high]`, square twice, L1-normalize again,
/// then return the power-weighted centroid `sum(i * p[i])` over the band.
/// The accumulator is zero-initialized, unlike the uninitialized local the
/// original C++ reads here.
pub fn weighted_squares_mean_index(p: &[f64], low: usize, high: usize) -> f64 {
    let high = high.min(p.len().saturating_sub(1));
    let mut a = l1_normalize_band(p, low, high);
    for v in a.iter_mut() {
        *v = (*v * *v) * (*v * *v);
    }
    let a = l1_normalize_band(&a, low, high);
    let mut result = 0.0;
    for i in low..=high {
        result += a[i] * i as f64;
    }
    result
}

/// Power-weighted centroid without the squaring step.
pub fn weighted_mean_index(p: &[f64], low: usize, high: usize) -> f64 {
    let high = high.min(p.len().saturating_sub(1));
    let a = l1_normalize_band(p, low, high);
    let mut result = 0.0;
    for i in low..=high {
        result += a[i] * i as f64;
    }
    result
}

fn l1_normalize_band(p: &[f64], low: usize, high: usize) -> Vec<f64> {
    let high = high.min(p.len().saturating_sub(1));
    let sum: f64 = p[low..=high].iter().map(|v| v.abs()).sum();
    if sum <= 0.0 {
        return p.to_vec();
    }
    p.iter().map(|v| v / sum).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn col_vec(values: &[f64]) -> DMatrix<f64> {
        DMatrix::from_column_slice(values.len(), 1, values)
    }

    #[test]
    fn normalize_round_trip_recovers_input() {
        let a = col_vec(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        let normalized = normalize(&a);
        let mean = a.column(0).sum() / a.nrows() as f64;
        let variance = a.column(0).iter().map(|v| (v - mean).powi(2)).sum::<f64>() / a.nrows() as f64;
        let std_dev = variance.sqrt();
        for i in 0..a.nrows() {
            let recovered = normalized[(i, 0)] * std_dev + mean;
            assert!((recovered - a[(i, 0)]).abs() < 1e-9);
        }
    }

    #[test]
    fn denoise_removes_step_at_rescan() {
        let a = col_vec(&[1.0, 1.0, 1.0, 10.0, 10.0, 10.0]);
        let re = [false, false, false, true, false, false];
        let b = denoise(&a, &re);
        for i in 0..6 {
            assert!((b[(i, 0)] - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn detrend_is_identity_below_three_rows() {
        let a = col_vec(&[1.0, 2.0]);
        let b = detrend(&a, 30.0);
        assert_eq!(a, b);
    }

    #[test]
    fn detrend_removes_linear_trend() {
        let n = 60;
        let x: Vec<f64> = (0..n).map(|i| i as f64 * 0.1 + 5.0).collect();
        let a = col_vec(&x);
        let b = detrend(&a, 30.0);
        // A pure linear trend should be suppressed close to zero.
        let max_abs = b.iter().cloned().fold(0.0f64, |m, v| m.max(v.abs()));
        assert!(max_abs < 0.5, "trend not removed: max={max_abs}");
    }

    #[test]
    fn moving_average_smooths_spike() {
        let mut values = vec![0.0; 21];
        values[10] = 21.0;
        let a = col_vec(&values);
        let b = moving_average(&a, 1, 3);
        assert!(b[(10, 0)] < 21.0);
        assert!(b[(10, 0)] > 0.0);
    }

    #[test]
    fn bandpass_passes_inband_sinusoid() {
        let n = 256;
        // Bin 20 out of 256 samples.
        let x: Vec<f64> = (0..n)
            .map(|i| (2.0 * std::f64::consts::PI * 20.0 * i as f64 / n as f64).sin())
            .collect();
        let filtered = bandpass(&x, 10.0, 40.0);
        let energy: f64 = filtered.iter().map(|v| v * v).sum();
        assert!(energy > 0.0);
    }

    #[test]
    fn weighted_squares_mean_index_centers_on_peak() {
        let mut p = vec![0.0; 50];
        p[30] = 1.0;
        let idx = weighted_squares_mean_index(&p, 10, 40);
        assert!((idx - 30.0).abs() < 1.0);
    }

    #[test]
    fn butterworth_bandpass_mask_peaks_in_band() {
        let mask = butterworth_bandpass(10.0, 40.0, 8, 100);
        let in_band = mask[25];
        let below = mask[2];
        let above = mask[90];
        assert!(in_band > below);
        assert!(in_band > above);
    }
}
