//! Signal extraction algorithms: three variants sharing the denoise ->
//! normalize prefix, chosen by [`crate::config::RppgAlgorithm`] rather
//! than an inheritance hierarchy -- the same shape as the `OnsetMethod`
//! enum in `crates/dj/src/library/qm_tempo.rs`.

use nalgebra::DMatrix;

use crate::buffer::SignalBuffer;
use crate::dsp;

/// BGR channel column indices (frames are assumed to arrive BGR-ordered).
const B: usize = 0;
const G: usize = 1;
const R: usize = 2;

/// Algorithm-specific diagnostics surfaced alongside `s_f`, for the
/// optional per-window `_estimation_<t>.csv` trace (see
/// [`crate::logging::TraceLogWriter`]). Populated only when `log_mode` is
/// on; the extraction result itself never depends on it.
#[derive(Debug, Clone, Default)]
pub enum ExtractorTrace {
    #[default]
    None,
    Pca {
        component_index: usize,
    },
    Xminay {
        alpha: f64,
    },
}

impl ExtractorTrace {
    /// Flatten to the `(name, value)` pairs `TraceLogWriter` writes as
    /// extra scalar columns on an estimation trace.
    pub fn columns(&self) -> Vec<(&'static str, f64)> {
        match self {
            ExtractorTrace::None => Vec::new(),
            ExtractorTrace::Pca { component_index } => vec![("component_index", *component_index as f64)],
            ExtractorTrace::Xminay { alpha } => vec![("alpha", *alpha)],
        }
    }
}

/// `extract(SignalBuffer, fps, low, high) -> (Vector, trace)`.
pub trait SignalExtractor {
    /// Returns the extracted, filtered time-domain signal `s_f` alongside
    /// algorithm-specific diagnostics for the optional trace log.
    fn extract(&self, buffer: &SignalBuffer, fps: f64, low: usize, high: usize) -> (Vec<f64>, ExtractorTrace);
}

fn moving_average_window(fps: f64) -> usize {
    ((fps / 6.0).floor() as i64).max(2) as usize
}

/// Green-channel only.
pub struct GreenExtractor;

impl SignalExtractor for GreenExtractor {
    fn extract(&self, buffer: &SignalBuffer, fps: f64, _low: usize, _high: usize) -> (Vec<f64>, ExtractorTrace) {
        let green = buffer.channel(G);
        let denoised = dsp::denoise(&green, buffer.rescan_flags());
        let normalized = dsp::normalize(&denoised);
        let detrended = dsp::detrend(&normalized, fps);
        let smoothed = dsp::moving_average(&detrended, 3, moving_average_window(fps));
        (smoothed.column(0).iter().cloned().collect(), ExtractorTrace::None)
    }
}

/// Principal-component projection, selecting the component whose spectrum
/// peaks within the physiological band.
pub struct PcaExtractor;

impl SignalExtractor for PcaExtractor {
    fn extract(&self, buffer: &SignalBuffer, fps: f64, low: usize, high: usize) -> (Vec<f64>, ExtractorTrace) {
        let all = buffer.channel_matrix();
        let denoised = dsp::denoise(&all, buffer.rescan_flags());
        let normalized = dsp::normalize(&denoised);
        let detrended = dsp::detrend(&normalized, fps);
        let (chosen, component_index, _pcs) = dsp::pca_component(&detrended, low, high);
        let chosen = DMatrix::from_column_slice(chosen.len(), 1, &chosen);
        let smoothed = dsp::moving_average(&chosen, 3, moving_average_window(fps));
        (
            smoothed.column(0).iter().cloned().collect(),
            ExtractorTrace::Pca { component_index },
        )
    }
}

/// Chrominance method: `X = 3R - 2G`, `Y = 1.5R + G - 1.5B`, bandpassed,
/// combined as `X_f - alpha*Y_f` with `alpha = std(X_f)/std(Y_f)` to cancel
/// specular reflection under the standardized-skin-tone assumption.
pub struct XMinusAlphaYExtractor;

impl SignalExtractor for XMinusAlphaYExtractor {
    fn extract(&self, buffer: &SignalBuffer, fps: f64, low: usize, high: usize) -> (Vec<f64>, ExtractorTrace) {
        let all = buffer.channel_matrix();
        let denoised = dsp::denoise(&all, buffer.rescan_flags());
        let normalized = dsp::normalize(&denoised);

        let rows = normalized.nrows();
        let mut x = Vec::with_capacity(rows);
        let mut y = Vec::with_capacity(rows);
        for i in 0..rows {
            let r = normalized[(i, R)];
            let g = normalized[(i, G)];
            let b = normalized[(i, B)];
            x.push(3.0 * r - 2.0 * g);
            y.push(1.5 * r + g - 1.5 * b);
        }

        let x_f = dsp::bandpass(&x, low as f64, high as f64);
        let y_f = dsp::bandpass(&y, low as f64, high as f64);

        let alpha = std_dev(&x_f) / std_dev(&y_f).max(f64::EPSILON);

        let combined: Vec<f64> = x_f.iter().zip(y_f.iter()).map(|(xf, yf)| xf - alpha * yf).collect();
        let combined_mat = DMatrix::from_column_slice(combined.len(), 1, &combined);
        let smoothed = dsp::moving_average(&combined_mat, 3, moving_average_window(fps));
        (
            smoothed.column(0).iter().cloned().collect(),
            ExtractorTrace::Xminay { alpha },
        )
    }
}

fn std_dev(x: &[f64]) -> f64 {
    if x.is_empty() {
        return 0.0;
    }
    let mean = x.iter().sum::<f64>() / x.len() as f64;
    let variance = x.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / x.len() as f64;
    variance.sqrt()
}

/// Physiological band, converted from BPM to bin indices for a window of
/// length `n` sampled at `fps`: 42-240 BPM.
pub fn band_bins(n: usize, fps: f64) -> (usize, usize) {
    let low = ((n as f64 * 42.0 / 60.0 / fps).floor().max(0.0)) as usize;
    let high = ((n as f64 * 240.0 / 60.0 / fps).floor() as i64 + 1).max(0) as usize;
    (low, high.min(n.saturating_sub(1)))
}

pub fn build_extractor(algorithm: crate::config::RppgAlgorithm) -> Box<dyn SignalExtractor> {
    use crate::config::RppgAlgorithm::*;
    match algorithm {
        G => Box::new(GreenExtractor),
        Pca => Box::new(PcaExtractor),
        Xminay => Box::new(XMinusAlphaYExtractor),
    }
}
