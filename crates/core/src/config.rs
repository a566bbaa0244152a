//! Load-time configuration for the rPPG pipeline.
//!
//! Mirrors the shape of the layered `ConfigManager` in
//! `crates/core/src/config.rs` in the lighting console this grew out of,
//! but flattened: this configuration is read once at `load()` and is
//! immutable for the life of the controller, so there is no schema /
//! valid-range / live-reload layer here.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{Result, RppgError};

/// Signal-extraction algorithm, selects the [`crate::signal::SignalExtractor`]
/// implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RppgAlgorithm {
    /// Green-channel only.
    G,
    /// Principal-component projection.
    Pca,
    /// Chrominance (X - alpha*Y).
    Xminay,
}

impl Default for RppgAlgorithm {
    fn default() -> Self {
        RppgAlgorithm::G
    }
}

/// Face-detector backend, selects the [`crate::vision::FaceDetector`] impl.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FaceDetectorKind {
    Haar,
    Deep,
}

impl Default for FaceDetectorKind {
    fn default() -> Self {
        FaceDetectorKind::Haar
    }
}

/// Explicit rational time base: `seconds = t * num / den`.
///
/// Kept as an integer ratio rather than a float so that variable-framerate
/// decoders can hand in exact presentation-timestamp units (e.g. 1/1000
/// for millisecond timestamps) without accumulating rounding error in the
/// timestamp column itself -- only the threshold comparisons convert to
/// floating point seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeBase {
    pub num: i64,
    pub den: i64,
}

impl TimeBase {
    pub fn new(num: i64, den: i64) -> Self {
        Self { num, den }
    }

    #[inline]
    pub fn to_seconds(self, t: i64) -> f64 {
        (t as f64 * self.num as f64) / self.den as f64
    }
}

impl Default for TimeBase {
    fn default() -> Self {
        // Millisecond timestamps by default.
        TimeBase::new(1, 1000)
    }
}

/// Immutable pipeline configuration, loaded once via [`Config::load`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub rppg_algorithm: RppgAlgorithm,
    pub face_detector: FaceDetectorKind,
    pub width: i32,
    pub height: i32,
    pub time_base: TimeBase,
    /// Downsample factor `d >= 1`: the controller is invoked once per `d`
    /// decoded frames by the caller.
    pub downsample: u32,
    /// Aggregate BPM report cadence, in Hz.
    pub sampling_frequency: f64,
    /// Cadence at which tracking is abandoned for a full re-detect, in Hz.
    pub rescan_frequency: f64,
    /// Seconds of signal required before extraction/estimation runs.
    pub min_signal_size: f64,
    /// Seconds of signal retained in the sliding window before eviction.
    pub max_signal_size: f64,
    pub log_path_prefix: String,
    pub haar_model_path: Option<PathBuf>,
    pub dnn_proto_path: Option<PathBuf>,
    pub dnn_model_path: Option<PathBuf>,
    pub log_mode: bool,
    pub gui_mode: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rppg_algorithm: RppgAlgorithm::default(),
            face_detector: FaceDetectorKind::default(),
            width: 640,
            height: 480,
            time_base: TimeBase::default(),
            downsample: 1,
            sampling_frequency: 1.0,
            rescan_frequency: 1.0,
            min_signal_size: 5.0,
            max_signal_size: 5.0,
            log_path_prefix: "Heartbeat".to_string(),
            haar_model_path: None,
            dnn_proto_path: None,
            dnn_model_path: None,
            log_mode: false,
            gui_mode: false,
        }
    }
}

impl Config {
    /// Load configuration from a JSON file.
    pub fn load<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration: missing model files or an inconsistent
    /// detector/path pairing are surfaced here, at load time, rather than
    /// on first use.
    pub fn validate(&self) -> Result<()> {
        if self.downsample == 0 {
            return Err(RppgError::Configuration(
                "downsample factor must be >= 1".into(),
            ));
        }
        if self.width <= 0 || self.height <= 0 {
            return Err(RppgError::Configuration(
                "width/height must be positive".into(),
            ));
        }
        match self.face_detector {
            FaceDetectorKind::Haar => {
                if self.haar_model_path.is_none() {
                    return Err(RppgError::Configuration(
                        "haar_model_path required for face_detector = haar".into(),
                    ));
                }
            }
            FaceDetectorKind::Deep => {
                if self.dnn_proto_path.is_none() || self.dnn_model_path.is_none() {
                    return Err(RppgError::Configuration(
                        "dnn_proto_path and dnn_model_path required for face_detector = deep"
                            .into(),
                    ));
                }
            }
        }
        Ok(())
    }
}
