//! Command-line front end: decodes a camera or video file frame by frame,
//! feeds each one to [`rppg_core::Rppg`], optionally renders a live GUI
//! overlay, and optionally compares the result against a baseline trace.

mod baseline;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use opencv::core::{Mat, Point, Scalar};
use opencv::prelude::*;
use opencv::{highgui, imgproc, videoio};

use rppg_core::config::{Config, FaceDetectorKind, RppgAlgorithm, TimeBase};
use rppg_core::Rppg;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum RppgAlgArg {
    G,
    Pca,
    Xminay,
}

impl From<RppgAlgArg> for RppgAlgorithm {
    fn from(value: RppgAlgArg) -> Self {
        match value {
            RppgAlgArg::G => RppgAlgorithm::G,
            RppgAlgArg::Pca => RppgAlgorithm::Pca,
            RppgAlgArg::Xminay => RppgAlgorithm::Xminay,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum FaceDetArg {
    Haar,
    Deep,
}

impl From<FaceDetArg> for FaceDetectorKind {
    fn from(value: FaceDetArg) -> Self {
        match value {
            FaceDetArg::Haar => FaceDetectorKind::Haar,
            FaceDetArg::Deep => FaceDetectorKind::Deep,
        }
    }
}

/// Remote-photoplethysmography heart-rate estimation from facial video.
#[derive(Debug, Parser)]
#[command(name = "heartbeat")]
struct Args {
    /// Video file to read; omit to open the default camera (device 0).
    #[arg(short = 'i', long)]
    input: Option<PathBuf>,

    /// Signal-extraction algorithm.
    #[arg(long = "rppg", value_enum, default_value = "g")]
    rppg: RppgAlgArg,

    /// Face-detector backend.
    #[arg(long = "facedet", value_enum, default_value = "haar")]
    facedet: FaceDetArg,

    /// Cadence at which tracking is abandoned for a full re-detect, in Hz.
    #[arg(short = 'r', long = "rescan-frequency", default_value_t = 1.0)]
    rescan_frequency: f64,

    /// Aggregate BPM report cadence, in Hz.
    #[arg(short = 'f', long = "sampling-frequency", default_value_t = 1.0)]
    sampling_frequency: f64,

    /// Seconds of signal required before extraction/estimation runs.
    #[arg(long = "min", default_value_t = 5.0)]
    min_signal_size: f64,

    /// Seconds of signal retained in the sliding window before eviction.
    #[arg(long = "max", default_value_t = 5.0)]
    max_signal_size: f64,

    /// Show a live window with the face box, ROI, corners, and BPM overlay.
    #[arg(long = "gui")]
    gui: bool,

    /// Write per-window signal/estimation trace CSVs alongside the BPM logs.
    #[arg(long = "log")]
    log: bool,

    /// Process every Nth decoded frame.
    #[arg(long = "ds", default_value_t = 1)]
    downsample: u32,

    #[arg(long = "haar-model", default_value = "models/haarcascade_frontalface_alt.xml")]
    haar_model: PathBuf,

    #[arg(long = "dnn-proto")]
    dnn_proto: Option<PathBuf>,

    #[arg(long = "dnn-model")]
    dnn_model: Option<PathBuf>,

    /// Prefix for the `_bpm.csv` / `_bpmAll.csv` log files.
    #[arg(long = "log-prefix")]
    log_prefix: Option<String>,

    /// Reference `time,bpm` CSV to compare the live estimate against.
    #[arg(long = "baseline")]
    baseline: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let face_detector: FaceDetectorKind = args.facedet.into();
    let log_prefix = args.log_prefix.clone().unwrap_or_else(|| {
        format!("Heartbeat_{}", chrono::Local::now().format("%Y%m%d_%H%M%S"))
    });

    let config = Config {
        rppg_algorithm: args.rppg.into(),
        face_detector,
        time_base: TimeBase::new(1, 1000),
        downsample: args.downsample,
        sampling_frequency: args.sampling_frequency,
        rescan_frequency: args.rescan_frequency,
        min_signal_size: args.min_signal_size,
        max_signal_size: args.max_signal_size,
        log_path_prefix: log_prefix,
        haar_model_path: Some(args.haar_model.clone()),
        dnn_proto_path: args.dnn_proto.clone(),
        dnn_model_path: args.dnn_model.clone(),
        log_mode: args.log,
        gui_mode: args.gui,
        ..Config::default()
    };
    config.validate().context("invalid configuration")?;

    let mut rppg = Rppg::load(config)?;
    let baseline = args
        .baseline
        .as_ref()
        .map(baseline::Baseline::load)
        .transpose()
        .context("loading baseline csv")?;

    let mut capture = match &args.input {
        Some(path) => videoio::VideoCapture::from_file(
            path.to_str().context("input path is not valid UTF-8")?,
            videoio::CAP_ANY,
        )?,
        None => videoio::VideoCapture::new(0, videoio::CAP_ANY)?,
    };
    if !videoio::VideoCapture::is_opened(&capture)? {
        anyhow::bail!("failed to open video source");
    }

    if args.gui {
        highgui::named_window("heartbeat", highgui::WINDOW_AUTOSIZE)?;
    }

    let mut frame_index: u64 = 0;
    let mut rgb = Mat::default();
    loop {
        if !capture.read(&mut rgb)? || rgb.empty() {
            break;
        }
        frame_index += 1;
        if frame_index % args.downsample as u64 != 0 {
            continue;
        }

        let mut gray = Mat::default();
        imgproc::cvt_color(&rgb, &mut gray, imgproc::COLOR_BGR2GRAY, 0)?;

        let t = capture.get(videoio::CAP_PROP_POS_MSEC)? as i64;
        let output = rppg.process_frame(&rgb, &gray, t);

        if let (Some(bpm), Some(baseline)) = (output.bpm, &baseline) {
            if let Some(reference) = baseline.nearest(t) {
                log::info!("t={t}ms bpm={bpm:.1} baseline={reference:.1}");
            }
        }

        if args.gui {
            let mut frame = rgb.clone();
            draw_overlay(&mut frame, &rppg, output.bpm)?;
            highgui::imshow("heartbeat", &frame)?;
            if highgui::wait_key(1)? == 27 {
                break;
            }
        }
    }

    Ok(())
}

fn draw_overlay(frame: &mut Mat, rppg: &Rppg, bpm: Option<f64>) -> Result<()> {
    if let Some(face_box) = rppg.face_box() {
        imgproc::rectangle(
            frame,
            face_box.to_cv(),
            Scalar::new(0.0, 255.0, 0.0, 0.0),
            2,
            imgproc::LINE_8,
            0,
        )?;
    }
    if let Some(roi) = rppg.roi() {
        imgproc::rectangle(
            frame,
            roi.to_cv(),
            Scalar::new(255.0, 0.0, 0.0, 0.0),
            1,
            imgproc::LINE_8,
            0,
        )?;
    }

    let label = match bpm {
        Some(bpm) => format!("{bpm:.0} bpm"),
        None => "-- bpm".to_string(),
    };
    imgproc::put_text(
        frame,
        &label,
        Point::new(10, 30),
        imgproc::FONT_HERSHEY_SIMPLEX,
        1.0,
        Scalar::new(0.0, 255.0, 255.0, 0.0),
        2,
        imgproc::LINE_8,
        false,
    )?;
    Ok(())
}
