//! Two face-detector backends sharing one contract.

use std::path::Path;

use opencv::core::{Mat, Rect as CvRect, Scalar, Size, Vector};
use opencv::dnn::{self, NetTrait, NetTraitConst};
use opencv::objdetect::{CascadeClassifier, CascadeClassifierTrait, CascadeClassifierTraitConst};
use opencv::prelude::*;

use crate::error::{Result, RppgError};
use crate::geometry::Rect;

/// `detect(frame_rgb, frame_gray) -> list<Rect>`.
pub trait FaceDetector: Send {
    fn detect(&mut self, rgb: &Mat, gray: &Mat) -> Result<Vec<Rect>>;
}

/// Multi-scale Haar cascade on grayscale.
pub struct HaarDetector {
    classifier: CascadeClassifier,
    /// Minimum detection size as a fraction of `min(width, height)`.
    /// 0.4 for the main pipeline, 0.2 for the "mobile" variant.
    min_size_fraction: f64,
}

impl HaarDetector {
    pub fn new<P: AsRef<Path>>(cascade_path: P, min_size_fraction: f64) -> Result<Self> {
        let path = cascade_path.as_ref();
        let classifier = CascadeClassifier::new(
            path.to_str()
                .ok_or_else(|| RppgError::Configuration("non-utf8 cascade path".into()))?,
        )
        .map_err(|e| RppgError::Configuration(format!("loading haar cascade: {e}")))?;
        Ok(Self {
            classifier,
            min_size_fraction,
        })
    }
}

impl FaceDetector for HaarDetector {
    fn detect(&mut self, _rgb: &Mat, gray: &Mat) -> Result<Vec<Rect>> {
        let size = gray.size()?;
        let min_dim = size.width.min(size.height) as f64;
        let min_size = (min_dim * self.min_size_fraction).max(1.0).round() as i32;

        let mut objects = Vector::<CvRect>::new();
        self.classifier.detect_multi_scale(
            gray,
            &mut objects,
            1.1,
            3,
            0,
            Size::new(min_size, min_size),
            Size::new(0, 0),
        )?;

        Ok(objects.iter().map(Rect::from_cv).collect())
    }
}

/// Caffe-style single-shot DNN detector.
pub struct DnnDetector {
    net: dnn::Net,
    confidence_threshold: f32,
}

const DNN_INPUT_SIZE: i32 = 300;
const DNN_MEAN: (f64, f64, f64) = (104.0, 177.0, 123.0);

impl DnnDetector {
    pub fn new<P: AsRef<Path>>(proto_path: P, model_path: P, confidence_threshold: f32) -> Result<Self> {
        let proto = proto_path
            .as_ref()
            .to_str()
            .ok_or_else(|| RppgError::Configuration("non-utf8 proto path".into()))?;
        let model = model_path
            .as_ref()
            .to_str()
            .ok_or_else(|| RppgError::Configuration("non-utf8 model path".into()))?;
        let net = dnn::read_net_from_caffe(proto, model)
            .map_err(|e| RppgError::Configuration(format!("loading dnn model: {e}")))?;
        Ok(Self {
            net,
            confidence_threshold,
        })
    }
}

impl FaceDetector for DnnDetector {
    fn detect(&mut self, rgb: &Mat, _gray: &Mat) -> Result<Vec<Rect>> {
        let frame_size = rgb.size()?;

        let blob = dnn::blob_from_image(
            rgb,
            1.0,
            Size::new(DNN_INPUT_SIZE, DNN_INPUT_SIZE),
            Scalar::new(DNN_MEAN.0, DNN_MEAN.1, DNN_MEAN.2, 0.0),
            false,
            false,
            opencv::core::CV_32F,
        )?;
        self.net.set_input(&blob, "", 1.0, Scalar::default())?;
        let detections: Mat = self.net.forward_single_def()?;

        // detections shape: [1, 1, N, 7] - [_, class, confidence, x1, y1, x2, y2] normalized.
        let num_detections = detections.mat_size()[2];
        let mut boxes = Vec::new();
        for i in 0..num_detections {
            let confidence = *detections.at_nd::<f32>(&[0, 0, i, 2])?;
            if confidence <= self.confidence_threshold {
                continue;
            }
            let x1 = *detections.at_nd::<f32>(&[0, 0, i, 3])? as f64 * frame_size.width as f64;
            let y1 = *detections.at_nd::<f32>(&[0, 0, i, 4])? as f64 * frame_size.height as f64;
            let x2 = *detections.at_nd::<f32>(&[0, 0, i, 5])? as f64 * frame_size.width as f64;
            let y2 = *detections.at_nd::<f32>(&[0, 0, i, 6])? as f64 * frame_size.height as f64;
            boxes.push(Rect::new(x1, y1, (x2 - x1).max(1.0), (y2 - y1).max(1.0)));
        }
        Ok(boxes)
    }
}
