//! Face acquisition and KLT tracking.
//!
//! Detector polymorphism follows a "variant chosen by config enum, shared
//! contract" pattern (see `crates/dj/src/library/qm_tempo.rs`
//! `OnsetMethod`): a single [`FaceDetector`] trait with two OpenCV-backed
//! implementations, no shared base state.

pub mod detector;
pub mod tracker;

use opencv::core::{Mat, Scalar, CV_8U};
use opencv::imgproc;
use opencv::prelude::*;

use crate::error::Result;
use crate::geometry::{Point, Rect};

pub use detector::{DnnDetector, FaceDetector, HaarDetector};

/// Sparse feature-point count bounds.
pub const MIN_CORNERS: usize = 5;
pub const MAX_CORNERS: usize = 10;

/// Minimum spacing, in pixels, enforced between seeded corners (see
/// DESIGN.md for the open-question note on the 20-25px range).
pub const MIN_CORNER_DISTANCE: f64 = 20.0;

/// Everything the controller tracks about the currently-acquired face.
///
/// Invariant: exists only while the face is valid -- there is no "invalid
/// but populated" variant; the controller holds `Option<FaceState>`.
pub struct FaceState {
    pub face_box: Rect,
    pub roi: Rect,
    pub mask: Mat,
    pub corners: Vec<Point>,
    pub last_gray: Mat,
}

impl FaceState {
    /// Forehead-like skin ROI within a detected face box:
    /// `x in [0.3, 0.7]*w`, `y in [0.1, 0.25]*h`, relative to the box's
    /// top-left.
    pub fn roi_for_box(face_box: Rect) -> Rect {
        face_box.sub_rect(0.3, 0.1, 0.4, 0.15)
    }

    /// Corner-seeding search region: a trapezoid approximated here, as in
    /// the original, by its bounding rectangle --
    /// `x in [0.22, 0.78]`, `y in [0.21, 0.65]` of the box.
    pub fn corner_region(face_box: Rect) -> Rect {
        face_box.sub_rect(0.22, 0.21, 0.56, 0.44)
    }
}

/// Among `candidates`, pick the one whose top-left is closest to
/// `previous`'s. Any candidate is equally valid on first acquisition.
pub fn nearest_box(candidates: &[Rect], previous: Option<Rect>) -> Option<Rect> {
    match previous {
        None => candidates.first().copied(),
        Some(prev) => candidates
            .iter()
            .copied()
            .min_by(|a, b| {
                a.tl_dist_sq(&prev)
                    .partial_cmp(&b.tl_dist_sq(&prev))
                    .unwrap()
            }),
    }
}

/// Seed corners inside `region` via goodFeaturesToTrack: max 10, quality
/// 0.01, min distance 20px, block size 3, Harris off, k=0.04.
pub fn seed_corners(gray: &Mat, region: Rect) -> Result<Vec<Point>> {
    let size = gray.size()?;
    let mut mask = Mat::zeros(size.height, size.width, CV_8U)?.to_mat()?;
    imgproc::rectangle(
        &mut mask,
        region.to_cv(),
        Scalar::all(255.0),
        -1,
        imgproc::LINE_8,
        0,
    )?;

    let mut corners = opencv::core::Vector::<opencv::core::Point2f>::new();
    imgproc::good_features_to_track(
        gray,
        &mut corners,
        MAX_CORNERS as i32,
        0.01,
        MIN_CORNER_DISTANCE,
        &mask,
        3,
        false,
        0.04,
    )?;

    Ok(corners.iter().map(Point::from_cv).collect())
}

/// Rasterize a boolean mask the size of `frame_size`, true inside `roi`.
pub fn rasterize_mask(frame_size: opencv::core::Size, roi: Rect) -> Result<Mat> {
    let mut mask = Mat::zeros(frame_size.height, frame_size.width, CV_8U)?.to_mat()?;
    imgproc::rectangle(
        &mut mask,
        roi.to_cv(),
        Scalar::all(255.0),
        -1,
        imgproc::LINE_8,
        0,
    )?;
    Ok(mask)
}

/// Run detection, select the nearest box to `previous_box`, seed corners,
/// and build a fresh [`FaceState`].
pub fn acquire_face(
    detector: &mut dyn FaceDetector,
    rgb: &Mat,
    gray: &Mat,
    previous_box: Option<Rect>,
) -> Result<Option<FaceState>> {
    let candidates = detector.detect(rgb, gray)?;
    let Some(face_box) = nearest_box(&candidates, previous_box) else {
        return Ok(None);
    };

    let roi = FaceState::roi_for_box(face_box);
    let corners = seed_corners(gray, FaceState::corner_region(face_box))?;
    let mask = rasterize_mask(gray.size()?, roi)?;

    Ok(Some(FaceState {
        face_box,
        roi,
        mask,
        corners,
        last_gray: gray.clone(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nearest_box_is_any_candidate_on_first_acquisition() {
        let candidates = [Rect::new(0.0, 0.0, 10.0, 10.0)];
        assert_eq!(nearest_box(&candidates, None), Some(candidates[0]));
    }

    #[test]
    fn nearest_box_picks_closest_top_left() {
        let prev = Rect::new(100.0, 100.0, 50.0, 50.0);
        let near = Rect::new(102.0, 101.0, 50.0, 50.0);
        let far = Rect::new(400.0, 400.0, 50.0, 50.0);
        let candidates = [far, near];
        assert_eq!(nearest_box(&candidates, Some(prev)), Some(near));
    }

    #[test]
    fn roi_for_box_matches_expected_fractions() {
        let face_box = Rect::new(0.0, 0.0, 100.0, 100.0);
        let roi = FaceState::roi_for_box(face_box);
        assert_eq!(roi.x, 30.0);
        assert_eq!(roi.y, 10.0);
        assert_eq!(roi.width, 40.0);
        assert_eq!(roi.height, 15.0);
    }
}
