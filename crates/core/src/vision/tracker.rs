//! Bidirectional KLT feature tracking.

use opencv::calib3d;
use opencv::core::{Mat, Point2f, Size, TermCriteria, TermCriteria_Type, Vector};
use opencv::prelude::*;
use opencv::video;

use super::{rasterize_mask, seed_corners, FaceState, MIN_CORNERS};
use crate::error::Result;
use crate::geometry::{Point, Rect};

const MAX_BACKWARD_DRIFT_SQ: f64 = 4.0; // 2px, squared.
const WIN_SIZE: i32 = 21;
const PYRAMID_LEVELS: i32 = 3;

fn term_criteria() -> Result<TermCriteria> {
    Ok(TermCriteria::new(
        (TermCriteria_Type::COUNT as i32) | (TermCriteria_Type::EPS as i32),
        30,
        0.01,
    )?)
}

/// Advance `face` by one frame of tracking. Returns `Ok(true)`
/// if tracking survived, `Ok(false)` if the face should be invalidated
/// (fewer than [`MIN_CORNERS`] survivors after the bidirectional check).
pub fn track(face: &mut FaceState, gray: &Mat) -> Result<bool> {
    if face.corners.len() < MIN_CORNERS {
        face.corners = seed_corners(&face.last_gray, FaceState::corner_region(face.face_box))?;
    }
    if face.corners.is_empty() {
        return Ok(false);
    }

    let prev_pts: Vector<Point2f> = face.corners.iter().map(|p| p.to_cv()).collect();

    let mut next_pts = Vector::<Point2f>::new();
    let mut status = Vector::<u8>::new();
    let mut err = Vector::<f32>::new();
    video::calc_optical_flow_pyr_lk(
        &face.last_gray,
        gray,
        &prev_pts,
        &mut next_pts,
        &mut status,
        &mut err,
        Size::new(WIN_SIZE, WIN_SIZE),
        PYRAMID_LEVELS,
        term_criteria()?,
        0,
        1e-4,
    )?;

    let mut back_pts = Vector::<Point2f>::new();
    let mut status_back = Vector::<u8>::new();
    let mut err_back = Vector::<f32>::new();
    video::calc_optical_flow_pyr_lk(
        gray,
        &face.last_gray,
        &next_pts,
        &mut back_pts,
        &mut status_back,
        &mut err_back,
        Size::new(WIN_SIZE, WIN_SIZE),
        PYRAMID_LEVELS,
        term_criteria()?,
        0,
        1e-4,
    )?;

    let mut survivors_prev = Vec::new();
    let mut survivors_next = Vec::new();
    for i in 0..prev_pts.len() {
        if status.get(i)? == 0 || status_back.get(i)? == 0 {
            continue;
        }
        let original = Point::from_cv(prev_pts.get(i)?);
        let roundtrip = Point::from_cv(back_pts.get(i)?);
        if original.dist_sq(&roundtrip) < MAX_BACKWARD_DRIFT_SQ {
            survivors_prev.push(original);
            survivors_next.push(Point::from_cv(next_pts.get(i)?));
        }
    }

    if survivors_next.len() < MIN_CORNERS {
        return Ok(false);
    }

    let src: Vector<Point2f> = survivors_prev.iter().map(|p| p.to_cv()).collect();
    let dst: Vector<Point2f> = survivors_next.iter().map(|p| p.to_cv()).collect();
    let mut inliers = Mat::default();
    let affine = calib3d::estimate_affine_2d(
        &src,
        &dst,
        &mut inliers,
        calib3d::RANSAC,
        3.0,
        2000,
        0.99,
        10,
    )?;

    if !affine.empty() {
        face.face_box = transform_rect(&affine, face.face_box)?;
        face.roi = transform_rect(&affine, face.roi)?;
        face.mask = rasterize_mask(gray.size()?, face.roi)?;
    }
    // Degenerate affine estimate: skip the box/ROI update this frame but
    // keep tracking with the survivor corners.

    face.corners = survivors_next;
    face.last_gray = gray.clone();
    Ok(true)
}

/// Apply a 2x3 affine matrix to a rectangle's four corners and return the
/// axis-aligned bounding box of the transformed points.
fn transform_rect(affine: &Mat, rect: Rect) -> Result<Rect> {
    let a00 = *affine.at_2d::<f64>(0, 0)?;
    let a01 = *affine.at_2d::<f64>(0, 1)?;
    let a02 = *affine.at_2d::<f64>(0, 2)?;
    let a10 = *affine.at_2d::<f64>(1, 0)?;
    let a11 = *affine.at_2d::<f64>(1, 1)?;
    let a12 = *affine.at_2d::<f64>(1, 2)?;

    let corners = [
        (rect.x, rect.y),
        (rect.x + rect.width, rect.y),
        (rect.x, rect.y + rect.height),
        (rect.x + rect.width, rect.y + rect.height),
    ];
    let transformed: Vec<(f64, f64)> = corners
        .iter()
        .map(|&(x, y)| (a00 * x + a01 * y + a02, a10 * x + a11 * y + a12))
        .collect();

    let min_x = transformed.iter().map(|p| p.0).fold(f64::INFINITY, f64::min);
    let max_x = transformed
        .iter()
        .map(|p| p.0)
        .fold(f64::NEG_INFINITY, f64::max);
    let min_y = transformed.iter().map(|p| p.1).fold(f64::INFINITY, f64::min);
    let max_y = transformed
        .iter()
        .map(|p| p.1)
        .fold(f64::NEG_INFINITY, f64::max);

    Ok(Rect::new(min_x, min_y, max_x - min_x, max_y - min_y))
}

#[cfg(test)]
mod tests {
    use super::*;
    use opencv::core::Mat1d;

    #[test]
    fn identity_affine_preserves_rect() -> Result<()> {
        let mut affine = Mat1d::new_rows_cols(2, 3)?;
        *affine.at_2d_mut::<f64>(0, 0)? = 1.0;
        *affine.at_2d_mut::<f64>(0, 1)? = 0.0;
        *affine.at_2d_mut::<f64>(0, 2)? = 0.0;
        *affine.at_2d_mut::<f64>(1, 0)? = 0.0;
        *affine.at_2d_mut::<f64>(1, 1)? = 1.0;
        *affine.at_2d_mut::<f64>(1, 2)? = 0.0;

        let rect = Rect::new(10.0, 20.0, 30.0, 40.0);
        let transformed = transform_rect(&affine, rect)?;
        assert!((transformed.x - rect.x).abs() < 1e-9);
        assert!((transformed.y - rect.y).abs() < 1e-9);
        assert!((transformed.width - rect.width).abs() < 1e-9);
        assert!((transformed.height - rect.height).abs() < 1e-9);
        Ok(())
    }

    #[test]
    fn translating_affine_shifts_rect() -> Result<()> {
        let mut affine = Mat1d::new_rows_cols(2, 3)?;
        *affine.at_2d_mut::<f64>(0, 0)? = 1.0;
        *affine.at_2d_mut::<f64>(0, 1)? = 0.0;
        *affine.at_2d_mut::<f64>(0, 2)? = 5.0;
        *affine.at_2d_mut::<f64>(1, 0)? = 0.0;
        *affine.at_2d_mut::<f64>(1, 1)? = 1.0;
        *affine.at_2d_mut::<f64>(1, 2)? = -3.0;

        let rect = Rect::new(0.0, 0.0, 10.0, 10.0);
        let transformed = transform_rect(&affine, rect)?;
        assert!((transformed.x - 5.0).abs() < 1e-9);
        assert!((transformed.y - (-3.0)).abs() < 1e-9);
        Ok(())
    }
}
