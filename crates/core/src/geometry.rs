//! Thin geometry wrappers over the vision backend's primitive types.
//!
//! Small newtype wrappers around foreign-crate geometry, the same pattern
//! as `crates/core/src/artnet/network_config.rs` in the console this crate
//! grew out of, rather than re-deriving a rectangle/point type from
//! scratch.

use opencv::core::{Point2f, Rect as CvRect};

/// Axis-aligned rectangle over the image plane.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    /// Top-left corner.
    #[inline]
    pub fn tl(&self) -> (f64, f64) {
        (self.x, self.y)
    }

    /// Squared Euclidean distance between this rect's top-left and `other`'s.
    #[inline]
    pub fn tl_dist_sq(&self, other: &Rect) -> f64 {
        let (ax, ay) = self.tl();
        let (bx, by) = other.tl();
        (ax - bx).powi(2) + (ay - by).powi(2)
    }

    /// A sub-rectangle at fractional offsets/sizes relative to this rect's
    /// top-left and dimensions, e.g. the forehead ROI within a face box.
    pub fn sub_rect(&self, fx: f64, fy: f64, fwidth: f64, fheight: f64) -> Rect {
        Rect::new(
            self.x + fx * self.width,
            self.y + fy * self.height,
            fwidth * self.width,
            fheight * self.height,
        )
    }

    pub fn to_cv(self) -> CvRect {
        CvRect::new(
            self.x.round() as i32,
            self.y.round() as i32,
            self.width.round().max(1.0) as i32,
            self.height.round().max(1.0) as i32,
        )
    }

    pub fn from_cv(r: CvRect) -> Self {
        Rect::new(r.x as f64, r.y as f64, r.width as f64, r.height as f64)
    }
}

/// A single 2D feature point, tracked across frames by the KLT tracker.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    #[inline]
    pub fn dist_sq(&self, other: &Point) -> f64 {
        (self.x - other.x).powi(2) + (self.y - other.y).powi(2)
    }

    pub fn to_cv(self) -> Point2f {
        Point2f::new(self.x as f32, self.y as f32)
    }

    pub fn from_cv(p: Point2f) -> Self {
        Point::new(p.x as f64, p.y as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sub_rect_computes_forehead_roi() {
        let face = Rect::new(100.0, 100.0, 200.0, 200.0);
        // forehead box: x in [0.3,0.7]*w, y in [0.1,0.25]*h
        let roi = face.sub_rect(0.3, 0.1, 0.4, 0.15);
        assert_eq!(roi.x, 160.0);
        assert_eq!(roi.y, 120.0);
        assert_eq!(roi.width, 80.0);
        assert_eq!(roi.height, 30.0);
    }

    #[test]
    fn tl_dist_sq_is_symmetric() {
        let a = Rect::new(0.0, 0.0, 10.0, 10.0);
        let b = Rect::new(3.0, 4.0, 10.0, 10.0);
        assert_eq!(a.tl_dist_sq(&b), b.tl_dist_sq(&a));
        assert_eq!(a.tl_dist_sq(&b), 25.0);
    }
}
