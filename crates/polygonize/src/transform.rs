//! Affine pixel-to-world transform in the GDAL / rasterio convention.
//!
//! ```text
//! x = c + a * col + b * row
//! y = f + d * col + e * row
//! ```
//!
//! `(col, row)` address pixel *corners*: `(0, 0)` is the outer corner of the
//! top-left pixel and `(width, height)` the outer corner of the bottom-right one.

use geo::Coord;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GeoTransform {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub e: f64,
    pub f: f64,
}

impl GeoTransform {
    /// North-up transform from the top-left corner and the pixel size.
    /// `pixel_height` is positive; the row axis points south.
    pub fn north_up(origin_x: f64, origin_y: f64, pixel_width: f64, pixel_height: f64) -> Self {
        Self { a: pixel_width, b: 0.0, c: origin_x, d: 0.0, e: -pixel_height, f: origin_y }
    }

    /// Identity transform (pixel space == world space).
    pub fn identity() -> Self {
        Self { a: 1.0, b: 0.0, c: 0.0, d: 0.0, e: 1.0, f: 0.0 }
    }

    /// Map a pixel-corner coordinate to world coordinates.
    #[inline]
    pub fn apply(&self, col: f64, row: f64) -> Coord<f64> {
        Coord {
            x: self.c + self.a * col + self.b * row,
            y: self.f + self.d * col + self.e * row,
        }
    }

    /// Map a world coordinate back to (fractional) pixel-corner coordinates.
    /// Returns `None` for a degenerate (non-invertible) transform.
    pub fn invert(&self, x: f64, y: f64) -> Option<(f64, f64)> {
        let det = self.a * self.e - self.b * self.d;
        if det == 0.0 || !det.is_finite() { return None }
        let dx = x - self.c;
        let dy = y - self.f;
        Some(((self.e * dx - self.b * dy) / det, (self.a * dy - self.d * dx) / det))
    }

    /// World coordinate of the centre of pixel `(col, row)`.
    #[inline]
    pub fn pixel_center(&self, col: usize, row: usize) -> Coord<f64> {
        self.apply(col as f64 + 0.5, row as f64 + 0.5)
    }

    /// Area of one pixel in world units.
    #[inline]
    pub fn pixel_area(&self) -> f64 {
        (self.a * self.e - self.b * self.d).abs()
    }

    /// Transform of a sub-window whose top-left pixel is `(col_off, row_off)`.
    pub fn window(&self, col_off: i64, row_off: i64) -> Self {
        let origin = self.apply(col_off as f64, row_off as f64);
        Self { c: origin.x, f: origin.y, ..*self }
    }

    /// Whether the transform has no rotation/shear terms.
    #[inline]
    pub fn is_north_up(&self) -> bool {
        self.b == 0.0 && self.d == 0.0
    }
}

impl Default for GeoTransform {
    fn default() -> Self { Self::identity() }
}

#[cfg(test)]
mod tests {
    use super::GeoTransform;

    #[test]
    fn north_up_round_trips_corners() {
        let t = GeoTransform::north_up(10.0, 5.0, 0.5, 0.25);
        let c = t.apply(4.0, 8.0);
        assert_eq!((c.x, c.y), (12.0, 3.0));
        let (col, row) = t.invert(c.x, c.y).unwrap();
        assert!((col - 4.0).abs() < 1e-12 && (row - 8.0).abs() < 1e-12);
    }

    #[test]
    fn window_shifts_origin_only() {
        let t = GeoTransform::north_up(0.0, 10.0, 1.0, 1.0);
        let w = t.window(3, 2);
        assert_eq!((w.c, w.f), (3.0, 8.0));
        assert_eq!((w.a, w.e), (t.a, t.e));
    }

    #[test]
    fn degenerate_transform_does_not_invert() {
        let t = GeoTransform { a: 0.0, b: 0.0, c: 0.0, d: 0.0, e: 0.0, f: 0.0 };
        assert!(t.invert(1.0, 1.0).is_none());
    }
}
