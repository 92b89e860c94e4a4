//! Geometry cleaning: simplification, sliver removal and small-part filtering.

use geo::{Area, Buffer, MultiPolygon, Polygon, SimplifyVwPreserve};

/// Tolerance for national outlines, in degrees.
pub const NATIONAL_TOLERANCE: f64 = 0.01;
/// Tolerance for subnational regions and coverage smoothing, in degrees.
pub const REGION_TOLERANCE: f64 = 0.005;
/// Buffer distance of the coverage smoothing pass, in degrees.
pub const SMOOTHING_BUFFER: f64 = 0.0001;

/// Geometries smaller than this (degrees²) keep all their parts.
const SMALL_GEOMETRY: f64 = 0.01;
/// Geometries larger than this (degrees²) use the coarse part threshold.
const LARGE_GEOMETRY: f64 = 50.0;
/// Archipelagic or very large countries whose small parts are legitimate land.
const FINE_THRESHOLD_COUNTRIES: [&str; 6] = ["CHL", "IDN", "RUS", "GRL", "CAN", "USA"];

/// Topology-preserving simplification.  Visvalingam-Whyatt works on triangle
/// areas, so a distance tolerance `t` becomes an area threshold of `t²`.
pub fn simplify_preserve(shape: &MultiPolygon<f64>, tolerance: f64) -> MultiPolygon<f64> {
    let simplified = shape.simplify_vw_preserve(tolerance * tolerance);
    drop_degenerate(simplified)
}

/// Part-area threshold (degrees²) for one country's geometry, or `None` when
/// the geometry is small enough to be kept whole.
pub fn small_part_threshold(iso3: &str, total_area: f64) -> Option<f64> {
    if total_area < SMALL_GEOMETRY { return None }
    Some(if FINE_THRESHOLD_COUNTRIES.contains(&iso3) {
        0.01
    } else if total_area > LARGE_GEOMETRY {
        0.1
    } else {
        0.001
    })
}

/// Drop polygons of a multi-part geometry whose area is below the country's
/// threshold.  Single polygons are never filtered.
pub fn remove_small_shapes(shape: MultiPolygon<f64>, iso3: &str) -> MultiPolygon<f64> {
    if shape.0.len() <= 1 { return shape }
    let Some(threshold) = small_part_threshold(iso3, shape.unsigned_area()) else { return shape };
    MultiPolygon(shape.0.into_iter().filter(|p| p.unsigned_area() > threshold).collect())
}

/// The coverage smoothing pass: simplify → buffer → simplify.
pub fn smooth(shape: &MultiPolygon<f64>) -> MultiPolygon<f64> {
    let first = simplify_preserve(shape, REGION_TOLERANCE);
    let buffered = first.buffer(SMOOTHING_BUFFER);
    simplify_preserve(&buffered, REGION_TOLERANCE)
}

/// Remove rings that cannot enclose area.
pub fn drop_degenerate(shape: MultiPolygon<f64>) -> MultiPolygon<f64> {
    MultiPolygon(
        shape.0.into_iter()
            .filter(|p| p.exterior().0.len() >= 4 && p.unsigned_area() > 0.0)
            .map(|p| {
                let (exterior, interiors) = p.into_inner();
                let interiors = interiors.into_iter().filter(|r| r.0.len() >= 4).collect();
                Polygon::new(exterior, interiors)
            })
            .collect(),
    )
}

/// Whether a geometry covers no area.
#[inline]
pub fn is_empty(shape: &MultiPolygon<f64>) -> bool {
    shape.0.is_empty() || shape.unsigned_area() <= 0.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::polygon;

    fn square(x: f64, y: f64, side: f64) -> Polygon<f64> {
        polygon![(x: x, y: y), (x: x + side, y: y), (x: x + side, y: y + side), (x: x, y: y + side)]
    }

    #[test]
    fn thresholds_escalate_with_area() {
        assert_eq!(small_part_threshold("KEN", 0.005), None);
        assert_eq!(small_part_threshold("KEN", 10.0), Some(0.001));
        assert_eq!(small_part_threshold("KEN", 60.0), Some(0.1));
        assert_eq!(small_part_threshold("IDN", 60.0), Some(0.01));
        assert_eq!(small_part_threshold("USA", 1.0), Some(0.01));
    }

    #[test]
    fn small_islands_are_dropped_from_large_countries() {
        let shape = MultiPolygon(vec![square(0.0, 0.0, 8.0), square(20.0, 20.0, 0.2)]);
        let cleaned = remove_small_shapes(shape.clone(), "KEN");
        assert_eq!(cleaned.0.len(), 1);
        // Same geometry in an archipelagic country keeps the island.
        assert_eq!(remove_small_shapes(shape, "IDN").0.len(), 2);
    }

    #[test]
    fn single_polygons_are_never_filtered() {
        let shape = MultiPolygon(vec![square(0.0, 0.0, 0.01)]);
        assert_eq!(remove_small_shapes(shape, "KEN").0.len(), 1);
    }

    #[test]
    fn smoothing_keeps_a_square_square() {
        let shape = MultiPolygon(vec![square(0.0, 0.0, 1.0)]);
        let smoothed = smooth(&shape);
        assert!((smoothed.unsigned_area() - 1.0).abs() < 0.01);
    }
}
