use std::fmt;

use geo::{BooleanOps, MultiPolygon};
use serde::{Deserialize, Serialize};

/// Set operation applied between two polygon layers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverlayOp {
    Intersection,
    /// Left minus right.
    Difference,
    SymmetricDifference,
}

impl OverlayOp {
    /// Apply the operation to two shapes.
    pub fn apply(self, a: &MultiPolygon<f64>, b: &MultiPolygon<f64>) -> MultiPolygon<f64> {
        match self {
            Self::Intersection => a.intersection(b),
            Self::Difference => a.difference(b),
            Self::SymmetricDifference => a.xor(b),
        }
    }
}

impl fmt::Display for OverlayOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Intersection => "intersection",
            Self::Difference => "difference",
            Self::SymmetricDifference => "symmetric_difference",
        })
    }
}

/// Dissolve many shapes into one.
pub fn union_all<'a>(shapes: impl IntoIterator<Item = &'a MultiPolygon<f64>>) -> MultiPolygon<f64> {
    geo::unary_union(shapes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{polygon, Area};

    fn rect(x0: f64, y0: f64, x1: f64, y1: f64) -> MultiPolygon<f64> {
        MultiPolygon(vec![polygon![(x: x0, y: y0), (x: x1, y: y0), (x: x1, y: y1), (x: x0, y: y1)]])
    }

    #[test]
    fn intersection_area_never_exceeds_either_input() {
        let cases = [
            (rect(0.0, 0.0, 2.0, 2.0), rect(1.0, 1.0, 3.0, 3.0)),
            (rect(0.0, 0.0, 4.0, 4.0), rect(1.0, 1.0, 2.0, 2.0)),
            (rect(0.0, 0.0, 1.0, 1.0), rect(5.0, 5.0, 6.0, 6.0)),
        ];
        for (a, b) in cases {
            let i = OverlayOp::Intersection.apply(&a, &b).unsigned_area();
            assert!(i <= a.unsigned_area().min(b.unsigned_area()) + 1e-9);
        }
    }

    #[test]
    fn operations_partition_the_union() {
        let a = rect(0.0, 0.0, 2.0, 2.0);
        let b = rect(1.0, 0.0, 3.0, 2.0);
        let i = OverlayOp::Intersection.apply(&a, &b).unsigned_area();
        let d = OverlayOp::Difference.apply(&a, &b).unsigned_area();
        let x = OverlayOp::SymmetricDifference.apply(&a, &b).unsigned_area();
        assert!((i - 2.0).abs() < 1e-9);
        assert!((d - 2.0).abs() < 1e-9);
        assert!((x - 4.0).abs() < 1e-9);
        assert!((union_all([&a, &b]).unsigned_area() - 6.0).abs() < 1e-9);
    }
}
