use geo::{BoundingRect, MultiPolygon, Rect};
use rstar::RTree;

use crate::geom::{envelope_of, BoundingBox};

/// Borrowed polygons plus an R-tree over their bounding boxes, used to prune
/// candidate pairs before any exact overlay.
#[derive(Debug)]
pub(crate) struct Geometries<'a> {
    shapes: &'a [MultiPolygon<f64>],
    rtree: RTree<BoundingBox>,
}

impl<'a> Geometries<'a> {
    /// Index a slice of MultiPolygons; empty ones are left out of the tree.
    pub(crate) fn new(shapes: &'a [MultiPolygon<f64>]) -> Self {
        Self {
            rtree: RTree::bulk_load(
                shapes.iter().enumerate()
                    .filter_map(|(i, shape)| shape.bounding_rect().map(|rect| BoundingBox::new(i, rect)))
                    .collect()
            ),
            shapes,
        }
    }

    #[inline] pub(crate) fn shapes(&self) -> &'a [MultiPolygon<f64>] { self.shapes }

    /// Indices of shapes whose bounding box intersects `rect`, ascending.
    pub(crate) fn candidates(&self, rect: &Rect<f64>) -> Vec<usize> {
        let mut hits: Vec<usize> = self.rtree.locate_in_envelope_intersecting(&envelope_of(rect))
            .map(|b| b.idx())
            .collect();
        hits.sort_unstable();
        hits
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{polygon, Coord, MultiPolygon};

    fn square(x: f64, y: f64) -> MultiPolygon<f64> {
        MultiPolygon(vec![polygon![(x: x, y: y), (x: x + 1.0, y: y), (x: x + 1.0, y: y + 1.0), (x: x, y: y + 1.0)]])
    }

    #[test]
    fn candidates_are_pruned_by_bbox() {
        let shapes = vec![square(0.0, 0.0), square(5.0, 5.0), square(0.5, 0.5)];
        let index = Geometries::new(&shapes);
        let query = Rect::new(Coord { x: 0.2, y: 0.2 }, Coord { x: 0.8, y: 0.8 });
        assert_eq!(index.candidates(&query), vec![0, 2]);
        let far = Rect::new(Coord { x: 10.0, y: 10.0 }, Coord { x: 11.0, y: 11.0 });
        assert!(index.candidates(&far).is_empty());
    }
}
