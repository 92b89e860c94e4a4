//! Voronoi cells by half-plane clipping.
//!
//! Each cell starts as the bounding rectangle and is clipped against the
//! perpendicular bisector towards every neighbour, visited in increasing
//! distance through an R-tree.  Once a neighbour is farther than twice the
//! cell's current radius, no later neighbour can cut the cell.

use geo::{Coord, LineString, Polygon, Rect};
use rstar::{primitives::GeomWithData, RTree};

type Site = GeomWithData<[f64; 2], usize>;

/// One convex cell per input point, clipped to `bounds`.  Duplicate points
/// share the cell of the first occurrence; later duplicates get `None`.
pub fn voronoi_cells(points: &[Coord<f64>], bounds: &Rect<f64>) -> Vec<Option<Polygon<f64>>> {
    let tree = RTree::bulk_load(
        points.iter().enumerate().map(|(i, p)| Site::new([p.x, p.y], i)).collect(),
    );

    let frame = vec![
        bounds.min(),
        Coord { x: bounds.max().x, y: bounds.min().y },
        bounds.max(),
        Coord { x: bounds.min().x, y: bounds.max().y },
    ];

    points.iter().enumerate()
        .map(|(i, &p)| {
            let mut cell = frame.clone();
            for site in tree.nearest_neighbor_iter(&[p.x, p.y]) {
                let j = site.data;
                if j == i { continue }
                let q = Coord { x: site.geom()[0], y: site.geom()[1] };
                if q == p {
                    // Coincident points: the lower index owns the cell.
                    if j < i { return None }
                    continue;
                }
                let reach = radius(&cell, p);
                if distance(p, q) > 2.0 * reach { break }
                cell = clip_half_plane(&cell, p, q);
                if cell.len() < 3 { return None }
            }
            let mut ring = cell;
            ring.push(ring[0]);
            Some(Polygon::new(LineString::new(ring), vec![]))
        })
        .collect()
}

#[inline]
fn distance(a: Coord<f64>, b: Coord<f64>) -> f64 {
    ((a.x - b.x).powi(2) + (a.y - b.y).powi(2)).sqrt()
}

/// Farthest cell vertex from the site.
fn radius(cell: &[Coord<f64>], site: Coord<f64>) -> f64 {
    cell.iter().map(|&v| distance(v, site)).fold(0.0, f64::max)
}

/// Keep the part of a convex polygon closer to `p` than to `q`
/// (Sutherland-Hodgman against one bisector).
fn clip_half_plane(cell: &[Coord<f64>], p: Coord<f64>, q: Coord<f64>) -> Vec<Coord<f64>> {
    // Inside when (x - m) · (q - p) <= 0, m the midpoint.
    let m = Coord { x: (p.x + q.x) / 2.0, y: (p.y + q.y) / 2.0 };
    let n = Coord { x: q.x - p.x, y: q.y - p.y };
    let side = |v: Coord<f64>| (v.x - m.x) * n.x + (v.y - m.y) * n.y;

    let mut out = Vec::with_capacity(cell.len() + 1);
    for k in 0..cell.len() {
        let a = cell[k];
        let b = cell[(k + 1) % cell.len()];
        let (sa, sb) = (side(a), side(b));
        if sa <= 0.0 { out.push(a) }
        if (sa < 0.0 && sb > 0.0) || (sa > 0.0 && sb < 0.0) {
            let t = sa / (sa - sb);
            out.push(Coord { x: a.x + t * (b.x - a.x), y: a.y + t * (b.y - a.y) });
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{Area, Contains, Point};

    fn unit_bounds() -> Rect<f64> {
        Rect::new(Coord { x: 0.0, y: 0.0 }, Coord { x: 4.0, y: 4.0 })
    }

    #[test]
    fn two_points_split_the_frame_at_the_bisector() {
        let points = [Coord { x: 1.0, y: 2.0 }, Coord { x: 3.0, y: 2.0 }];
        let cells = voronoi_cells(&points, &unit_bounds());
        let left = cells[0].as_ref().unwrap();
        let right = cells[1].as_ref().unwrap();
        assert!((left.unsigned_area() - 8.0).abs() < 1e-9);
        assert!((right.unsigned_area() - 8.0).abs() < 1e-9);
        assert!(left.contains(&Point::new(1.9, 3.9)));
        assert!(!left.contains(&Point::new(2.1, 0.1)));
    }

    #[test]
    fn cells_tile_the_frame() {
        let points: Vec<Coord<f64>> = (0..16)
            .map(|i| Coord { x: 0.3 + (i % 4) as f64 * 0.9 + (i / 4) as f64 * 0.05, y: 0.4 + (i / 4) as f64 * 0.95 })
            .collect();
        let cells = voronoi_cells(&points, &unit_bounds());
        let total: f64 = cells.iter().flatten().map(|c| c.unsigned_area()).sum();
        assert!((total - 16.0).abs() < 1e-6);
    }

    #[test]
    fn duplicate_points_yield_one_cell() {
        let points = [Coord { x: 1.0, y: 1.0 }, Coord { x: 1.0, y: 1.0 }, Coord { x: 3.0, y: 3.0 }];
        let cells = voronoi_cells(&points, &unit_bounds());
        assert!(cells[0].is_some());
        assert!(cells[1].is_none());
        let total: f64 = cells.iter().flatten().map(|c| c.unsigned_area()).sum();
        assert!((total - 16.0).abs() < 1e-9);
    }
}
