//! Boundary tracing: turn a labelled component into closed rings in pixel space.
//!
//! Every pixel side that borders a pixel outside the component becomes a
//! directed unit edge, oriented so the component lies on the left (positive
//! shoelace area in `(col, row)` coordinates).  Edges are chained into rings
//! by always taking the leftmost available turn at each vertex, which keeps
//! diagonally touching pixels in separate rings (4-connectivity).

use ahash::AHashMap;

// ---------------------------------------------------------------------------
// Directions
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Dir { E, S, W, N }

impl Dir {
    #[inline]
    fn delta(self) -> (i64, i64) {
        match self {
            Dir::E => (1, 0),
            Dir::S => (0, 1),
            Dir::W => (-1, 0),
            Dir::N => (0, -1),
        }
    }

    #[inline]
    fn left(self) -> Dir {
        match self { Dir::E => Dir::S, Dir::S => Dir::W, Dir::W => Dir::N, Dir::N => Dir::E }
    }

    #[inline]
    fn right(self) -> Dir {
        match self { Dir::E => Dir::N, Dir::N => Dir::W, Dir::W => Dir::S, Dir::S => Dir::E }
    }
}

#[derive(Clone, Copy, Debug)]
struct Edge {
    from: (i64, i64),
    dir:  Dir,
}

impl Edge {
    #[inline]
    fn to(&self) -> (i64, i64) {
        let (dx, dy) = self.dir.delta();
        (self.from.0 + dx, self.from.1 + dy)
    }
}

// ---------------------------------------------------------------------------
// Rings
// ---------------------------------------------------------------------------

/// A closed ring of pixel-corner coordinates.  The first vertex is not
/// repeated at the end; only corner vertices are kept.
#[derive(Clone, Debug, PartialEq)]
pub struct PixelRing {
    pub vertices: Vec<(i64, i64)>,
}

impl PixelRing {
    /// Shoelace area; positive for exterior rings, negative for holes.
    pub fn signed_area(&self) -> f64 {
        let n = self.vertices.len();
        let mut twice = 0i64;
        for i in 0..n {
            let (x0, y0) = self.vertices[i];
            let (x1, y1) = self.vertices[(i + 1) % n];
            twice += x0 * y1 - x1 * y0;
        }
        twice as f64 / 2.0
    }

    /// Even-odd containment test for a point strictly inside a pixel
    /// (half-integer coordinates never hit a vertex or edge).
    pub fn contains(&self, x: f64, y: f64) -> bool {
        let n = self.vertices.len();
        let mut inside = false;
        let mut j = n - 1;
        for i in 0..n {
            let (xi, yi) = (self.vertices[i].0 as f64, self.vertices[i].1 as f64);
            let (xj, yj) = (self.vertices[j].0 as f64, self.vertices[j].1 as f64);
            if (yi > y) != (yj > y) && x < (xj - xi) * (y - yi) / (yj - yi) + xi {
                inside = !inside;
            }
            j = i;
        }
        inside
    }

    /// An interior sample point: the centre of the pixel to the left of the
    /// ring's first edge.
    pub(crate) fn sample_inside(&self) -> (f64, f64) {
        let (x0, y0) = self.vertices[0];
        let (x1, y1) = self.vertices[1 % self.vertices.len()];
        let (dx, dy) = ((x1 - x0).signum(), (y1 - y0).signum());
        // left of (dx, dy) is (-dy, dx)
        (x0 as f64 + 0.5 * dx as f64 - 0.5 * dy as f64, y0 as f64 + 0.5 * dy as f64 + 0.5 * dx as f64)
    }
}

/// Trace the boundary rings of the pixels selected by `labels[idx] == id`.
pub fn trace_rings(labels: &[u32], width: usize, height: usize, id: u32, pixels: &[usize]) -> Vec<PixelRing> {
    let inside = |col: i64, row: i64| -> bool {
        col >= 0 && row >= 0 && (col as usize) < width && (row as usize) < height
            && labels[row as usize * width + col as usize] == id
    };

    // 1) Collect directed boundary edges with the component on the left.
    let mut edges: Vec<Edge> = Vec::with_capacity(pixels.len() * 2);
    for &idx in pixels {
        let (c, r) = ((idx % width) as i64, (idx / width) as i64);
        if !inside(c, r - 1) { edges.push(Edge { from: (c, r), dir: Dir::E }) }
        if !inside(c + 1, r) { edges.push(Edge { from: (c + 1, r), dir: Dir::S }) }
        if !inside(c, r + 1) { edges.push(Edge { from: (c + 1, r + 1), dir: Dir::W }) }
        if !inside(c - 1, r) { edges.push(Edge { from: (c, r + 1), dir: Dir::N }) }
    }

    // 2) Index outgoing edges by their start vertex (at most two per vertex).
    let mut outgoing: AHashMap<(i64, i64), Vec<usize>> = AHashMap::with_capacity(edges.len());
    for (i, edge) in edges.iter().enumerate() {
        outgoing.entry(edge.from).or_default().push(i);
    }

    let next_edge = |edge: &Edge| -> Option<usize> {
        let candidates = outgoing.get(&edge.to())?;
        [edge.dir.left(), edge.dir, edge.dir.right()].into_iter()
            .find_map(|dir| candidates.iter().copied().find(|&i| edges[i].dir == dir))
    };

    // 3) Walk rings.  The turn rule pairs incoming and outgoing edges
    //    one-to-one, so every walk returns to its first edge.
    let mut used = vec![false; edges.len()];
    let mut rings = Vec::new();
    for start in 0..edges.len() {
        if used[start] { continue }

        let mut walk: Vec<usize> = Vec::new();
        let mut current = start;
        loop {
            used[current] = true;
            walk.push(current);
            match next_edge(&edges[current]) {
                Some(next) if next == start => break,
                Some(next) if !used[next] => current = next,
                _ => break, // unreachable for a well-formed edge set
            }
        }

        // Keep only corners: vertices where the heading changes.
        let n = walk.len();
        let vertices: Vec<(i64, i64)> = (0..n)
            .filter(|&k| edges[walk[k]].dir != edges[walk[(k + n - 1) % n]].dir)
            .map(|k| edges[walk[k]].from)
            .collect();

        if vertices.len() >= 4 {
            rings.push(PixelRing { vertices });
        }
    }

    rings
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rings_for(mask: &[u8], width: usize) -> Vec<PixelRing> {
        let height = mask.len() / width;
        let labels: Vec<u32> = mask.iter().map(|&m| if m == 1 { 0 } else { u32::MAX }).collect();
        let pixels: Vec<usize> = (0..mask.len()).filter(|&i| mask[i] == 1).collect();
        trace_rings(&labels, width, height, 0, &pixels)
    }

    #[test]
    fn single_pixel_is_unit_square() {
        let rings = rings_for(&[1], 1);
        assert_eq!(rings.len(), 1);
        assert_eq!(rings[0].vertices.len(), 4);
        assert_eq!(rings[0].signed_area(), 1.0);
    }

    #[test]
    fn block_collapses_collinear_vertices() {
        let rings = rings_for(&[1, 1, 1, 1, 1, 1], 3);
        assert_eq!(rings.len(), 1);
        assert_eq!(rings[0].vertices.len(), 4);
        assert_eq!(rings[0].signed_area(), 6.0);
    }

    #[test]
    fn donut_has_one_hole() {
        let mask = [
            1, 1, 1,
            1, 0, 1,
            1, 1, 1,
        ];
        let rings = rings_for(&mask, 3);
        assert_eq!(rings.len(), 2);
        let mut areas: Vec<f64> = rings.iter().map(|r| r.signed_area()).collect();
        areas.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_eq!(areas, vec![-1.0, 9.0]);
    }

    #[test]
    fn self_touching_component_splits_at_pinch() {
        // The top-right pixel touches the rest only diagonally at (2, 1),
        // but belongs to the same label via the right column.
        let mask = [
            1, 1, 0,
            1, 0, 1,
            1, 1, 1,
        ];
        let rings = rings_for(&mask, 3);
        let total: f64 = rings.iter().map(|r| r.signed_area()).sum();
        assert_eq!(total, 7.0);
        assert_eq!(rings.iter().filter(|r| r.signed_area() > 0.0).count(), 1);
    }

    #[test]
    fn sample_inside_lies_in_ring() {
        let rings = rings_for(&[1, 1, 1, 1], 2);
        let (x, y) = rings[0].sample_inside();
        assert!(rings[0].contains(x, y));
    }
}
