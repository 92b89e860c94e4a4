//! Raster polygonization.
//!
//! Groups 4-connected pixels of identical value into polygons, traces their
//! boundaries along pixel edges and maps them to world coordinates through an
//! affine [`GeoTransform`].  Pixels rejected by the caller's mask predicate
//! (nodata, zero, ...) produce no output.

mod label;
mod trace;
mod transform;

pub use label::{label_components, Component, UNLABELED};
pub use trace::{trace_rings, PixelRing};
pub use transform::GeoTransform;

use geo::{Coord, LineString, MultiPolygon, Polygon};

/// One connected region of equal-valued pixels.
#[derive(Clone, Debug)]
pub struct Shape {
    /// Pixel value shared by the region.
    pub value: f32,
    /// Number of pixels in the region.
    pub pixel_count: usize,
    /// Region outline in world coordinates.
    pub geometry: MultiPolygon<f64>,
}

/// Polygonize a row-major `width × height` grid.
///
/// Only pixels for which `keep(value)` is true take part.  Shapes come out in
/// row-major order of their first pixel, so repeated runs on the same grid
/// yield identical output.
pub fn polygonize<F>(data: &[f32], width: usize, height: usize, transform: &GeoTransform, keep: F) -> Vec<Shape>
where
    F: Fn(f32) -> bool,
{
    if width == 0 || height == 0 || data.len() != width * height { return Vec::new() }

    let (labels, components) = label_components(data, width, height, keep);

    components.iter().enumerate()
        .map(|(id, comp)| {
            let rings = trace_rings(&labels, width, height, id as u32, &comp.pixels);
            Shape {
                value: comp.value,
                pixel_count: comp.pixels.len(),
                geometry: assemble(rings, transform),
            }
        })
        .collect()
}

/// Pair holes with the smallest exterior ring that contains them, then map
/// every ring to world coordinates.
fn assemble(rings: Vec<PixelRing>, transform: &GeoTransform) -> MultiPolygon<f64> {
    let (exteriors, holes): (Vec<PixelRing>, Vec<PixelRing>) = rings.into_iter()
        .partition(|ring| ring.signed_area() > 0.0);

    let mut interiors: Vec<Vec<PixelRing>> = vec![Vec::new(); exteriors.len()];
    for hole in holes {
        // The pixel left of a hole edge belongs to the component.
        let (x, y) = hole.sample_inside();
        let owner = exteriors.iter().enumerate()
            .filter(|(_, ext)| ext.contains(x, y))
            .min_by(|(_, a), (_, b)| a.signed_area().total_cmp(&b.signed_area()))
            .map(|(i, _)| i);
        if let Some(i) = owner {
            interiors[i].push(hole);
        }
    }

    let to_world = |ring: &PixelRing| -> LineString<f64> {
        let mut coords: Vec<Coord<f64>> = ring.vertices.iter()
            .map(|&(col, row)| transform.apply(col as f64, row as f64))
            .collect();
        if let Some(&first) = coords.first() { coords.push(first) }
        LineString::new(coords)
    };

    MultiPolygon::new(
        exteriors.iter().zip(interiors.iter())
            .map(|(ext, holes)| Polygon::new(to_world(ext), holes.iter().map(to_world).collect()))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::Area;

    #[test]
    fn empty_grid_yields_nothing() {
        assert!(polygonize(&[], 0, 0, &GeoTransform::identity(), |_| true).is_empty());
    }

    #[test]
    fn hole_is_attached_to_outer_ring() {
        let data = [
            1.0, 1.0, 1.0,
            1.0, 0.0, 1.0,
            1.0, 1.0, 1.0,
        ];
        let shapes = polygonize(&data, 3, 3, &GeoTransform::identity(), |v| v > 0.0);
        assert_eq!(shapes.len(), 1);
        assert_eq!(shapes[0].pixel_count, 8);
        assert_eq!(shapes[0].geometry.0.len(), 1);
        assert_eq!(shapes[0].geometry.0[0].interiors().len(), 1);
        assert!((shapes[0].geometry.unsigned_area() - 8.0).abs() < 1e-9);
    }
}
