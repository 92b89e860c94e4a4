use std::path::Path;

use anyhow::Result;
use tracing::debug;

use crate::{
    common::GeoTiffReader,
    error::StageError,
    layer::{ArtifactKey, Feature, Layer, LAYER_EPSG},
    raster::TILE_NODATA,
    report::Outcome,
};

/// Polygonize one raster tile into a layer of `value` polygons.
///
/// Pixels that are nodata (the tile's own sentinel or 255), non-finite or
/// `<= 0` are excluded.  The result holds one feature per 4-connected run of
/// equal-valued pixels, in row-major order of the run's first pixel.
pub fn vectorize(tile_path: &Path) -> Result<Layer> {
    let mut reader = GeoTiffReader::open(tile_path)
        .map_err(|e| StageError::decode(tile_path, format!("{e:#}")))?;
    let header = reader.header().clone();
    if let Some(found) = header.epsg {
        if found != LAYER_EPSG {
            return Err(StageError::CrsMismatch { path: tile_path.to_path_buf(), expected: LAYER_EPSG, found }.into());
        }
    }
    let data = reader.read_all()
        .map_err(|e| StageError::decode(tile_path, format!("{e:#}")))?;

    let nodata = header.nodata.map(|v| v as f32).unwrap_or(TILE_NODATA);
    let keep = |v: f32| v.is_finite() && v > 0.0 && v != TILE_NODATA && v != nodata;

    let values: Vec<f32> = data.iter().copied().collect();
    let shapes = polygonize::polygonize(&values, header.width, header.height, &header.transform, keep);

    Ok(Layer::new(
        shapes.into_iter()
            .map(|shape| Feature::new(shape.geometry).with_attr("value", shape.value as f64))
            .collect(),
    ))
}

/// Vectorize `tile_path` into the shapefile `out_path`, attaching `key` as
/// its sidecar.  A tile without a single valid pixel writes nothing.
pub fn vectorize_tile(tile_path: &Path, out_path: &Path, key: Option<&ArtifactKey>) -> Result<Outcome> {
    let layer = vectorize(tile_path)?;
    if layer.is_empty() {
        return Ok(Outcome::skipped("no valid pixels"));
    }
    debug!(file = %tile_path.display(), polygons = layer.len(), "vectorized tile");
    layer.write(out_path)?;
    if let Some(key) = key {
        key.write_sidecar(out_path)?;
    }
    Ok(Outcome::Written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common;
    use geo::Area;
    use ndarray::Array2;
    use polygonize::GeoTransform;

    #[test]
    fn block_of_equal_pixels_becomes_one_polygon() {
        let dir = tempfile::tempdir().unwrap();
        let tile = dir.path().join("KEN.1_1.tif");
        let mut grid = Array2::from_elem((10, 10), TILE_NODATA);
        for r in 2..5 { for c in 3..6 { grid[[r, c]] = 50.0 } }
        grid[[8, 8]] = 0.0;
        grid[[9, 9]] = -1.0;
        common::write_geotiff(&tile, &grid, &GeoTransform::north_up(36.0, 0.0, 0.01, 0.01), 255.0).unwrap();

        let layer = vectorize(&tile).unwrap();
        assert_eq!(layer.len(), 1);
        assert_eq!(layer.features[0].number("value"), Some(50.0));
        assert!((layer.features[0].geometry.unsigned_area() - 9.0 * 0.0001).abs() < 1e-12);
    }

    #[test]
    fn empty_tile_is_skipped_without_output() {
        let dir = tempfile::tempdir().unwrap();
        let tile = dir.path().join("KEN.2_1.tif");
        let grid = Array2::from_elem((4, 4), TILE_NODATA);
        common::write_geotiff(&tile, &grid, &GeoTransform::north_up(0.0, 0.0, 1.0, 1.0), 255.0).unwrap();

        let out = dir.path().join("shapes").join("KEN.2_1.shp");
        let outcome = vectorize_tile(&tile, &out, None).unwrap();
        assert!(matches!(outcome, Outcome::Skipped { .. }));
        assert!(!out.exists());
    }

    #[test]
    fn written_tile_carries_its_key() {
        let dir = tempfile::tempdir().unwrap();
        let tile = dir.path().join("KEN.1_1.tif");
        let grid = Array2::from_elem((2, 2), 100.0);
        common::write_geotiff(&tile, &grid, &GeoTransform::north_up(36.0, 0.0, 0.5, 0.5), 255.0).unwrap();

        let out = dir.path().join("shapes").join("KEN.1_1.shp");
        let key = ArtifactKey::for_region("KEN", "KEN.1_1");
        assert_eq!(vectorize_tile(&tile, &out, Some(&key)).unwrap(), Outcome::Written);
        assert_eq!(ArtifactKey::read_sidecar(&out).unwrap(), Some(key));
        assert_eq!(Layer::read(&out).unwrap().len(), 1);
    }

    #[test]
    fn unreadable_tile_is_a_decode_error() {
        let dir = tempfile::tempdir().unwrap();
        let tile = dir.path().join("broken.tif");
        std::fs::write(&tile, b"not a tiff").unwrap();
        let err = vectorize(&tile).unwrap_err();
        assert!(matches!(err.downcast_ref::<StageError>(), Some(StageError::Decode { .. })));
    }
}
