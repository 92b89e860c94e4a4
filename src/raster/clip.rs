use std::path::Path;

use anyhow::{Context, Result};
use geo::{BoundingRect, Contains, MultiPolygon, Point};
use ndarray::{Array2, Zip};
use polygonize::GeoTransform;

use crate::{
    common::{self, GeoTiffReader},
    error::StageError,
    layer::LAYER_EPSG,
};

/// Nodata value of every tile written by the clipper.
pub const TILE_NODATA: f32 = 255.0;

/// Fractional pixel slack when snapping a bounding box to the source grid.
const SNAP_EPSILON: f64 = 1e-6;

/// A raster clipped to one region.
#[derive(Clone, Debug, PartialEq)]
pub struct RasterTile {
    pub data: Array2<f32>,
    pub transform: GeoTransform,
}

impl RasterTile {
    #[inline] pub fn width(&self) -> usize { self.data.ncols() }

    #[inline] pub fn height(&self) -> usize { self.data.nrows() }

    /// Number of pixels holding data.
    pub fn valid_pixels(&self) -> usize {
        self.data.iter().filter(|&&v| v != TILE_NODATA).count()
    }

    /// World-space bounds `(min_x, min_y, max_x, max_y)` of the tile grid.
    pub fn bounds(&self) -> (f64, f64, f64, f64) {
        let corners = [
            self.transform.apply(0.0, 0.0),
            self.transform.apply(self.width() as f64, 0.0),
            self.transform.apply(0.0, self.height() as f64),
            self.transform.apply(self.width() as f64, self.height() as f64),
        ];
        corners.iter().fold(
            (f64::INFINITY, f64::INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY),
            |(x0, y0, x1, y1), c| (x0.min(c.x), y0.min(c.y), x1.max(c.x), y1.max(c.y)),
        )
    }

    /// Write the tile as a Float32 GeoTIFF with nodata 255.
    pub fn write(&self, path: &Path) -> Result<()> {
        common::ensure_parent_exists(path)?;
        common::write_geotiff(path, &self.data, &self.transform, TILE_NODATA as f64)
    }
}

/// A source raster (population or hazard) opened for repeated clipping.
pub struct RasterSource {
    reader: GeoTiffReader,
}

impl RasterSource {
    /// Open a GeoTIFF and check that it is in EPSG:4326.  A file without
    /// GeoKeys is taken to be EPSG:4326.
    pub fn open(path: &Path) -> Result<Self> {
        if !path.exists() { return Err(StageError::MissingInput(path.to_path_buf()).into()) }
        let reader = GeoTiffReader::open(path)
            .map_err(|e| StageError::decode(path, format!("{e:#}")))?;
        if let Some(found) = reader.header().epsg {
            if found != LAYER_EPSG {
                return Err(StageError::CrsMismatch { path: path.to_path_buf(), expected: LAYER_EPSG, found }.into());
            }
        }
        Ok(Self { reader })
    }

    #[inline]
    pub fn transform(&self) -> GeoTransform { self.reader.header().transform }

    /// Clip the raster to `region`.
    ///
    /// The output grid is the region's bounding box snapped outward to the
    /// source grid.  Pixels whose centre falls outside the region, outside
    /// the source image, or on source nodata are set to [`TILE_NODATA`].
    pub fn clip(&mut self, region: &MultiPolygon<f64>) -> Result<RasterTile> {
        let header = self.reader.header().clone();
        let Some(rect) = region.bounding_rect() else {
            return Err(StageError::MalformedGeometry { context: "empty clip region".to_string() }.into());
        };

        let corners = [
            (rect.min().x, rect.min().y),
            (rect.min().x, rect.max().y),
            (rect.max().x, rect.min().y),
            (rect.max().x, rect.max().y),
        ];
        let mut cols = (f64::INFINITY, f64::NEG_INFINITY);
        let mut rows = (f64::INFINITY, f64::NEG_INFINITY);
        for (x, y) in corners {
            let (c, r) = header.transform.invert(x, y)
                .with_context(|| format!("Non-invertible transform in {}", self.reader.path().display()))?;
            cols = (cols.0.min(c), cols.1.max(c));
            rows = (rows.0.min(r), rows.1.max(r));
        }
        let col_off = (cols.0 + SNAP_EPSILON).floor() as i64;
        let row_off = (rows.0 + SNAP_EPSILON).floor() as i64;
        let width = (((cols.1 - SNAP_EPSILON).ceil() as i64) - col_off).max(1) as usize;
        let height = (((rows.1 - SNAP_EPSILON).ceil() as i64) - row_off).max(1) as usize;

        let mut data = self.reader.read_window(col_off, row_off, width, height, TILE_NODATA)?;
        let transform = header.transform.window(col_off, row_off);
        let source_nodata = header.nodata.map(|v| v as f32);

        Zip::indexed(&mut data).par_for_each(|(row, col), value| {
            let is_nodata = !value.is_finite() || Some(*value) == source_nodata;
            if is_nodata || !region.contains(&Point::from(transform.pixel_center(col, row))) {
                *value = TILE_NODATA;
            }
        });

        Ok(RasterTile { data, transform })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::polygon;

    fn write_source(dir: &Path, data: Array2<f32>, nodata: f64) -> std::path::PathBuf {
        let path = dir.join("source.tif");
        common::write_geotiff(&path, &data, &GeoTransform::north_up(30.0, 2.0, 0.1, 0.1), nodata).unwrap();
        path
    }

    #[test]
    fn clip_masks_pixels_outside_the_region() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_source(dir.path(), Array2::from_elem((20, 20), 7.0), -9999.0);
        let mut source = RasterSource::open(&path).unwrap();

        // Triangle over the top-left 1° × 1°.
        let region = MultiPolygon(vec![polygon![(x: 30.0, y: 2.0), (x: 31.0, y: 2.0), (x: 30.0, y: 1.0)]]);
        let tile = source.clip(&region).unwrap();
        assert_eq!((tile.width(), tile.height()), (10, 10));
        assert_eq!(tile.data[[0, 0]], 7.0);
        assert_eq!(tile.data[[9, 9]], TILE_NODATA);
        assert!(tile.valid_pixels() > 30 && tile.valid_pixels() < 70);
    }

    #[test]
    fn region_outside_the_raster_yields_an_all_nodata_tile() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_source(dir.path(), Array2::from_elem((20, 20), 7.0), -9999.0);
        let mut source = RasterSource::open(&path).unwrap();
        let far = MultiPolygon(vec![polygon![(x: 100.0, y: 50.0), (x: 101.0, y: 50.0), (x: 101.0, y: 51.0), (x: 100.0, y: 51.0)]]);
        let tile = source.clip(&far).unwrap();
        assert_eq!(tile.valid_pixels(), 0);
        assert!(tile.width() >= 1 && tile.height() >= 1);
    }

    #[test]
    fn source_nodata_becomes_tile_nodata() {
        let dir = tempfile::tempdir().unwrap();
        let mut grid = Array2::from_elem((20, 20), 3.0);
        grid[[0, 0]] = -9999.0;
        let path = write_source(dir.path(), grid, -9999.0);
        let mut source = RasterSource::open(&path).unwrap();
        let region = MultiPolygon(vec![polygon![(x: 30.0, y: 0.0), (x: 32.0, y: 0.0), (x: 32.0, y: 2.0), (x: 30.0, y: 2.0)]]);
        let tile = source.clip(&region).unwrap();
        assert_eq!(tile.data[[0, 0]], TILE_NODATA);
        assert_eq!(tile.valid_pixels(), 399);
    }

    #[test]
    fn tile_round_trips_through_geotiff() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_source(dir.path(), Array2::from_elem((20, 20), 1.0), -9999.0);
        let mut source = RasterSource::open(&path).unwrap();
        let region = MultiPolygon(vec![polygon![(x: 30.5, y: 0.5), (x: 31.0, y: 0.5), (x: 31.0, y: 1.0), (x: 30.5, y: 1.0)]]);
        let tile = source.clip(&region).unwrap();
        let out = dir.path().join("tiles").join("KEN.1_1.tif");
        tile.write(&out).unwrap();

        let mut back = GeoTiffReader::open(&out).unwrap();
        assert_eq!(back.header().nodata, Some(255.0));
        assert_eq!(back.header().epsg, Some(4326));
        assert_eq!(back.read_all().unwrap(), tile.data);
        let c = back.header().transform.apply(0.0, 0.0);
        assert!((c.x - 30.5).abs() < 1e-9 && (c.y - 1.0).abs() < 1e-9);
    }
}
