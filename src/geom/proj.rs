use anyhow::{anyhow, Context, Result};
use geo::{Area, Coord, MapCoords, MultiPolygon};
use proj4rs::{proj::Proj as Proj4, transform::transform};

/// PROJ.4 definition of EPSG:4326 (degrees → radians handled in code).
const WGS84_PROJ4: &str = "+proj=longlat +datum=WGS84 +no_defs +type=crs";

/// PROJ.4 definition of EPSG:3857 (spherical Web Mercator).
const WEB_MERCATOR_PROJ4: &str =
    "+proj=merc +a=6378137 +b=6378137 +lat_ts=0 +lon_0=0 +x_0=0 +y_0=0 +k=1 +units=m +nadgrids=@null +no_defs +type=crs";

/// Web Mercator is undefined at the poles.
const MAX_MERCATOR_LAT: f64 = 85.051_128_779_806_59;

/// EPSG:4326 → EPSG:3857 reprojection used for every area computation.
pub struct WebMercator {
    from: Proj4,
    to: Proj4,
}

impl WebMercator {
    pub fn new() -> Result<Self> {
        let from = Proj4::from_proj_string(WGS84_PROJ4)
            .with_context(|| anyhow!("failed to build source PROJ.4: {WGS84_PROJ4}"))?;
        let to = Proj4::from_proj_string(WEB_MERCATOR_PROJ4)
            .with_context(|| anyhow!("failed to build target PROJ.4: {WEB_MERCATOR_PROJ4}"))?;
        Ok(Self { from, to })
    }

    /// Reproject lon/lat degrees to Web Mercator metres.
    pub fn project(&self, shape: &MultiPolygon<f64>) -> Result<MultiPolygon<f64>> {
        shape.try_map_coords(|coord: Coord<f64>| {
            let lat = coord.y.clamp(-MAX_MERCATOR_LAT, MAX_MERCATOR_LAT);
            let mut point = (coord.x.to_radians(), lat.to_radians(), 0.0);
            transform(&self.from, &self.to, &mut point)
                .map_err(|e| anyhow!("CRS transform failed at ({}, {}): {e:?}", coord.x, coord.y))?;
            Ok(Coord { x: point.0, y: point.1 })
        })
    }

    /// Planar area in EPSG:3857 square metres.
    pub fn area(&self, shape: &MultiPolygon<f64>) -> Result<f64> {
        Ok(self.project(shape)?.unsigned_area())
    }
}
