use std::{fmt, path::Path};

use anyhow::Result;
use geo::{BoundingRect, Coord, MultiPolygon, Rect};
use shapefile::Shape;
use tracing::debug;

use crate::{
    common,
    geom::{self, OverlayOp},
    layer::{self, ArtifactKey, AttrValue, Feature, Layer},
    pipeline::{CountryRun, Stage},
    report::Outcome,
};

/// Margin (degrees) around the national outline within which wealth points
/// still shape the Voronoi cells along the border.
const POINT_MARGIN: f64 = 0.5;

/// Reporting band of a Relative Wealth Index value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PovertyBand {
    BelowZero,
    ZeroToHalf,
    AboveHalf,
}

impl PovertyBand {
    pub fn from_rwi(rwi: f64) -> Self {
        if rwi <= 0.0 {
            Self::BelowZero
        } else if rwi <= 0.5 {
            Self::ZeroToHalf
        } else {
            Self::AboveHalf
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::BelowZero => "< 0",
            Self::ZeroToHalf => "0 - 0.5",
            Self::AboveHalf => "> 0.5",
        }
    }
}

impl fmt::Display for PovertyBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.label()) }
}

/// National wealth layer, then its clip to every region.
pub(crate) fn prepare_poverty(run: &CountryRun) -> Result<()> {
    let sources = common::list_files(&run.config.poverty_source_dir(), "shp")?;
    if sources.is_empty() {
        run.record(Stage::Poverty, "national", Ok(Outcome::skipped("no poverty source")));
        return Ok(());
    }
    run.record(Stage::Poverty, "national", national_poverty(run, &sources));
    regional_poverty(run)
}

fn national_poverty(run: &CountryRun, sources: &[std::path::PathBuf]) -> Result<Outcome> {
    let out = run.paths.poverty_national();
    if out.exists() { return Ok(Outcome::skipped("already exists")) }

    let outline_path = run.paths.national_outline();
    if !outline_path.exists() { return Ok(Outcome::skipped("no national outline")) }
    let outline = Layer::read(&outline_path)?.dissolve();
    let Some(bounds) = outline.bounding_rect() else { return Ok(Outcome::skipped("empty national outline")) };
    let frame = Rect::new(
        Coord { x: bounds.min().x - POINT_MARGIN, y: bounds.min().y - POINT_MARGIN },
        Coord { x: bounds.max().x + POINT_MARGIN, y: bounds.max().y + POINT_MARGIN },
    );

    let mut sites: Vec<(Coord<f64>, f64)> = Vec::new();
    let mut areas: Vec<Feature> = Vec::new();
    for source in sources {
        read_wealth(source, &frame, &mut sites, &mut areas)?;
    }
    debug!(iso3 = run.iso3(), points = sites.len(), polygons = areas.len(), "wealth samples near country");

    let coords: Vec<Coord<f64>> = sites.iter().map(|(c, _)| *c).collect();
    let cells = geom::voronoi_cells(&coords, &frame).into_iter()
        .zip(&sites)
        .filter_map(|(cell, (_, rwi))| {
            cell.map(|polygon| Feature::new(MultiPolygon(vec![polygon])).with_attr("rwi", *rwi))
        });

    let features: Vec<Feature> = cells.chain(areas)
        .map(|mut f| {
            f.geometry = OverlayOp::Intersection.apply(&f.geometry, &outline);
            f
        })
        .collect();
    let layer = Layer::new(features).drop_empty();
    if layer.is_empty() { return Ok(Outcome::skipped("no wealth samples within country")) }

    layer.write(&out)?;
    ArtifactKey { country: run.iso3().to_string(), ..ArtifactKey::default() }.write_sidecar(&out)?;
    Ok(Outcome::Written)
}

/// Collect `rwi` points and polygons from one source file.  Points outside
/// `frame` and polygons not touching it are ignored.
fn read_wealth(path: &Path, frame: &Rect<f64>, sites: &mut Vec<(Coord<f64>, f64)>, areas: &mut Vec<Feature>) -> Result<()> {
    layer::ensure_layer_crs(path)?;
    let inside = |c: Coord<f64>| {
        c.x >= frame.min().x && c.x <= frame.max().x && c.y >= frame.min().y && c.y <= frame.max().y
    };

    for (shape, record) in common::read_shapefile(path)? {
        let Some(rwi) = record.get("rwi").cloned().and_then(AttrValue::from_field).and_then(|v| v.as_number()) else {
            continue;
        };
        let point = match &shape {
            Shape::Point(p) => Some(Coord { x: p.x, y: p.y }),
            Shape::PointZ(p) => Some(Coord { x: p.x, y: p.y }),
            Shape::PointM(p) => Some(Coord { x: p.x, y: p.y }),
            _ => None,
        };
        if let Some(c) = point {
            if inside(c) { sites.push((c, rwi)) }
            continue;
        }
        if let Shape::Polygon(p) = &shape {
            let geometry = common::shp_to_geo(p);
            let touches = geometry.bounding_rect().is_some_and(|r| {
                r.min().x <= frame.max().x && r.max().x >= frame.min().x
                    && r.min().y <= frame.max().y && r.max().y >= frame.min().y
            });
            if touches { areas.push(Feature::new(geometry).with_attr("rwi", rwi)) }
        }
    }
    Ok(())
}

fn regional_poverty(run: &CountryRun) -> Result<()> {
    let national = run.paths.poverty_national();
    if !national.exists() { return Ok(()) }
    let poverty = Layer::read(&national)?;

    let dir = run.paths.poverty_regions();
    for (gid, boundary) in run.regions()? {
        let out = dir.join(format!("{gid}.shp"));
        let result = if out.exists() {
            Ok(Outcome::skipped("already exists"))
        } else {
            clip_region(run, &gid, &boundary, &poverty, &out)
        };
        run.record(Stage::Poverty, format!("regions/{gid}"), result);
    }
    Ok(())
}

fn clip_region(run: &CountryRun, gid: &str, boundary: &Path, poverty: &Layer, out: &Path) -> Result<Outcome> {
    let region = Layer::new(
        Layer::read(boundary)?.features.into_iter().map(|f| Feature::new(f.geometry)).collect(),
    );
    let clipped = region.overlay(poverty, OverlayOp::Intersection);
    if clipped.is_empty() { return Ok(Outcome::skipped("no poverty data in region")) }

    clipped.write(out)?;
    ArtifactKey::for_region(run.iso3(), gid).write_sidecar(out)?;
    Ok(Outcome::Written)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bands_split_at_zero_and_half() {
        assert_eq!(PovertyBand::from_rwi(-0.3).label(), "< 0");
        assert_eq!(PovertyBand::from_rwi(0.0).label(), "< 0");
        assert_eq!(PovertyBand::from_rwi(0.25).label(), "0 - 0.5");
        assert_eq!(PovertyBand::from_rwi(0.5).label(), "0 - 0.5");
        assert_eq!(PovertyBand::from_rwi(1.2).to_string(), "> 0.5");
    }
}
