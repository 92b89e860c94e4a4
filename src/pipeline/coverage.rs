use std::path::{Path, PathBuf};

use anyhow::Result;
use geo::MultiPolygon;
use tracing::{debug, info};

use crate::{
    common,
    geom::{self, OverlayOp, WebMercator},
    layer::{ArtifactKey, Feature, Layer, Technology},
    pipeline::{CountryRun, Stage},
    report::Outcome,
};

/// Coverage parts smaller than this (EPSG:3857 m²) are discarded after the dissolve.
const MIN_COVERAGE_PART_M2: f64 = 1e7;

/// National, regional and uncovered coverage for every configured technology.
pub(crate) fn prepare_coverage(run: &CountryRun) -> Result<()> {
    let regions = run.regions()?;
    let merc = WebMercator::new()?;
    for &tech in &run.config.technologies {
        run.record(Stage::Coverage, format!("national/{tech}"), national_coverage(run, tech, &merc));
        regional_coverage(run, tech, &regions);
        uncovered(run, tech, &regions);
    }
    Ok(())
}

/// MCE when the inclusions list names the country's ISO2 code, OCI otherwise.
fn coverage_source(run: &CountryRun, tech: Technology) -> Result<PathBuf> {
    let root = run.config.coverage_source_dir();
    let label = tech.label();
    let inclusions = root.join("Data_MCE").join(format!("Inclusions_201812_{label}.shp"));
    let included = inclusions.exists()
        && !run.meta.iso2.is_empty()
        && !Layer::read_where(&inclusions, "CNTRY_ISO2", &run.meta.iso2)?.is_empty();

    Ok(if included {
        root.join("Data_MCE").join(format!("MCE_201812_{label}.shp"))
    } else {
        root.join("Data_OCI").join(format!("OCI_201812_{label}.shp"))
    })
}

fn national_coverage(run: &CountryRun, tech: Technology, merc: &WebMercator) -> Result<Outcome> {
    let out = run.paths.coverage_national(tech);
    if out.exists() { return Ok(Outcome::skipped("already exists")) }

    let source = coverage_source(run, tech)?;
    if !source.exists() { return Ok(Outcome::skipped(format!("no coverage source {}", common::file_name(&source)))) }
    debug!(iso3 = run.iso3(), file = %source.display(), "reading coverage source");

    let matched = Layer::read_where(&source, "CNTRY_ISO3", run.iso3())?;
    if matched.is_empty() { return Ok(Outcome::skipped("no coverage polygons for country")) }

    let dissolved = geom::drop_degenerate(matched.dissolve());
    let cleaned = drop_small_parts(dissolved, merc)?;
    if geom::is_empty(&cleaned) { return Ok(Outcome::skipped("coverage empty after cleaning")) }
    let smoothed = geom::smooth(&cleaned);
    if geom::is_empty(&smoothed) { return Ok(Outcome::skipped("coverage empty after smoothing")) }

    Layer::new(vec![Feature::new(smoothed).with_attr("value", 1.0)]).write(&out)?;
    ArtifactKey { country: run.iso3().to_string(), technology: Some(tech), ..ArtifactKey::default() }
        .write_sidecar(&out)?;
    info!(iso3 = run.iso3(), technology = %tech, "national coverage written");
    Ok(Outcome::Written)
}

fn drop_small_parts(shape: MultiPolygon<f64>, merc: &WebMercator) -> Result<MultiPolygon<f64>> {
    let mut kept = Vec::with_capacity(shape.0.len());
    for polygon in shape.0 {
        let part = MultiPolygon(vec![polygon]);
        if merc.area(&part)? > MIN_COVERAGE_PART_M2 {
            kept.extend(part.0);
        }
    }
    Ok(MultiPolygon(kept))
}

/// Clip the national coverage to each region.  Regions without any
/// coverage get no file.
fn regional_coverage(run: &CountryRun, tech: Technology, regions: &[(String, PathBuf)]) {
    let national = run.paths.coverage_national(tech);
    if !national.exists() { return }
    let coverage = match Layer::read(&national) {
        Ok(layer) => layer.dissolve(),
        Err(e) => return run.record(Stage::Coverage, format!("regions/{tech}"), Err(e)),
    };

    let dir = run.paths.coverage_regions(tech);
    for (gid, boundary) in regions {
        let out = dir.join(format!("{gid}.shp"));
        let result = if out.exists() {
            Ok(Outcome::skipped("already exists"))
        } else {
            clip_region(run, tech, gid, boundary, &coverage, &out)
        };
        run.record(Stage::Coverage, format!("regions/{tech}/{gid}"), result);
    }
}

fn clip_region(run: &CountryRun, tech: Technology, gid: &str, boundary: &Path, coverage: &MultiPolygon<f64>, out: &Path) -> Result<Outcome> {
    let region = Layer::read(boundary)?.dissolve();
    let clipped = geom::drop_degenerate(OverlayOp::Intersection.apply(&region, coverage));
    if geom::is_empty(&clipped) { return Ok(Outcome::skipped("no coverage in region")) }

    Layer::new(vec![Feature::new(clipped).with_attr("value", 1.0)]).write(out)?;
    ArtifactKey::for_region(run.iso3(), gid).with_technology(tech).write_sidecar(out)?;
    Ok(Outcome::Written)
}

/// Per-region complement of coverage.  Without any regional coverage for the
/// technology the boundaries directory is copied whole; a region without a
/// coverage file is copied verbatim.
fn uncovered(run: &CountryRun, tech: Technology, regions: &[(String, PathBuf)]) {
    let covered_dir = run.paths.coverage_regions(tech);
    let out_dir = run.paths.coverage_uncovered(tech);

    if !covered_dir.is_dir() {
        let result = common::copy_dir_recursive(&run.paths.boundaries_dir(), &out_dir).map(|copied| {
            debug!(iso3 = run.iso3(), technology = %tech, copied, "no coverage, copied boundaries");
            Outcome::Written
        });
        return run.record(Stage::Coverage, format!("uncovered/{tech}"), result);
    }

    for (gid, boundary) in regions {
        let out = out_dir.join(format!("{gid}.shp"));
        let result = if out.exists() {
            Ok(Outcome::skipped("already exists"))
        } else {
            uncovered_region(run, tech, gid, boundary, &covered_dir.join(format!("{gid}.shp")), &out)
        };
        run.record(Stage::Coverage, format!("uncovered/{tech}/{gid}"), result);
    }
}

fn uncovered_region(run: &CountryRun, tech: Technology, gid: &str, boundary: &Path, covered: &Path, out: &Path) -> Result<Outcome> {
    common::ensure_parent_exists(out)?;
    if !covered.exists() {
        common::copy_shapefile_set(boundary, out)?;
        return Ok(Outcome::Written);
    }

    let region = Layer::read(boundary)?.dissolve();
    let coverage = Layer::read(covered)?.dissolve();
    let rest = geom::drop_degenerate(OverlayOp::SymmetricDifference.apply(&region, &coverage));
    if geom::is_empty(&rest) { return Ok(Outcome::skipped("region fully covered")) }

    Layer::new(vec![Feature::new(rest).with_attr("value", 0.0)]).write(out)?;
    ArtifactKey::for_region(run.iso3(), gid).with_technology(tech).write_sidecar(out)?;
    Ok(Outcome::Written)
}
