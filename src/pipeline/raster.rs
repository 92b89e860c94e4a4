use std::path::{Path, PathBuf};

use anyhow::Result;
use tracing::debug;

use crate::{
    common,
    layer::{ArtifactKey, HazardScenario, Layer},
    pipeline::{CountryRun, Stage},
    raster::{vectorize_tile, RasterSource},
    report::Outcome,
};

/// Clip the population raster and every hazard raster to each region, then
/// vectorize every tile.
pub(crate) fn prepare_rasters(run: &CountryRun) -> Result<()> {
    let regions = run.regions()?;
    if regions.is_empty() {
        run.record(Stage::Raster, "*", Ok(Outcome::skipped("no region boundaries")));
        return Ok(());
    }

    let iso3 = run.iso3();
    clip_and_vectorize(
        run,
        &run.config.population_source(),
        &run.paths.population_tiles(),
        &run.paths.population_shapes(),
        &regions,
        |gid| ArtifactKey::for_region(iso3, gid),
    );

    for &hazard in &run.config.hazards {
        for file in common::list_files(&run.config.hazard_source_dir(hazard), "tif")? {
            let stem = common::file_stem(&file);
            let Some(scenario) = HazardScenario::parse(&stem) else {
                run.record(Stage::Raster, stem, Ok(Outcome::skipped("unrecognised hazard file name")));
                continue;
            };
            if scenario.hazard_type != hazard { continue }

            clip_and_vectorize(
                run,
                &file,
                &run.paths.hazard_tiles(hazard, &stem),
                &run.paths.hazard_shapes(hazard, &stem),
                &regions,
                |gid| ArtifactKey::for_region(iso3, gid).with_hazard(&scenario),
            );
        }
    }
    Ok(())
}

fn clip_and_vectorize<F>(run: &CountryRun, source: &Path, tiles: &Path, shapes: &Path, regions: &[(String, PathBuf)], key_for: F)
where
    F: Fn(&str) -> ArtifactKey,
{
    let name = common::file_stem(source);
    let mut raster = match RasterSource::open(source) {
        Ok(raster) => raster,
        Err(e) => return run.record(Stage::Raster, name, Err(e)),
    };
    debug!(file = %source.display(), regions = regions.len(), "clipping raster");

    for (gid, boundary) in regions {
        let tile = tiles.join(format!("{gid}.tif"));
        let shp = shapes.join(format!("{gid}.shp"));
        let result = region_tile(&mut raster, boundary, &tile, &shp, &key_for(gid));
        run.record(Stage::Raster, format!("{name}/{gid}"), result);
    }
}

/// Clip one region's tile (unless present) and vectorize it (unless present).
fn region_tile(raster: &mut RasterSource, boundary: &Path, tile: &Path, shp: &Path, key: &ArtifactKey) -> Result<Outcome> {
    if !tile.exists() {
        let region = Layer::read(boundary)?.dissolve();
        raster.clip(&region)?.write(tile)?;
    }
    if shp.exists() { return Ok(Outcome::skipped("already exists")) }
    vectorize_tile(tile, shp, Some(key))
}
