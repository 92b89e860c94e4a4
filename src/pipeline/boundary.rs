use anyhow::Result;
use tracing::info;

use crate::{
    config::Config,
    geom::{self, NATIONAL_TOLERANCE, REGION_TOLERANCE},
    layer::{ArtifactKey, Feature, Layer},
    pipeline::{CountryRun, Stage},
    report::Outcome,
};

/// National outline, region sets for levels `1..=depth`, then one boundary
/// file per region of the deepest level.  Each output already on disk is
/// left untouched.
pub(crate) fn prepare_boundaries(run: &CountryRun) -> Result<()> {
    run.record(Stage::Boundary, "national_outline", national_outline(run));
    for level in 1..=run.meta.depth() {
        run.record(Stage::Boundary, format!("regions_{level}"), region_set(run, level));
    }
    split_regions(run)
}

/// Features of `gadm36_{level}.shp` belonging to one country, simplified
/// and stripped of small parts.
fn country_features(config: &Config, iso3: &str, level: u8, tolerance: f64) -> Result<Layer> {
    let source = Layer::read_where(&config.boundary_source(level), "GID_0", iso3)?;
    let features = source.features.into_iter()
        .map(|mut f| {
            let simplified = geom::simplify_preserve(&f.geometry, tolerance);
            f.geometry = geom::remove_small_shapes(simplified, iso3);
            f
        })
        .collect();
    Ok(Layer::new(features).drop_empty())
}

fn national_outline(run: &CountryRun) -> Result<Outcome> {
    let path = run.paths.national_outline();
    if path.exists() { return Ok(Outcome::skipped("already exists")) }

    let outline = country_features(run.config, run.iso3(), 0, NATIONAL_TOLERANCE)?;
    if outline.is_empty() {
        return Ok(Outcome::skipped("country absent from boundary dataset"));
    }

    let meta = run.meta;
    let features = outline.features.into_iter()
        .map(|f| {
            let name = f.text("NAME_0").map(str::to_string);
            let mut out = Feature::new(f.geometry)
                .with_attr("GID_0", meta.iso3.as_str())
                .with_attr("iso3", meta.iso3.as_str())
                .with_attr("iso2", meta.iso2.as_str())
                .with_attr("country", meta.name.as_str());
            if let Some(name) = name { out = out.with_attr("NAME_0", name) }
            if let Some(income) = &meta.income_group { out = out.with_attr("income", income.as_str()) }
            out
        })
        .collect();
    Layer::new(features).write(&path)?;
    info!(iso3 = %meta.iso3, "national outline written");
    Ok(Outcome::Written)
}

fn region_set(run: &CountryRun, level: u8) -> Result<Outcome> {
    let path = run.paths.regions(level);
    if path.exists() { return Ok(Outcome::skipped("already exists")) }

    let regions = country_features(run.config, run.iso3(), level, REGION_TOLERANCE)?;
    if regions.is_empty() {
        return Ok(Outcome::skipped(format!("no level {level} regions in boundary dataset")));
    }

    let gid = format!("GID_{level}");
    let name = format!("NAME_{level}");
    let features: Vec<Feature> = regions.features.into_iter()
        .filter_map(|f| {
            let id = f.text(&gid)?.to_string();
            let label = f.text(&name).map(str::to_string);
            let mut out = Feature::new(f.geometry)
                .with_attr("GID_0", run.iso3())
                .with_attr(&gid, id);
            if let Some(label) = label { out = out.with_attr(&name, label) }
            Some(out)
        })
        .collect();
    Layer::new(features).write(&path)?;
    Ok(Outcome::Written)
}

/// `boundaries/{gid}.shp`, one feature each, keyed by region.
fn split_regions(run: &CountryRun) -> Result<()> {
    let depth = run.meta.depth();
    let source = run.paths.regions(depth);
    if !source.exists() { return Ok(()) }

    let gid_field = run.meta.gid_field();
    let dir = run.paths.boundaries_dir();
    for feature in Layer::read(&source)?.features {
        let Some(gid) = feature.text(&gid_field).map(str::to_string) else { continue };
        let path = dir.join(format!("{gid}.shp"));
        let result = if path.exists() {
            Ok(Outcome::skipped("already exists"))
        } else {
            Layer::new(vec![feature])
                .write(&path)
                .and_then(|_| ArtifactKey::for_region(run.iso3(), &gid).write_sidecar(&path))
                .map(|_| Outcome::Written)
        };
        run.record(Stage::Boundary, gid, result);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{country::CountryMeta, report::RunReport};
    use geo::{polygon, MultiPolygon};

    fn kenya() -> CountryMeta {
        CountryMeta {
            iso3: "KEN".to_string(),
            iso2: "KE".to_string(),
            name: "Kenya".to_string(),
            gid_region: 1,
            income_group: Some("LMC".to_string()),
            exclude: false,
        }
    }

    #[test]
    fn outline_carries_country_metadata() {
        let tmp = tempfile::tempdir().unwrap();
        let config = Config::new(tmp.path());
        let square = MultiPolygon(vec![polygon![(x: 36.0, y: -1.0), (x: 37.0, y: -1.0), (x: 37.0, y: 0.0), (x: 36.0, y: 0.0)]]);
        Layer::new(vec![Feature::new(square).with_attr("GID_0", "KEN").with_attr("NAME_0", "Kenya")])
            .write(&config.boundary_source(0))
            .unwrap();

        let meta = kenya();
        let report = RunReport::new();
        let run = CountryRun::new(&config, &meta, &report);
        assert_eq!(national_outline(&run).unwrap(), Outcome::Written);

        let outline = Layer::read(&run.paths.national_outline()).unwrap();
        assert_eq!(outline.len(), 1);
        assert_eq!(outline.features[0].text("income"), Some("LMC"));
        assert_eq!(outline.features[0].text("iso2"), Some("KE"));
        assert_eq!(outline.features[0].text("NAME_0"), Some("Kenya"));
    }
}
