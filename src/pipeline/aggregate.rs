//! Per-country CSV summaries of the overlay funnel.

use std::{
    collections::BTreeSet,
    fmt,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    common,
    config::{CountryPaths, FunnelDir},
    geom::WebMercator,
    layer::{ArtifactKey, HazardType, Layer},
    pipeline::{CountryRun, PovertyBand, Stage},
    report::Outcome,
};

/// Columns every region summary is grouped by.
pub const REGION_KEYS: [&str; 5] = ["iso3", "region", "scenario", "period", "technology"];

/// Columns every country summary is grouped by.
pub const COUNTRY_KEYS: [&str; 4] = ["iso3", "scenario", "period", "technology"];

const UNCONNECTED_KEYS: [&str; 6] = ["iso3", "hazard", "region", "scenario", "period", "technology"];

/// Summarised quantity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    /// Hazard value, `value_2` of the funnel.
    Depth,
    /// Population value, `value_1` of the funnel.
    Population,
    /// Parcel area in EPSG:3857 m².
    Area,
}

impl Metric {
    pub const ALL: [Metric; 3] = [Metric::Depth, Metric::Population, Metric::Area];

    pub fn column(self) -> &'static str {
        match self {
            Self::Depth => "depth",
            Self::Population => "population",
            Self::Area => "area",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.column()) }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Reducer {
    Sum,
    Mean,
}

impl Reducer {
    fn apply(self, expr: Expr) -> Expr {
        match self {
            Self::Sum => expr.sum(),
            Self::Mean => expr.mean(),
        }
    }
}

/// Reducer per metric for one grouping call.
///
/// Within a region, vectorized parcels repeat the same population pixel value
/// and are averaged.  Across regions the per-region values are independent
/// and are summed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregationPlan {
    pub depth: Reducer,
    pub population: Reducer,
    pub area: Reducer,
}

impl AggregationPlan {
    /// Raw parcels grouped by region, scenario, period and technology.
    pub const REGION: Self = Self { depth: Reducer::Mean, population: Reducer::Mean, area: Reducer::Mean };

    /// Region rows grouped by scenario, period and technology.
    pub const COUNTRY: Self = Self { depth: Reducer::Mean, population: Reducer::Sum, area: Reducer::Sum };

    /// Plain totals, used for the unconnected population.
    pub const TOTAL: Self = Self { depth: Reducer::Mean, population: Reducer::Sum, area: Reducer::Sum };

    pub fn reducer(&self, metric: Metric) -> Reducer {
        match metric {
            Metric::Depth => self.depth,
            Metric::Population => self.population,
            Metric::Area => self.area,
        }
    }

    fn exprs(&self) -> Vec<Expr> {
        Metric::ALL.iter()
            .map(|&m| self.reducer(m).apply(col(m.column())).alias(m.column()))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Parcels
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct Parcel {
    region: String,
    scenario: Option<String>,
    period: Option<String>,
    technology: Option<String>,
    population: Option<f64>,
    depth: Option<f64>,
    rwi: Option<f64>,
    area: f64,
}

/// Read every funnel shapefile of `dir` into one per-parcel table.
///
/// Columns: `iso3, hazard, region, scenario, period, technology, population,
/// depth, rwi, poverty, area`.  Rows are ordered by region, scenario, period
/// and technology.
pub fn read_parcels(dir: &Path, iso3: &str, hazard: HazardType, merc: &WebMercator) -> Result<DataFrame> {
    let table = read_parcel_files(&common::list_files(dir, "shp")?, iso3, hazard, merc)?;
    debug!(dir = %dir.display(), parcels = table.height(), "funnel parcels read");
    Ok(table)
}

/// Region a funnel file describes: its key's region id, else its stem.
fn parcel_region(file: &Path) -> Result<String> {
    Ok(ArtifactKey::resolve(file)?
        .and_then(|key| key.region_id)
        .unwrap_or_else(|| common::file_stem(file)))
}

fn read_parcel_files(files: &[PathBuf], iso3: &str, hazard: HazardType, merc: &WebMercator) -> Result<DataFrame> {
    let mut parcels: Vec<Parcel> = Vec::new();
    for file in files {
        let file = file.as_path();
        let key = ArtifactKey::resolve(file)?.unwrap_or_default();
        let region = key.region_id.clone().unwrap_or_else(|| common::file_stem(file));
        let layer = Layer::read(file).with_context(|| format!("Failed to read funnel layer {}", file.display()))?;
        for (feature, area) in layer.features.iter().zip(layer.areas_m2(merc)?) {
            parcels.push(Parcel {
                region: region.clone(),
                scenario: key.scenario.map(|s| s.label().to_string()),
                period: key.period.map(|p| p.label()),
                technology: key.technology.map(|t| t.label().to_string()),
                population: feature.number("value_1"),
                depth: feature.number("value_2"),
                rwi: feature.number("rwi"),
                area,
            });
        }
    }
    parcels.sort_by(|a, b| {
        (&a.region, &a.scenario, &a.period, &a.technology).cmp(&(&b.region, &b.scenario, &b.period, &b.technology))
    });

    let n = parcels.len();
    Ok(DataFrame::new(vec![
        Column::new("iso3".into(), vec![iso3; n]),
        Column::new("hazard".into(), vec![hazard.dir_name(); n]),
        Column::new("region".into(), parcels.iter().map(|p| p.region.clone()).collect::<Vec<_>>()),
        Column::new("scenario".into(), parcels.iter().map(|p| p.scenario.clone()).collect::<Vec<_>>()),
        Column::new("period".into(), parcels.iter().map(|p| p.period.clone()).collect::<Vec<_>>()),
        Column::new("technology".into(), parcels.iter().map(|p| p.technology.clone()).collect::<Vec<_>>()),
        Column::new("population".into(), parcels.iter().map(|p| p.population).collect::<Vec<_>>()),
        Column::new("depth".into(), parcels.iter().map(|p| p.depth).collect::<Vec<_>>()),
        Column::new("rwi".into(), parcels.iter().map(|p| p.rwi).collect::<Vec<_>>()),
        Column::new("poverty".into(), parcels.iter()
            .map(|p| p.rwi.map(|v| PovertyBand::from_rwi(v).label()))
            .collect::<Vec<_>>()),
        Column::new("area".into(), parcels.iter().map(|p| p.area).collect::<Vec<_>>()),
    ])?)
}

/// Group `table` by `keys`, reducing every metric column with `plan`.
/// Groups keep the order in which they first appear.
pub fn summarize(table: &DataFrame, keys: &[&str], plan: &AggregationPlan) -> Result<DataFrame> {
    let by: Vec<Expr> = keys.iter().map(|&k| col(k)).collect();
    Ok(table.clone().lazy()
        .group_by_stable(by)
        .agg(plan.exprs())
        .collect()?)
}

// ---------------------------------------------------------------------------
// Stage
// ---------------------------------------------------------------------------

/// Funnel files to aggregate: every region is read from the deepest funnel
/// step that holds any file for it, so a region missing from a later step
/// falls back to an earlier one instead of disappearing.
fn funnel_files(paths: &CountryPaths, hazard: HazardType) -> Result<Vec<PathBuf>> {
    let mut claimed: BTreeSet<String> = BTreeSet::new();
    let mut files = Vec::new();
    for step in [FunnelDir::PopHazardCoveragePoverty, FunnelDir::PopHazardCoverage, FunnelDir::PopHazard] {
        let mut found = BTreeSet::new();
        let mut fallback = BTreeSet::new();
        for file in common::list_files(&paths.funnel(hazard, step), "shp")? {
            let region = parcel_region(&file)?;
            if claimed.contains(&region) { continue }
            if !claimed.is_empty() { fallback.insert(region.clone()); }
            found.insert(region);
            files.push(file);
        }
        if !fallback.is_empty() {
            debug!(iso3 = paths.iso3(), hazard = %hazard, step = ?step, regions = ?fallback, "regions read from an earlier funnel step");
        }
        claimed.extend(found);
    }
    Ok(files)
}

/// Write the detail, region and per-metric country CSVs for every hazard,
/// then the unconnected population summary.
pub(crate) fn aggregate_country(run: &CountryRun) -> Result<()> {
    let merc = WebMercator::new()?;
    for &hazard in &run.config.hazards {
        run.record(Stage::Aggregate, hazard.dir_name(), aggregate_hazard(&run.paths, hazard, &merc));
    }
    run.record(Stage::Aggregate, "unconnected", aggregate_unconnected(run, &merc));
    Ok(())
}

fn aggregate_hazard(paths: &CountryPaths, hazard: HazardType, merc: &WebMercator) -> Result<Outcome> {
    let files = funnel_files(paths, hazard)?;
    if files.is_empty() { return Ok(Outcome::skipped("no funnel output")) }
    let iso3 = paths.iso3();
    let detail = read_parcel_files(&files, iso3, hazard, merc)?;
    if detail.height() == 0 { return Ok(Outcome::skipped("funnel layers hold no features")) }

    let out_dir = paths.vulnerable_csv_dir();
    common::ensure_dir_exists(&out_dir)?;
    let name = |suffix: &str| out_dir.join(format!("{iso3}_{hazard}_{suffix}.csv"));

    common::write_to_csv_file(&name("aggregated_results"), &detail)?;
    let regional = summarize(&detail, &REGION_KEYS, &AggregationPlan::REGION)?;
    common::write_to_csv_file(&name("regional_summary"), &regional)?;

    let country = summarize(&regional, &COUNTRY_KEYS, &AggregationPlan::COUNTRY)?;
    for metric in Metric::ALL {
        let columns: Vec<&str> = COUNTRY_KEYS.iter().copied().chain([metric.column()]).collect();
        let table = country.select(columns)?;
        common::write_to_csv_file(&name(&format!("{metric}_average")), &table)?;
    }
    info!(iso3, hazard = %hazard, files = files.len(), rows = detail.height(), "aggregates written");
    Ok(Outcome::Written)
}

fn aggregate_unconnected(run: &CountryRun, merc: &WebMercator) -> Result<Outcome> {
    let mut tables: Vec<DataFrame> = Vec::new();
    for &hazard in &run.config.hazards {
        let dir = run.paths.funnel(hazard, FunnelDir::PopUnconnected);
        let detail = read_parcels(&dir, run.iso3(), hazard, merc)?;
        if detail.height() > 0 { tables.push(detail) }
    }
    let Some(mut all) = tables.pop() else { return Ok(Outcome::skipped("no unconnected population")) };
    for table in tables.iter().rev() {
        all = table.vstack(&all)?;
    }

    let summary = summarize(&all, &UNCONNECTED_KEYS, &AggregationPlan::TOTAL)?;
    let out_dir = run.paths.unconnected_csv_dir();
    common::ensure_dir_exists(&out_dir)?;
    common::write_to_csv_file(&out_dir.join(format!("{}_unconnected_results.csv", run.iso3())), &summary)?;
    Ok(Outcome::Written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::Config,
        layer::{Feature, HazardScenario, Technology},
    };
    use geo::{polygon, MultiPolygon};

    fn parcels() -> DataFrame {
        df![
            "iso3" => ["KEN", "KEN", "KEN", "KEN", "KEN"],
            "region" => ["KEN.1_1", "KEN.1_1", "KEN.1_1", "KEN.1_2", "KEN.1_2"],
            "scenario" => ["historical", "historical", "rcp8p5", "historical", "historical"],
            "period" => ["rp00100", "rp00100", "rp00100", "rp00100", "rp00100"],
            "technology" => ["GSM", "GSM", "GSM", "GSM", "4G"],
            "population" => [100.0, 300.0, 50.0, 10.0, 20.0],
            "depth" => [1.0, 3.0, 2.0, 4.0, 6.0],
            "area" => [10.0, 30.0, 5.0, 1.0, 2.0],
        ].unwrap()
    }

    fn value(df: &DataFrame, column: &str, row: usize) -> f64 {
        df.column(column).unwrap().f64().unwrap().get(row).unwrap()
    }

    #[test]
    fn one_row_per_group_key() {
        let out = summarize(&parcels(), &REGION_KEYS, &AggregationPlan::REGION).unwrap();
        assert_eq!(out.height(), 4);
        assert_eq!(value(&out, "population", 0), 200.0);
        assert_eq!(value(&out, "depth", 0), 2.0);
        assert_eq!(value(&out, "area", 0), 20.0);
    }

    #[test]
    fn summed_population_matches_input() {
        let plan = AggregationPlan { depth: Reducer::Mean, population: Reducer::Sum, area: Reducer::Sum };
        let out = summarize(&parcels(), &REGION_KEYS, &plan).unwrap();
        assert_eq!(value(&out, "population", 0), 400.0);
        assert_eq!(value(&out, "population", 1), 50.0);
        assert_eq!(value(&out, "population", 2), 10.0);
        assert_eq!(value(&out, "area", 0), 40.0);
        assert_eq!(value(&out, "depth", 0), 2.0);
    }

    #[test]
    fn country_plan_sums_regions() {
        let regional = summarize(&parcels(), &REGION_KEYS, &AggregationPlan::REGION).unwrap();
        let country = summarize(&regional, &COUNTRY_KEYS, &AggregationPlan::COUNTRY).unwrap();
        // historical/GSM covers both regions: 200 (mean of KEN.1_1) + 10.
        assert_eq!(country.height(), 3);
        assert_eq!(value(&country, "population", 0), 210.0);
        assert_eq!(value(&country, "depth", 0), 3.0);
    }

    #[test]
    fn parcels_take_tags_from_keys() {
        let tmp = tempfile::tempdir().unwrap();
        let scenario = HazardScenario::parse("inuncoast_historical_nosub_hist_rp0100_0").unwrap();
        let path = tmp.path().join("4G_inuncoast_historical_nosub_hist_rp0100_0_KEN.1_1.shp");
        let square = MultiPolygon(vec![polygon![(x: 0.0, y: 0.0), (x: 0.01, y: 0.0), (x: 0.01, y: 0.01), (x: 0.0, y: 0.01)]]);
        Layer::new(vec![
            Feature::new(square).with_attr("value_1", 120.0).with_attr("value_2", 0.8).with_attr("rwi", 0.3),
        ]).write(&path).unwrap();
        ArtifactKey::for_region("KEN", "KEN.1_1").with_hazard(&scenario).with_technology(Technology::G4)
            .write_sidecar(&path).unwrap();

        let merc = WebMercator::new().unwrap();
        let df = read_parcels(tmp.path(), "KEN", HazardType::Coastal, &merc).unwrap();
        assert_eq!(df.height(), 1);
        assert_eq!(df.column("region").unwrap().str().unwrap().get(0), Some("KEN.1_1"));
        assert_eq!(df.column("period").unwrap().str().unwrap().get(0), Some("rp00100"));
        assert_eq!(df.column("technology").unwrap().str().unwrap().get(0), Some("4G"));
        assert_eq!(df.column("hazard").unwrap().str().unwrap().get(0), Some("coastal"));
        assert_eq!(df.column("poverty").unwrap().str().unwrap().get(0), Some("0 - 0.5"));
        assert_eq!(value(&df, "population", 0), 120.0);
        // 0.01° square at the equator is roughly 1.24 km² in web mercator.
        let area = value(&df, "area", 0);
        assert!(area > 1.2e6 && area < 1.3e6, "area {area}");
    }

    #[test]
    fn regions_missing_from_a_later_step_fall_back() {
        let tmp = tempfile::tempdir().unwrap();
        let config = Config::new(tmp.path());
        let paths = config.country("KEN");
        let scenario = HazardScenario::parse("inunriver_historical_000000000WATCH_1980_rp00100").unwrap();
        let square = MultiPolygon(vec![polygon![(x: 36.0, y: -1.0), (x: 36.01, y: -1.0), (x: 36.01, y: -0.99), (x: 36.0, y: -0.99)]]);
        let write = |step: FunnelDir, gid: &str| {
            let path = paths.funnel(HazardType::Riverine, step).join(format!("GSM_{}_{gid}.shp", scenario.stem));
            Layer::new(vec![Feature::new(square.clone()).with_attr("value_1", 10.0).with_attr("value_2", 1.0)])
                .write(&path)
                .unwrap();
            ArtifactKey::for_region("KEN", gid).with_hazard(&scenario).with_technology(Technology::Gsm)
                .write_sidecar(&path)
                .unwrap();
        };
        write(FunnelDir::PopHazardCoveragePoverty, "KEN.1_1");
        write(FunnelDir::PopHazardCoverage, "KEN.1_1");
        write(FunnelDir::PopHazardCoverage, "KEN.1_2");

        let files = funnel_files(&paths, HazardType::Riverine).unwrap();
        assert_eq!(files.len(), 2);
        assert!(files[0].starts_with(paths.funnel(HazardType::Riverine, FunnelDir::PopHazardCoveragePoverty)));
        assert!(files[1].starts_with(paths.funnel(HazardType::Riverine, FunnelDir::PopHazardCoverage)));

        let merc = WebMercator::new().unwrap();
        let df = read_parcel_files(&files, "KEN", HazardType::Riverine, &merc).unwrap();
        let regions: Vec<_> = df.column("region").unwrap().str().unwrap().into_no_null_iter().collect();
        assert_eq!(regions, ["KEN.1_1", "KEN.1_2"]);
    }
}
