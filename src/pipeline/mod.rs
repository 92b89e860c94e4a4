//! Per-country pipeline and the parallel run over all countries.

mod aggregate;
mod boundary;
mod combine;
mod coverage;
mod intersect;
mod poverty;
mod raster;

pub use aggregate::{read_parcels, summarize, AggregationPlan, Metric, Reducer, COUNTRY_KEYS, REGION_KEYS};
pub use combine::combine;
pub use intersect::{intersect, IntersectOptions};
pub use poverty::PovertyBand;

use std::{fmt, path::PathBuf, str::FromStr};

use anyhow::{bail, Context, Result};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{info, info_span, warn};

use crate::{
    common,
    config::{Config, CountryPaths},
    country::{self, CountryMeta},
    report::{Outcome, RunReport},
};

/// Pipeline stages in dependency order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Boundary,
    Raster,
    Coverage,
    Poverty,
    Intersect,
    Aggregate,
    Combine,
}

impl Stage {
    pub const ALL: [Stage; 7] = [
        Stage::Boundary,
        Stage::Raster,
        Stage::Coverage,
        Stage::Poverty,
        Stage::Intersect,
        Stage::Aggregate,
        Stage::Combine,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Boundary => "boundary",
            Self::Raster => "raster",
            Self::Coverage => "coverage",
            Self::Poverty => "poverty",
            Self::Intersect => "intersect",
            Self::Aggregate => "aggregate",
            Self::Combine => "combine",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.name()) }
}

impl FromStr for Stage {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match Self::ALL.iter().find(|stage| stage.name().eq_ignore_ascii_case(s)) {
            Some(stage) => Ok(*stage),
            None => bail!("unknown stage: {s}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Country context
// ---------------------------------------------------------------------------

/// Everything one country's stages share.
pub(crate) struct CountryRun<'a> {
    pub(crate) config: &'a Config,
    pub(crate) meta: &'a CountryMeta,
    pub(crate) paths: CountryPaths<'a>,
    pub(crate) report: &'a RunReport,
}

impl<'a> CountryRun<'a> {
    pub(crate) fn new(config: &'a Config, meta: &'a CountryMeta, report: &'a RunReport) -> Self {
        Self { config, meta, paths: config.country(&meta.iso3), report }
    }

    #[inline]
    pub(crate) fn iso3(&self) -> &str { &self.meta.iso3 }

    /// Record the result of one unit of work.  Errors become `Failed`.
    pub(crate) fn record(&self, stage: Stage, item: impl Into<String>, result: Result<Outcome>) {
        let outcome = result.unwrap_or_else(|e| Outcome::from_error(&e));
        self.report.record(self.iso3(), stage, item, outcome);
    }

    /// Per-region boundary files as `(gid, path)`, in name order.
    pub(crate) fn regions(&self) -> Result<Vec<(String, PathBuf)>> {
        Ok(common::list_files(&self.paths.boundaries_dir(), "shp")?
            .into_iter()
            .map(|path| (common::file_stem(&path), path))
            .collect())
    }
}

/// Run every configured stage for one country.  Failures are recorded in
/// `report` and never abort the remaining stages.
pub fn run_country(config: &Config, meta: &CountryMeta, report: &RunReport) {
    let run = CountryRun::new(config, meta, report);
    if meta.depth() == 0 {
        run.record(Stage::Boundary, "regions", Ok(Outcome::skipped("no subnational depth")));
        return;
    }

    for stage in Stage::ALL.into_iter().filter(|s| *s != Stage::Combine && config.runs(*s)) {
        let _span = info_span!("stage", iso3 = %meta.iso3, stage = %stage).entered();
        info!("starting");
        let result = match stage {
            Stage::Boundary => boundary::prepare_boundaries(&run),
            Stage::Raster => raster::prepare_rasters(&run),
            Stage::Coverage => coverage::prepare_coverage(&run),
            Stage::Poverty => poverty::prepare_poverty(&run),
            Stage::Intersect => intersect::run_funnel(&run),
            Stage::Aggregate => aggregate::aggregate_country(&run),
            Stage::Combine => Ok(()),
        };
        if let Err(e) = result {
            warn!(error = %format!("{e:#}"), "stage failed");
            run.record(stage, "*", Err(e));
        }
    }
}

/// Run the whole pipeline: every selected country in parallel, then the
/// global combiner once all countries are done.  The report is written to
/// `results/run_report.json`.
pub fn run(config: &Config) -> Result<RunReport> {
    let countries = country::select_countries(config)?;
    info!(countries = countries.len(), "selected countries");

    let report = RunReport::new();
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.threads.unwrap_or(0))
        .build()
        .context("Failed to build worker pool")?;
    pool.install(|| {
        countries.par_iter().for_each(|meta| run_country(config, meta, &report));
    });

    if config.runs(Stage::Combine) {
        let _span = info_span!("stage", stage = %Stage::Combine).entered();
        if let Err(e) = combine(config, &report) {
            warn!(error = %format!("{e:#}"), "global combine failed");
            report.record("*", Stage::Combine, "global", Outcome::from_error(&e));
        }
    }

    report.write_json(&config.run_report_path())?;
    let summary = report.summary();
    info!(written = summary.written, skipped = summary.skipped, failed = summary.failed, "run finished");
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_names_round_trip() {
        for stage in Stage::ALL {
            assert_eq!(stage.to_string().parse::<Stage>().unwrap(), stage);
        }
        assert_eq!("Intersect".parse::<Stage>().unwrap(), Stage::Intersect);
        assert!("download".parse::<Stage>().is_err());
    }
}
