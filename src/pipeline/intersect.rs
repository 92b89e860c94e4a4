//! Funnel overlay of per-region layers paired by file name.
//!
//! Two shapefiles describe the same region when one file name contains the
//! other (`KEN.1_1.shp` pairs with `inunriver_..._KEN.1_1.shp`).  The output
//! name is the left name, optionally prefixed, so that tokens accumulate
//! down the funnel:
//!
//! ```text
//! population ∩ hazard              → pop_hazard/{stem}_{gid}.shp
//! pop_hazard ∩ coverage/{tech}     → pop_hazard_coverage/{tech}_{stem}_{gid}.shp
//! pop_hazard_coverage ∩ poverty    → pop_hazard_coverage_poverty/{tech}_{stem}_{gid}.shp
//! pop_hazard ∖ coverage/{tech}     → pop_unconnected/{tech}_{stem}_{gid}.shp
//! ```

use std::path::Path;

use anyhow::{bail, Context, Result};
use rayon::prelude::*;
use tracing::debug;

use crate::{
    common,
    config::FunnelDir,
    error::StageError,
    geom::OverlayOp,
    layer::{ArtifactKey, Layer, Technology},
    pipeline::{CountryRun, Stage},
    report::Outcome,
};

/// How one folder pair is overlaid.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IntersectOptions {
    pub op: OverlayOp,
    /// Token prepended to every output name as `{prefix}_{left name}`.
    pub prefix: Option<String>,
    /// Technology stamped on the key of every output.
    pub technology: Option<Technology>,
    /// Leave existing outputs alone instead of overwriting them.
    pub skip_existing: bool,
}

impl IntersectOptions {
    pub fn new(op: OverlayOp) -> Self {
        Self { op, prefix: None, technology: None, skip_existing: false }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    pub fn with_technology(mut self, tech: Technology) -> Self {
        self.technology = Some(tech);
        self
    }

    pub fn skip_existing(mut self, skip: bool) -> Self {
        self.skip_existing = skip;
        self
    }

    fn output_name(&self, left_name: &str) -> String {
        match &self.prefix {
            Some(prefix) => format!("{prefix}_{left_name}"),
            None => left_name.to_string(),
        }
    }

    fn tag(&self, key: Option<ArtifactKey>) -> Option<ArtifactKey> {
        match (key, self.technology) {
            (Some(key), Some(tech)) => Some(key.with_technology(tech)),
            (key, _) => key,
        }
    }
}

/// Pick the right-hand partner of `left_name`: an exact name wins, otherwise
/// the first (sorted) name that contains or is contained in it.
pub(crate) fn find_match<'a>(left_name: &str, right_names: &'a [String]) -> (Option<&'a str>, Vec<&'a str>) {
    if let Some(exact) = right_names.iter().find(|r| r.as_str() == left_name) {
        return (Some(exact.as_str()), Vec::new());
    }
    let mut hits = right_names.iter()
        .filter(|r| r.contains(left_name) || left_name.contains(r.as_str()))
        .map(String::as_str);
    let first = hits.next();
    (first, hits.collect())
}

/// Overlay every shapefile of `left_dir` with its name-matched partner in
/// `right_dir`, writing into `out_dir`.
///
/// Returns one `(output name, outcome)` per left file; per-file failures are
/// folded into `Outcome::Failed` and never stop the batch.  A left file with
/// no partner is skipped, except under difference, where nothing is
/// subtracted and the left layer is written through unchanged.
pub fn intersect(left_dir: &Path, right_dir: &Path, out_dir: &Path, options: &IntersectOptions) -> Result<Vec<(String, Outcome)>> {
    let left_files = common::list_files(left_dir, "shp")?;
    let right_names: Vec<String> = common::list_files(right_dir, "shp")?
        .iter()
        .map(|p| common::file_name(p))
        .collect();

    Ok(left_files.par_iter()
        .map(|left| {
            let left_name = common::file_name(left);
            let out_name = options.output_name(&left_name);
            let out = out_dir.join(&out_name);
            let outcome = pair(left, &left_name, right_dir, &right_names, &out, options)
                .unwrap_or_else(|e| Outcome::from_error(&e));
            (out_name, outcome)
        })
        .collect())
}

fn pair(left: &Path, left_name: &str, right_dir: &Path, right_names: &[String], out: &Path, options: &IntersectOptions) -> Result<Outcome> {
    if options.skip_existing && out.exists() {
        return Ok(Outcome::skipped("already exists"));
    }

    let (matched, ignored) = find_match(left_name, right_names);
    if !ignored.is_empty() {
        debug!(file = left_name, ignored = ?ignored, "several candidate matches, using the first");
    }

    let Some(right_name) = matched else {
        if options.op == OverlayOp::Difference {
            let layer = Layer::read(left)?;
            return write_result(&layer, options.tag(ArtifactKey::resolve(left)?), out);
        }
        let err = StageError::NoMatch { file: left_name.to_string(), dir: right_dir.to_path_buf() };
        return Ok(Outcome::skipped(err));
    };
    let right = right_dir.join(right_name);

    let key = match (ArtifactKey::resolve(left)?, ArtifactKey::resolve(&right)?) {
        (Some(a), Some(b)) => Some(a.merge(&b).with_context(|| format!("pairing {left_name} with {right_name}"))?),
        (a, b) => a.or(b),
    };
    if let (Some(found), Some(tech)) = (key.as_ref().and_then(|k| k.technology), options.technology) {
        if found != tech {
            bail!("pairing {left_name} with {right_name}: {found} layer in a {tech} overlay");
        }
    }
    let key = options.tag(key);

    let left_layer = Layer::read(left)?;
    let right_layer = Layer::read(&right)?;
    let result = left_layer.overlay(&right_layer, options.op);
    if result.is_empty() {
        return Ok(Outcome::skipped(format!("empty {}", options.op)));
    }
    write_result(&result, key, out)
}

fn write_result(layer: &Layer, key: Option<ArtifactKey>, out: &Path) -> Result<Outcome> {
    layer.write(out)?;
    if let Some(key) = key {
        key.write_sidecar(out)?;
    }
    Ok(Outcome::Written)
}

// ---------------------------------------------------------------------------
// Funnel
// ---------------------------------------------------------------------------

/// Run the whole funnel for every configured hazard type.
pub(crate) fn run_funnel(run: &CountryRun) -> Result<()> {
    let paths = &run.paths;
    let skip = run.config.skip_existing;

    for &hazard in &run.config.hazards {
        let pop_hazard = paths.funnel(hazard, FunnelDir::PopHazard);
        let pop_hazard_coverage = paths.funnel(hazard, FunnelDir::PopHazardCoverage);

        for stem_dir in common::list_dirs(&paths.hazard_root(hazard))? {
            let stem = common::file_name(&stem_dir);
            let options = IntersectOptions::new(OverlayOp::Intersection).with_prefix(stem).skip_existing(skip);
            record_all(run, &pop_hazard, intersect(&paths.population_shapes(), &stem_dir.join("shapefiles"), &pop_hazard, &options));
        }

        for &tech in &run.config.technologies {
            let coverage = paths.coverage_regions(tech);

            let options = IntersectOptions::new(OverlayOp::Intersection)
                .with_prefix(tech.label())
                .with_technology(tech)
                .skip_existing(skip);
            record_all(run, &pop_hazard_coverage, intersect(&pop_hazard, &coverage, &pop_hazard_coverage, &options));

            let unconnected = paths.funnel(hazard, FunnelDir::PopUnconnected);
            let options = IntersectOptions::new(OverlayOp::Difference)
                .with_prefix(tech.label())
                .with_technology(tech)
                .skip_existing(skip);
            record_all(run, &unconnected, intersect(&pop_hazard, &coverage, &unconnected, &options));
        }

        let with_poverty = paths.funnel(hazard, FunnelDir::PopHazardCoveragePoverty);
        let options = IntersectOptions::new(OverlayOp::Intersection).skip_existing(skip);
        record_all(run, &with_poverty, intersect(&pop_hazard_coverage, &paths.poverty_regions(), &with_poverty, &options));
    }
    Ok(())
}

fn record_all(run: &CountryRun, out_dir: &Path, results: Result<Vec<(String, Outcome)>>) {
    let folder = common::file_name(out_dir);
    match results {
        Ok(results) => {
            for (name, outcome) in results {
                run.record(Stage::Intersect, format!("{folder}/{name}"), Ok(outcome));
            }
        }
        Err(e) => run.record(Stage::Intersect, folder, Err(e)),
    }
}
