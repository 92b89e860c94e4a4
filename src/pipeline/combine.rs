//! Global tables stacked from every country's CSV summaries.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use polars::prelude::*;
use tracing::{debug, info};

use crate::{
    common,
    config::Config,
    country::Classification,
    pipeline::{Metric, Stage},
    report::{Outcome, RunReport},
};

const UNCONNECTED_FILE: &str = "unconnected_global_results.csv";

/// Stack `{iso3}_{hazard}_{metric}_average.csv` of every country under
/// `results/` into `global_results/vulnerable_{hazard}_{metric}_results.csv`,
/// and every unconnected summary into `unconnected_global_results.csv`.
///
/// Rows gain `continent`, `region` and `income` columns.  Country folders
/// without CSV output are skipped.
pub fn combine(config: &Config, report: &RunReport) -> Result<()> {
    let mut vulnerable_dirs = Vec::new();
    let mut unconnected_dirs = Vec::new();
    for country_dir in common::list_dirs(&config.results())? {
        let iso3 = common::file_name(&country_dir);
        let paths = config.country(&iso3);
        let vulnerable = paths.vulnerable_csv_dir();
        if vulnerable.is_dir() {
            vulnerable_dirs.push(vulnerable);
        } else {
            debug!(iso3, "no vulnerable csv files, skipping");
        }
        let unconnected = paths.unconnected_csv_dir();
        if unconnected.is_dir() { unconnected_dirs.push(unconnected) }
    }

    let out_dir = config.global_results();
    for &hazard in &config.hazards {
        for metric in Metric::ALL {
            let suffix = format!("_{hazard}_{metric}_average.csv");
            let files = matching_files(&vulnerable_dirs, &suffix)?;
            let schema = metric_schema(metric);
            let out = out_dir.join(format!("vulnerable_{hazard}_{metric}_results.csv"));
            let outcome = stack(&files, &schema, None, &out)
                .with_context(|| format!("Failed to combine {hazard} {metric} averages"));
            record(report, &out, outcome);
        }
    }

    let files = matching_files(&unconnected_dirs, "_unconnected_results.csv")?;
    let out = out_dir.join(UNCONNECTED_FILE);
    let outcome = stack(&files, &unconnected_schema(), Some(("region", "gid")), &out)
        .context("Failed to combine unconnected summaries");
    record(report, &out, outcome);
    Ok(())
}

fn record(report: &RunReport, out: &Path, result: Result<Outcome>) {
    let outcome = result.unwrap_or_else(|e| Outcome::from_error(&e));
    report.record("*", Stage::Combine, common::file_name(out), outcome);
}

fn matching_files(dirs: &[PathBuf], suffix: &str) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for dir in dirs {
        files.extend(common::list_files(dir, "csv")?.into_iter().filter(|f| common::file_name(f).ends_with(suffix)));
    }
    Ok(files)
}

fn metric_schema(metric: Metric) -> Vec<(&'static str, DataType)> {
    vec![
        ("iso3", DataType::String),
        ("scenario", DataType::String),
        ("period", DataType::String),
        ("technology", DataType::String),
        (metric.column(), DataType::Float64),
    ]
}

fn unconnected_schema() -> Vec<(&'static str, DataType)> {
    vec![
        ("iso3", DataType::String),
        ("hazard", DataType::String),
        ("gid", DataType::String),
        ("scenario", DataType::String),
        ("period", DataType::String),
        ("technology", DataType::String),
        ("depth", DataType::Float64),
        ("population", DataType::Float64),
        ("area", DataType::Float64),
    ]
}

/// Read, conform and classify every file, then write them as one table.
fn stack(files: &[PathBuf], schema: &[(&str, DataType)], rename: Option<(&str, &str)>, out: &Path) -> Result<Outcome> {
    if files.is_empty() { return Ok(Outcome::skipped("no country summaries")) }

    let mut combined: Option<DataFrame> = None;
    for file in files {
        let mut df = common::read_from_csv_file(file)?;
        if let Some((from, to)) = rename {
            if df.column(from).is_ok() { df.rename(from, to.into())?; }
        }
        let df = with_classification(conform(&df, schema)?)?;
        combined = Some(match combined {
            Some(acc) => acc.vstack(&df)?,
            None => df,
        });
    }

    let Some(combined) = combined else { return Ok(Outcome::skipped("no country summaries")) };
    common::ensure_parent_exists(out)?;
    common::write_to_csv_file(out, &combined)?;
    info!(file = %out.display(), countries = files.len(), rows = combined.height(), "global table written");
    Ok(Outcome::Written)
}

/// Project `df` onto `schema`: listed columns in order, cast to their type,
/// missing ones filled with nulls.
fn conform(df: &DataFrame, schema: &[(&str, DataType)]) -> Result<DataFrame> {
    let height = df.height();
    let columns = schema.iter()
        .map(|(name, dtype)| match df.column(name) {
            Ok(column) => column.cast(dtype).with_context(|| format!("column {name} cannot be read as {dtype}")),
            Err(_) => Ok(Column::full_null((*name).into(), height, dtype)),
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(DataFrame::new(columns)?)
}

fn with_classification(mut df: DataFrame) -> Result<DataFrame> {
    let classes: Vec<Classification> = df.column("iso3")?.str()?
        .into_iter()
        .map(|iso3| Classification::of(iso3.unwrap_or_default()))
        .collect();
    df.with_column(Column::new("continent".into(), classes.iter().map(|c| c.continent.label()).collect::<Vec<_>>()))?;
    df.with_column(Column::new("region".into(), classes.iter().map(|c| c.region.label()).collect::<Vec<_>>()))?;
    df.with_column(Column::new("income".into(), classes.iter().map(|c| c.income.label()).collect::<Vec<_>>()))?;
    Ok(df)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layer::HazardType;

    fn write(path: &Path, text: &str) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, text).unwrap();
    }

    #[test]
    fn stacks_countries_and_classifies_rows() {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = Config::new(tmp.path());
        config.hazards = vec![HazardType::Riverine];

        write(&config.country("KEN").vulnerable_csv_dir().join("KEN_riverine_population_average.csv"),
            "iso3,scenario,period,technology,population\nKEN,historical,rp00100,GSM,210\nKEN,rcp8p5,rp01000,4G,12.5\n");
        write(&config.country("BRA").vulnerable_csv_dir().join("BRA_riverine_population_average.csv"),
            "iso3,scenario,period,technology,population\nBRA,historical,rp00100,,40\n");
        // Folder without csv output.
        std::fs::create_dir_all(config.country("MCO").results()).unwrap();

        let report = RunReport::new();
        combine(&config, &report).unwrap();

        let out = config.global_results().join("vulnerable_riverine_population_results.csv");
        let df = common::read_from_csv_file(&out).unwrap();
        assert_eq!(df.height(), 3);
        let iso3: Vec<_> = df.column("iso3").unwrap().str().unwrap().into_no_null_iter().collect();
        assert_eq!(iso3, ["BRA", "KEN", "KEN"]);
        let continent: Vec<_> = df.column("continent").unwrap().str().unwrap().into_no_null_iter().collect();
        assert_eq!(continent, ["South America", "Africa", "Africa"]);
        assert_eq!(df.column("income").unwrap().str().unwrap().get(1), Some("LMC"));
        assert_eq!(df.column("region").unwrap().str().unwrap().get(1), Some("SSA"));

        // No depth files anywhere.
        assert!(!config.global_results().join("vulnerable_riverine_depth_results.csv").exists());
        assert!(report.records().iter().all(|r| !r.outcome.is_failed()));
    }

    #[test]
    fn unconnected_region_column_becomes_gid() {
        let tmp = tempfile::tempdir().unwrap();
        let config = Config::new(tmp.path());
        write(&config.country("KEN").unconnected_csv_dir().join("KEN_unconnected_results.csv"),
            "iso3,hazard,region,scenario,period,technology,depth,population,area\n\
             KEN,riverine,KEN.1_1,historical,rp00100,4G,0.5,100,2500\n");

        combine(&config, &RunReport::new()).unwrap();
        let df = common::read_from_csv_file(&config.global_results().join(UNCONNECTED_FILE)).unwrap();
        assert_eq!(df.column("gid").unwrap().str().unwrap().get(0), Some("KEN.1_1"));
        assert_eq!(df.column("region").unwrap().str().unwrap().get(0), Some("SSA"));
    }
}
