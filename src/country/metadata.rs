use std::path::Path;

use anyhow::{Context, Result};
use polars::prelude::*;
use tracing::debug;

use crate::{common, config::Config, error::StageError};

/// Countries always processed at the first administrative level only.
pub const LARGE_COUNTRIES: [&str; 7] = ["ARG", "BRA", "CHN", "USA", "DZA", "IND", "RUS"];

/// One row of `countries.csv`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CountryMeta {
    pub iso3: String,
    pub iso2: String,
    pub name: String,
    /// Administrative depth to partition the country by (`0` = none).
    pub gid_region: u8,
    pub income_group: Option<String>,
    pub exclude: bool,
}

impl CountryMeta {
    /// Depth actually processed: large countries are pinned to level 1.
    pub fn depth(&self) -> u8 {
        if LARGE_COUNTRIES.contains(&self.iso3.as_str()) { self.gid_region.min(1) } else { self.gid_region }
    }

    /// `GID_{depth}` field naming the lowest processed level.
    pub fn gid_field(&self) -> String { format!("GID_{}", self.depth()) }
}

/// Read every row of the country metadata CSV.
pub fn load_countries(path: &Path) -> Result<Vec<CountryMeta>> {
    if !path.exists() { return Err(StageError::MissingInput(path.to_path_buf()).into()) }
    let df = common::read_from_csv_file(path)?;

    let iso3 = string_column(&df, "iso3")?
        .with_context(|| format!("{} has no iso3 column", path.display()))?;
    let height = df.height();
    let iso2 = string_column(&df, "iso2")?.unwrap_or_else(|| vec![None; height]);
    let name = string_column(&df, "country")?.unwrap_or_else(|| vec![None; height]);
    let income = string_column(&df, "income_group")?.unwrap_or_else(|| vec![None; height]);
    let gid_region = int_column(&df, "gid_region")?.unwrap_or_else(|| vec![None; height]);
    let exclude = int_column(&df, "Exclude")?.unwrap_or_else(|| vec![None; height]);

    Ok((0..height)
        .filter_map(|i| {
            let iso3 = iso3[i].clone()?.trim().to_ascii_uppercase();
            Some(CountryMeta {
                iso2: iso2[i].clone().unwrap_or_default().trim().to_string(),
                name: name[i].clone().unwrap_or_default(),
                gid_region: gid_region[i].unwrap_or(0).clamp(0, u8::MAX as i64) as u8,
                income_group: income[i].clone().filter(|s| !s.is_empty()),
                exclude: exclude[i].unwrap_or(0) != 0,
                iso3,
            })
        })
        .collect())
}

/// Countries to process under `config`, one entry per ISO3, in file order.
///
/// Excluded rows and rows outside the configured selection are dropped
/// entirely.  Countries without a subnational depth are kept; the caller
/// reports them as skipped.
pub fn select_countries(config: &Config) -> Result<Vec<CountryMeta>> {
    let mut selected: Vec<CountryMeta> = Vec::new();
    for meta in load_countries(&config.countries_csv())? {
        if meta.exclude {
            debug!(iso3 = %meta.iso3, "excluded by metadata");
            continue;
        }
        if !config.selects(&meta.iso3) { continue }
        if selected.iter().any(|m| m.iso3 == meta.iso3) { continue }
        selected.push(meta);
    }
    Ok(selected)
}

fn string_column(df: &DataFrame, name: &str) -> Result<Option<Vec<Option<String>>>> {
    let Ok(column) = df.column(name) else { return Ok(None) };
    let column = column.cast(&DataType::String)
        .with_context(|| format!("column {name} is not text"))?;
    Ok(Some(column.str()?.into_iter().map(|v| v.map(str::to_string)).collect()))
}

fn int_column(df: &DataFrame, name: &str) -> Result<Option<Vec<Option<i64>>>> {
    let Ok(column) = df.column(name) else { return Ok(None) };
    let column = column.cast(&DataType::Int64)
        .with_context(|| format!("column {name} is not numeric"))?;
    Ok(Some(column.i64()?.into_iter().collect()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const CSV: &str = "iso3,iso2,country,gid_region,income_group,Exclude\n\
        KEN,KE,Kenya,2,LMC,0\n\
        BRA,BR,Brazil,2,UMC,0\n\
        ATA,AQ,Antarctica,1,,1\n\
        MCO,MC,Monaco,0,HIC,0\n\
        KEN,KE,Kenya,2,LMC,0\n";

    fn config_with_csv() -> (tempfile::TempDir, Config) {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::new(dir.path());
        std::fs::create_dir_all(config.raw()).unwrap();
        std::fs::write(config.countries_csv(), CSV).unwrap();
        (dir, config)
    }

    #[test]
    fn rows_are_parsed() {
        let (_dir, config) = config_with_csv();
        let all = load_countries(&config.countries_csv()).unwrap();
        assert_eq!(all.len(), 5);
        assert_eq!(all[0].iso2, "KE");
        assert_eq!(all[0].gid_region, 2);
        assert!(all[2].exclude);
        assert_eq!(all[2].income_group, None);
    }

    #[test]
    fn excluded_and_duplicate_rows_are_dropped() {
        let (_dir, config) = config_with_csv();
        let isos: Vec<String> = select_countries(&config).unwrap().into_iter().map(|m| m.iso3).collect();
        assert_eq!(isos, ["KEN", "BRA", "MCO"]);
    }

    #[test]
    fn selection_filters_case_insensitively() {
        let (_dir, mut config) = config_with_csv();
        config.countries = Some(vec!["bra".to_string(), "ATA".to_string()]);
        let isos: Vec<String> = select_countries(&config).unwrap().into_iter().map(|m| m.iso3).collect();
        assert_eq!(isos, ["BRA"]);
    }

    #[test]
    fn large_countries_are_pinned_to_depth_one() {
        let (_dir, config) = config_with_csv();
        let selected = select_countries(&config).unwrap();
        assert_eq!(selected[0].depth(), 2);
        assert_eq!(selected[1].depth(), 1);
        assert_eq!(selected[1].gid_field(), "GID_1");
        assert_eq!(selected[2].depth(), 0);
    }
}
