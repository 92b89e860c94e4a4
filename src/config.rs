//! Run configuration: one immutable value threaded through every stage.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::{layer::{HazardType, Technology}, pipeline::Stage};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Root holding `raw/`, `processed/`, `results/` and `global_results/`.
    pub base_path: PathBuf,
    /// ISO3 filter; `None` processes every non-excluded country.
    pub countries: Option<Vec<String>>,
    pub hazards: Vec<HazardType>,
    pub technologies: Vec<Technology>,
    pub stages: Vec<Stage>,
    /// Skip intersector outputs that already exist instead of overwriting them.
    pub skip_existing: bool,
    /// Worker threads for the country pool; `None` uses rayon's default.
    pub threads: Option<usize>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_path: PathBuf::from("."),
            countries: None,
            hazards: HazardType::ALL.to_vec(),
            technologies: Technology::ALL.to_vec(),
            stages: Stage::ALL.to_vec(),
            skip_existing: false,
            threads: None,
        }
    }
}

impl Config {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self { base_path: base_path.into(), ..Self::default() }
    }

    /// Load a JSON config file; absent keys take their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    #[inline]
    pub fn runs(&self, stage: Stage) -> bool { self.stages.contains(&stage) }

    /// Whether `iso3` passes the country filter.
    pub fn selects(&self, iso3: &str) -> bool {
        match &self.countries {
            Some(list) => list.iter().any(|c| c.eq_ignore_ascii_case(iso3)),
            None => true,
        }
    }

    // -----------------------------------------------------------------------
    // Directory roots
    // -----------------------------------------------------------------------

    pub fn raw(&self) -> PathBuf { self.base_path.join("raw") }

    pub fn processed(&self) -> PathBuf { self.base_path.join("processed") }

    pub fn results(&self) -> PathBuf { self.base_path.join("results") }

    pub fn global_results(&self) -> PathBuf { self.base_path.join("global_results") }

    pub fn countries_csv(&self) -> PathBuf { self.raw().join("countries.csv") }

    pub fn boundary_source(&self, level: u8) -> PathBuf {
        self.raw().join("boundaries").join(format!("gadm36_{level}.shp"))
    }

    pub fn population_source(&self) -> PathBuf {
        self.raw().join("WorldPop").join("ppp_2020_1km_Aggregated.tif")
    }

    pub fn hazard_source_dir(&self, hazard: HazardType) -> PathBuf {
        self.raw().join(hazard.raw_dir())
    }

    pub fn coverage_source_dir(&self) -> PathBuf { self.raw().join("mobile_coverage") }

    pub fn poverty_source_dir(&self) -> PathBuf { self.raw().join("poverty") }

    pub fn run_report_path(&self) -> PathBuf { self.results().join("run_report.json") }

    /// Per-country view over the directory layout.
    pub fn country<'a>(&'a self, iso3: &'a str) -> CountryPaths<'a> {
        CountryPaths { config: self, iso3 }
    }
}

/// Paths scoped to one country.  Each stage writes only under its own
/// country directory, so parallel country workers never share an output path.
#[derive(Clone, Copy, Debug)]
pub struct CountryPaths<'a> {
    config: &'a Config,
    iso3: &'a str,
}

impl<'a> CountryPaths<'a> {
    pub fn iso3(&self) -> &'a str { self.iso3 }

    pub fn processed(&self) -> PathBuf { self.config.processed().join(self.iso3) }

    pub fn results(&self) -> PathBuf { self.config.results().join(self.iso3) }

    pub fn national_outline(&self) -> PathBuf { self.processed().join("national_outline.shp") }

    pub fn regions(&self, level: u8) -> PathBuf {
        self.processed().join("regions").join(format!("regions_{level}_{}.shp", self.iso3))
    }

    pub fn boundaries_dir(&self) -> PathBuf { self.processed().join("boundaries") }

    pub fn population_tiles(&self) -> PathBuf { self.processed().join("population").join("tiffs") }

    pub fn population_shapes(&self) -> PathBuf { self.processed().join("population").join("shapefiles") }

    /// One sub-directory per hazard raster stem.
    pub fn hazard_root(&self, hazard: HazardType) -> PathBuf {
        self.processed().join("hazards").join(hazard.dir_name())
    }

    pub fn hazard_tiles(&self, hazard: HazardType, stem: &str) -> PathBuf {
        self.hazard_root(hazard).join(stem).join("tiffs")
    }

    pub fn hazard_shapes(&self, hazard: HazardType, stem: &str) -> PathBuf {
        self.hazard_root(hazard).join(stem).join("shapefiles")
    }

    pub fn coverage_national(&self, tech: Technology) -> PathBuf {
        self.processed().join("coverage").join("national").join(format!("coverage_{}.shp", tech.label()))
    }

    pub fn coverage_regions(&self, tech: Technology) -> PathBuf {
        self.processed().join("coverage").join("regions").join(tech.label())
    }

    pub fn coverage_uncovered(&self, tech: Technology) -> PathBuf {
        self.processed().join("coverage").join("uncovered").join(tech.label())
    }

    pub fn poverty_national(&self) -> PathBuf {
        self.processed().join("poverty").join("national").join(format!("poverty_{}.shp", self.iso3))
    }

    pub fn poverty_regions(&self) -> PathBuf { self.processed().join("poverty").join("regions") }

    pub fn funnel(&self, hazard: HazardType, step: FunnelDir) -> PathBuf {
        self.results().join(hazard.dir_name()).join(step.dir_name())
    }

    pub fn vulnerable_csv_dir(&self) -> PathBuf { self.results().join("vulnerable_csv_files") }

    pub fn unconnected_csv_dir(&self) -> PathBuf { self.results().join("unconnected_csv_files") }
}

/// Output directories of the overlay funnel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FunnelDir {
    PopHazard,
    PopHazardCoverage,
    PopHazardCoveragePoverty,
    PopUnconnected,
}

impl FunnelDir {
    pub fn dir_name(self) -> &'static str {
        match self {
            Self::PopHazard => "pop_hazard",
            Self::PopHazardCoverage => "pop_hazard_coverage",
            Self::PopHazardCoveragePoverty => "pop_hazard_coverage_poverty",
            Self::PopUnconnected => "pop_unconnected",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_fills_missing_keys_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "base_path": "/data", "countries": ["KEN"], "technologies": ["4G"] }"#).unwrap();

        let config = Config::from_json_file(&path).unwrap();
        assert_eq!(config.base_path, PathBuf::from("/data"));
        assert_eq!(config.technologies, vec![Technology::G4]);
        assert_eq!(config.hazards, HazardType::ALL.to_vec());
        assert!(config.selects("ken"));
        assert!(!config.selects("UGA"));
        assert!(!config.skip_existing);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "bse_path": "/data" }"#).unwrap();
        assert!(Config::from_json_file(&path).is_err());
    }

    #[test]
    fn country_paths_are_scoped() {
        let config = Config::new("/base");
        let paths = config.country("KEN");
        assert_eq!(paths.regions(2), PathBuf::from("/base/processed/KEN/regions/regions_2_KEN.shp"));
        assert_eq!(
            paths.funnel(HazardType::Riverine, FunnelDir::PopHazard),
            PathBuf::from("/base/results/KEN/riverine/pop_hazard"),
        );
        assert_eq!(paths.coverage_uncovered(Technology::G3), PathBuf::from("/base/processed/KEN/coverage/uncovered/3G"));
    }
}
