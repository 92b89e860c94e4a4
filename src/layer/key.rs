//! Typed identity of every vector artifact.
//!
//! Legacy file names encode region, hazard scenario, return period and
//! technology as `_`-separated tokens.  They are parsed once, when a layer is
//! first produced, into an [`ArtifactKey`] stored next to the shapefile as
//! `{stem}.key.json`.  Later stages read the sidecar instead of the name.

use std::{fmt, path::{Path, PathBuf}, str::FromStr, sync::OnceLock};

use anyhow::{bail, Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Vocabularies
// ---------------------------------------------------------------------------

/// Flood hazard family.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HazardType {
    Riverine,
    Coastal,
}

impl HazardType {
    pub const ALL: [HazardType; 2] = [HazardType::Riverine, HazardType::Coastal];

    /// Directory name under `processed/` and `results/`.
    pub fn dir_name(self) -> &'static str {
        match self {
            Self::Riverine => "riverine",
            Self::Coastal => "coastal",
        }
    }

    /// Directory of source rasters under `raw/`.
    pub fn raw_dir(self) -> &'static str {
        match self {
            Self::Riverine => "flood_hazard",
            Self::Coastal => "coastal_hazard",
        }
    }

    /// Leading token of the hazard raster file names.
    pub fn file_token(self) -> &'static str {
        match self {
            Self::Riverine => "inunriver",
            Self::Coastal => "inuncoast",
        }
    }

    fn from_token(token: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|h| h.file_token() == token)
    }
}

impl fmt::Display for HazardType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.dir_name()) }
}

impl FromStr for HazardType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "riverine" | "inunriver" => Ok(Self::Riverine),
            "coastal" | "inuncoast" => Ok(Self::Coastal),
            _ => bail!("unknown hazard type: {s}"),
        }
    }
}

/// Climate scenario.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scenario {
    Historical,
    Rcp4p5,
    Rcp8p5,
}

impl Scenario {
    pub fn label(self) -> &'static str {
        match self {
            Self::Historical => "historical",
            Self::Rcp4p5 => "rcp4p5",
            Self::Rcp8p5 => "rcp8p5",
        }
    }

    fn from_token(token: &str) -> Option<Self> {
        match token {
            "historical" => Some(Self::Historical),
            "rcp4p5" => Some(Self::Rcp4p5),
            "rcp8p5" => Some(Self::Rcp8p5),
            _ => None,
        }
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.label()) }
}

/// Flood return period in years.  `rp0100` and `rp00100` both read as 100.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReturnPeriod(pub u32);

impl ReturnPeriod {
    /// Canonical label, zero-padded to five digits (`rp00100`, `rp01000`).
    pub fn label(self) -> String { format!("rp{:05}", self.0) }

    fn from_token(token: &str) -> Option<Self> {
        let digits = token.strip_prefix("rp")?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) { return None }
        digits.parse().ok().map(Self)
    }
}

impl fmt::Display for ReturnPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.label()) }
}

/// Cellular technology generation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Technology {
    #[serde(rename = "GSM")]
    Gsm,
    #[serde(rename = "3G")]
    G3,
    #[serde(rename = "4G")]
    G4,
}

impl Technology {
    pub const ALL: [Technology; 3] = [Technology::Gsm, Technology::G3, Technology::G4];

    pub fn label(self) -> &'static str {
        match self {
            Self::Gsm => "GSM",
            Self::G3 => "3G",
            Self::G4 => "4G",
        }
    }

    fn from_token(token: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.label() == token)
    }
}

impl fmt::Display for Technology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.label()) }
}

impl FromStr for Technology {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "GSM" | "2G" => Ok(Self::Gsm),
            "3G" => Ok(Self::G3),
            "4G" => Ok(Self::G4),
            _ => bail!("unknown technology: {s}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Hazard raster names
// ---------------------------------------------------------------------------

/// Decoded `<type>_<scenario>_<model>_<year>_<returnperiod>` hazard raster stem.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HazardScenario {
    pub stem: String,
    pub hazard_type: HazardType,
    pub scenario: Scenario,
    pub model: String,
    pub year: Option<u16>,
    pub period: ReturnPeriod,
}

impl HazardScenario {
    /// Parse a hazard raster stem such as
    /// `inunriver_rcp8p5_0000HadGEM2-ES_2080_rp01000` or
    /// `inuncoast_historical_nosub_hist_rp0100_0`.
    pub fn parse(stem: &str) -> Option<Self> {
        let tokens: Vec<&str> = stem.split('_').collect();
        let hazard_type = HazardType::from_token(tokens.first()?)?;
        let scenario = Scenario::from_token(tokens.get(1)?)?;
        let model = tokens.get(2)?.to_string();
        let year = tokens.get(3).and_then(|t| if t.len() == 4 { t.parse().ok() } else { None });
        let period = tokens.iter().find_map(|t| ReturnPeriod::from_token(t))?;
        Some(Self { stem: stem.to_string(), hazard_type, scenario, model, year, period })
    }
}

// ---------------------------------------------------------------------------
// Artifact key
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArtifactKey {
    pub country: String,
    pub region_id: Option<String>,
    pub hazard_type: Option<HazardType>,
    pub scenario: Option<Scenario>,
    pub period: Option<ReturnPeriod>,
    pub technology: Option<Technology>,
}

fn region_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?:^|_)([A-Z]{3}(?:\.\d+)*(?:_\d+)?)$").expect("static regex")
    })
}

impl ArtifactKey {
    pub fn for_region(country: &str, region_id: &str) -> Self {
        Self { country: country.to_string(), region_id: Some(region_id.to_string()), ..Self::default() }
    }

    pub fn with_hazard(mut self, hazard: &HazardScenario) -> Self {
        self.hazard_type = Some(hazard.hazard_type);
        self.scenario = Some(hazard.scenario);
        self.period = Some(hazard.period);
        self
    }

    pub fn with_technology(mut self, tech: Technology) -> Self {
        self.technology = Some(tech);
        self
    }

    /// Decode a legacy file stem.  Returns `None` when no region id is found.
    pub fn from_legacy_name(stem: &str) -> Option<Self> {
        let region = region_pattern().captures(stem)?.get(1)?.as_str().to_string();
        if Technology::from_token(&region).is_some() { return None }
        let country = region.get(..3)?.to_string();

        // Region ids contain `_`, so only scan the part before them.
        let head = stem.strip_suffix(region.as_str()).unwrap_or("");
        let tokens: Vec<&str> = head.split('_').filter(|t| !t.is_empty()).collect();

        Some(Self {
            country,
            region_id: Some(region),
            hazard_type: tokens.iter().find_map(|t| HazardType::from_token(t)),
            scenario: tokens.iter().find_map(|t| Scenario::from_token(t)),
            period: tokens.iter().find_map(|t| ReturnPeriod::from_token(t)),
            technology: tokens.first().and_then(|t| Technology::from_token(t)),
        })
    }

    /// Combine the keys of two overlaid layers.  Fails when they describe
    /// different regions or disagree on any populated field.
    pub fn merge(&self, other: &ArtifactKey) -> Result<ArtifactKey> {
        fn pick<T: PartialEq + Copy + fmt::Debug>(name: &str, a: Option<T>, b: Option<T>) -> Result<Option<T>> {
            match (a, b) {
                (Some(x), Some(y)) if x != y => bail!("lineage mismatch on {name}: {x:?} vs {y:?}"),
                _ => Ok(a.or(b)),
            }
        }

        if !self.country.eq_ignore_ascii_case(&other.country) {
            bail!("lineage mismatch on country: {} vs {}", self.country, other.country);
        }
        let region_id = match (&self.region_id, &other.region_id) {
            (Some(a), Some(b)) if a != b => bail!("lineage mismatch on region: {a} vs {b}"),
            (a, b) => a.clone().or_else(|| b.clone()),
        };

        Ok(ArtifactKey {
            country: self.country.clone(),
            region_id,
            hazard_type: pick("hazard type", self.hazard_type, other.hazard_type)?,
            scenario: pick("scenario", self.scenario, other.scenario)?,
            period: pick("period", self.period, other.period)?,
            technology: pick("technology", self.technology, other.technology)?,
        })
    }

    /// `{stem}.key.json` next to a `.shp` path.
    pub fn sidecar_path(shp_path: &Path) -> PathBuf { shp_path.with_extension("key.json") }

    pub fn write_sidecar(&self, shp_path: &Path) -> Result<()> {
        let path = Self::sidecar_path(shp_path);
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, text)
            .with_context(|| format!("Failed to write key sidecar {}", path.display()))
    }

    pub fn read_sidecar(shp_path: &Path) -> Result<Option<ArtifactKey>> {
        let path = Self::sidecar_path(shp_path);
        if !path.exists() { return Ok(None) }
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read key sidecar {}", path.display()))?;
        let key = serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse key sidecar {}", path.display()))?;
        Ok(Some(key))
    }

    /// Sidecar key if present, otherwise decoded from the legacy file name.
    pub fn resolve(shp_path: &Path) -> Result<Option<ArtifactKey>> {
        if let Some(key) = Self::read_sidecar(shp_path)? { return Ok(Some(key)) }
        Ok(shp_path.file_stem().and_then(|s| s.to_str()).and_then(Self::from_legacy_name))
    }
}
