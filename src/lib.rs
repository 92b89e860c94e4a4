#![doc = "glanvup public API"]
mod common;
mod config;
mod country;
mod error;
mod geom;
mod layer;
mod pipeline;
mod raster;
mod report;

#[doc(inline)]
pub use config::{Config, CountryPaths, FunnelDir};

#[doc(inline)]
pub use country::{load_countries, select_countries, Classification, Continent, CountryMeta, IncomeGroup, RegionGroup};

#[doc(inline)]
pub use error::StageError;

#[doc(inline)]
pub use geom::{OverlayOp, WebMercator};

#[doc(inline)]
pub use layer::{ArtifactKey, AttrValue, Feature, HazardScenario, HazardType, Layer, ReturnPeriod, Scenario, Technology, LAYER_EPSG};

#[doc(inline)]
pub use pipeline::{
    combine, intersect, read_parcels, run, run_country, summarize, AggregationPlan, IntersectOptions, Metric,
    PovertyBand, Reducer, Stage, COUNTRY_KEYS, REGION_KEYS,
};

#[doc(inline)]
pub use raster::{vectorize, vectorize_tile, RasterSource, RasterTile, TILE_NODATA};

#[doc(inline)]
pub use report::{Outcome, OutcomeRecord, ReportSummary, RunReport};
