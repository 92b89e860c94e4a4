//! Structured record of what every per-item unit of work did.

use std::{fs::File, io::BufWriter, path::Path, sync::Mutex};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::pipeline::Stage;

/// Result of one per-file / per-region / per-country unit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Written,
    Skipped { reason: String },
    Failed { reason: String },
}

impl Outcome {
    pub fn skipped(reason: impl ToString) -> Self { Self::Skipped { reason: reason.to_string() } }

    pub fn failed(reason: impl ToString) -> Self { Self::Failed { reason: reason.to_string() } }

    /// Fold an error chain into a `Failed` outcome.
    pub fn from_error(err: &anyhow::Error) -> Self { Self::Failed { reason: format!("{err:#}") } }

    #[inline]
    pub fn is_failed(&self) -> bool { matches!(self, Self::Failed { .. }) }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OutcomeRecord {
    pub country: String,
    pub stage: Stage,
    pub item: String,
    #[serde(flatten)]
    pub outcome: Outcome,
}

/// Thread-safe accumulator shared by all country workers.
#[derive(Debug, Default)]
pub struct RunReport {
    records: Mutex<Vec<OutcomeRecord>>,
}

/// Counts per outcome kind.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ReportSummary {
    pub written: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl RunReport {
    pub fn new() -> Self { Self::default() }

    pub fn record(&self, country: &str, stage: Stage, item: impl Into<String>, outcome: Outcome) {
        let item = item.into();
        match &outcome {
            Outcome::Written => tracing::debug!(iso3 = country, stage = %stage, file = %item, "written"),
            Outcome::Skipped { reason } => tracing::info!(iso3 = country, stage = %stage, file = %item, "skipped: {reason}"),
            Outcome::Failed { reason } => tracing::warn!(iso3 = country, stage = %stage, file = %item, "failed: {reason}"),
        }
        let record = OutcomeRecord { country: country.to_string(), stage, item, outcome };
        // A poisoned lock only means another worker panicked mid-push.
        match self.records.lock() {
            Ok(mut records) => records.push(record),
            Err(poisoned) => poisoned.into_inner().push(record),
        }
    }

    /// Snapshot of all records, sorted by country, stage and item.
    pub fn records(&self) -> Vec<OutcomeRecord> {
        let mut records = match self.records.lock() {
            Ok(records) => records.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        records.sort_by(|a, b| {
            (a.country.as_str(), a.stage, a.item.as_str()).cmp(&(b.country.as_str(), b.stage, b.item.as_str()))
        });
        records
    }

    pub fn summary(&self) -> ReportSummary {
        self.records().iter().fold(ReportSummary::default(), |mut s, r| {
            match r.outcome {
                Outcome::Written => s.written += 1,
                Outcome::Skipped { .. } => s.skipped += 1,
                Outcome::Failed { .. } => s.failed += 1,
            }
            s
        })
    }

    /// Records belonging to one country and stage.
    pub fn filter(&self, country: &str, stage: Stage) -> Vec<OutcomeRecord> {
        self.records().into_iter().filter(|r| r.country == country && r.stage == stage).collect()
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        #[derive(Serialize)]
        struct Document {
            summary: ReportSummary,
            outcomes: Vec<OutcomeRecord>,
        }

        crate::common::ensure_parent_exists(path)?;
        let file = File::create(path)
            .with_context(|| format!("Failed to create report file {}", path.display()))?;
        let doc = Document { summary: self.summary(), outcomes: self.records() };
        serde_json::to_writer_pretty(BufWriter::new(file), &doc)
            .with_context(|| format!("Failed to write report to {}", path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_counts_each_kind() {
        let report = RunReport::new();
        report.record("KEN", Stage::Boundary, "regions_1", Outcome::Written);
        report.record("KEN", Stage::Raster, "KEN.1_1", Outcome::skipped("no valid pixels"));
        report.record("UGA", Stage::Raster, "UGA.1_1", Outcome::failed("bad tiff"));
        assert_eq!(report.summary(), ReportSummary { written: 1, skipped: 1, failed: 1 });
        assert_eq!(report.filter("KEN", Stage::Raster).len(), 1);
    }

    #[test]
    fn report_serializes_status_tag() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run_report.json");
        let report = RunReport::new();
        report.record("KEN", Stage::Intersect, "a.shp", Outcome::skipped("no match"));
        report.write_json(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["outcomes"][0]["status"], "skipped");
        assert_eq!(value["outcomes"][0]["stage"], "intersect");
        assert_eq!(value["summary"]["skipped"], 1);
    }
}
