use anyhow::Result;
use glanvup::{Config, HazardType, Stage, Technology};
use tracing::warn;

pub fn run(_cli: &crate::cli::Cli, args: &crate::cli::RunArgs) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => Config::from_json_file(path)?,
        None => Config::default(),
    };
    if let Some(base_path) = &args.base_path { config.base_path = base_path.clone() }
    if !args.countries.is_empty() {
        config.countries = Some(args.countries.iter().map(|c| c.to_ascii_uppercase()).collect());
    }
    if !args.hazards.is_empty() {
        config.hazards = args.hazards.iter().map(|h| h.parse::<HazardType>()).collect::<Result<_>>()?;
    }
    if !args.technologies.is_empty() {
        config.technologies = args.technologies.iter().map(|t| t.parse::<Technology>()).collect::<Result<_>>()?;
    }
    if !args.stages.is_empty() {
        config.stages = args.stages.iter().map(|s| s.parse::<Stage>()).collect::<Result<_>>()?;
    }
    if args.skip_existing { config.skip_existing = true }
    if args.threads.is_some() { config.threads = args.threads }

    let report = glanvup::run(&config)?;
    let summary = report.summary();
    eprintln!(
        "[run] {} written, {} skipped, {} failed (report: {})",
        summary.written, summary.skipped, summary.failed, config.run_report_path().display(),
    );
    if summary.failed > 0 { warn!(failed = summary.failed, "some items failed, see the run report") }
    Ok(())
}
