use anyhow::Result;
use glanvup::{combine, Config, RunReport};

pub fn run(_cli: &crate::cli::Cli, args: &crate::cli::CombineArgs) -> Result<()> {
    let config = Config::new(args.base_path.clone().unwrap_or(".".into()));
    let report = RunReport::new();
    combine(&config, &report)?;

    for record in report.records() {
        eprintln!("[combine] {}: {:?}", record.item, record.outcome);
    }
    Ok(())
}
