use anyhow::Result;
use glanvup::{vectorize_tile, ArtifactKey, Outcome};

pub fn run(_cli: &crate::cli::Cli, args: &crate::cli::VectorizeArgs) -> Result<()> {
    let key = args.output.file_stem()
        .and_then(|s| s.to_str())
        .and_then(ArtifactKey::from_legacy_name);

    match vectorize_tile(&args.tile, &args.output, key.as_ref())? {
        Outcome::Written => eprintln!("[vectorize] wrote {}", args.output.display()),
        Outcome::Skipped { reason } => eprintln!("[vectorize] skipped: {reason}"),
        Outcome::Failed { reason } => anyhow::bail!("vectorize failed: {reason}"),
    }
    Ok(())
}
