use std::path::PathBuf;

/// Flood, coverage and poverty exposure pipeline
#[derive(clap::Parser, Debug)]
#[command(name = "glanvup", version, about, propagate_version = true)]
pub struct Cli {
    /// Increase output verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(clap::Subcommand, Debug)]
pub enum Commands {
    /// Run the per-country pipeline, then the global combiner
    Run(RunArgs),

    /// Rebuild the global tables from existing country results
    Combine(CombineArgs),

    /// Convert one raster tile into a polygon shapefile
    Vectorize(VectorizeArgs),
}

#[derive(clap::Args, Debug)]
pub struct RunArgs {
    /// JSON config file; flags below override its values
    #[arg(short, long, value_hint = clap::ValueHint::FilePath)]
    pub config: Option<PathBuf>,

    /// Data root holding raw/, processed/ and results/
    #[arg(short, long, value_hint = clap::ValueHint::DirPath)]
    pub base_path: Option<PathBuf>,

    /// ISO3 code to process (repeatable), defaults to every country
    #[arg(long = "country")]
    pub countries: Vec<String>,

    /// Hazard type: riverine or coastal (repeatable)
    #[arg(long = "hazard")]
    pub hazards: Vec<String>,

    /// Technology: GSM, 3G or 4G (repeatable)
    #[arg(long = "technology")]
    pub technologies: Vec<String>,

    /// Stage to run (repeatable), defaults to all stages
    #[arg(long = "stage")]
    pub stages: Vec<String>,

    /// Leave existing intersection outputs in place
    #[arg(long)]
    pub skip_existing: bool,

    /// Worker threads for the country pool
    #[arg(short = 'j', long)]
    pub threads: Option<usize>,
}

#[derive(clap::Args, Debug)]
pub struct CombineArgs {
    /// Data root holding results/, defaults to "."
    #[arg(short, long, value_hint = clap::ValueHint::DirPath)]
    pub base_path: Option<PathBuf>,
}

#[derive(clap::Args, Debug)]
pub struct VectorizeArgs {
    /// Input GeoTIFF tile
    #[arg(value_hint = clap::ValueHint::FilePath)]
    pub tile: PathBuf,

    /// Output shapefile
    #[arg(value_hint = clap::ValueHint::FilePath)]
    pub output: PathBuf,
}
