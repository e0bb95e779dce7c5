//! Command-line argument definitions

use std::path::PathBuf;

use clap::Args;

/// Arguments for the run command
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Experiment file (YAML or TOML)
    #[arg(short, long, default_value = "experiment.yaml")]
    pub config: PathBuf,

    /// Directory receiving run directories
    #[arg(long)]
    pub results_dir: Option<PathBuf>,

    /// Stop at the first iteration meeting every target
    #[arg(long, overrides_with = "no_early_stop")]
    pub early_stop: bool,

    /// Run every combination even after targets are met
    #[arg(long, overrides_with = "early_stop")]
    pub no_early_stop: bool,

    /// Only list the combinations
    #[arg(long)]
    pub dry_run: bool,
}

impl RunArgs {
    /// Early-stop override; `None` keeps the file value
    pub fn early_stop(&self) -> Option<bool> {
        match (self.early_stop, self.no_early_stop) {
            (true, _) => Some(true),
            (_, true) => Some(false),
            _ => None,
        }
    }
}

/// Arguments for the plan command
#[derive(Args, Debug)]
pub struct PlanArgs {
    /// Experiment file (YAML or TOML)
    #[arg(short, long, default_value = "experiment.yaml")]
    pub config: PathBuf,

    /// Print the plan as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the refs command
#[derive(Args, Debug)]
pub struct RefsArgs {
    /// Directory of reference files, or a list file with one path per line
    pub source: PathBuf,

    /// Metrics to derive targets for
    #[arg(long, value_delimiter = ',')]
    pub metrics: Vec<String>,

    /// auto, mean, max, min or pNN
    #[arg(long, default_value = "auto")]
    pub aggregate: String,

    /// Relative tolerance for approximately targets
    #[arg(long, default_value_t = 0.05)]
    pub tolerance: f64,

    /// Write the targets YAML here instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Write the per-file report as JSON
    #[arg(long)]
    pub report: Option<PathBuf>,
}

/// Arguments for the breathing command
#[derive(Args, Debug)]
pub struct BreathingArgs {
    /// Video file to check
    pub input: PathBuf,

    /// Reference for per-frame PSNR
    #[arg(short, long)]
    pub reference: Option<PathBuf>,

    /// Write the report as JSON
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}
