//! transcode-tune CLI
//!
//! # Usage
//!
//! ```bash
//! transcode-tune plan -c experiment.yaml
//! transcode-tune run -c experiment.yaml --early-stop
//! transcode-tune refs ./references --aggregate p90 --output targets.yaml
//! transcode-tune breathing output_003.mp4 --reference source.mp4
//! ```

use anyhow::Result;
use clap::Parser;
use tracing::info;

use transcode_tune::app::container::DefaultAppContainer;
use transcode_tune::cli::{commands, Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    cli.logging().init();

    info!("Starting transcode-tune {}", env!("CARGO_PKG_VERSION"));

    let container = DefaultAppContainer::new();
    match cli.command {
        Commands::Run(args) => commands::run(args, &container).await,
        Commands::Plan(args) => commands::plan(args).await,
        Commands::Refs(args) => commands::refs(args, &container).await,
        Commands::Breathing(args) => commands::breathing(args, &container).await,
    }
}
