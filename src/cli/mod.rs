//! CLI module for transcode-tune
//!
//! This module handles command-line argument parsing and command execution.

use clap::{Parser, Subcommand};

use crate::utils::logging::{LogFormat, LogLevel, LoggingConfig};

pub mod args;
pub mod commands;

/// Transcoding parameter tuner
///
/// Submits candidate configurations to a remote transcoding service, fetches each
/// result over ssh and checks it against bitrate and quality targets.
#[derive(Parser, Debug)]
#[command(name = "transcode-tune")]
#[command(about = "Iterative transcoding parameter tuning")]
#[command(version)]
#[command(long_about = None)]
pub struct Cli {
    /// Logging level (RUST_LOG takes precedence)
    #[arg(long, value_enum, default_value = "info", global = true, env = "TUNE_LOG_LEVEL")]
    pub log_level: LogLevel,

    /// Log output format
    #[arg(long, value_enum, default_value = "compact", global = true)]
    pub log_format: LogFormat,

    /// The command to execute
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn logging(&self) -> LoggingConfig {
        LoggingConfig {
            level: self.log_level,
            format: self.log_format,
            ..LoggingConfig::default()
        }
    }
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run an experiment
    Run(args::RunArgs),
    /// List the combinations an experiment would try, without remote work
    Plan(args::PlanArgs),
    /// Derive target thresholds from reference streams
    Refs(args::RefsArgs),
    /// Check a file for quality breathing
    Breathing(args::BreathingArgs),
}
