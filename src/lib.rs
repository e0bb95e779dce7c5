//! transcode-tune library
//!
//! Iterative tuning of transcoding parameters: candidate configurations are rendered
//! from a template, submitted to a remote transcoding service, fetched back over ssh,
//! measured with ffprobe/ffmpeg and checked against bitrate and quality targets.

pub mod adapters;
pub mod app;
pub mod cli;
pub mod config;
pub mod domain;
pub mod engine;
pub mod error;
pub mod planner;
pub mod ports;
pub mod probe;
pub mod utils;

// Re-export commonly used types
pub use config::{Experiment, ExperimentConfig};
pub use domain::errors::DomainError;
pub use domain::model::{CandidateSet, Combination, Job, JobState, Metrics, RunRecord, TargetSet};
pub use error::{TuneError, TuneResult};
