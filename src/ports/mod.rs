// Ports - Interface definitions (contracts)

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::errors::*;
use crate::domain::model::*;

/// One rendered configuration handed to the transcoding service
#[derive(Debug, Clone)]
pub struct SubmissionRequest {
    pub run_id: String,
    pub index: usize,
    pub configuration: Value,
}

/// Port for triggering remote transcodes
#[async_trait]
pub trait SubmitPort: Send + Sync {
    /// Submit a configuration and return the service's submission identifier
    async fn submit(&self, request: &SubmissionRequest) -> Result<String, DomainError>;
}

/// Remote-side state of a submitted job
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteStatus {
    /// Artifact not there yet, or still being written
    Pending,
    /// Artifact exists and the producing process has finished
    Ready,
    /// The remote process reported an error
    Failed(String),
}

/// Port for the remote host holding transcoder output
#[async_trait]
pub trait RemotePort: Send + Sync {
    /// Query job status without changing remote state
    async fn check_status(
        &self,
        submission_id: &str,
        remote_path: &str,
    ) -> Result<RemoteStatus, DomainError>;

    /// Copy exactly one artifact to `local_path`
    async fn fetch(&self, remote_path: &str, local_path: &Path) -> Result<PathBuf, DomainError>;
}

/// What the analyzer should measure besides the bitstream statistics
#[derive(Debug, Clone, Default)]
pub struct AnalysisRequest {
    pub perceptual: Vec<PerceptualMetric>,
    pub reference: Option<PathBuf>,
}

impl AnalysisRequest {
    pub fn bitstream_only() -> Self {
        Self::default()
    }

    pub fn with_quality(perceptual: Vec<PerceptualMetric>, reference: Option<PathBuf>) -> Self {
        Self {
            perceptual,
            reference,
        }
    }
}

/// Port for media inspection
#[async_trait]
pub trait AnalyzerPort: Send + Sync {
    /// Extract metrics from a local media file
    async fn analyze(&self, local_path: &Path, request: &AnalysisRequest)
        -> Result<Metrics, DomainError>;
}

/// Port for persisting one run
#[async_trait]
pub trait ArchivePort: Send + Sync {
    /// Directory holding every file of the run
    fn run_dir(&self) -> &Path;

    /// Local location for a file of the run
    fn path_for(&self, file_name: &str) -> PathBuf {
        self.run_dir().join(file_name)
    }

    /// Persist the rendered configuration of an iteration
    async fn write_configuration(
        &self,
        index: usize,
        configuration: &Value,
    ) -> Result<PathBuf, DomainError>;

    /// Persist the metrics and verdict of an iteration
    async fn write_metrics(
        &self,
        index: usize,
        metrics: &Metrics,
        verdict: Option<&Verdict>,
    ) -> Result<PathBuf, DomainError>;

    /// Replace the run-level summary
    async fn write_summary(
        &self,
        record: &RunRecord,
        experiment: &Value,
    ) -> Result<PathBuf, DomainError>;
}

/// Port for progress notifications
#[async_trait]
pub trait NotifyPort: Send + Sync {
    /// Deliver a notification; delivery problems are logged, never raised
    async fn notify(&self, title: &str, message: &str);
}
