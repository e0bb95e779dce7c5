// Reference interactor - Derives target thresholds from reference streams

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::domain::errors::*;
use crate::domain::model::*;
use crate::ports::*;
use crate::utils::path::PathUtils;
use crate::utils::Utils;

/// Metrics aggregated when the caller names none
pub const DEFAULT_METRICS: &[&str] = &[
    metric::BITRATE_AVG,
    metric::BITRATE_MAX,
    metric::IFRAME_AVG_SIZE,
    metric::IFRAME_MAX_SIZE,
];

/// How per-file values collapse into one threshold
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Aggregate {
    /// Max for peak metrics, min for `bitrate_min`, mean otherwise
    Auto,
    Mean,
    Max,
    Min,
    Percentile(f64),
}

impl Aggregate {
    pub fn parse(spec: &str) -> Result<Self, DomainError> {
        let spec = spec.trim().to_lowercase();
        match spec.as_str() {
            "auto" => Ok(Aggregate::Auto),
            "mean" | "avg" => Ok(Aggregate::Mean),
            "max" => Ok(Aggregate::Max),
            "min" => Ok(Aggregate::Min),
            _ => spec
                .strip_prefix('p')
                .and_then(|pct| pct.parse::<f64>().ok())
                .filter(|pct| (0.0..=100.0).contains(pct))
                .map(Aggregate::Percentile)
                .ok_or_else(|| {
                    DomainError::Configuration(format!(
                        "Invalid aggregate: {}. Valid aggregates: auto, mean, max, min, pNN",
                        spec
                    ))
                }),
        }
    }

    /// Concrete aggregate for a metric
    fn resolve(self, metric_name: &str) -> Aggregate {
        match (self, metric_name) {
            (
                Aggregate::Auto,
                metric::BITRATE_MAX | metric::IFRAME_MAX_SIZE | metric::IFRAME_INTERVAL_MAX,
            ) => Aggregate::Max,
            (Aggregate::Auto, metric::BITRATE_MIN) => Aggregate::Min,
            (Aggregate::Auto, _) => Aggregate::Mean,
            (other, _) => other,
        }
    }

    fn apply(self, values: &[f64]) -> Option<f64> {
        if values.is_empty() {
            return None;
        }
        match self {
            Aggregate::Auto | Aggregate::Mean => {
                Some(values.iter().sum::<f64>() / values.len() as f64)
            }
            Aggregate::Max => values.iter().copied().reduce(f64::max),
            Aggregate::Min => values.iter().copied().reduce(f64::min),
            Aggregate::Percentile(pct) => Utils::percentile(values, pct),
        }
    }
}

impl fmt::Display for Aggregate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Aggregate::Auto => write!(f, "auto"),
            Aggregate::Mean => write!(f, "mean"),
            Aggregate::Max => write!(f, "max"),
            Aggregate::Min => write!(f, "min"),
            Aggregate::Percentile(pct) => write!(f, "p{}", pct),
        }
    }
}

/// What to derive targets from
#[derive(Debug, Clone)]
pub struct ReferenceRequest {
    /// Directory of media files, or a list file
    pub source: PathBuf,
    pub metrics: Vec<String>,
    pub aggregate: Aggregate,
    /// Relative tolerance for `approximately` targets
    pub tolerance: f64,
}

impl ReferenceRequest {
    pub fn new(source: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            metrics: DEFAULT_METRICS.iter().map(|m| m.to_string()).collect(),
            aggregate: Aggregate::Auto,
            tolerance: TargetSet::DEFAULT_TOLERANCE,
        }
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        if self.metrics.is_empty() {
            return Err(DomainError::Configuration(
                "At least one metric is required".to_string(),
            ));
        }
        for name in &self.metrics {
            if !metric::is_known(name) {
                return Err(DomainError::Configuration(format!(
                    "Unknown metric '{}'. Known metrics: {}",
                    name,
                    metric::ALL.join(", ")
                )));
            }
            if metric::PERCEPTUAL.contains(&name.as_str()) {
                return Err(DomainError::Configuration(format!(
                    "'{}' needs a reference of its own and cannot be derived from reference streams",
                    name
                )));
            }
        }
        if !self.tolerance.is_finite() || self.tolerance < 0.0 {
            return Err(DomainError::Configuration(format!(
                "Tolerance must be a non-negative number, got {}",
                self.tolerance
            )));
        }
        Ok(())
    }
}

/// Per-file analysis result
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReferenceFile {
    pub path: PathBuf,
    pub metrics: Metrics,
}

/// A file the analyzer could not read
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedFile {
    pub path: PathBuf,
    pub error: String,
}

/// Distribution of one metric over the reference set
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricSummary {
    pub count: usize,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    pub aggregate: String,
    pub threshold: f64,
}

/// Everything the `refs` command reports
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReferenceReport {
    pub files: Vec<ReferenceFile>,
    pub skipped: Vec<SkippedFile>,
    pub summary: BTreeMap<String, MetricSummary>,
    pub targets: TargetSet,
}

/// Interactor for target derivation
pub struct ReferenceInteractor {
    analyzer_port: Arc<dyn AnalyzerPort>,
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

impl ReferenceInteractor {
    pub fn new(analyzer_port: Arc<dyn AnalyzerPort>) -> Self {
        Self { analyzer_port }
    }

    /// Analyze every reference file and derive targets from the requested metrics
    pub async fn derive(&self, request: &ReferenceRequest) -> Result<ReferenceReport, DomainError> {
        request.validate()?;
        let sources = PathUtils::collect_media(&request.source)?;
        info!("Analyzing {} reference files", sources.len());

        let mut files = Vec::new();
        let mut skipped = Vec::new();
        for (i, path) in sources.iter().enumerate() {
            info!("[{}/{}] {}", i + 1, sources.len(), path.display());
            match self
                .analyzer_port
                .analyze(path, &AnalysisRequest::bitstream_only())
                .await
            {
                Ok(metrics) => files.push(ReferenceFile {
                    path: path.clone(),
                    metrics,
                }),
                Err(e) => {
                    warn!("Skipping {}: {}", path.display(), e);
                    skipped.push(SkippedFile {
                        path: path.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        if files.is_empty() {
            return Err(DomainError::Analysis(format!(
                "None of the {} reference files could be analyzed",
                sources.len()
            )));
        }

        let (summary, targets) = Self::aggregate(&files, request);
        Ok(ReferenceReport {
            files,
            skipped,
            summary,
            targets,
        })
    }

    /// Collapse per-file metrics into thresholds; metrics no file reports are left out
    pub fn aggregate(
        files: &[ReferenceFile],
        request: &ReferenceRequest,
    ) -> (BTreeMap<String, MetricSummary>, TargetSet) {
        let mut summary = BTreeMap::new();
        let mut targets = TargetSet::new().with_default_tolerance(request.tolerance);

        for name in &request.metrics {
            let values: Vec<f64> = files.iter().filter_map(|f| f.metrics.get(name)).collect();
            let aggregate = request.aggregate.resolve(name);
            let threshold = match aggregate.apply(&values) {
                Some(threshold) => round2(threshold),
                None => {
                    warn!("No reference file reports '{}', no target derived", name);
                    continue;
                }
            };

            let mode = ComparisonMode::default_for(name);
            let target = match mode {
                ComparisonMode::Approximately => {
                    Target::approximately(threshold, Some(request.tolerance))
                }
                ComparisonMode::AtLeast => Target::at_least(threshold),
                ComparisonMode::AtMost => Target::at_most(threshold),
            };
            targets = targets.with_target(name, target);

            summary.insert(
                name.clone(),
                MetricSummary {
                    count: values.len(),
                    mean: round2(values.iter().sum::<f64>() / values.len() as f64),
                    min: values.iter().copied().fold(f64::INFINITY, f64::min),
                    max: values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
                    aggregate: aggregate.to_string(),
                    threshold,
                },
            );
        }

        (summary, targets)
    }
}

/// Human-readable label for a reference source
pub fn describe_source(source: &Path) -> String {
    if source.is_dir() {
        format!("directory {}", source.display())
    } else {
        format!("list {}", source.display())
    }
}
