// Domain models - Core types and data structures

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::errors::DomainError;

/// Well-known metric names produced by the media analyzer
pub mod metric {
    pub const BITRATE_AVG: &str = "bitrate_avg";
    pub const BITRATE_MAX: &str = "bitrate_max";
    pub const BITRATE_MIN: &str = "bitrate_min";
    pub const DURATION: &str = "duration";
    pub const FRAME_RATE: &str = "frame_rate";
    pub const FRAME_COUNT: &str = "frame_count";
    pub const FILE_SIZE: &str = "file_size";
    pub const IFRAME_COUNT: &str = "iframe_count";
    pub const IFRAME_INTERVAL_AVG: &str = "iframe_interval_avg";
    pub const IFRAME_INTERVAL_MAX: &str = "iframe_interval_max";
    pub const IFRAME_AVG_SIZE: &str = "iframe_avg_size";
    pub const IFRAME_MAX_SIZE: &str = "iframe_max_size";
    pub const PFRAME_AVG_SIZE: &str = "pframe_avg_size";
    pub const BFRAME_AVG_SIZE: &str = "bframe_avg_size";
    pub const FRAME_SIZE_CV: &str = "frame_size_cv";
    pub const IFRAME_PFRAME_RATIO: &str = "iframe_pframe_ratio";
    pub const GOP_LENGTH_AVG: &str = "gop_length_avg";
    pub const GOP_LENGTH_STD: &str = "gop_length_std";
    pub const BREATHING_SCORE: &str = "breathing_score";
    pub const PSNR: &str = "psnr";
    pub const PSNR_RANGE: &str = "psnr_range";
    pub const PSNR_IP_DELTA: &str = "psnr_ip_delta";
    pub const VMAF: &str = "vmaf";

    /// Every metric name a target may refer to
    pub const ALL: &[&str] = &[
        BITRATE_AVG,
        BITRATE_MAX,
        BITRATE_MIN,
        DURATION,
        FRAME_RATE,
        FRAME_COUNT,
        FILE_SIZE,
        IFRAME_COUNT,
        IFRAME_INTERVAL_AVG,
        IFRAME_INTERVAL_MAX,
        IFRAME_AVG_SIZE,
        IFRAME_MAX_SIZE,
        PFRAME_AVG_SIZE,
        BFRAME_AVG_SIZE,
        FRAME_SIZE_CV,
        IFRAME_PFRAME_RATIO,
        GOP_LENGTH_AVG,
        GOP_LENGTH_STD,
        BREATHING_SCORE,
        PSNR,
        PSNR_RANGE,
        PSNR_IP_DELTA,
        VMAF,
    ];

    /// Metrics that need a reference stream
    pub const PERCEPTUAL: &[&str] = &[PSNR, PSNR_RANGE, PSNR_IP_DELTA, VMAF];

    pub fn is_known(name: &str) -> bool {
        ALL.contains(&name)
    }
}

/// Dot-separated location of a leaf inside a template, e.g. `encoder.x264.bitrate`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ParamPath(String);

impl ParamPath {
    /// Parse and validate a dotted path
    pub fn parse(path: &str) -> Result<Self, DomainError> {
        let trimmed = path.trim();
        if trimmed.is_empty() {
            return Err(DomainError::Configuration(
                "Parameter path cannot be empty".to_string(),
            ));
        }
        if trimmed.split('.').any(|segment| segment.is_empty()) {
            return Err(DomainError::Configuration(format!(
                "Parameter path '{}' contains an empty segment",
                trimmed
            )));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('.')
    }

    /// Whether `self` names a mapping that contains `other` (segment-wise)
    pub fn is_prefix_of(&self, other: &ParamPath) -> bool {
        other.0.len() > self.0.len()
            && other.0.starts_with(&self.0)
            && other.0.as_bytes()[self.0.len()] == b'.'
    }
}

impl TryFrom<String> for ParamPath {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ParamPath> for String {
    fn from(path: ParamPath) -> Self {
        path.0
    }
}

impl fmt::Display for ParamPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Parameter paths mapped to their ordered candidate values
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct CandidateSet {
    entries: BTreeMap<ParamPath, Vec<Value>>,
}

impl CandidateSet {
    /// Build a candidate set, rejecting empty lists, non-scalar values and overlapping paths
    pub fn new(entries: BTreeMap<ParamPath, Vec<Value>>) -> Result<Self, DomainError> {
        if entries.is_empty() {
            return Err(DomainError::EmptyCandidateSet);
        }

        for (path, values) in &entries {
            if values.is_empty() {
                return Err(DomainError::Configuration(format!(
                    "Parameter '{}' has no candidate values",
                    path
                )));
            }
            if let Some(bad) = values.iter().find(|v| v.is_array() || v.is_object()) {
                return Err(DomainError::Configuration(format!(
                    "Parameter '{}' has non-scalar candidate {}",
                    path, bad
                )));
            }
        }

        for outer in entries.keys() {
            if let Some(inner) = entries.keys().find(|p| outer.is_prefix_of(p)) {
                return Err(DomainError::Configuration(format!(
                    "Parameter paths '{}' and '{}' overlap",
                    outer, inner
                )));
            }
        }

        Ok(Self { entries })
    }

    pub fn paths(&self) -> impl Iterator<Item = &ParamPath> {
        self.entries.keys()
    }

    pub fn entries(&self) -> impl Iterator<Item = (&ParamPath, &Vec<Value>)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Product of candidate list lengths
    pub fn combination_count(&self) -> Result<usize, DomainError> {
        self.entries.values().try_fold(1usize, |acc, values| {
            acc.checked_mul(values.len()).ok_or_else(|| {
                DomainError::Configuration("Parameter space is too large to enumerate".to_string())
            })
        })
    }

    /// Decode a position in the product space; the last path varies fastest
    pub fn combination_at(&self, mut position: usize) -> Combination {
        let mut picks: Vec<(ParamPath, Value)> = Vec::with_capacity(self.entries.len());
        for (path, values) in self.entries.iter().rev() {
            let radix = values.len();
            picks.push((path.clone(), values[position % radix].clone()));
            position /= radix;
        }
        Combination {
            assignments: picks.into_iter().collect(),
        }
    }
}

/// One concrete value per parameter path
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Combination {
    assignments: BTreeMap<ParamPath, Value>,
}

impl Combination {
    pub fn new(assignments: BTreeMap<ParamPath, Value>) -> Self {
        Self { assignments }
    }

    pub fn get(&self, path: &str) -> Option<&Value> {
        self.assignments
            .iter()
            .find(|(p, _)| p.as_str() == path)
            .map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ParamPath, &Value)> {
        self.assignments.iter()
    }

    pub fn len(&self) -> usize {
        self.assignments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }
}

impl fmt::Display for Combination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .assignments
            .iter()
            .map(|(path, value)| format!("{}={}", path, value))
            .collect();
        write!(f, "{}", parts.join(", "))
    }
}

/// Lifecycle of one remote job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Submitted,
    Polling,
    Completed,
    Failed,
    TimedOut,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Failed | JobState::TimedOut)
    }

    /// Legal edges of the job state machine
    pub fn can_transition_to(&self, next: JobState) -> bool {
        use JobState::*;
        match (*self, next) {
            (Pending, Submitted) => true,
            (Submitted, Polling) => true,
            (Polling, Completed) | (Polling, TimedOut) => true,
            // fetch or analysis may still fail after the remote side completed
            (Completed, Failed) => true,
            (Pending | Submitted | Polling, Failed) => true,
            _ => false,
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobState::Pending => "pending",
            JobState::Submitted => "submitted",
            JobState::Polling => "polling",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
            JobState::TimedOut => "timed_out",
        };
        write!(f, "{}", name)
    }
}

/// Stage of an iteration where a failure happened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePhase {
    Render,
    Submit,
    Poll,
    Fetch,
    Analyze,
}

impl fmt::Display for FailurePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailurePhase::Render => "render",
            FailurePhase::Submit => "submit",
            FailurePhase::Poll => "poll",
            FailurePhase::Fetch => "fetch",
            FailurePhase::Analyze => "analyze",
        };
        write!(f, "{}", name)
    }
}

/// Recorded reason for a failed iteration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobFailure {
    pub phase: FailurePhase,
    pub message: String,
}

/// Named numeric measurements of one artifact
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Metrics {
    values: BTreeMap<String, f64>,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: &str, value: f64) {
        if value.is_finite() {
            self.values.insert(name.to_string(), value);
        }
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &f64)> {
        self.values.iter()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Overlay another metric set onto this one
    pub fn extend(&mut self, other: &Metrics) {
        for (name, value) in other.iter() {
            self.values.insert(name.clone(), *value);
        }
    }
}

impl<const N: usize> From<[(&str, f64); N]> for Metrics {
    fn from(pairs: [(&str, f64); N]) -> Self {
        let mut metrics = Metrics::new();
        for (name, value) in pairs {
            metrics.insert(name, value);
        }
        metrics
    }
}

/// How a metric is compared against its threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonMode {
    AtMost,
    AtLeast,
    Approximately,
}

impl ComparisonMode {
    pub fn parse(mode: &str) -> Result<Self, DomainError> {
        match mode.to_lowercase().as_str() {
            "at_most" | "max" | "<=" => Ok(ComparisonMode::AtMost),
            "at_least" | "min" | ">=" => Ok(ComparisonMode::AtLeast),
            "approximately" | "approx" | "~" => Ok(ComparisonMode::Approximately),
            _ => Err(DomainError::Configuration(format!(
                "Invalid comparison mode: {}. Valid modes: at_most, at_least, approximately",
                mode
            ))),
        }
    }

    /// Default comparison for a metric when deriving targets from references
    pub fn default_for(metric_name: &str) -> Self {
        match metric_name {
            metric::BITRATE_AVG => ComparisonMode::Approximately,
            metric::PSNR | metric::VMAF => ComparisonMode::AtLeast,
            _ => ComparisonMode::AtMost,
        }
    }
}

impl fmt::Display for ComparisonMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ComparisonMode::AtMost => "at_most",
            ComparisonMode::AtLeast => "at_least",
            ComparisonMode::Approximately => "approximately",
        };
        write!(f, "{}", name)
    }
}

/// Threshold for a single metric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Target {
    pub mode: ComparisonMode,
    pub threshold: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tolerance: Option<f64>,
}

impl Target {
    pub fn at_most(threshold: f64) -> Self {
        Self {
            mode: ComparisonMode::AtMost,
            threshold,
            tolerance: None,
        }
    }

    pub fn at_least(threshold: f64) -> Self {
        Self {
            mode: ComparisonMode::AtLeast,
            threshold,
            tolerance: None,
        }
    }

    pub fn approximately(threshold: f64, tolerance: Option<f64>) -> Self {
        Self {
            mode: ComparisonMode::Approximately,
            threshold,
            tolerance,
        }
    }
}

/// Metric thresholds an artifact must satisfy
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TargetSet {
    #[serde(default)]
    pub targets: BTreeMap<String, Target>,
    /// Relative tolerance for `approximately` targets without their own
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_tolerance: Option<f64>,
}

impl TargetSet {
    /// Relative tolerance given to bare `approximately` thresholds
    pub const DEFAULT_TOLERANCE: f64 = 0.05;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_target(mut self, name: &str, target: Target) -> Self {
        self.targets.insert(name.to_string(), target);
        self
    }

    pub fn with_default_tolerance(mut self, tolerance: f64) -> Self {
        self.default_tolerance = Some(tolerance);
        self
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Tolerance that applies to the named target
    pub fn tolerance_for(&self, name: &str) -> Option<f64> {
        self.targets
            .get(name)
            .and_then(|t| t.tolerance)
            .or(self.default_tolerance)
    }

    /// Entries of `other` override entries of `self`
    pub fn merge(&mut self, other: TargetSet) {
        for (name, target) in other.targets {
            self.targets.insert(name, target);
        }
        if other.default_tolerance.is_some() {
            self.default_tolerance = other.default_tolerance;
        }
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        if let Some(tolerance) = self.default_tolerance {
            validate_tolerance("default_tolerance", tolerance)?;
        }
        for (name, target) in &self.targets {
            if !metric::is_known(name) {
                return Err(DomainError::Configuration(format!(
                    "Unknown target metric '{}'. Known metrics: {}",
                    name,
                    metric::ALL.join(", ")
                )));
            }
            if !target.threshold.is_finite() {
                return Err(DomainError::Configuration(format!(
                    "Target '{}' has a non-finite threshold",
                    name
                )));
            }
            if let Some(tolerance) = target.tolerance {
                validate_tolerance(name, tolerance)?;
            }
            if target.mode == ComparisonMode::Approximately && self.tolerance_for(name).is_none()
            {
                return Err(DomainError::Configuration(format!(
                    "Target '{}' is 'approximately' but has no tolerance and no default_tolerance is set",
                    name
                )));
            }
        }
        Ok(())
    }
}

fn validate_tolerance(name: &str, tolerance: f64) -> Result<(), DomainError> {
    if !tolerance.is_finite() || tolerance < 0.0 {
        return Err(DomainError::Configuration(format!(
            "Tolerance for '{}' must be a non-negative number, got {}",
            name, tolerance
        )));
    }
    Ok(())
}

/// Comparison of one metric against its target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricOutcome {
    pub value: f64,
    pub threshold: f64,
    pub mode: ComparisonMode,
    /// Signed `value - threshold`
    pub deviation: f64,
    /// Size of the violation relative to the threshold, zero when achieved
    pub shortfall: f64,
    pub achieved: bool,
}

/// Evaluator result for one job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub all_achieved: bool,
    pub outcomes: BTreeMap<String, MetricOutcome>,
    /// Target names without a matching metric
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skipped: Vec<String>,
}

impl Verdict {
    pub fn deviation(&self, name: &str) -> Option<f64> {
        self.outcomes.get(name).map(|o| o.deviation)
    }

    /// Sum of normalized violations, used to rank near misses
    pub fn aggregate_deviation(&self) -> f64 {
        self.outcomes.values().map(|o| o.shortfall).sum()
    }

    pub fn missed(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|(_, o)| !o.achieved)
            .map(|(name, _)| name.as_str())
            .collect()
    }
}

/// One execution attempt for one combination
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub index: usize,
    pub combination: Combination,
    pub configuration: Value,
    pub submission_id: Option<String>,
    pub state: JobState,
    pub artifact: Option<PathBuf>,
    pub metrics: Option<Metrics>,
    pub verdict: Option<Verdict>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub failure: Option<JobFailure>,
}

impl Job {
    pub fn new(index: usize, combination: Combination, configuration: Value) -> Self {
        Self {
            index,
            combination,
            configuration,
            submission_id: None,
            state: JobState::Pending,
            artifact: None,
            metrics: None,
            verdict: None,
            submitted_at: None,
            completed_at: None,
            failure: None,
        }
    }

    /// Move along the state machine, rejecting illegal edges
    pub fn transition(&mut self, next: JobState) -> Result<(), DomainError> {
        if !self.state.can_transition_to(next) {
            return Err(DomainError::InvalidTransition {
                from: self.state.to_string(),
                to: next.to_string(),
            });
        }
        self.state = next;
        if next.is_terminal() || next == JobState::Completed {
            self.completed_at = Some(Utc::now());
        }
        Ok(())
    }

    /// Record a failure and move to `Failed` when the state machine allows it
    pub fn fail(&mut self, phase: FailurePhase, message: impl Into<String>) {
        if self.state.can_transition_to(JobState::Failed) {
            self.state = JobState::Failed;
        }
        self.completed_at = Some(Utc::now());
        self.failure = Some(JobFailure {
            phase,
            message: message.into(),
        });
    }

    pub fn is_failure(&self) -> bool {
        self.state.is_terminal()
    }

    pub fn achieved(&self) -> bool {
        self.verdict.as_ref().map(|v| v.all_achieved).unwrap_or(false)
    }
}

/// Overall state of an experiment run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    EarlyStopped,
    Cancelled,
    Aborted,
}

/// Pointer to the best job of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BestResult {
    pub iteration: usize,
    /// Whether the job met every target, or is only the nearest miss
    pub all_achieved: bool,
    /// Ranking key: bitrate for achieved jobs, aggregate deviation otherwise
    pub score: f64,
}

/// Durable log of one experiment run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: String,
    pub strategy: String,
    pub total_combinations: usize,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub jobs: Vec<Job>,
    pub best: Option<BestResult>,
    /// Perceptual scores computed for the best job after the loop
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub best_quality: Option<Metrics>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RunRecord {
    pub fn new(run_id: impl Into<String>, strategy: impl Into<String>, total: usize) -> Self {
        Self {
            run_id: run_id.into(),
            strategy: strategy.into(),
            total_combinations: total,
            status: RunStatus::Running,
            started_at: Utc::now(),
            finished_at: None,
            jobs: Vec::new(),
            best: None,
            best_quality: None,
            error: None,
        }
    }

    pub fn append(&mut self, job: Job) {
        self.jobs.push(job);
    }

    pub fn job(&self, iteration: usize) -> Option<&Job> {
        self.jobs.iter().find(|j| j.index == iteration)
    }

    pub fn best_job(&self) -> Option<&Job> {
        self.best.as_ref().and_then(|b| self.job(b.iteration))
    }

    pub fn finish(&mut self, status: RunStatus) {
        self.status = status;
        self.finished_at = Some(Utc::now());
    }

    pub fn is_finished(&self) -> bool {
        self.status != RunStatus::Running
    }
}

/// Quality scores computed against a reference stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PerceptualMetric {
    Psnr,
    Vmaf,
}

impl PerceptualMetric {
    pub fn parse(name: &str) -> Result<Self, DomainError> {
        match name.to_lowercase().as_str() {
            "psnr" => Ok(PerceptualMetric::Psnr),
            "vmaf" => Ok(PerceptualMetric::Vmaf),
            _ => Err(DomainError::Configuration(format!(
                "Invalid quality metric: {}. Valid metrics: psnr, vmaf",
                name
            ))),
        }
    }
}

/// Deterministic artifact file name, e.g. `output_{index}.mp4` -> `output_007.mp4`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ArtifactName(String);

impl ArtifactName {
    pub const PLACEHOLDER: &'static str = "{index}";

    pub fn parse(template: &str) -> Result<Self, DomainError> {
        if !template.contains(Self::PLACEHOLDER) {
            return Err(DomainError::Configuration(format!(
                "Artifact name '{}' must contain {}",
                template,
                Self::PLACEHOLDER
            )));
        }
        if template.contains('/') || template.contains('\\') {
            return Err(DomainError::Configuration(format!(
                "Artifact name '{}' must be a bare file name",
                template
            )));
        }
        Ok(Self(template.to_string()))
    }

    pub fn for_iteration(&self, index: usize) -> String {
        self.0.replace(Self::PLACEHOLDER, &format!("{:03}", index))
    }
}

impl Default for ArtifactName {
    fn default() -> Self {
        Self("output_{index}.mp4".to_string())
    }
}

impl TryFrom<String> for ArtifactName {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ArtifactName> for String {
    fn from(name: ArtifactName) -> Self {
        name.0
    }
}

#[cfg(test)]
mod tests;
