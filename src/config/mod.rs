//! Experiment configuration: file loading, environment overrides and validation
//!
//! Precedence is CLI > environment > file > defaults. The CLI layer applies its
//! overrides after [`ExperimentConfig::apply_env`].

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::adapters::probe_ffprobe::DEFAULT_ANALYSIS_TIMEOUT;
use crate::adapters::ssh_remote::DEFAULT_STATUS_COMMAND;
use crate::domain::errors::DomainError;
use crate::domain::model::*;
use crate::engine::{PollSettings, RetryPolicy};
use crate::error::{TuneError, TuneResult};
use crate::planner::{GridSearch, RandomSearch, SearchStrategy};

/// Environment variables that override file values
pub const ENV_API_URL: &str = "TUNE_API_URL";
pub const ENV_REMOTE_HOST: &str = "TUNE_REMOTE_HOST";
pub const ENV_REMOTE_USER: &str = "TUNE_REMOTE_USER";
pub const ENV_RESULTS_DIR: &str = "TUNE_RESULTS_DIR";

/// Candidate list for one parameter; a bare scalar means a single candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Candidates {
    List(Vec<Value>),
    Single(Value),
}

impl Candidates {
    pub fn into_values(self) -> Vec<Value> {
        match self {
            Candidates::List(values) => values,
            Candidates::Single(value) => vec![value],
        }
    }
}

/// A target as written in configuration: a bare threshold uses the metric's default mode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TargetSpec {
    Threshold(f64),
    Full(Target),
}

impl TargetSpec {
    fn is_bare(&self) -> bool {
        matches!(self, TargetSpec::Threshold(_))
    }

    pub fn into_target(self, metric_name: &str) -> Target {
        match self {
            TargetSpec::Full(target) => target,
            TargetSpec::Threshold(threshold) => Target {
                mode: ComparisonMode::default_for(metric_name),
                threshold,
                tolerance: None,
            },
        }
    }
}

/// Layout of a targets file, as written by `refs`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TargetsDocument {
    #[serde(default)]
    pub targets: BTreeMap<String, TargetSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_tolerance: Option<f64>,
}

impl TargetsDocument {
    pub fn into_target_set(self) -> TargetSet {
        let mut set = TargetSet::new();
        for (name, spec) in self.targets {
            let target = spec.into_target(&name);
            set = set.with_target(&name, target);
        }
        set.default_tolerance = self.default_tolerance;
        set
    }
}

impl From<&TargetSet> for TargetsDocument {
    fn from(set: &TargetSet) -> Self {
        Self {
            targets: set
                .targets
                .iter()
                .map(|(name, target)| (name.clone(), TargetSpec::Full(target.clone())))
                .collect(),
            default_tolerance: set.default_tolerance,
        }
    }
}

/// Remote host holding the transcoder output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RemoteConfig {
    pub host: String,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    /// Directory the service writes artifacts into
    pub output_dir: String,
    #[serde(default)]
    pub identity_file: Option<PathBuf>,
    /// Status check template with `{path}` and `{id}`
    #[serde(default = "default_status_command")]
    pub status_command: String,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

fn default_status_command() -> String {
    DEFAULT_STATUS_COMMAND.to_string()
}

fn default_connect_timeout() -> u64 {
    10
}

impl RemoteConfig {
    /// Remote location of an artifact
    pub fn artifact_path(&self, file_name: &str) -> String {
        format!("{}/{}", self.output_dir.trim_end_matches('/'), file_name)
    }
}

/// Search strategy selection
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StrategyConfig {
    #[default]
    Grid,
    Random {
        samples: usize,
        #[serde(default)]
        seed: Option<u64>,
    },
}

/// When perceptual scores are computed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityPass {
    /// Every analyzed iteration, so PSNR/VMAF can be targets
    #[default]
    PerIteration,
    /// Only the best job, after the loop
    BestOnly,
}

/// Experiment file contents
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExperimentConfig {
    /// Base configuration template (JSON or YAML)
    pub template: PathBuf,
    /// Transcoding service endpoint
    pub api_url: String,
    /// Dotted path of the submission id in the service response
    #[serde(default)]
    pub submission_id_field: Option<String>,
    pub remote: RemoteConfig,
    #[serde(default)]
    pub artifact_name: ArtifactName,
    /// Parameter path that receives the remote artifact path in each configuration
    #[serde(default)]
    pub output_path_param: Option<String>,
    pub params: BTreeMap<String, Candidates>,
    #[serde(default)]
    pub targets: BTreeMap<String, TargetSpec>,
    /// Targets file merged under the inline targets
    #[serde(default)]
    pub targets_file: Option<PathBuf>,
    #[serde(default)]
    pub default_tolerance: Option<f64>,
    /// Perceptual metrics to compute against `reference_video`
    #[serde(default)]
    pub metrics: Vec<PerceptualMetric>,
    #[serde(default)]
    pub reference_video: Option<PathBuf>,
    #[serde(default)]
    pub quality_pass: QualityPass,
    #[serde(default)]
    pub polling: PollSettings,
    #[serde(default)]
    pub submission: RetryPolicy,
    #[serde(default)]
    pub strategy: StrategyConfig,
    /// Stop at the first iteration meeting every target
    #[serde(default)]
    pub early_stop: bool,
    /// Consecutive failed iterations before the run aborts; 0 disables the limit
    #[serde(default = "default_max_consecutive_failures")]
    pub max_consecutive_failures: usize,
    /// Upper bound for one ffprobe/ffmpeg run, in seconds; 0 disables it
    #[serde(default = "default_analysis_timeout")]
    pub analysis_timeout_secs: u64,
    #[serde(default = "default_results_dir")]
    pub results_dir: PathBuf,
    /// Program and arguments run for each notification
    #[serde(default)]
    pub notify_command: Option<Vec<String>>,
}

fn default_max_consecutive_failures() -> usize {
    5
}

fn default_analysis_timeout() -> u64 {
    DEFAULT_ANALYSIS_TIMEOUT.as_secs()
}

fn default_results_dir() -> PathBuf {
    PathBuf::from("results")
}

/// Parse a YAML, TOML or JSON document, chosen by file extension (YAML otherwise)
pub fn read_document<T: DeserializeOwned>(path: &Path) -> TuneResult<T> {
    let display = path.display().to_string();
    let content = fs::read_to_string(path).map_err(|source| TuneError::Read {
        path: display.clone(),
        source,
    })?;
    let extension = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "toml" => toml::from_str(&content).map_err(|source| TuneError::Toml {
            path: display,
            source,
        }),
        "json" => serde_json::from_str(&content).map_err(|source| TuneError::Json {
            path: display,
            source,
        }),
        _ => serde_yaml::from_str(&content).map_err(|source| TuneError::Yaml {
            path: display,
            source,
        }),
    }
}

fn bare_names(targets: &BTreeMap<String, TargetSpec>) -> impl Iterator<Item = String> + '_ {
    targets
        .iter()
        .filter(|(_, spec)| spec.is_bare())
        .map(|(name, _)| name.clone())
}

fn resolve(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

impl ExperimentConfig {
    /// Load an experiment file; relative file references resolve against its directory
    pub fn load(path: &Path) -> TuneResult<Self> {
        let mut config: Self = read_document(path)?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        config.template = resolve(base, &config.template);
        config.targets_file = config.targets_file.map(|p| resolve(base, &p));
        config.reference_video = config.reference_video.map(|p| resolve(base, &p));
        config.remote.identity_file = config.remote.identity_file.map(|p| resolve(base, &p));
        info!("Loaded experiment from {}", path.display());
        Ok(config)
    }

    /// Apply `TUNE_*` environment overrides
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from `lookup`; empty values are ignored
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let env_mappings = [
            ENV_API_URL,
            ENV_REMOTE_HOST,
            ENV_REMOTE_USER,
            ENV_RESULTS_DIR,
        ];

        let mut env_overrides = 0;
        for key in env_mappings {
            let value = match lookup(key).filter(|v| !v.trim().is_empty()) {
                Some(value) => value,
                None => continue,
            };
            info!("Found environment override: {} = {}", key, value);
            match key {
                ENV_API_URL => self.api_url = value,
                ENV_REMOTE_HOST => self.remote.host = value,
                ENV_REMOTE_USER => self.remote.user = Some(value),
                _ => self.results_dir = PathBuf::from(value),
            }
            env_overrides += 1;
        }

        if env_overrides > 0 {
            info!("Applied {} environment variable overrides", env_overrides);
        }
    }

    /// Candidate set from `params`
    pub fn candidate_set(&self) -> Result<CandidateSet, DomainError> {
        let mut entries = BTreeMap::new();
        for (path, candidates) in &self.params {
            let parsed = ParamPath::parse(path)?;
            if entries.contains_key(&parsed) {
                return Err(DomainError::Configuration(format!(
                    "Parameter '{}' is listed more than once",
                    parsed
                )));
            }
            entries.insert(parsed, candidates.clone().into_values());
        }
        let candidates = CandidateSet::new(entries)?;

        if let Some(output) = self.output_path_param()? {
            if let Some(clash) = candidates
                .paths()
                .find(|p| p.is_prefix_of(&output) || output.is_prefix_of(p) || **p == output)
            {
                return Err(DomainError::Configuration(format!(
                    "output_path_param '{}' overlaps parameter '{}'",
                    output, clash
                )));
            }
        }
        Ok(candidates)
    }

    pub fn output_path_param(&self) -> Result<Option<ParamPath>, DomainError> {
        self.output_path_param
            .as_deref()
            .map(ParamPath::parse)
            .transpose()
    }

    /// Targets file, then inline targets, then the explicit default tolerance
    ///
    /// A bare threshold for an `approximately` metric falls back to
    /// [`TargetSet::DEFAULT_TOLERANCE`] when no default tolerance is set.
    pub fn target_set(&self) -> TuneResult<TargetSet> {
        let mut bare: Vec<String> = bare_names(&self.targets).collect();
        let mut targets = match &self.targets_file {
            Some(path) => {
                let document: TargetsDocument = read_document(path)?;
                info!(
                    "Loaded {} targets from {}",
                    document.targets.len(),
                    path.display()
                );
                bare.extend(
                    bare_names(&document.targets).filter(|name| !self.targets.contains_key(name)),
                );
                document.into_target_set()
            }
            None => TargetSet::new(),
        };

        let inline = TargetsDocument {
            targets: self.targets.clone(),
            default_tolerance: self.default_tolerance,
        };
        targets.merge(inline.into_target_set());

        for name in bare {
            if targets.tolerance_for(&name).is_some() {
                continue;
            }
            if let Some(target) = targets.targets.get_mut(&name) {
                if target.mode == ComparisonMode::Approximately {
                    target.tolerance = Some(TargetSet::DEFAULT_TOLERANCE);
                }
            }
        }
        targets.validate()?;
        Ok(targets)
    }

    /// Strategy object for `strategy`
    pub fn search_strategy(&self) -> Result<Box<dyn SearchStrategy>, DomainError> {
        match &self.strategy {
            StrategyConfig::Grid => Ok(Box::new(GridSearch)),
            StrategyConfig::Random { samples, seed } => {
                let seed = seed.unwrap_or_else(rand::random);
                info!("Random search seed: {}", seed);
                Ok(Box::new(RandomSearch::new(*samples, seed)?))
            }
        }
    }

    /// Template root; must be a mapping
    pub fn load_template(&self) -> TuneResult<Value> {
        let template: Value = read_document(&self.template)?;
        if !template.is_object() {
            return Err(DomainError::Configuration(format!(
                "Template {} must be a mapping at the top level",
                self.template.display()
            ))
            .into());
        }
        Ok(template)
    }

    /// Check everything that does not need the filesystem
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.api_url.trim().is_empty() {
            return Err(DomainError::Configuration("api_url is required".to_string()));
        }
        if self.remote.host.trim().is_empty() {
            return Err(DomainError::Configuration("remote.host is required".to_string()));
        }
        if self.remote.output_dir.trim().is_empty() {
            return Err(DomainError::Configuration(
                "remote.output_dir is required".to_string(),
            ));
        }
        if let Some(field) = &self.submission_id_field {
            if field.split('.').any(|s| s.trim().is_empty()) {
                return Err(DomainError::Configuration(format!(
                    "submission_id_field '{}' has an empty segment",
                    field
                )));
            }
        }
        self.polling.validate()?;
        self.submission.validate()?;
        if let Some(argv) = &self.notify_command {
            if argv.first().map(|p| p.trim().is_empty()).unwrap_or(true) {
                return Err(DomainError::Configuration(
                    "notify_command needs at least a program name".to_string(),
                ));
            }
        }
        if !self.metrics.is_empty() {
            match &self.reference_video {
                Some(reference) if !reference.is_file() => {
                    return Err(DomainError::Configuration(format!(
                        "reference_video {} does not exist",
                        reference.display()
                    )))
                }
                Some(_) => {}
                None => warn!(
                    "Quality metrics requested without reference_video; they will be skipped"
                ),
            }
        }
        Ok(())
    }

    pub fn analysis_timeout(&self) -> Option<Duration> {
        (self.analysis_timeout_secs > 0).then(|| Duration::from_secs(self.analysis_timeout_secs))
    }

    /// Validate and assemble everything a run needs
    pub fn prepare(&self) -> TuneResult<Experiment> {
        self.validate()?;
        let candidates = self.candidate_set()?;
        let targets = self.target_set()?;
        let strategy = self.search_strategy()?;
        let template = self.load_template()?;
        if targets.is_empty() {
            warn!("No targets configured; every analyzed iteration counts as achieved");
        }
        for name in targets.targets.keys() {
            if metric::PERCEPTUAL.contains(&name.as_str())
                && self.quality_pass == QualityPass::BestOnly
            {
                warn!(
                    "Target '{}' needs per-iteration quality scores but quality_pass is best_only",
                    name
                );
            }
        }
        Ok(Experiment {
            template,
            candidates,
            targets,
            strategy,
            output_path_param: self.output_path_param()?,
        })
    }

    /// Configuration snapshot stored in the run summary
    pub fn snapshot(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Validated experiment, ready to plan or run
pub struct Experiment {
    pub template: Value,
    pub candidates: CandidateSet,
    pub targets: TargetSet,
    pub strategy: Box<dyn SearchStrategy>,
    pub output_path_param: Option<ParamPath>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    const EXPERIMENT: &str = r#"
template: template.json
api_url: http://transcoder.local/api/jobs
remote:
  host: encoder-01
  user: media
  output_dir: /srv/output/
params:
  encoder.x264.bitrate: [2500, 3000, 3500]
  encoder.x264.preset: slow
targets:
  bitrate_avg:
    mode: approximately
    threshold: 3000
    tolerance: 0.05
  bitrate_max: 5000
"#;

    fn write_experiment(dir: &TempDir, body: &str) -> PathBuf {
        fs::write(dir.path().join("template.json"), r#"{"encoder": {"x264": {}}}"#).unwrap();
        let path = dir.path().join("experiment.yaml");
        fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn test_load_yaml_experiment() {
        let dir = TempDir::new().unwrap();
        let config = ExperimentConfig::load(&write_experiment(&dir, EXPERIMENT)).unwrap();

        assert_eq!(config.template, dir.path().join("template.json"));
        assert_eq!(config.remote.status_command, DEFAULT_STATUS_COMMAND);
        assert_eq!(config.remote.artifact_path("output_001.mp4"), "/srv/output/output_001.mp4");
        assert_eq!(config.strategy, StrategyConfig::Grid);
        assert_eq!(config.quality_pass, QualityPass::PerIteration);
        assert!(!config.early_stop);
        assert_eq!(config.analysis_timeout(), Some(DEFAULT_ANALYSIS_TIMEOUT));

        let experiment = config.prepare().unwrap();
        assert_eq!(experiment.candidates.combination_count().unwrap(), 3);
        assert_eq!(experiment.targets.targets["bitrate_max"], Target::at_most(5000.0));
        assert_eq!(experiment.strategy.name(), "grid");
    }

    #[test]
    fn test_load_toml_experiment() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("template.json"), "{}").unwrap();
        let path = dir.path().join("experiment.toml");
        fs::write(
            &path,
            r#"
template = "template.json"
api_url = "http://transcoder.local/api/jobs"
early_stop = true
analysis_timeout_secs = 0

[remote]
host = "encoder-01"
output_dir = "/srv/output"

[params]
"encoder.crf" = [20, 23]

[strategy]
kind = "random"
samples = 1
seed = 7
"#,
        )
        .unwrap();

        let config = ExperimentConfig::load(&path).unwrap();
        assert!(config.early_stop);
        assert_eq!(config.analysis_timeout(), None);
        assert_eq!(
            config.strategy,
            StrategyConfig::Random {
                samples: 1,
                seed: Some(7)
            }
        );
        let experiment = config.prepare().unwrap();
        assert_eq!(experiment.strategy.planned_count(&experiment.candidates).unwrap(), 1);
    }

    #[test]
    fn test_unknown_field_is_rejected() {
        let dir = TempDir::new().unwrap();
        let body = format!("{}\nearly_stopp: true\n", EXPERIMENT);
        let err = ExperimentConfig::load(&write_experiment(&dir, &body)).unwrap_err();
        assert!(matches!(err, TuneError::Yaml { .. }));
    }

    #[test]
    fn test_environment_overrides() {
        let dir = TempDir::new().unwrap();
        let mut config = ExperimentConfig::load(&write_experiment(&dir, EXPERIMENT)).unwrap();
        let env: HashMap<&str, &str> = [
            (ENV_API_URL, "http://other/api"),
            (ENV_REMOTE_USER, "ops"),
            (ENV_REMOTE_HOST, ""),
        ]
        .into_iter()
        .collect();

        config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));
        assert_eq!(config.api_url, "http://other/api");
        assert_eq!(config.remote.user.as_deref(), Some("ops"));
        assert_eq!(config.remote.host, "encoder-01");
    }

    #[test]
    fn test_inline_targets_override_targets_file() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("targets.yaml"),
            "targets:\n  bitrate_max: 4000\n  iframe_max_size: 90000\ndefault_tolerance: 0.1\n",
        )
        .unwrap();
        let body = format!("{}targets_file: targets.yaml\n", EXPERIMENT);
        let config = ExperimentConfig::load(&write_experiment(&dir, &body)).unwrap();

        let targets = config.target_set().unwrap();
        assert_eq!(targets.len(), 3);
        assert_eq!(targets.targets["bitrate_max"].threshold, 5000.0);
        assert_eq!(targets.targets["iframe_max_size"].threshold, 90000.0);
        assert_eq!(targets.default_tolerance, Some(0.1));
    }

    #[test]
    fn test_approximately_without_tolerance_is_rejected() {
        let dir = TempDir::new().unwrap();
        let body = EXPERIMENT.replace("    tolerance: 0.05\n", "");
        let config = ExperimentConfig::load(&write_experiment(&dir, &body)).unwrap();
        let Err(err) = config.prepare() else {
            panic!("approximately target without tolerance was accepted");
        };
        assert!(matches!(err, TuneError::Domain(DomainError::Configuration(_))));
    }

    #[test]
    fn test_bare_approximately_threshold_gets_default_tolerance() {
        let dir = TempDir::new().unwrap();
        let body = EXPERIMENT.replace(
            "  bitrate_avg:\n    mode: approximately\n    threshold: 3000\n    tolerance: 0.05\n",
            "  bitrate_avg: 3000\n",
        );
        let config = ExperimentConfig::load(&write_experiment(&dir, &body)).unwrap();

        let targets = config.target_set().unwrap();
        assert_eq!(
            targets.targets["bitrate_avg"],
            Target::approximately(3000.0, Some(TargetSet::DEFAULT_TOLERANCE))
        );
        assert!(config.prepare().is_ok());
    }

    #[test]
    fn test_bare_threshold_defers_to_default_tolerance() {
        let dir = TempDir::new().unwrap();
        let body = format!(
            "{}default_tolerance: 0.1\n",
            EXPERIMENT.replace(
                "  bitrate_avg:\n    mode: approximately\n    threshold: 3000\n    tolerance: 0.05\n",
                "  bitrate_avg: 3000\n",
            )
        );
        let config = ExperimentConfig::load(&write_experiment(&dir, &body)).unwrap();

        let targets = config.target_set().unwrap();
        assert_eq!(targets.targets["bitrate_avg"].tolerance, None);
        assert_eq!(targets.tolerance_for("bitrate_avg"), Some(0.1));
    }

    #[test]
    fn test_bare_threshold_uses_metric_default_mode() {
        let spec = TargetSpec::Threshold(95.0);
        assert_eq!(spec.into_target("vmaf").mode, ComparisonMode::AtLeast);
        assert_eq!(
            TargetSpec::Threshold(5000.0).into_target("bitrate_max").mode,
            ComparisonMode::AtMost
        );
    }

    #[test]
    fn test_output_path_param_must_not_overlap() {
        let dir = TempDir::new().unwrap();
        let body = format!("{}output_path_param: encoder.x264\n", EXPERIMENT);
        let config = ExperimentConfig::load(&write_experiment(&dir, &body)).unwrap();
        assert!(config.candidate_set().is_err());

        let body = format!("{}output_path_param: output.path\n", EXPERIMENT);
        let config = ExperimentConfig::load(&write_experiment(&dir, &body)).unwrap();
        assert!(config.candidate_set().is_ok());
    }

    #[test]
    fn test_duplicate_parameter_paths_are_rejected() {
        let dir = TempDir::new().unwrap();
        let body = EXPERIMENT.replace(
            "  encoder.x264.preset: slow\n",
            "  encoder.x264.preset: slow\n  \" encoder.x264.bitrate\": [4000]\n",
        );
        let config = ExperimentConfig::load(&write_experiment(&dir, &body)).unwrap();
        assert_eq!(config.params.len(), 3);

        let err = config.candidate_set().unwrap_err();
        assert!(err.to_string().contains("encoder.x264.bitrate"));
    }

    #[test]
    fn test_template_must_be_mapping() {
        let dir = TempDir::new().unwrap();
        let config = ExperimentConfig::load(&write_experiment(&dir, EXPERIMENT)).unwrap();
        fs::write(dir.path().join("template.json"), "[1, 2]").unwrap();
        assert!(config.load_template().is_err());
    }
}
