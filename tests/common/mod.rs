//! In-memory ports shared by the integration tests

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};

use transcode_tune::app::{ExperimentInteractor, RunSettings};
use transcode_tune::config::QualityPass;
use transcode_tune::domain::model::*;
use transcode_tune::domain::rules::ThresholdPolicy;
use transcode_tune::engine::{PollSettings, RetryPolicy};
use transcode_tune::planner::GridSearch;
use transcode_tune::ports::*;
use transcode_tune::{DomainError, Experiment};

/// Accepts every submission except the listed iterations
#[derive(Default)]
pub struct FakeSubmit {
    pub failing: HashSet<usize>,
    pub calls: AtomicUsize,
}

#[async_trait]
impl SubmitPort for FakeSubmit {
    async fn submit(&self, request: &SubmissionRequest) -> Result<String, DomainError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.contains(&request.index) {
            return Err(DomainError::Submission("HTTP 503 Service Unavailable".to_string()));
        }
        Ok(format!("{}-{:03}", request.run_id, request.index))
    }
}

/// Reports artifacts ready, except the listed remote file names which stay pending
#[derive(Default)]
pub struct FakeRemote {
    pub never_ready: HashSet<String>,
    pub fetched: Mutex<Vec<String>>,
}

fn file_name(path: &str) -> String {
    path.rsplit('/').next().unwrap_or(path).to_string()
}

#[async_trait]
impl RemotePort for FakeRemote {
    async fn check_status(
        &self,
        _id: &str,
        remote_path: &str,
    ) -> Result<RemoteStatus, DomainError> {
        if self.never_ready.contains(&file_name(remote_path)) {
            Ok(RemoteStatus::Pending)
        } else {
            Ok(RemoteStatus::Ready)
        }
    }

    async fn fetch(&self, remote_path: &str, local_path: &Path) -> Result<PathBuf, DomainError> {
        std::fs::write(local_path, b"not really a video")
            .map_err(|e| DomainError::Transfer(e.to_string()))?;
        self.fetched.lock().unwrap().push(file_name(remote_path));
        Ok(local_path.to_path_buf())
    }
}

/// Returns canned bitrates by artifact file name; PSNR when asked for it
#[derive(Default)]
pub struct FakeAnalyzer {
    pub bitrates: HashMap<String, f64>,
    pub calls: Mutex<Vec<(String, bool)>>,
}

impl FakeAnalyzer {
    pub fn with_bitrates(bitrates: &[(&str, f64)]) -> Self {
        Self {
            bitrates: bitrates
                .iter()
                .map(|(name, value)| (name.to_string(), *value))
                .collect(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn analyzed(&self) -> Vec<String> {
        self.calls.lock().unwrap().iter().map(|(n, _)| n.clone()).collect()
    }
}

#[async_trait]
impl AnalyzerPort for FakeAnalyzer {
    async fn analyze(
        &self,
        local_path: &Path,
        request: &AnalysisRequest,
    ) -> Result<Metrics, DomainError> {
        let name = local_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        self.calls
            .lock()
            .unwrap()
            .push((name.clone(), !request.perceptual.is_empty()));

        let bitrate = self
            .bitrates
            .get(&name)
            .copied()
            .ok_or_else(|| DomainError::Analysis(format!("no canned metrics for {}", name)))?;
        let mut metrics = Metrics::from([("bitrate_avg", bitrate), ("bitrate_max", bitrate * 1.5)]);
        if request.perceptual.contains(&PerceptualMetric::Psnr) {
            metrics.insert("psnr", 41.5);
        }
        Ok(metrics)
    }
}

/// Collects notifications
#[derive(Default)]
pub struct FakeNotify {
    pub titles: Mutex<Vec<String>>,
}

#[async_trait]
impl NotifyPort for FakeNotify {
    async fn notify(&self, title: &str, _message: &str) {
        self.titles.lock().unwrap().push(title.to_string());
    }
}

/// `encoder.bitrate` over the given candidates
pub fn experiment(bitrates: &[u64], targets: TargetSet) -> Experiment {
    let mut entries = BTreeMap::new();
    entries.insert(
        ParamPath::parse("encoder.bitrate").unwrap(),
        bitrates.iter().map(|b| json!(b)).collect::<Vec<Value>>(),
    );
    Experiment {
        template: json!({"encoder": {"codec": "h264"}}),
        candidates: CandidateSet::new(entries).unwrap(),
        targets,
        strategy: Box::new(GridSearch),
        output_path_param: Some(ParamPath::parse("output.path").unwrap()),
    }
}

pub fn bitrate_at_most(threshold: f64) -> TargetSet {
    TargetSet::new().with_target("bitrate_avg", Target::at_most(threshold))
}

pub fn settings() -> RunSettings {
    RunSettings {
        remote_output_dir: "/srv/output".to_string(),
        artifact_name: ArtifactName::default(),
        perceptual: Vec::new(),
        reference: None,
        quality_pass: QualityPass::PerIteration,
        poll: PollSettings {
            interval_secs: 0.005,
            backoff_factor: 1.0,
            max_interval_secs: 0.005,
            max_wait_secs: 0.05,
            max_check_errors: 0,
        },
        retry: RetryPolicy {
            initial_backoff_secs: 0.001,
            ..RetryPolicy::default()
        },
        early_stop: false,
        max_consecutive_failures: 0,
    }
}

pub struct Harness {
    pub submit: Arc<FakeSubmit>,
    pub remote: Arc<FakeRemote>,
    pub analyzer: Arc<FakeAnalyzer>,
    pub notify: Arc<FakeNotify>,
}

impl Harness {
    pub fn new(submit: FakeSubmit, remote: FakeRemote, analyzer: FakeAnalyzer) -> Self {
        Self {
            submit: Arc::new(submit),
            remote: Arc::new(remote),
            analyzer: Arc::new(analyzer),
            notify: Arc::new(FakeNotify::default()),
        }
    }

    pub fn interactor(&self) -> ExperimentInteractor {
        ExperimentInteractor::new(
            self.submit.clone(),
            self.remote.clone(),
            self.analyzer.clone(),
            self.notify.clone(),
            Arc::new(ThresholdPolicy),
        )
    }
}
