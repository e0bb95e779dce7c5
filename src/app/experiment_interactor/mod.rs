// Experiment interactor - Orchestrates the tuning loop use case

use std::path::PathBuf;
use std::sync::Arc;

use serde_json::Value;
use tracing::{error, info, warn};

use crate::config::{Experiment, ExperimentConfig, QualityPass};
use crate::domain::errors::*;
use crate::domain::model::*;
use crate::domain::rules::*;
use crate::engine::{JobDriver, JobTarget, PollSettings, RetryPolicy};
use crate::ports::*;
use crate::utils::logging::ProgressReporter;
use crate::utils::shutdown::Cancellation;

/// Per-run knobs taken from the experiment configuration
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub remote_output_dir: String,
    pub artifact_name: ArtifactName,
    pub perceptual: Vec<PerceptualMetric>,
    pub reference: Option<PathBuf>,
    pub quality_pass: QualityPass,
    pub poll: PollSettings,
    pub retry: RetryPolicy,
    pub early_stop: bool,
    /// 0 disables the limit
    pub max_consecutive_failures: usize,
}

impl RunSettings {
    pub fn from_config(config: &ExperimentConfig) -> Self {
        Self {
            remote_output_dir: config.remote.output_dir.clone(),
            artifact_name: config.artifact_name.clone(),
            perceptual: config.metrics.clone(),
            reference: config.reference_video.clone(),
            quality_pass: config.quality_pass,
            poll: config.polling.clone(),
            retry: config.submission.clone(),
            early_stop: config.early_stop,
            max_consecutive_failures: config.max_consecutive_failures,
        }
    }

    fn remote_path(&self, file_name: &str) -> String {
        format!("{}/{}", self.remote_output_dir.trim_end_matches('/'), file_name)
    }

    /// Analysis for each iteration; perceptual scores are deferred under `best_only`
    fn iteration_analysis(&self) -> AnalysisRequest {
        match self.quality_pass {
            QualityPass::PerIteration if !self.perceptual.is_empty() => {
                AnalysisRequest::with_quality(self.perceptual.clone(), self.reference.clone())
            }
            _ => AnalysisRequest::bitstream_only(),
        }
    }
}

/// State owned by a single run: the record, its archive and failure bookkeeping
pub struct RunContext {
    archive: Arc<dyn ArchivePort>,
    record: RunRecord,
    snapshot: Value,
    consecutive_failures: usize,
}

impl RunContext {
    pub fn new(archive: Arc<dyn ArchivePort>, record: RunRecord, snapshot: Value) -> Self {
        Self {
            archive,
            record,
            snapshot,
            consecutive_failures: 0,
        }
    }

    pub fn record(&self) -> &RunRecord {
        &self.record
    }

    /// Append a finished job and rewrite the summary
    async fn record_job(&mut self, job: Job) -> Result<(), DomainError> {
        if job.is_failure() {
            self.consecutive_failures += 1;
        } else {
            self.consecutive_failures = 0;
        }
        self.record.append(job);
        self.record.best = BestJobSelector::select(&self.record.jobs);
        self.persist().await
    }

    async fn persist(&self) -> Result<(), DomainError> {
        self.archive
            .write_summary(&self.record, &self.snapshot)
            .await
            .map(|_| ())
    }

    /// Close the run with `status` and write the final summary
    async fn finish(
        &mut self,
        status: RunStatus,
        error: Option<String>,
    ) -> Result<(), DomainError> {
        self.record.best = BestJobSelector::select(&self.record.jobs);
        self.record.error = error;
        self.record.finish(status);
        self.persist().await
    }
}

/// Interactor for the tuning loop
pub struct ExperimentInteractor {
    submit_port: Arc<dyn SubmitPort>,
    remote_port: Arc<dyn RemotePort>,
    analyzer_port: Arc<dyn AnalyzerPort>,
    notify_port: Arc<dyn NotifyPort>,
    policy: Arc<dyn AchievementPolicy>,
}

fn iteration_summary(job: &Job) -> String {
    if let Some(failure) = &job.failure {
        return format!("failed during {}: {}", failure.phase, failure.message);
    }
    if job.state == JobState::TimedOut {
        return "timed out waiting for the artifact".to_string();
    }
    let bitrate = job
        .metrics
        .as_ref()
        .and_then(|m| m.get(metric::BITRATE_AVG))
        .map(|b| format!("{:.0} kbps", b))
        .unwrap_or_else(|| "n/a".to_string());
    match &job.verdict {
        Some(verdict) if verdict.all_achieved => format!("targets met, bitrate {}", bitrate),
        Some(verdict) => format!(
            "missed {}, bitrate {}",
            verdict.missed().join(", "),
            bitrate
        ),
        None => format!("bitrate {}", bitrate),
    }
}

impl ExperimentInteractor {
    /// Create new experiment interactor with injected ports
    pub fn new(
        submit_port: Arc<dyn SubmitPort>,
        remote_port: Arc<dyn RemotePort>,
        analyzer_port: Arc<dyn AnalyzerPort>,
        notify_port: Arc<dyn NotifyPort>,
        policy: Arc<dyn AchievementPolicy>,
    ) -> Self {
        Self {
            submit_port,
            remote_port,
            analyzer_port,
            notify_port,
            policy,
        }
    }

    /// Execute one experiment run
    ///
    /// Returns the final record for completed and early-stopped runs. Aborted and
    /// cancelled runs are persisted first and then reported as errors.
    pub async fn run(
        &self,
        experiment: &Experiment,
        settings: &RunSettings,
        archive: Arc<dyn ArchivePort>,
        run_id: &str,
        snapshot: Value,
        cancel: &Cancellation,
    ) -> Result<RunRecord, DomainError> {
        let strategy = experiment.strategy.as_ref();
        let total = strategy.planned_count(&experiment.candidates)?;

        // Path conflicts with the template surface before any submission
        self.render(experiment, settings, 1, &experiment.candidates.combination_at(0))?;

        let record = RunRecord::new(run_id, strategy.name(), total);
        let mut context = RunContext::new(archive, record, snapshot);
        context.persist().await?;

        info!(
            run_id,
            strategy = strategy.name(),
            "Starting run with {} combinations in {}",
            total,
            context.archive.run_dir().display()
        );

        let mut driver = JobDriver::new(
            Arc::clone(&self.submit_port),
            Arc::clone(&self.remote_port),
            settings.poll.clone(),
            settings.retry.clone(),
        );
        let mut progress = ProgressReporter::new(total);
        let mut status = RunStatus::Completed;

        for (position, combination) in strategy.combinations(&experiment.candidates)?.enumerate() {
            if cancel.is_cancelled() {
                status = RunStatus::Cancelled;
                break;
            }

            let index = position + 1;
            progress.start_iteration(index, &combination.to_string());
            let configuration = match self.render(experiment, settings, index, &combination) {
                Ok(configuration) => configuration,
                Err(e) => {
                    error!(iteration = index, "Run stopped, rendering failed: {}", e);
                    context.finish(RunStatus::Aborted, Some(e.to_string())).await?;
                    return Err(e);
                }
            };
            let mut job = Job::new(index, combination, configuration);

            let outcome = self
                .run_iteration(
                    &mut job,
                    experiment,
                    settings,
                    &mut driver,
                    &context,
                    run_id,
                    cancel,
                )
                .await;

            let summary = iteration_summary(&job);
            progress.complete_iteration(!job.is_failure(), &summary);
            let achieved = job.achieved();
            context.record_job(job).await?;

            match outcome {
                Ok(()) => {}
                Err(DomainError::Cancelled) => {
                    status = RunStatus::Cancelled;
                    break;
                }
                Err(e) => {
                    error!("Run stopped: {}", e);
                    context.finish(RunStatus::Aborted, Some(e.to_string())).await?;
                    return Err(e);
                }
            }

            self.notify_port
                .notify(&format!("Iteration {}/{}", index, total), &summary)
                .await;

            if achieved && settings.early_stop {
                info!(iteration = index, "All targets met, stopping early");
                status = RunStatus::EarlyStopped;
                break;
            }

            if settings.max_consecutive_failures > 0
                && context.consecutive_failures > settings.max_consecutive_failures
            {
                let e = DomainError::RunAborted {
                    consecutive_failures: context.consecutive_failures,
                };
                error!("{}", e);
                context.finish(RunStatus::Aborted, Some(e.to_string())).await?;
                self.notify_port.notify("Run aborted", &e.to_string()).await;
                return Err(e);
            }
        }

        if status == RunStatus::Cancelled {
            warn!("Run cancelled after {} iterations", context.record.jobs.len());
            context
                .finish(RunStatus::Cancelled, Some("cancelled".to_string()))
                .await?;
            return Err(DomainError::Cancelled);
        }

        context.record.best = BestJobSelector::select(&context.record.jobs);
        if settings.quality_pass == QualityPass::BestOnly && !settings.perceptual.is_empty() {
            context.record.best_quality =
                self.score_best(&context.record, settings, cancel).await;
        }
        context.finish(status, None).await?;

        let message = match context.record.best_job() {
            Some(best) => format!("best iteration #{}: {}", best.index, iteration_summary(best)),
            None => "no iteration produced an analyzable artifact".to_string(),
        };
        info!(run_id, status = ?status, "Run finished, {}", message);
        self.notify_port.notify("Run finished", &message).await;

        Ok(context.record)
    }

    /// Template with the combination and, when configured, the remote artifact path injected
    fn render(
        &self,
        experiment: &Experiment,
        settings: &RunSettings,
        index: usize,
        combination: &Combination,
    ) -> Result<Value, DomainError> {
        let configuration = PathInjector::inject_all(&experiment.template, combination)?;
        match &experiment.output_path_param {
            Some(path) => {
                let file_name = settings.artifact_name.for_iteration(index);
                let remote_path = settings.remote_path(&file_name);
                PathInjector::inject(&configuration, path, Value::String(remote_path))
            }
            None => Ok(configuration),
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_iteration(
        &self,
        job: &mut Job,
        experiment: &Experiment,
        settings: &RunSettings,
        driver: &mut JobDriver,
        context: &RunContext,
        run_id: &str,
        cancel: &Cancellation,
    ) -> Result<(), DomainError> {
        let file_name = settings.artifact_name.for_iteration(job.index);
        let remote_path = settings.remote_path(&file_name);
        context
            .archive
            .write_configuration(job.index, &job.configuration)
            .await?;

        let local_path = context.archive.path_for(&file_name);
        let target = JobTarget {
            run_id,
            remote_path: &remote_path,
            local_path: &local_path,
        };
        driver.drive(job, &target, cancel).await?;

        let artifact = match (&job.state, &job.artifact) {
            (JobState::Completed, Some(artifact)) => artifact.clone(),
            _ => return Ok(()),
        };

        let request = settings.iteration_analysis();
        let analysis = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                job.fail(FailurePhase::Analyze, "cancelled");
                return Err(DomainError::Cancelled);
            }
            analysis = self.analyzer_port.analyze(&artifact, &request) => analysis,
        };

        match analysis {
            Ok(metrics) => {
                let verdict = self.policy.evaluate(&metrics, &experiment.targets);
                context
                    .archive
                    .write_metrics(job.index, &metrics, Some(&verdict))
                    .await?;
                job.metrics = Some(metrics);
                job.verdict = Some(verdict);
            }
            Err(e) => {
                warn!(iteration = job.index, "{}", e);
                job.fail(FailurePhase::Analyze, e.to_string());
            }
        }
        Ok(())
    }

    /// Perceptual scores for the best job's artifact; problems only warn
    async fn score_best(
        &self,
        record: &RunRecord,
        settings: &RunSettings,
        cancel: &Cancellation,
    ) -> Option<Metrics> {
        let best = record.best_job()?;
        let artifact = best.artifact.as_ref()?;
        if settings.reference.is_none() {
            warn!("No reference_video configured, skipping quality pass");
            return None;
        }

        info!(iteration = best.index, "Scoring best result against the reference");
        let request =
            AnalysisRequest::with_quality(settings.perceptual.clone(), settings.reference.clone());
        let analysis = tokio::select! {
            biased;
            _ = cancel.cancelled() => return None,
            analysis = self.analyzer_port.analyze(artifact, &request) => analysis,
        };

        match analysis {
            Ok(metrics) => {
                let mut quality = Metrics::new();
                for (name, value) in metrics.iter() {
                    if metric::PERCEPTUAL.contains(&name.as_str()) {
                        quality.insert(name, *value);
                    }
                }
                let listing = quality
                    .iter()
                    .map(|(name, value)| format!("{}: {:.2}", name, value))
                    .collect::<Vec<_>>()
                    .join(", ");
                self.notify_port
                    .notify(&format!("Quality of iteration #{}", best.index), &listing)
                    .await;
                Some(quality)
            }
            Err(e) => {
                warn!(iteration = best.index, "Quality pass failed: {}", e);
                None
            }
        }
    }
}
