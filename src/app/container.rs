use std::sync::Arc;
use std::time::Duration;

use crate::adapters::probe_ffprobe::DEFAULT_ANALYSIS_TIMEOUT;
use crate::adapters::{
    CommandNotifyAdapter, FFprobeAdapter, HttpSubmitAdapter, SshRemoteAdapter, SshSettings,
    TracingNotifyAdapter,
};
use crate::app::{BreathingInteractor, ExperimentInteractor, ReferenceInteractor};
use crate::config::ExperimentConfig;
use crate::domain::errors::DomainError;
use crate::domain::rules::{AchievementPolicy, ThresholdPolicy};
use crate::ports::{AnalyzerPort, NotifyPort, RemotePort, SubmitPort};

pub trait AppContainer: Send + Sync {
    fn reference_interactor(&self) -> Arc<ReferenceInteractor>;
    fn breathing_interactor(&self) -> Arc<BreathingInteractor>;
    fn experiment_interactor(
        &self,
        config: &ExperimentConfig,
    ) -> Result<Arc<ExperimentInteractor>, DomainError>;
}

pub struct DefaultAppContainer {
    reference_interactor: Arc<ReferenceInteractor>,
    breathing_interactor: Arc<BreathingInteractor>,
}

impl DefaultAppContainer {
    pub fn new() -> Self {
        let analyzer_port: Arc<dyn AnalyzerPort> =
            Arc::new(FFprobeAdapter::new().with_timeout(Some(DEFAULT_ANALYSIS_TIMEOUT)));

        let reference_interactor = Arc::new(ReferenceInteractor::new(Arc::clone(&analyzer_port)));
        let breathing_interactor = Arc::new(BreathingInteractor::new(Arc::clone(&analyzer_port)));

        Self {
            reference_interactor,
            breathing_interactor,
        }
    }

    fn ssh_settings(config: &ExperimentConfig) -> SshSettings {
        let remote = &config.remote;
        SshSettings {
            user: remote.user.clone(),
            port: remote.port,
            identity_file: remote.identity_file.clone(),
            status_command: remote.status_command.clone(),
            connect_timeout: Duration::from_secs(remote.connect_timeout_secs),
            ..SshSettings::new(remote.host.clone())
        }
    }
}

impl Default for DefaultAppContainer {
    fn default() -> Self {
        Self::new()
    }
}

impl AppContainer for DefaultAppContainer {
    fn reference_interactor(&self) -> Arc<ReferenceInteractor> {
        Arc::clone(&self.reference_interactor)
    }

    fn breathing_interactor(&self) -> Arc<BreathingInteractor> {
        Arc::clone(&self.breathing_interactor)
    }

    fn experiment_interactor(
        &self,
        config: &ExperimentConfig,
    ) -> Result<Arc<ExperimentInteractor>, DomainError> {
        let submit_port = Arc::new(HttpSubmitAdapter::new(
            config.api_url.clone(),
            config.submission.timeout(),
            config.submission_id_field.clone(),
        )?);
        let remote_port = Arc::new(SshRemoteAdapter::new(Self::ssh_settings(config)));
        let notify_port: Arc<dyn NotifyPort> = match &config.notify_command {
            Some(argv) => Arc::new(CommandNotifyAdapter::new(argv.clone())?),
            None => Arc::new(TracingNotifyAdapter::new()),
        };
        let analyzer_port: Arc<dyn AnalyzerPort> =
            Arc::new(FFprobeAdapter::new().with_timeout(config.analysis_timeout()));
        let policy: Arc<dyn AchievementPolicy> = Arc::new(ThresholdPolicy);

        Ok(Arc::new(ExperimentInteractor::new(
            submit_port as Arc<dyn SubmitPort>,
            remote_port as Arc<dyn RemotePort>,
            analyzer_port,
            notify_port,
            policy,
        )))
    }
}
