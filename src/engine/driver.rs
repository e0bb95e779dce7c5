//! Remote job driver: submit, poll until done, fetch the artifact

use std::collections::HashSet;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::domain::errors::DomainError;
use crate::domain::model::{FailurePhase, Job, JobState};
use crate::engine::{PollSettings, RetryPolicy};
use crate::ports::{RemotePort, RemoteStatus, SubmissionRequest, SubmitPort};
use crate::utils::shutdown::Cancellation;

/// Where one job's artifact lives on both ends
#[derive(Debug, Clone)]
pub struct JobTarget<'a> {
    pub run_id: &'a str,
    pub remote_path: &'a str,
    pub local_path: &'a Path,
}

/// Owns the job state machine for one run.
///
/// Per-iteration failures are recorded on the job and reported as `Ok(())`.
/// `Err` means the run itself must stop: cancellation or a broken state machine.
pub struct JobDriver {
    submitter: Arc<dyn SubmitPort>,
    remote: Arc<dyn RemotePort>,
    poll: PollSettings,
    retry: RetryPolicy,
    seen_ids: HashSet<String>,
}

/// Race `future` against cancellation
async fn guarded<F: Future>(cancel: &Cancellation, future: F) -> Option<F::Output> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        output = future => Some(output),
    }
}

fn cancelled(job: &mut Job, phase: FailurePhase) -> DomainError {
    warn!(iteration = job.index, state = %job.state, "Job cancelled during {}", phase);
    job.fail(phase, "cancelled");
    DomainError::Cancelled
}

impl JobDriver {
    pub fn new(
        submitter: Arc<dyn SubmitPort>,
        remote: Arc<dyn RemotePort>,
        poll: PollSettings,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            submitter,
            remote,
            poll,
            retry,
            seen_ids: HashSet::new(),
        }
    }

    /// Take `job` from `Pending` through to a fetched artifact or a terminal state
    pub async fn drive(
        &mut self,
        job: &mut Job,
        target: &JobTarget<'_>,
        cancel: &Cancellation,
    ) -> Result<(), DomainError> {
        let submission_id = match self.submit(job, target, cancel).await? {
            Some(id) => id,
            None => return Ok(()),
        };
        if !self.poll_until_done(job, &submission_id, target, cancel).await? {
            return Ok(());
        }
        self.fetch(job, target, cancel).await
    }

    async fn submit(
        &mut self,
        job: &mut Job,
        target: &JobTarget<'_>,
        cancel: &Cancellation,
    ) -> Result<Option<String>, DomainError> {
        let request = SubmissionRequest {
            run_id: target.run_id.to_string(),
            index: job.index,
            configuration: job.configuration.clone(),
        };

        let mut attempt = 0;
        let outcome = loop {
            let result = match guarded(cancel, self.submitter.submit(&request)).await {
                Some(result) => result,
                None => return Err(cancelled(job, FailurePhase::Submit)),
            };
            match result {
                Ok(id) => break Ok(id),
                Err(e) if attempt < self.retry.retries => {
                    attempt += 1;
                    let delay = self.retry.delay_for(attempt);
                    warn!(
                        iteration = job.index,
                        "{}; retry {}/{} in {:?}", e, attempt, self.retry.retries, delay
                    );
                    if guarded(cancel, tokio::time::sleep(delay)).await.is_none() {
                        return Err(cancelled(job, FailurePhase::Submit));
                    }
                }
                Err(e) => break Err(e),
            }
        };

        match outcome {
            Ok(id) if self.seen_ids.contains(&id) => {
                let error = DomainError::Submission(format!(
                    "Duplicate submission id '{}' in this run",
                    id
                ));
                job.fail(FailurePhase::Submit, error.to_string());
                Ok(None)
            }
            Ok(id) => {
                self.seen_ids.insert(id.clone());
                job.submission_id = Some(id.clone());
                job.submitted_at = Some(Utc::now());
                job.transition(JobState::Submitted)?;
                Ok(Some(id))
            }
            Err(e) => {
                job.fail(FailurePhase::Submit, e.to_string());
                Ok(None)
            }
        }
    }

    /// `Ok(true)` once the remote side reports the artifact ready
    async fn poll_until_done(
        &self,
        job: &mut Job,
        submission_id: &str,
        target: &JobTarget<'_>,
        cancel: &Cancellation,
    ) -> Result<bool, DomainError> {
        job.transition(JobState::Polling)?;
        let deadline = Instant::now() + self.poll.max_wait();
        let mut delay = self.poll.interval();
        let mut check_errors = 0;

        loop {
            if Instant::now() >= deadline {
                return self.timed_out(job);
            }

            let check = tokio::time::timeout_at(
                deadline,
                self.remote.check_status(submission_id, target.remote_path),
            );
            let status = match guarded(cancel, check).await {
                None => return Err(cancelled(job, FailurePhase::Poll)),
                Some(Err(_)) => return self.timed_out(job),
                Some(Ok(status)) => status,
            };

            match status {
                Ok(RemoteStatus::Ready) => {
                    job.transition(JobState::Completed)?;
                    info!(iteration = job.index, submission_id, "Remote artifact ready");
                    return Ok(true);
                }
                Ok(RemoteStatus::Failed(reason)) => {
                    job.fail(FailurePhase::Poll, format!("Remote job failed: {}", reason));
                    return Ok(false);
                }
                Ok(RemoteStatus::Pending) => {
                    check_errors = 0;
                    debug!(
                        iteration = job.index,
                        submission_id, "Not ready, next check in {:?}", delay
                    );
                }
                Err(e) => {
                    check_errors += 1;
                    if check_errors > self.poll.max_check_errors {
                        job.fail(FailurePhase::Poll, e.to_string());
                        return Ok(false);
                    }
                    warn!(
                        iteration = job.index,
                        "{} ({}/{} tolerated)", e, check_errors, self.poll.max_check_errors
                    );
                }
            }

            let now = Instant::now();
            if now >= deadline {
                return self.timed_out(job);
            }
            let pause = delay.min(deadline - now);
            if guarded(cancel, tokio::time::sleep(pause)).await.is_none() {
                return Err(cancelled(job, FailurePhase::Poll));
            }
            delay = self.poll.next_delay(delay);
        }
    }

    fn timed_out(&self, job: &mut Job) -> Result<bool, DomainError> {
        job.transition(JobState::TimedOut)?;
        warn!(
            iteration = job.index,
            "No artifact after {:.0}s, giving up", self.poll.max_wait_secs
        );
        Ok(false)
    }

    async fn fetch(
        &self,
        job: &mut Job,
        target: &JobTarget<'_>,
        cancel: &Cancellation,
    ) -> Result<(), DomainError> {
        match guarded(cancel, self.remote.fetch(target.remote_path, target.local_path)).await {
            None => Err(cancelled(job, FailurePhase::Fetch)),
            Some(Ok(path)) => {
                job.artifact = Some(path);
                Ok(())
            }
            Some(Err(e)) => {
                job.fail(FailurePhase::Fetch, e.to_string());
                Ok(())
            }
        }
    }
}
