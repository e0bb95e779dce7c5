//! Remote job engine: submission retries, polling cadence and the job driver

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::errors::DomainError;

pub mod driver;

pub use driver::{JobDriver, JobTarget};

/// Polling cadence and deadline for one job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollSettings {
    /// Delay between the first status checks, in seconds
    pub interval_secs: f64,
    /// Multiplier applied to the delay after each pending check; 1.0 keeps it fixed
    pub backoff_factor: f64,
    /// Ceiling for the delay, in seconds
    pub max_interval_secs: f64,
    /// Wall-clock budget since submission, in seconds
    pub max_wait_secs: f64,
    /// Consecutive failed status checks tolerated before the job fails
    pub max_check_errors: u32,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval_secs: 10.0,
            backoff_factor: 1.0,
            max_interval_secs: 60.0,
            max_wait_secs: 3600.0,
            max_check_errors: 3,
        }
    }
}

impl PollSettings {
    pub fn validate(&self) -> Result<(), DomainError> {
        let positive = |name: &str, value: f64| {
            if value.is_finite() && value > 0.0 {
                Ok(())
            } else {
                Err(DomainError::Configuration(format!(
                    "polling.{} must be a positive number, got {}",
                    name, value
                )))
            }
        };
        positive("interval_secs", self.interval_secs)?;
        positive("max_interval_secs", self.max_interval_secs)?;
        positive("max_wait_secs", self.max_wait_secs)?;
        if !self.backoff_factor.is_finite() || self.backoff_factor < 1.0 {
            return Err(DomainError::Configuration(format!(
                "polling.backoff_factor must be at least 1.0, got {}",
                self.backoff_factor
            )));
        }
        if self.max_interval_secs < self.interval_secs {
            return Err(DomainError::Configuration(
                "polling.max_interval_secs must not be below interval_secs".to_string(),
            ));
        }
        Ok(())
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs_f64(self.interval_secs)
    }

    pub fn max_wait(&self) -> Duration {
        Duration::from_secs_f64(self.max_wait_secs)
    }

    /// Delay after `current`, grown by the backoff factor and capped
    pub fn next_delay(&self, current: Duration) -> Duration {
        let grown = current.as_secs_f64() * self.backoff_factor;
        Duration::from_secs_f64(grown.min(self.max_interval_secs))
    }
}

/// Retries for the submission call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Extra attempts after the first failure
    pub retries: u32,
    /// Delay before the first retry, in seconds
    pub initial_backoff_secs: f64,
    pub backoff_factor: f64,
    /// HTTP request timeout, in seconds
    pub timeout_secs: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 0,
            initial_backoff_secs: 2.0,
            backoff_factor: 2.0,
            timeout_secs: 30.0,
        }
    }
}

impl RetryPolicy {
    pub fn validate(&self) -> Result<(), DomainError> {
        if !self.initial_backoff_secs.is_finite() || self.initial_backoff_secs < 0.0 {
            return Err(DomainError::Configuration(
                "submission.initial_backoff_secs must be non-negative".to_string(),
            ));
        }
        if !self.backoff_factor.is_finite() || self.backoff_factor < 1.0 {
            return Err(DomainError::Configuration(
                "submission.backoff_factor must be at least 1.0".to_string(),
            ));
        }
        if !self.timeout_secs.is_finite() || self.timeout_secs <= 0.0 {
            return Err(DomainError::Configuration(
                "submission.timeout_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Delay before retry number `attempt` (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        Duration::from_secs_f64(self.initial_backoff_secs * self.backoff_factor.powi(exponent))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs_f64(self.timeout_secs)
    }
}
