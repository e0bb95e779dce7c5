//! Logging configuration and progress reporting

use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

/// Log level configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Error messages only
    Error,
    /// Warnings and errors
    Warn,
    /// General information
    Info,
    /// Debug information
    Debug,
    /// Very verbose debug information
    Trace,
}

impl LogLevel {
    fn directive(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable multi-line format
    Pretty,
    /// Compact single-line format
    Compact,
    /// JSON format for structured logging
    Json,
}

/// Logging configuration options
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: LogLevel,
    pub format: LogFormat,
    /// Include target module information
    pub target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Compact,
            target: false,
        }
    }
}

impl LoggingConfig {
    /// `RUST_LOG` wins over the configured level
    pub fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(self.level.directive()))
    }

    /// Install the global subscriber; a second call is a no-op
    pub fn init(&self) {
        let builder = tracing_subscriber::fmt()
            .with_env_filter(self.filter())
            .with_target(self.target)
            .with_writer(std::io::stderr);

        let _ = match self.format {
            LogFormat::Pretty => builder.pretty().try_init(),
            LogFormat::Compact => builder.compact().try_init(),
            LogFormat::Json => builder.json().try_init(),
        };
    }
}

/// Reports progress over the iterations of a run
pub struct ProgressReporter {
    total: usize,
    current: Option<(usize, Instant)>,
    run_started: Instant,
}

impl ProgressReporter {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            current: None,
            run_started: Instant::now(),
        }
    }

    /// Start a new iteration
    pub fn start_iteration(&mut self, index: usize, description: &str) {
        self.current = Some((index, Instant::now()));
        tracing::info!(iteration = index, "[{}/{}] {}", index, self.total, description);
    }

    /// Complete the current iteration
    pub fn complete_iteration(&mut self, success: bool, summary: &str) {
        if let Some((index, started)) = self.current.take() {
            let status = if success { "completed" } else { "failed" };
            let elapsed = started.elapsed().as_secs_f64();
            if success {
                tracing::info!(
                    iteration = index,
                    "[{}/{}] {} in {:.1}s: {}",
                    index,
                    self.total,
                    status,
                    elapsed,
                    summary
                );
            } else {
                tracing::warn!(
                    iteration = index,
                    "[{}/{}] {} in {:.1}s: {}",
                    index,
                    self.total,
                    status,
                    elapsed,
                    summary
                );
            }

            if index > 0 && index < self.total {
                let per_iteration = self.run_started.elapsed().as_secs_f64() / index as f64;
                let eta = per_iteration * (self.total - index) as f64;
                tracing::debug!("Estimated time for remaining iterations: {:.0}s", eta);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LoggingConfig::default();
        assert_eq!(config.level, LogLevel::Info);
        assert_eq!(config.format, LogFormat::Compact);
    }

    #[test]
    fn test_progress_reporter_tracks_current_iteration() {
        let mut progress = ProgressReporter::new(3);
        progress.start_iteration(1, "encoder.bitrate=3000");
        assert!(progress.current.is_some());
        progress.complete_iteration(true, "achieved");
        assert!(progress.current.is_none());
    }
}
