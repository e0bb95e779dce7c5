//! Error handling module for transcode-tune

use thiserror::Error;

use crate::domain::errors::DomainError;

/// Main error type for loading experiments and running commands
#[derive(Error, Debug)]
pub enum TuneError {
    /// Domain rule violation or failed run
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// A configuration, template or targets file could not be read
    #[error("Cannot read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// YAML parse error
    #[error("Invalid YAML in {path}: {source}")]
    Yaml {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    /// TOML parse error
    #[error("Invalid TOML in {path}: {source}")]
    Toml {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    /// JSON parse error
    #[error("Invalid JSON in {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for transcode-tune operations
pub type TuneResult<T> = std::result::Result<T, TuneError>;
