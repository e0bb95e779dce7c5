// Domain errors - Error taxonomy for the tuning engine

use std::fmt;

/// Domain-specific error types
#[derive(Debug, Clone, PartialEq)]
pub enum DomainError {
    /// Invalid experiment configuration (candidate set, targets, paths)
    Configuration(String),
    /// A parameter path runs through a value that is not a mapping
    PathConflict { path: String, segment: String },
    /// The candidate set has no parameters
    EmptyCandidateSet,
    /// The transcoding service rejected or never received a submission
    Submission(String),
    /// The remote status channel could not be queried
    RemoteCheck(String),
    /// Artifact could not be copied back from the remote host
    Transfer(String),
    /// The inspection tool failed or produced unparsable output
    Analysis(String),
    /// Run directory or summary could not be written
    Archive(String),
    /// An illegal job state transition was requested
    InvalidTransition { from: String, to: String },
    /// The operation was interrupted
    Cancelled,
    /// Too many consecutive iteration failures
    RunAborted { consecutive_failures: usize },
}

impl DomainError {
    /// Whether the error ends the whole run rather than one iteration
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            DomainError::Configuration(_)
                | DomainError::PathConflict { .. }
                | DomainError::EmptyCandidateSet
                | DomainError::Archive(_)
                | DomainError::InvalidTransition { .. }
                | DomainError::RunAborted { .. }
        )
    }
}

impl fmt::Display for DomainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DomainError::Configuration(msg) => write!(f, "Configuration error: {}", msg),
            DomainError::PathConflict { path, segment } => write!(
                f,
                "Path conflict: '{}' crosses non-mapping value at '{}'",
                path, segment
            ),
            DomainError::EmptyCandidateSet => write!(f, "Candidate set is empty"),
            DomainError::Submission(msg) => write!(f, "Submission failed: {}", msg),
            DomainError::RemoteCheck(msg) => write!(f, "Remote status check failed: {}", msg),
            DomainError::Transfer(msg) => write!(f, "Transfer failed: {}", msg),
            DomainError::Analysis(msg) => write!(f, "Analysis failed: {}", msg),
            DomainError::Archive(msg) => write!(f, "Archive error: {}", msg),
            DomainError::InvalidTransition { from, to } => {
                write!(f, "Invalid job transition: {} -> {}", from, to)
            }
            DomainError::Cancelled => write!(f, "Operation cancelled"),
            DomainError::RunAborted {
                consecutive_failures,
            } => write!(
                f,
                "Run aborted after {} consecutive failed iterations",
                consecutive_failures
            ),
        }
    }
}

impl std::error::Error for DomainError {}
