//! Parameter-space search planning

pub mod strategy;

pub use strategy::{GridSearch, RandomSearch};

use crate::domain::errors::DomainError;
use crate::domain::model::{CandidateSet, Combination};

/// Lazy, finite sequence of combinations borrowed from a candidate set
pub type CombinationIter<'a> = Box<dyn Iterator<Item = Combination> + Send + 'a>;

/// Search strategy over a candidate set
///
/// Each call to [`SearchStrategy::combinations`] starts a fresh sequence, so a plan can be
/// listed (dry run) and then executed with identical order.
pub trait SearchStrategy: Send + Sync {
    /// Short identifier recorded in the run summary
    fn name(&self) -> &str;

    /// Number of combinations the sequence will yield
    fn planned_count(&self, candidates: &CandidateSet) -> Result<usize, DomainError>;

    /// Start the combination sequence
    fn combinations<'a>(
        &self,
        candidates: &'a CandidateSet,
    ) -> Result<CombinationIter<'a>, DomainError>;
}

/// Exhaustive cartesian product in deterministic order
pub fn generate(candidates: &CandidateSet) -> Result<CombinationIter<'_>, DomainError> {
    GridSearch.combinations(candidates)
}
