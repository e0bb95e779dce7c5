//! Search strategy implementations

use rand::rngs::StdRng;
use rand::seq::index;
use rand::SeedableRng;
use tracing::{debug, warn};

use crate::domain::errors::DomainError;
use crate::domain::model::{CandidateSet, Combination};
use crate::planner::{CombinationIter, SearchStrategy};

/// Every combination exactly once; paths in lexicographic order, last path varies fastest
#[derive(Debug, Clone, Copy, Default)]
pub struct GridSearch;

impl SearchStrategy for GridSearch {
    fn name(&self) -> &str {
        "grid"
    }

    fn planned_count(&self, candidates: &CandidateSet) -> Result<usize, DomainError> {
        candidates.combination_count()
    }

    fn combinations<'a>(
        &self,
        candidates: &'a CandidateSet,
    ) -> Result<CombinationIter<'a>, DomainError> {
        if candidates.is_empty() {
            return Err(DomainError::EmptyCandidateSet);
        }
        let total = candidates.combination_count()?;
        debug!("Grid search over {} combinations", total);
        Ok(Box::new(GridIter {
            candidates,
            position: 0,
            total,
        }))
    }
}

struct GridIter<'a> {
    candidates: &'a CandidateSet,
    position: usize,
    total: usize,
}

impl Iterator for GridIter<'_> {
    type Item = Combination;

    fn next(&mut self) -> Option<Self::Item> {
        if self.position >= self.total {
            return None;
        }
        let combination = self.candidates.combination_at(self.position);
        self.position += 1;
        Some(combination)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.total - self.position;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for GridIter<'_> {}

/// Distinct combinations sampled without replacement from a seeded generator
#[derive(Debug, Clone, Copy)]
pub struct RandomSearch {
    samples: usize,
    seed: u64,
}

impl RandomSearch {
    pub fn new(samples: usize, seed: u64) -> Result<Self, DomainError> {
        if samples == 0 {
            return Err(DomainError::Configuration(
                "Random search needs at least one sample".to_string(),
            ));
        }
        Ok(Self { samples, seed })
    }
}

impl SearchStrategy for RandomSearch {
    fn name(&self) -> &str {
        "random"
    }

    fn planned_count(&self, candidates: &CandidateSet) -> Result<usize, DomainError> {
        Ok(self.samples.min(candidates.combination_count()?))
    }

    fn combinations<'a>(
        &self,
        candidates: &'a CandidateSet,
    ) -> Result<CombinationIter<'a>, DomainError> {
        if candidates.is_empty() {
            return Err(DomainError::EmptyCandidateSet);
        }
        let total = candidates.combination_count()?;
        if self.samples > total {
            warn!(
                "Requested {} samples but only {} combinations exist",
                self.samples, total
            );
        }
        let amount = self.samples.min(total);

        let mut rng = StdRng::seed_from_u64(self.seed);
        let positions = index::sample(&mut rng, total, amount).into_vec();
        debug!("Random search picked {} of {} combinations", amount, total);

        Ok(Box::new(
            positions
                .into_iter()
                .map(move |position| candidates.combination_at(position)),
        ))
    }
}
