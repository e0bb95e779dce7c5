// Domain rules - Injection, target evaluation and ranking policies

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::domain::errors::*;
use crate::domain::model::*;

/// Renders parameter values into a configuration template
pub struct PathInjector;

impl PathInjector {
    /// Deep-copy `template` with the leaf at `path` set to `value`
    pub fn inject(template: &Value, path: &ParamPath, value: Value) -> Result<Value, DomainError> {
        let mut rendered = template.clone();
        Self::set_in_place(&mut rendered, path, value)?;
        Ok(rendered)
    }

    /// Deep-copy `template` with every assignment of `combination` applied
    pub fn inject_all(template: &Value, combination: &Combination) -> Result<Value, DomainError> {
        let mut rendered = template.clone();
        for (path, value) in combination.iter() {
            Self::set_in_place(&mut rendered, path, value.clone())?;
        }
        Ok(rendered)
    }

    fn set_in_place(root: &mut Value, path: &ParamPath, value: Value) -> Result<(), DomainError> {
        let segments: Vec<&str> = path.segments().collect();
        let (leaf, parents) = match segments.split_last() {
            Some(split) => split,
            None => {
                return Err(DomainError::Configuration(
                    "Parameter path cannot be empty".to_string(),
                ))
            }
        };

        let mut current = root;
        let mut walked = String::new();
        for segment in parents {
            let map = Self::as_mapping(current, path, &walked)?;
            if !walked.is_empty() {
                walked.push('.');
            }
            walked.push_str(segment);
            current = map
                .entry(segment.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
        }

        let map = Self::as_mapping(current, path, &walked)?;
        map.insert(leaf.to_string(), value);
        Ok(())
    }

    fn as_mapping<'a>(
        value: &'a mut Value,
        path: &ParamPath,
        walked: &str,
    ) -> Result<&'a mut Map<String, Value>, DomainError> {
        match value {
            Value::Object(map) => Ok(map),
            _ => Err(DomainError::PathConflict {
                path: path.to_string(),
                segment: if walked.is_empty() {
                    "<root>".to_string()
                } else {
                    walked.to_string()
                },
            }),
        }
    }
}

/// Decides whether a job's metrics meet the target set
pub trait AchievementPolicy: Send + Sync {
    fn name(&self) -> &str;

    fn evaluate(&self, metrics: &Metrics, targets: &TargetSet) -> Verdict;
}

/// Every evaluated target must hold; metrics that were not measured are skipped
pub struct ThresholdPolicy;

impl ThresholdPolicy {
    /// Compare one metric value against its target
    pub fn compare(value: f64, target: &Target, tolerance: Option<f64>) -> MetricOutcome {
        let threshold = target.threshold;
        let deviation = value - threshold;
        let scale = if threshold.abs() > f64::EPSILON {
            threshold.abs()
        } else {
            1.0
        };

        let (achieved, violation) = match target.mode {
            ComparisonMode::AtMost => (value <= threshold, deviation.max(0.0)),
            ComparisonMode::AtLeast => (value >= threshold, (-deviation).max(0.0)),
            ComparisonMode::Approximately => {
                // validated configs always carry a tolerance here
                let allowed = tolerance.unwrap_or(0.0) * scale;
                let excess = deviation.abs() - allowed;
                (excess <= 1e-9 * scale, excess.max(0.0))
            }
        };

        MetricOutcome {
            value,
            threshold,
            mode: target.mode,
            deviation,
            shortfall: if achieved { 0.0 } else { violation / scale },
            achieved,
        }
    }
}

impl AchievementPolicy for ThresholdPolicy {
    fn name(&self) -> &str {
        "threshold"
    }

    fn evaluate(&self, metrics: &Metrics, targets: &TargetSet) -> Verdict {
        let mut outcomes = BTreeMap::new();
        let mut skipped = Vec::new();

        for (name, target) in &targets.targets {
            match metrics.get(name) {
                Some(value) => {
                    let outcome = Self::compare(value, target, targets.tolerance_for(name));
                    outcomes.insert(name.clone(), outcome);
                }
                None => skipped.push(name.clone()),
            }
        }

        Verdict {
            all_achieved: outcomes.values().all(|o| o.achieved),
            outcomes,
            skipped,
        }
    }
}

/// Picks the best job of a run
pub struct BestJobSelector;

impl BestJobSelector {
    /// Among achieving jobs the smallest bitrate (or artifact size) wins; otherwise the
    /// smallest aggregate deviation. Ties go to the lowest iteration index.
    pub fn select(jobs: &[Job]) -> Option<BestResult> {
        let achieved = jobs
            .iter()
            .filter(|j| j.achieved())
            .filter_map(|j| Self::size_key(j).map(|score| (j.index, score)));
        if let Some((iteration, score)) = Self::minimum(achieved) {
            return Some(BestResult {
                iteration,
                all_achieved: true,
                score,
            });
        }

        let near_misses = jobs.iter().filter_map(|j| {
            j.verdict
                .as_ref()
                .map(|v| (j.index, v.aggregate_deviation()))
        });
        Self::minimum(near_misses).map(|(iteration, score)| BestResult {
            iteration,
            all_achieved: false,
            score,
        })
    }

    fn size_key(job: &Job) -> Option<f64> {
        let metrics = job.metrics.as_ref()?;
        metrics
            .get(metric::BITRATE_AVG)
            .or_else(|| metrics.get(metric::FILE_SIZE))
            .or(Some(f64::MAX))
    }

    fn minimum(candidates: impl Iterator<Item = (usize, f64)>) -> Option<(usize, f64)> {
        candidates.min_by(|a, b| {
            a.1.partial_cmp(&b.1)
                .unwrap_or(Ordering::Equal)
                .then(a.0.cmp(&b.0))
        })
    }
}

#[cfg(test)]
mod tests;
