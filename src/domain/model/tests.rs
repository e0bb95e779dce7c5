// Unit tests for domain models

use super::*;
use serde_json::json;

fn candidates(pairs: &[(&str, Vec<Value>)]) -> Result<CandidateSet, DomainError> {
    let entries = pairs
        .iter()
        .map(|(path, values)| (ParamPath::parse(path).unwrap(), values.clone()))
        .collect();
    CandidateSet::new(entries)
}

#[test]
fn test_param_path_parse() {
    let path = ParamPath::parse("encoder.x264.bitrate").unwrap();
    assert_eq!(path.segments().collect::<Vec<_>>(), vec!["encoder", "x264", "bitrate"]);

    assert!(ParamPath::parse("").is_err());
    assert!(ParamPath::parse("encoder..bitrate").is_err());
    assert!(ParamPath::parse(".bitrate").is_err());
}

#[test]
fn test_param_path_prefix_is_segment_wise() {
    let encoder = ParamPath::parse("encoder").unwrap();
    assert!(encoder.is_prefix_of(&ParamPath::parse("encoder.bitrate").unwrap()));
    assert!(!encoder.is_prefix_of(&ParamPath::parse("encoder_preset").unwrap()));
    assert!(!encoder.is_prefix_of(&encoder));
}

#[test]
fn test_candidate_set_rejects_overlapping_paths() {
    let result = candidates(&[
        ("encoder", vec![json!(1)]),
        ("encoder-x", vec![json!(1)]),
        ("encoder.bitrate", vec![json!(3000)]),
    ]);
    assert!(matches!(result, Err(DomainError::Configuration(_))));
}

#[test]
fn test_candidate_set_rejects_empty_input() {
    assert_eq!(candidates(&[]), Err(DomainError::EmptyCandidateSet));
    assert!(candidates(&[("encoder.bitrate", vec![])]).is_err());
    assert!(candidates(&[("encoder.bitrate", vec![json!([1, 2])])]).is_err());
}

#[test]
fn test_combination_count_and_order() {
    let set = candidates(&[
        ("b.preset", vec![json!("fast"), json!("slow")]),
        ("a.bitrate", vec![json!(1000), json!(2000), json!(3000)]),
    ])
    .unwrap();
    assert_eq!(set.combination_count().unwrap(), 6);

    // a.bitrate sorts first and varies slowest
    let first = set.combination_at(0);
    assert_eq!(first.get("a.bitrate"), Some(&json!(1000)));
    assert_eq!(first.get("b.preset"), Some(&json!("fast")));

    let second = set.combination_at(1);
    assert_eq!(second.get("a.bitrate"), Some(&json!(1000)));
    assert_eq!(second.get("b.preset"), Some(&json!("slow")));

    let last = set.combination_at(5);
    assert_eq!(last.get("a.bitrate"), Some(&json!(3000)));
    assert_eq!(last.get("b.preset"), Some(&json!("slow")));
}

#[test]
fn test_job_state_transitions() {
    assert!(JobState::Pending.can_transition_to(JobState::Submitted));
    assert!(JobState::Submitted.can_transition_to(JobState::Polling));
    assert!(JobState::Polling.can_transition_to(JobState::TimedOut));
    assert!(JobState::Completed.can_transition_to(JobState::Failed));

    assert!(!JobState::Pending.can_transition_to(JobState::Polling));
    assert!(!JobState::TimedOut.can_transition_to(JobState::Polling));
    assert!(!JobState::Failed.can_transition_to(JobState::Completed));
}

#[test]
fn test_job_rejects_illegal_transition() {
    let mut job = Job::new(1, Combination::new(BTreeMap::new()), json!({}));
    let err = job.transition(JobState::Completed).unwrap_err();
    assert!(matches!(err, DomainError::InvalidTransition { .. }));
    assert_eq!(job.state, JobState::Pending);
}

#[test]
fn test_job_fail_keeps_timed_out_state() {
    let mut job = Job::new(1, Combination::new(BTreeMap::new()), json!({}));
    job.transition(JobState::Submitted).unwrap();
    job.transition(JobState::Polling).unwrap();
    job.transition(JobState::TimedOut).unwrap();
    job.fail(FailurePhase::Poll, "no artifact after 60s");
    assert_eq!(job.state, JobState::TimedOut);
    assert_eq!(job.failure.as_ref().unwrap().phase, FailurePhase::Poll);
}

#[test]
fn test_comparison_mode_parse() {
    assert_eq!(ComparisonMode::parse("at_most").unwrap(), ComparisonMode::AtMost);
    assert_eq!(ComparisonMode::parse("AT_LEAST").unwrap(), ComparisonMode::AtLeast);
    assert_eq!(ComparisonMode::parse("approx").unwrap(), ComparisonMode::Approximately);
    assert!(ComparisonMode::parse("roughly").is_err());
}

#[test]
fn test_target_set_requires_explicit_tolerance() {
    let targets = TargetSet::new().with_target("bitrate_avg", Target::approximately(3500.0, None));
    assert!(targets.validate().is_err());

    let targets = targets.with_default_tolerance(0.05);
    assert!(targets.validate().is_ok());
    assert_eq!(targets.tolerance_for("bitrate_avg"), Some(0.05));
}

#[test]
fn test_target_set_rejects_unknown_metric() {
    let targets = TargetSet::new().with_target("bitrate_average", Target::at_most(3500.0));
    assert!(targets.validate().is_err());
}

#[test]
fn test_target_set_merge_overrides() {
    let mut base = TargetSet::new()
        .with_target("bitrate_avg", Target::at_most(3000.0))
        .with_target("bitrate_max", Target::at_most(5000.0));
    base.merge(TargetSet::new().with_target("bitrate_avg", Target::at_most(3500.0)));
    assert_eq!(base.targets["bitrate_avg"].threshold, 3500.0);
    assert_eq!(base.targets["bitrate_max"].threshold, 5000.0);
}

#[test]
fn test_combination_serializes_as_flat_map() {
    let set = candidates(&[("encoder.x264.bitrate", vec![json!(3000)])]).unwrap();
    let value = serde_json::to_value(set.combination_at(0)).unwrap();
    assert_eq!(value, json!({ "encoder.x264.bitrate": 3000 }));
}

#[test]
fn test_metrics_skip_non_finite_values() {
    let mut metrics = Metrics::new();
    metrics.insert("bitrate_avg", f64::NAN);
    metrics.insert("bitrate_max", 5200.0);
    assert!(!metrics.contains("bitrate_avg"));
    assert_eq!(metrics.get("bitrate_max"), Some(5200.0));
}
