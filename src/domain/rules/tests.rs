// Unit tests for business rules

use super::*;
use serde_json::json;

fn path(p: &str) -> ParamPath {
    ParamPath::parse(p).unwrap()
}

fn evaluated_job(index: usize, metrics: Metrics, targets: &TargetSet) -> Job {
    let mut job = Job::new(index, Combination::new(BTreeMap::new()), json!({}));
    job.verdict = Some(ThresholdPolicy.evaluate(&metrics, targets));
    job.metrics = Some(metrics);
    job
}

#[test]
fn test_inject_creates_intermediate_mappings() {
    let rendered =
        PathInjector::inject(&json!({}), &path("encoder.x264.bitrate"), json!(3000)).unwrap();
    assert_eq!(rendered, json!({"encoder": {"x264": {"bitrate": 3000}}}));
}

#[test]
fn test_inject_leaves_template_untouched() {
    let template = json!({"encoder": {"preset": "fast"}});
    let rendered = PathInjector::inject(&template, &path("encoder.bitrate"), json!(2500)).unwrap();
    assert_eq!(template, json!({"encoder": {"preset": "fast"}}));
    assert_eq!(rendered, json!({"encoder": {"preset": "fast", "bitrate": 2500}}));
}

#[test]
fn test_inject_is_idempotent() {
    let template = json!({"encoder": {"preset": "fast"}});
    let once = PathInjector::inject(&template, &path("encoder.bitrate"), json!(2500)).unwrap();
    let twice = PathInjector::inject(&once, &path("encoder.bitrate"), json!(2500)).unwrap();
    assert_eq!(once, twice);
}

#[test]
fn test_inject_conflict_on_scalar_prefix() {
    let err = PathInjector::inject(&json!({"encoder": 5}), &path("encoder.bitrate"), json!(1))
        .unwrap_err();
    assert_eq!(
        err,
        DomainError::PathConflict {
            path: "encoder.bitrate".to_string(),
            segment: "encoder".to_string(),
        }
    );
}

#[test]
fn test_inject_conflict_on_non_object_root() {
    let err = PathInjector::inject(&json!([1, 2]), &path("bitrate"), json!(1)).unwrap_err();
    assert!(matches!(err, DomainError::PathConflict { .. }));
}

#[test]
fn test_inject_all_applies_every_assignment() {
    let mut assignments = BTreeMap::new();
    assignments.insert(path("encoder.bitrate"), json!(3000));
    assignments.insert(path("encoder.gop"), json!(50));
    let rendered =
        PathInjector::inject_all(&json!({"name": "job"}), &Combination::new(assignments)).unwrap();
    assert_eq!(rendered, json!({"name": "job", "encoder": {"bitrate": 3000, "gop": 50}}));
}

#[test]
fn test_evaluate_reports_signed_deviation() {
    let metrics = Metrics::from([("bitrate_avg", 3400.0), ("bitrate_max", 5200.0)]);
    let targets = TargetSet::new()
        .with_target("bitrate_avg", Target::at_most(3500.0))
        .with_target("bitrate_max", Target::at_most(5000.0));

    let verdict = ThresholdPolicy.evaluate(&metrics, &targets);
    assert!(!verdict.all_achieved);
    assert_eq!(verdict.deviation("bitrate_max"), Some(200.0));
    assert_eq!(verdict.deviation("bitrate_avg"), Some(-100.0));
    assert!(verdict.outcomes["bitrate_avg"].achieved);
    assert_eq!(verdict.missed(), vec!["bitrate_max"]);
}

#[test]
fn test_evaluate_at_least() {
    let metrics = Metrics::from([("vmaf", 92.0)]);
    let targets = TargetSet::new().with_target("vmaf", Target::at_least(93.0));
    let verdict = ThresholdPolicy.evaluate(&metrics, &targets);
    assert!(!verdict.all_achieved);
    assert_eq!(verdict.deviation("vmaf"), Some(-1.0));
}

#[test]
fn test_evaluate_approximately_uses_relative_tolerance() {
    let targets = TargetSet::new()
        .with_target("bitrate_avg", Target::approximately(3000.0, None))
        .with_default_tolerance(0.05);

    let within = ThresholdPolicy.evaluate(&Metrics::from([("bitrate_avg", 3140.0)]), &targets);
    assert!(within.all_achieved);

    let outside = ThresholdPolicy.evaluate(&Metrics::from([("bitrate_avg", 2800.0)]), &targets);
    assert!(!outside.all_achieved);
    assert_eq!(outside.deviation("bitrate_avg"), Some(-200.0));
}

#[test]
fn test_evaluate_target_tolerance_overrides_default() {
    let targets = TargetSet::new()
        .with_target("bitrate_avg", Target::approximately(3000.0, Some(0.10)))
        .with_default_tolerance(0.01);
    let verdict = ThresholdPolicy.evaluate(&Metrics::from([("bitrate_avg", 3250.0)]), &targets);
    assert!(verdict.all_achieved);
}

#[test]
fn test_evaluate_skips_missing_metrics() {
    let metrics = Metrics::from([("bitrate_avg", 3000.0)]);
    let targets = TargetSet::new()
        .with_target("bitrate_avg", Target::at_most(3500.0))
        .with_target("vmaf", Target::at_least(95.0));
    let verdict = ThresholdPolicy.evaluate(&metrics, &targets);
    assert!(verdict.all_achieved);
    assert_eq!(verdict.skipped, vec!["vmaf".to_string()]);
    assert!(!verdict.outcomes.contains_key("vmaf"));
}

fn bitrates(avg: f64, max: f64) -> Metrics {
    Metrics::from([("bitrate_avg", avg), ("bitrate_max", max)])
}

#[test]
fn test_best_prefers_smallest_bitrate_among_achievers() {
    let targets = TargetSet::new().with_target("bitrate_max", Target::at_most(5000.0));
    let jobs = vec![
        evaluated_job(1, bitrates(3200.0, 4800.0), &targets),
        evaluated_job(2, bitrates(2900.0, 4900.0), &targets),
        evaluated_job(3, bitrates(2500.0, 5600.0), &targets),
    ];
    let best = BestJobSelector::select(&jobs).unwrap();
    assert_eq!(best.iteration, 2);
    assert!(best.all_achieved);
}

#[test]
fn test_best_ties_break_on_lowest_index() {
    let targets = TargetSet::new().with_target("bitrate_max", Target::at_most(5000.0));
    let jobs = vec![
        evaluated_job(4, bitrates(3000.0, 4000.0), &targets),
        evaluated_job(2, bitrates(3000.0, 4500.0), &targets),
    ];
    assert_eq!(BestJobSelector::select(&jobs).unwrap().iteration, 2);
}

#[test]
fn test_best_falls_back_to_nearest_miss() {
    let targets = TargetSet::new().with_target("bitrate_max", Target::at_most(5000.0));
    let mut failed = Job::new(1, Combination::new(BTreeMap::new()), json!({}));
    failed.fail(FailurePhase::Submit, "HTTP 500");
    let jobs = vec![
        failed,
        evaluated_job(2, Metrics::from([("bitrate_max", 6000.0)]), &targets),
        evaluated_job(3, Metrics::from([("bitrate_max", 5250.0)]), &targets),
    ];
    let best = BestJobSelector::select(&jobs).unwrap();
    assert_eq!(best.iteration, 3);
    assert!(!best.all_achieved);
    assert!((best.score - 0.05).abs() < 1e-9);
}

#[test]
fn test_best_is_none_without_evaluated_jobs() {
    let mut failed = Job::new(1, Combination::new(BTreeMap::new()), json!({}));
    failed.fail(FailurePhase::Fetch, "connection reset");
    assert!(BestJobSelector::select(&[failed]).is_none());
}
