//! Command implementations

use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Local;
use serde_json::json;
use tracing::{info, warn};

use crate::adapters::fs_archive::{atomic_write_json, run_id_for, SUMMARY_FILE};
use crate::adapters::FsArchiveAdapter;
use crate::app::container::AppContainer;
use crate::app::reference_interactor::describe_source;
use crate::app::{Aggregate, ReferenceRequest, RunSettings};
use crate::cli::args::{BreathingArgs, PlanArgs, RefsArgs, RunArgs};
use crate::config::{ExperimentConfig, TargetsDocument};
use crate::domain::model::{metric, RunRecord};
use crate::ports::ArchivePort;
use crate::utils::shutdown::{install_ctrl_c, Cancellation};
use crate::utils::Utils;

/// File, then environment, then command-line overrides
fn load_experiment(path: &Path, args: Option<&RunArgs>) -> Result<ExperimentConfig> {
    let mut config = ExperimentConfig::load(path)
        .with_context(|| format!("Failed to load experiment {}", path.display()))?;
    config.apply_env();

    if let Some(args) = args {
        if let Some(results_dir) = &args.results_dir {
            config.results_dir = results_dir.clone();
        }
        if let Some(early_stop) = args.early_stop() {
            config.early_stop = early_stop;
        }
    }
    Ok(config)
}

/// Execute the run command
pub async fn run(args: RunArgs, container: &dyn AppContainer) -> Result<()> {
    let config = load_experiment(&args.config, Some(&args))?;
    if args.dry_run {
        return print_plan(&config, false);
    }

    let experiment = config.prepare().context("Invalid experiment")?;
    let interactor = container.experiment_interactor(&config)?;

    let archive = FsArchiveAdapter::create(&config.results_dir, &run_id_for(Local::now()))?;
    let run_id = archive.run_id();
    let run_dir = archive.run_dir().to_path_buf();

    let (handle, cancel) = Cancellation::new();
    install_ctrl_c(handle);

    let settings = RunSettings::from_config(&config);
    let record = interactor
        .run(
            &experiment,
            &settings,
            Arc::new(archive),
            &run_id,
            config.snapshot(),
            &cancel,
        )
        .await
        .with_context(|| {
            format!(
                "Run {} did not complete; partial results in {}",
                run_id,
                run_dir.join(SUMMARY_FILE).display()
            )
        })?;

    print_outcome(&record, &run_dir);
    Ok(())
}

fn print_outcome(record: &RunRecord, run_dir: &Path) {
    println!("Run {} finished: {:?}", record.run_id, record.status);
    println!("Iterations: {}/{}", record.jobs.len(), record.total_combinations);
    if let Some(elapsed) = record
        .finished_at
        .and_then(|end| (end - record.started_at).to_std().ok())
    {
        println!("Duration: {}", Utils::format_duration(elapsed));
    }
    match record.best_job() {
        Some(best) => {
            let label = if best.achieved() {
                "all targets met"
            } else {
                "nearest miss"
            };
            println!("Best: iteration #{} ({})", best.index, label);
            println!("  {}", best.combination);
            if let Some(size) = best
                .artifact
                .as_ref()
                .and_then(|path| fs::metadata(path).ok())
                .map(|meta| meta.len())
            {
                println!("  artifact: {}", Utils::format_file_size(size));
            }
            if let Some(bitrate) = best.metrics.as_ref().and_then(|m| m.get(metric::BITRATE_AVG)) {
                println!("  bitrate_avg: {:.0} kbps", bitrate);
            }
            if let Some(quality) = &record.best_quality {
                for (name, value) in quality.iter() {
                    println!("  {}: {:.2}", name, value);
                }
            }
        }
        None => println!("Best: none"),
    }
    println!("Results: {}", run_dir.join(SUMMARY_FILE).display());
}

/// Execute the plan command
pub async fn plan(args: PlanArgs) -> Result<()> {
    let config = load_experiment(&args.config, None)?;
    print_plan(&config, args.json)
}

fn print_plan(config: &ExperimentConfig, as_json: bool) -> Result<()> {
    let experiment = config.prepare().context("Invalid experiment")?;
    let strategy = experiment.strategy.as_ref();
    let total = strategy.planned_count(&experiment.candidates)?;
    let combinations = strategy.combinations(&experiment.candidates)?;

    if as_json {
        let entries: Vec<_> = combinations
            .enumerate()
            .map(|(i, combination)| json!({ "iteration": i + 1, "combination": combination }))
            .collect();
        let document = json!({
            "strategy": strategy.name(),
            "total": total,
            "combinations": entries,
        });
        println!("{}", serde_json::to_string_pretty(&document)?);
        return Ok(());
    }

    println!("{} combinations ({})", total, strategy.name());
    for (i, combination) in combinations.enumerate() {
        println!("  [{}] {}", i + 1, combination);
    }
    Ok(())
}

/// Execute the refs command
pub async fn refs(args: RefsArgs, container: &dyn AppContainer) -> Result<()> {
    let mut request = ReferenceRequest::new(&args.source);
    if !args.metrics.is_empty() {
        request.metrics = args.metrics.iter().map(|m| m.trim().to_string()).collect();
    }
    request.aggregate = Aggregate::parse(&args.aggregate)?;
    request.tolerance = args.tolerance;

    info!("Deriving targets from {}", describe_source(&args.source));
    let report = container.reference_interactor().derive(&request).await?;
    if !report.skipped.is_empty() {
        warn!("{} reference files were skipped", report.skipped.len());
    }

    let yaml = serde_yaml::to_string(&TargetsDocument::from(&report.targets))
        .context("Failed to encode targets")?;
    match &args.output {
        Some(path) => {
            fs::write(path, &yaml)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            info!("Targets written to {}", path.display());
        }
        None => print!("{}", yaml),
    }

    if let Some(path) = &args.report {
        atomic_write_json(path, &report)?;
        info!("Report written to {}", path.display());
    }
    Ok(())
}

/// Execute the breathing command
pub async fn breathing(args: BreathingArgs, container: &dyn AppContainer) -> Result<()> {
    let assessment = container
        .breathing_interactor()
        .assess(&args.input, args.reference.as_deref())
        .await
        .with_context(|| format!("Failed to analyze {}", args.input.display()))?;

    let report = &assessment.report;
    println!("File: {}", assessment.file.display());
    println!("Breathing score: {}/100 ({})", report.score, report.rating);
    for name in [
        metric::FRAME_SIZE_CV,
        metric::IFRAME_PFRAME_RATIO,
        metric::GOP_LENGTH_AVG,
        metric::GOP_LENGTH_STD,
        metric::PSNR_RANGE,
        metric::PSNR_IP_DELTA,
    ] {
        if let Some(value) = assessment.metrics.get(name) {
            println!("  {}: {:.2}", name, value);
        }
    }
    for issue in &report.issues {
        println!("  - {}", issue);
    }

    if let Some(path) = &args.output {
        atomic_write_json(path, &assessment)?;
        info!("Report written to {}", path.display());
    }
    Ok(())
}
