// Filesystem archive adapter - Persists one run under a timestamped directory

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Local};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::domain::errors::*;
use crate::domain::model::*;
use crate::ports::*;

pub const SUMMARY_FILE: &str = "results.json";

pub fn configuration_file(index: usize) -> String {
    format!("config_{:03}.json", index)
}

pub fn metrics_file(index: usize) -> String {
    format!("metrics_{:03}.json", index)
}

/// Run ids are local timestamps, e.g. `20240611_142233`
pub fn run_id_for(time: DateTime<Local>) -> String {
    time.format("%Y%m%d_%H%M%S").to_string()
}

/// Pretty JSON written to a sibling temp file, then renamed over `path`
pub fn atomic_write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), DomainError> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let bytes = serde_json::to_vec_pretty(value)
        .map_err(|e| DomainError::Archive(format!("Cannot serialize {}: {}", path.display(), e)))?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)
        .map_err(|e| DomainError::Archive(format!("Cannot write in {}: {}", dir.display(), e)))?;
    let fill = |tmp: &mut tempfile::NamedTempFile| -> std::io::Result<()> {
        tmp.write_all(&bytes)?;
        tmp.write_all(b"\n")?;
        tmp.as_file().sync_all()
    };
    fill(&mut tmp)
        .map_err(|e| DomainError::Archive(format!("Cannot write {}: {}", path.display(), e)))?;
    tmp.persist(path)
        .map_err(|e| DomainError::Archive(format!("Cannot replace {}: {}", path.display(), e)))?;
    Ok(())
}

/// Filesystem archive adapter
pub struct FsArchiveAdapter {
    run_dir: PathBuf,
}

impl FsArchiveAdapter {
    /// Create `<results_dir>/<run_id>`, adding a numeric suffix if that run already exists
    pub fn create(results_dir: &Path, run_id: &str) -> Result<Self, DomainError> {
        fs::create_dir_all(results_dir).map_err(|e| {
            DomainError::Archive(format!("Cannot create {}: {}", results_dir.display(), e))
        })?;

        let mut candidate = results_dir.join(run_id);
        let mut suffix = 1;
        loop {
            match fs::create_dir(&candidate) {
                Ok(()) => break,
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    suffix += 1;
                    candidate = results_dir.join(format!("{}_{}", run_id, suffix));
                }
                Err(e) => {
                    return Err(DomainError::Archive(format!(
                        "Cannot create {}: {}",
                        candidate.display(),
                        e
                    )))
                }
            }
        }
        debug!("Run directory: {}", candidate.display());
        Ok(Self { run_dir: candidate })
    }

    /// Name of the run directory, used as the run id
    pub fn run_id(&self) -> String {
        self.run_dir
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default()
    }

    fn relative(&self, path: &Path) -> String {
        path.strip_prefix(&self.run_dir)
            .unwrap_or(path)
            .display()
            .to_string()
    }
}

#[async_trait]
impl ArchivePort for FsArchiveAdapter {
    fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    async fn write_configuration(
        &self,
        index: usize,
        configuration: &Value,
    ) -> Result<PathBuf, DomainError> {
        let path = self.path_for(&configuration_file(index));
        atomic_write_json(&path, configuration)?;
        Ok(path)
    }

    async fn write_metrics(
        &self,
        index: usize,
        metrics: &Metrics,
        verdict: Option<&Verdict>,
    ) -> Result<PathBuf, DomainError> {
        let path = self.path_for(&metrics_file(index));
        let document = json!({
            "iteration": index,
            "metrics": metrics,
            "verdict": verdict,
        });
        atomic_write_json(&path, &document)?;
        Ok(path)
    }

    async fn write_summary(
        &self,
        record: &RunRecord,
        experiment: &Value,
    ) -> Result<PathBuf, DomainError> {
        let best = record.best_job().map(|job| {
            json!({
                "iteration": job.index,
                "all_achieved": job.achieved(),
                "combination": job.combination,
                "configuration_file": configuration_file(job.index),
                "artifact": job.artifact.as_deref().map(|p| self.relative(p)),
                "metrics": job.metrics,
                "quality": record.best_quality,
            })
        });
        let document = json!({
            "experiment": experiment,
            "run": record,
            "best": best,
        });
        let path = self.path_for(SUMMARY_FILE);
        atomic_write_json(&path, &document)?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_file_names_are_zero_padded() {
        assert_eq!(configuration_file(7), "config_007.json");
        assert_eq!(metrics_file(112), "metrics_112.json");
    }

    #[test]
    fn test_run_id_format() {
        let time = Local.with_ymd_and_hms(2024, 6, 11, 14, 22, 33).unwrap();
        assert_eq!(run_id_for(time), "20240611_142233");
    }

    #[test]
    fn test_create_avoids_existing_run_directory() {
        let root = tempfile::tempdir().unwrap();
        let first = FsArchiveAdapter::create(root.path(), "20240611_142233").unwrap();
        let second = FsArchiveAdapter::create(root.path(), "20240611_142233").unwrap();
        assert_eq!(first.run_id(), "20240611_142233");
        assert_eq!(second.run_id(), "20240611_142233_2");
    }

    #[test]
    fn test_atomic_write_replaces_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.json");
        atomic_write_json(&path, &json!({"v": 1})).unwrap();
        atomic_write_json(&path, &json!({"v": 2})).unwrap();
        let content: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(content, json!({"v": 2}));
        let leftovers = fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(leftovers, 1);
    }
}
