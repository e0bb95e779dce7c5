//! FFprobe adapter for media analysis
//!
//! Bitstream statistics come from ffprobe; PSNR and VMAF come from ffmpeg's
//! `psnr` and `libvmaf` filters run against a reference stream.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::domain::errors::*;
use crate::domain::model::*;
use crate::ports::*;
use crate::probe::breathing::BreathingReport;
use crate::probe::ffprobe::{FrameList, ProbeOutput};
use crate::probe::frames::{self, FrameStats};
use crate::probe::quality::{self, PsnrSummary};
use crate::utils::process::{self, ToolOutput};

/// Default upper bound for a single ffprobe/ffmpeg run
pub const DEFAULT_ANALYSIS_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Analyzer backed by the ffprobe and ffmpeg executables
pub struct FFprobeAdapter {
    ffprobe: PathBuf,
    ffmpeg: PathBuf,
    /// Upper bound for a single tool run
    timeout: Option<Duration>,
}

impl FFprobeAdapter {
    /// Create new FFprobe adapter using the tools on `PATH`
    pub fn new() -> Self {
        Self::with_tools("ffprobe", "ffmpeg")
    }

    pub fn with_tools(ffprobe: impl Into<PathBuf>, ffmpeg: impl Into<PathBuf>) -> Self {
        Self {
            ffprobe: ffprobe.into(),
            ffmpeg: ffmpeg.into(),
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    async fn run(&self, command: Command, tool: &str) -> Result<ToolOutput, DomainError> {
        let output = process::capture(command, self.timeout)
            .await
            .map_err(|e| DomainError::Analysis(format!("Unable to run {}: {}", tool, e)))?;
        if !output.success() {
            return Err(DomainError::Analysis(format!(
                "{} failed: {}",
                tool,
                output.diagnostic()
            )));
        }
        Ok(output)
    }

    async fn probe_container(&self, path: &Path) -> Result<ProbeOutput, DomainError> {
        let mut command = Command::new(&self.ffprobe);
        command
            .args(["-v", "error", "-print_format", "json", "-show_format", "-show_streams"])
            .arg(path);
        let output = self.run(command, "ffprobe").await?;
        ProbeOutput::parse(&output.stdout)
    }

    async fn probe_frames(&self, path: &Path) -> Result<FrameStats, DomainError> {
        let mut command = Command::new(&self.ffprobe);
        command
            .args([
                "-v",
                "error",
                "-select_streams",
                "v:0",
                "-show_entries",
                "frame=pict_type,pkt_size,pts_time,best_effort_timestamp_time",
                "-of",
                "json",
            ])
            .arg(path);
        let output = self.run(command, "ffprobe").await?;
        Ok(FrameStats::new(FrameList::parse(&output.stdout)?.into_samples()))
    }

    async fn measure_psnr(
        &self,
        path: &Path,
        reference: &Path,
        stats: &FrameStats,
        metrics: &mut Metrics,
    ) -> Result<(), DomainError> {
        let mut command = Command::new(&self.ffmpeg);
        command
            .args(["-hide_banner", "-nostats", "-i"])
            .arg(path)
            .arg("-i")
            .arg(reference)
            .args(["-lavfi", "[0:v][1:v]psnr=stats_file=-", "-f", "null", "-"]);
        let output = self.run(command, "ffmpeg psnr").await?;

        let per_frame = quality::parse_frame_psnr(&output.stdout);
        let summary = PsnrSummary::from_frames(&per_frame, stats.frames());
        let average = quality::parse_psnr_average(&output.stderr)
            .or(summary.as_ref().map(|s| s.mean));

        match average {
            Some(average) => metrics.insert(metric::PSNR, average),
            None => {
                return Err(DomainError::Analysis(
                    "ffmpeg psnr produced no parsable score".to_string(),
                ))
            }
        }
        if let Some(summary) = summary {
            summary.insert_into(metrics);
        }
        Ok(())
    }

    async fn measure_vmaf(&self, path: &Path, reference: &Path) -> Result<f64, DomainError> {
        let log = tempfile::Builder::new()
            .prefix("vmaf_")
            .suffix(".json")
            .tempfile()
            .map_err(|e| DomainError::Analysis(format!("Unable to create VMAF log: {}", e)))?;

        let filter = format!(
            "[0:v][1:v]libvmaf=log_fmt=json:log_path={}",
            escape_filter_path(log.path())
        );
        let mut command = Command::new(&self.ffmpeg);
        command
            .args(["-hide_banner", "-nostats", "-i"])
            .arg(path)
            .arg("-i")
            .arg(reference)
            .args(["-lavfi", filter.as_str(), "-f", "null", "-"]);
        self.run(command, "ffmpeg libvmaf").await?;

        let content = tokio::fs::read_to_string(log.path())
            .await
            .map_err(|e| DomainError::Analysis(format!("Unable to read VMAF log: {}", e)))?;
        quality::parse_vmaf_log(&content)
    }
}

impl Default for FFprobeAdapter {
    fn default() -> Self {
        Self::new()
    }
}

/// Escape a path for use inside an ffmpeg filter option
fn escape_filter_path(path: &Path) -> String {
    path.display()
        .to_string()
        .replace('\\', "\\\\")
        .replace(':', "\\:")
        .replace(' ', "\\ ")
        .replace('[', "\\[")
        .replace(']', "\\]")
        .replace('\'', "\\'")
}

#[async_trait]
impl AnalyzerPort for FFprobeAdapter {
    async fn analyze(
        &self,
        local_path: &Path,
        request: &AnalysisRequest,
    ) -> Result<Metrics, DomainError> {
        let file_size = tokio::fs::metadata(local_path)
            .await
            .map_err(|e| {
                DomainError::Analysis(format!("Cannot read {}: {}", local_path.display(), e))
            })?
            .len();

        let probe = self.probe_container(local_path).await?;
        if probe.video_stream().is_none() {
            return Err(DomainError::Analysis(format!(
                "No video stream found in {}",
                local_path.display()
            )));
        }
        let stats = self.probe_frames(local_path).await?;
        if stats.is_empty() {
            return Err(DomainError::Analysis(format!(
                "ffprobe reported no frames for {}",
                local_path.display()
            )));
        }
        let mut metrics = frames::bitstream_metrics(&probe, &stats, Some(file_size));
        debug!(
            "Bitstream metrics for {}: {} values",
            local_path.display(),
            metrics.len()
        );

        if !request.perceptual.is_empty() {
            match request.reference.as_deref() {
                Some(reference) => {
                    if !reference.exists() {
                        return Err(DomainError::Analysis(format!(
                            "Reference video not found: {}",
                            reference.display()
                        )));
                    }
                    for scorer in &request.perceptual {
                        match scorer {
                            PerceptualMetric::Psnr => {
                                self.measure_psnr(local_path, reference, &stats, &mut metrics)
                                    .await?
                            }
                            PerceptualMetric::Vmaf => {
                                let vmaf = self.measure_vmaf(local_path, reference).await?;
                                metrics.insert(metric::VMAF, vmaf);
                            }
                        }
                    }
                }
                None => warn!("Quality metrics requested without a reference video, skipping"),
            }
        }

        BreathingReport::assess(&metrics).insert_into(&mut metrics);
        info!(
            "Analyzed {}: bitrate_avg={:?} kbps, bitrate_max={:?} kbps",
            local_path.display(),
            metrics.get(metric::BITRATE_AVG),
            metrics.get(metric::BITRATE_MAX)
        );
        Ok(metrics)
    }
}
