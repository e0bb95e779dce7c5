//! Parsing of ffmpeg psnr and libvmaf output

use serde::Deserialize;

use crate::domain::errors::DomainError;
use crate::domain::model::{metric, Metrics};
use crate::probe::frames::{self, FrameSample, PictType};

/// PSNR of one frame from the psnr filter's stats file
#[derive(Debug, Clone, PartialEq)]
pub struct FramePsnr {
    /// One-based frame number as printed by the filter
    pub n: usize,
    pub psnr: f64,
}

/// Pull the `average:` value from the psnr filter summary on stderr
pub fn parse_psnr_average(stderr: &str) -> Option<f64> {
    stderr
        .lines()
        .filter(|line| line.contains("PSNR"))
        .flat_map(|line| line.split_whitespace())
        .filter_map(|token| token.strip_prefix("average:"))
        .filter_map(|value| value.parse::<f64>().ok())
        .filter(|value| value.is_finite())
        .last()
}

/// Parse `n:1 mse_avg:... psnr_avg:42.1 ...` lines; frames with infinite PSNR are dropped
pub fn parse_frame_psnr(stats: &str) -> Vec<FramePsnr> {
    stats
        .lines()
        .filter_map(|line| {
            let mut n = None;
            let mut psnr = None;
            for item in line.split_whitespace() {
                match item.split_once(':') {
                    Some(("n", value)) => n = value.parse::<usize>().ok(),
                    Some(("psnr_avg", value)) => psnr = value.parse::<f64>().ok(),
                    _ => {}
                }
            }
            match (n, psnr) {
                (Some(n), Some(psnr)) if psnr.is_finite() => Some(FramePsnr { n, psnr }),
                _ => None,
            }
        })
        .collect()
}

#[derive(Debug, Deserialize)]
struct VmafLog {
    pooled_metrics: PooledMetrics,
}

#[derive(Debug, Deserialize)]
struct PooledMetrics {
    vmaf: PooledValue,
}

#[derive(Debug, Deserialize)]
struct PooledValue {
    mean: f64,
}

/// Pooled mean VMAF from a libvmaf JSON log
pub fn parse_vmaf_log(json: &str) -> Result<f64, DomainError> {
    let log: VmafLog = serde_json::from_str(json)
        .map_err(|e| DomainError::Analysis(format!("Unparsable VMAF log: {}", e)))?;
    Ok(log.pooled_metrics.vmaf.mean)
}

/// Per-frame PSNR statistics split by picture type
#[derive(Debug, Clone, PartialEq)]
pub struct PsnrSummary {
    pub mean: f64,
    pub std: f64,
    pub range: f64,
    pub i_mean: Option<f64>,
    pub p_mean: Option<f64>,
    pub b_mean: Option<f64>,
}

impl PsnrSummary {
    /// Align PSNR samples with the frame list by position
    pub fn from_frames(samples: &[FramePsnr], frames: &[FrameSample]) -> Option<Self> {
        let values: Vec<f64> = samples.iter().map(|s| s.psnr).collect();
        let mean = frames::mean(&values)?;
        let std = frames::std_dev(&values)?;
        let range = frames::max(&values)? - frames::min(&values)?;

        let by_type = |pict_type: PictType| -> Option<f64> {
            let values: Vec<f64> = samples
                .iter()
                .filter(|s| {
                    s.n >= 1
                        && frames
                            .get(s.n - 1)
                            .map(|f| f.pict_type == pict_type)
                            .unwrap_or(false)
                })
                .map(|s| s.psnr)
                .collect();
            frames::mean(&values)
        };

        Some(Self {
            mean,
            std,
            range,
            i_mean: by_type(PictType::I),
            p_mean: by_type(PictType::P),
            b_mean: by_type(PictType::B),
        })
    }

    /// I-frame PSNR advantage over P-frames
    pub fn ip_delta(&self) -> Option<f64> {
        match (self.i_mean, self.p_mean) {
            (Some(i), Some(p)) if i > 0.0 && p > 0.0 => Some(i - p),
            _ => None,
        }
    }

    pub fn insert_into(&self, metrics: &mut Metrics) {
        metrics.insert(metric::PSNR_RANGE, self.range);
        if let Some(delta) = self.ip_delta() {
            metrics.insert(metric::PSNR_IP_DELTA, delta);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SUMMARY: &str = "frame=  250 fps=0.0 q=-0.0 Lsize=N/A time=00:00:10.00 bitrate=N/A speed= 123x\n\
        [Parsed_psnr_0 @ 0x55d0c1a0] PSNR y:41.93 u:46.21 v:46.54 average:43.02 min:38.11 max:49.87\n";

    #[test]
    fn test_parse_psnr_average() {
        assert_eq!(parse_psnr_average(SUMMARY), Some(43.02));
        assert_eq!(parse_psnr_average("no summary here"), None);
    }

    #[test]
    fn test_parse_psnr_average_rejects_inf() {
        let identical = "[Parsed_psnr_0 @ 0x1] PSNR y:inf u:inf v:inf average:inf min:inf max:inf";
        assert_eq!(parse_psnr_average(identical), None);
    }

    #[test]
    fn test_parse_frame_psnr() {
        let stats = "n:1 mse_avg:2.10 mse_y:2.60 mse_u:1.10 mse_v:1.20 psnr_avg:44.91 psnr_y:43.98 psnr_u:47.72 psnr_v:47.34\n\
                     n:2 mse_avg:0.00 mse_y:0.00 mse_u:0.00 mse_v:0.00 psnr_avg:inf psnr_y:inf psnr_u:inf psnr_v:inf\n\
                     n:3 mse_avg:3.50 mse_y:4.10 mse_u:1.90 mse_v:2.00 psnr_avg:42.69 psnr_y:41.99 psnr_u:45.34 psnr_v:45.12\n";
        let frames = parse_frame_psnr(stats);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0], FramePsnr { n: 1, psnr: 44.91 });
        assert_eq!(frames[1].n, 3);
    }

    #[test]
    fn test_parse_vmaf_log() {
        let log = r#"{"version": "2.3.1", "frames": [], "pooled_metrics": {"vmaf": {"min": 80.1, "max": 99.0, "mean": 93.47, "harmonic_mean": 93.2}}}"#;
        assert_eq!(parse_vmaf_log(log).unwrap(), 93.47);
        assert!(parse_vmaf_log("{}").is_err());
    }

    #[test]
    fn test_psnr_summary_by_picture_type() {
        let frames: Vec<FrameSample> = ["I", "P", "P", "I"]
            .iter()
            .enumerate()
            .map(|(number, t)| FrameSample {
                number,
                pict_type: PictType::parse(t),
                size: 100,
                pts: Some(number as f64),
            })
            .collect();
        let samples = vec![
            FramePsnr { n: 1, psnr: 46.0 },
            FramePsnr { n: 2, psnr: 41.0 },
            FramePsnr { n: 3, psnr: 43.0 },
            FramePsnr { n: 4, psnr: 44.0 },
        ];
        let summary = PsnrSummary::from_frames(&samples, &frames).unwrap();
        assert_eq!(summary.range, 5.0);
        assert_eq!(summary.i_mean, Some(45.0));
        assert_eq!(summary.p_mean, Some(42.0));
        assert_eq!(summary.b_mean, None);
        assert_eq!(summary.ip_delta(), Some(3.0));
    }
}
