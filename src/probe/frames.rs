//! Per-frame statistics: windowed bitrate, I-frame cadence and frame sizes

use std::collections::BTreeMap;

use crate::domain::model::{metric, Metrics};
use crate::probe::ffprobe::ProbeOutput;

/// Bitrate sampling window in seconds
pub const BITRATE_WINDOW_SECS: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PictType {
    I,
    P,
    B,
    Other,
}

impl PictType {
    pub fn parse(value: &str) -> Self {
        match value.trim() {
            "I" => PictType::I,
            "P" => PictType::P,
            "B" => PictType::B,
            _ => PictType::Other,
        }
    }
}

/// One decoded video frame as reported by ffprobe
#[derive(Debug, Clone, PartialEq)]
pub struct FrameSample {
    /// Zero-based position in decode order
    pub number: usize,
    pub pict_type: PictType,
    /// Packet size in bytes
    pub size: u64,
    /// Presentation time in seconds
    pub pts: Option<f64>,
}

/// Aggregated view over a frame list
#[derive(Debug, Clone)]
pub struct FrameStats {
    frames: Vec<FrameSample>,
}

impl FrameStats {
    pub fn new(frames: Vec<FrameSample>) -> Self {
        Self { frames }
    }

    pub fn frames(&self) -> &[FrameSample] {
        &self.frames
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    fn of_type(&self, pict_type: PictType) -> impl Iterator<Item = &FrameSample> {
        self.frames.iter().filter(move |f| f.pict_type == pict_type)
    }

    /// Non-zero packet sizes of one picture type
    pub fn sizes(&self, pict_type: PictType) -> Vec<f64> {
        self.of_type(pict_type)
            .filter(|f| f.size > 0)
            .map(|f| f.size as f64)
            .collect()
    }

    pub fn count(&self, pict_type: PictType) -> usize {
        self.of_type(pict_type).count()
    }

    /// Kilobits carried by each one-second window between the first and last timestamp.
    /// Windows without any bytes are left out, so the work is bounded by the frame count.
    pub fn window_bitrates(&self) -> Vec<f64> {
        let mut windows: BTreeMap<i64, u64> = BTreeMap::new();
        for frame in &self.frames {
            if let Some(pts) = frame.pts.filter(|pts| pts.is_finite()) {
                let window = (pts / BITRATE_WINDOW_SECS).floor() as i64;
                *windows.entry(window).or_default() += frame.size;
            }
        }
        windows
            .into_values()
            .filter(|bytes| *bytes > 0)
            .map(|bytes| bytes as f64 * 8.0 / BITRATE_WINDOW_SECS / 1000.0)
            .collect()
    }

    /// Seconds between consecutive I-frames
    pub fn iframe_intervals(&self) -> Vec<f64> {
        let times: Vec<f64> = self.of_type(PictType::I).filter_map(|f| f.pts).collect();
        times.windows(2).map(|w| w[1] - w[0]).collect()
    }

    /// Frames between consecutive I-frames
    pub fn gop_lengths(&self) -> Vec<f64> {
        let numbers: Vec<usize> = self.of_type(PictType::I).map(|f| f.number).collect();
        numbers.windows(2).map(|w| (w[1] - w[0]) as f64).collect()
    }

    /// Coefficient of variation of all non-zero frame sizes, in percent
    pub fn size_cv(&self) -> Option<f64> {
        let sizes: Vec<f64> = self
            .frames
            .iter()
            .filter(|f| f.size > 0)
            .map(|f| f.size as f64)
            .collect();
        let avg = mean(&sizes)?;
        if avg <= 0.0 {
            return None;
        }
        Some(std_dev(&sizes)? / avg * 100.0)
    }

    /// Metrics derived from the frame list alone
    pub fn metrics(&self) -> Metrics {
        let mut metrics = Metrics::new();
        metrics.insert(metric::FRAME_COUNT, self.len() as f64);
        metrics.insert(metric::IFRAME_COUNT, self.count(PictType::I) as f64);

        let windows = self.window_bitrates();
        if let Some(max) = max(&windows) {
            metrics.insert(metric::BITRATE_MAX, max);
        }
        if let Some(min) = min(&windows) {
            metrics.insert(metric::BITRATE_MIN, min);
        }

        let intervals = self.iframe_intervals();
        if let Some(avg) = mean(&intervals) {
            metrics.insert(metric::IFRAME_INTERVAL_AVG, avg);
        }
        if let Some(max) = max(&intervals) {
            metrics.insert(metric::IFRAME_INTERVAL_MAX, max);
        }

        let i_sizes = self.sizes(PictType::I);
        let p_sizes = self.sizes(PictType::P);
        if let Some(avg) = mean(&i_sizes) {
            metrics.insert(metric::IFRAME_AVG_SIZE, avg);
        }
        if let Some(max) = max(&i_sizes) {
            metrics.insert(metric::IFRAME_MAX_SIZE, max);
        }
        if let Some(avg) = mean(&p_sizes) {
            metrics.insert(metric::PFRAME_AVG_SIZE, avg);
        }
        if let Some(avg) = mean(&self.sizes(PictType::B)) {
            metrics.insert(metric::BFRAME_AVG_SIZE, avg);
        }
        if let (Some(i_avg), Some(p_avg)) = (mean(&i_sizes), mean(&p_sizes)) {
            if p_avg > 0.0 {
                metrics.insert(metric::IFRAME_PFRAME_RATIO, i_avg / p_avg);
            }
        }

        if let Some(cv) = self.size_cv() {
            metrics.insert(metric::FRAME_SIZE_CV, cv);
        }
        let gops = self.gop_lengths();
        if let Some(avg) = mean(&gops) {
            metrics.insert(metric::GOP_LENGTH_AVG, avg);
        }
        if let Some(std) = std_dev(&gops) {
            metrics.insert(metric::GOP_LENGTH_STD, std);
        }
        metrics
    }
}

/// Container-level metrics plus the frame list statistics
pub fn bitstream_metrics(
    probe: &ProbeOutput,
    stats: &FrameStats,
    file_size: Option<u64>,
) -> Metrics {
    let mut metrics = stats.metrics();
    let format = probe.format.as_ref();

    let duration = format.and_then(|f| f.duration());
    if let Some(duration) = duration {
        metrics.insert(metric::DURATION, duration);
    }
    let size = format.and_then(|f| f.size()).or(file_size.map(|s| s as f64));
    if let Some(size) = size {
        metrics.insert(metric::FILE_SIZE, size);
    }

    // container bit_rate first, then size over duration
    let bitrate = format
        .and_then(|f| f.bit_rate())
        .map(|bps| bps / 1000.0)
        .or_else(|| match (size, duration) {
            (Some(size), Some(duration)) if duration > 0.0 => Some(size * 8.0 / duration / 1000.0),
            _ => None,
        });
    if let Some(bitrate) = bitrate {
        metrics.insert(metric::BITRATE_AVG, bitrate);
    }

    if let Some(rate) = probe.video_stream().and_then(|s| s.frame_rate()) {
        metrics.insert(metric::FRAME_RATE, rate);
    }
    metrics
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Population standard deviation
pub fn std_dev(values: &[f64]) -> Option<f64> {
    let avg = mean(values)?;
    let variance = values.iter().map(|v| (v - avg).powi(2)).sum::<f64>() / values.len() as f64;
    Some(variance.sqrt())
}

pub fn max(values: &[f64]) -> Option<f64> {
    values.iter().copied().reduce(f64::max)
}

pub fn min(values: &[f64]) -> Option<f64> {
    values.iter().copied().reduce(f64::min)
}
