//! ffprobe JSON output structures

use serde::Deserialize;

use crate::domain::errors::DomainError;
use crate::probe::frames::{FrameSample, PictType};

/// ffprobe prints most numbers as strings; accept either form
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Numeric {
    Number(f64),
    Text(String),
}

impl Numeric {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Numeric::Number(n) => Some(*n),
            Numeric::Text(s) => s.trim().parse::<f64>().ok(),
        }
        .filter(|v| v.is_finite())
    }
}

fn numeric(value: &Option<Numeric>) -> Option<f64> {
    value.as_ref().and_then(Numeric::as_f64)
}

/// `-show_format -show_streams` output
#[derive(Debug, Clone, Deserialize)]
pub struct ProbeOutput {
    #[serde(default)]
    pub format: Option<FormatInfo>,
    #[serde(default)]
    pub streams: Vec<StreamInfo>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FormatInfo {
    #[serde(default)]
    pub format_name: Option<String>,
    #[serde(default)]
    pub duration: Option<Numeric>,
    #[serde(default)]
    pub size: Option<Numeric>,
    #[serde(default)]
    pub bit_rate: Option<Numeric>,
}

impl FormatInfo {
    pub fn duration(&self) -> Option<f64> {
        numeric(&self.duration)
    }

    pub fn size(&self) -> Option<f64> {
        numeric(&self.size)
    }

    pub fn bit_rate(&self) -> Option<f64> {
        numeric(&self.bit_rate)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StreamInfo {
    #[serde(default)]
    pub codec_type: Option<String>,
    #[serde(default)]
    pub codec_name: Option<String>,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default)]
    pub avg_frame_rate: Option<String>,
    #[serde(default)]
    pub r_frame_rate: Option<String>,
}

impl StreamInfo {
    pub fn is_video(&self) -> bool {
        self.codec_type.as_deref() == Some("video")
    }

    /// Average frame rate, falling back to the container's nominal rate
    pub fn frame_rate(&self) -> Option<f64> {
        self.avg_frame_rate
            .as_deref()
            .and_then(parse_frame_rate)
            .or_else(|| self.r_frame_rate.as_deref().and_then(parse_frame_rate))
    }
}

impl ProbeOutput {
    pub fn parse(json: &str) -> Result<Self, DomainError> {
        serde_json::from_str(json)
            .map_err(|e| DomainError::Analysis(format!("Unparsable ffprobe output: {}", e)))
    }

    pub fn video_stream(&self) -> Option<&StreamInfo> {
        self.streams.iter().find(|s| s.is_video())
    }
}

/// Parse `30000/1001` or `25` into frames per second
pub fn parse_frame_rate(rate: &str) -> Option<f64> {
    let rate = rate.trim();
    let value = match rate.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().ok()?;
            let den: f64 = den.trim().parse().ok()?;
            if den == 0.0 {
                return None;
            }
            num / den
        }
        None => rate.parse().ok()?,
    };
    (value.is_finite() && value > 0.0).then_some(value)
}

/// `-show_entries frame=...` output
#[derive(Debug, Clone, Deserialize)]
pub struct FrameList {
    #[serde(default)]
    pub frames: Vec<RawFrame>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawFrame {
    #[serde(default)]
    pub pict_type: Option<String>,
    #[serde(default)]
    pub pkt_size: Option<Numeric>,
    #[serde(default)]
    pub pts_time: Option<Numeric>,
    #[serde(default)]
    pub pkt_pts_time: Option<Numeric>,
    #[serde(default)]
    pub best_effort_timestamp_time: Option<Numeric>,
}

impl FrameList {
    pub fn parse(json: &str) -> Result<Self, DomainError> {
        serde_json::from_str(json)
            .map_err(|e| DomainError::Analysis(format!("Unparsable ffprobe frame list: {}", e)))
    }

    /// Convert to samples in decode order; frame numbers are positions in the list
    pub fn into_samples(self) -> Vec<FrameSample> {
        self.frames
            .into_iter()
            .enumerate()
            .map(|(number, frame)| FrameSample {
                number,
                pict_type: PictType::parse(frame.pict_type.as_deref().unwrap_or("?")),
                size: numeric(&frame.pkt_size).map(|s| s.max(0.0) as u64).unwrap_or(0),
                pts: numeric(&frame.pts_time)
                    .or_else(|| numeric(&frame.pkt_pts_time))
                    .or_else(|| numeric(&frame.best_effort_timestamp_time)),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_probe_output_with_string_numbers() {
        let json = r#"{
            "format": {"format_name": "mov,mp4", "duration": "10.000000", "size": "3750000", "bit_rate": "3000000"},
            "streams": [
                {"codec_type": "audio", "codec_name": "aac"},
                {"codec_type": "video", "codec_name": "h264", "width": 1920, "height": 1080, "avg_frame_rate": "30000/1001"}
            ]
        }"#;
        let probe = ProbeOutput::parse(json).unwrap();
        let format = probe.format.as_ref().unwrap();
        assert_eq!(format.duration(), Some(10.0));
        assert_eq!(format.bit_rate(), Some(3_000_000.0));
        let video = probe.video_stream().unwrap();
        assert_eq!(video.codec_name.as_deref(), Some("h264"));
        assert!((video.frame_rate().unwrap() - 29.97).abs() < 0.01);
    }

    #[test]
    fn test_parse_frame_rate() {
        assert_eq!(parse_frame_rate("25/1"), Some(25.0));
        assert_eq!(parse_frame_rate("24"), Some(24.0));
        assert_eq!(parse_frame_rate("0/0"), None);
        assert_eq!(parse_frame_rate("garbage"), None);
    }

    #[test]
    fn test_frame_list_timestamp_fallback() {
        let json = r#"{"frames": [
            {"pict_type": "I", "pkt_size": "5000", "pts_time": "0.000000"},
            {"pict_type": "P", "pkt_size": "800", "best_effort_timestamp_time": "0.040000"},
            {"pict_type": "B", "pkt_size": 300}
        ]}"#;
        let samples = FrameList::parse(json).unwrap().into_samples();
        assert_eq!(samples.len(), 3);
        assert_eq!(samples[0].pict_type, PictType::I);
        assert_eq!(samples[1].pts, Some(0.04));
        assert_eq!(samples[2].size, 300);
        assert_eq!(samples[2].pts, None);
    }

    #[test]
    fn test_garbage_is_analysis_error() {
        assert!(matches!(
            ProbeOutput::parse("not json"),
            Err(DomainError::Analysis(_))
        ));
    }
}
