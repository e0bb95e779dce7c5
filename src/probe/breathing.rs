//! Breathing (periodic quality pulsing) assessment

use std::fmt;

use serde::Serialize;

use crate::domain::model::{metric, Metrics};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BreathingRating {
    Normal,
    Mild,
    Moderate,
    Severe,
}

impl BreathingRating {
    pub fn from_score(score: u32) -> Self {
        match score {
            s if s >= 70 => BreathingRating::Severe,
            s if s >= 40 => BreathingRating::Moderate,
            s if s >= 20 => BreathingRating::Mild,
            _ => BreathingRating::Normal,
        }
    }
}

impl fmt::Display for BreathingRating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BreathingRating::Normal => "normal",
            BreathingRating::Mild => "mild",
            BreathingRating::Moderate => "moderate",
            BreathingRating::Severe => "severe",
        };
        write!(f, "{}", name)
    }
}

/// Score with the findings that contributed to it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BreathingReport {
    pub score: u32,
    pub rating: BreathingRating,
    pub issues: Vec<String>,
}

impl BreathingReport {
    /// Score the frame-size and PSNR metrics that are present
    pub fn assess(metrics: &Metrics) -> Self {
        let mut score = 0;
        let mut issues = Vec::new();

        if let Some(cv) = metrics.get(metric::FRAME_SIZE_CV) {
            if cv > 50.0 {
                score += 30;
                issues.push(format!("Frame size fluctuates heavily (CV={:.1}%)", cv));
            } else if cv > 30.0 {
                score += 15;
                issues.push(format!("Frame size fluctuates (CV={:.1}%)", cv));
            }
        }

        if let Some(ratio) = metrics.get(metric::IFRAME_PFRAME_RATIO) {
            if ratio > 5.0 {
                score += 30;
                issues.push(format!("I/P frame size gap is excessive (ratio={:.1})", ratio));
            } else if ratio > 3.0 {
                score += 15;
                issues.push(format!("I/P frame size gap is large (ratio={:.1})", ratio));
            }
        }

        if let Some(range) = metrics.get(metric::PSNR_RANGE) {
            if range > 5.0 {
                score += 40;
                issues.push(format!("PSNR swings heavily (range={:.1}dB)", range));
            } else if range > 3.0 {
                score += 20;
                issues.push(format!("PSNR swings (range={:.1}dB)", range));
            }
        }

        if let Some(delta) = metrics.get(metric::PSNR_IP_DELTA) {
            if delta > 2.0 {
                score += 20;
                issues.push(format!("I/P frame PSNR gap is large (delta={:.1}dB)", delta));
            }
        }

        Self {
            score,
            rating: BreathingRating::from_score(score),
            issues,
        }
    }

    /// Only meaningful once frame sizes were measured
    pub fn insert_into(&self, metrics: &mut Metrics) {
        if metrics.contains(metric::FRAME_SIZE_CV) || metrics.contains(metric::PSNR_RANGE) {
            metrics.insert(metric::BREATHING_SCORE, self.score as f64);
        }
    }
}
