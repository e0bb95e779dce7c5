// Breathing interactor - Quality pulsing assessment for a single file

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use crate::domain::errors::*;
use crate::domain::model::*;
use crate::ports::*;
use crate::probe::BreathingReport;

/// Metrics plus the scored findings
#[derive(Debug, Clone, Serialize)]
pub struct BreathingAssessment {
    pub file: PathBuf,
    pub reference: Option<PathBuf>,
    pub metrics: Metrics,
    pub report: BreathingReport,
}

/// Interactor for the breathing check
pub struct BreathingInteractor {
    analyzer_port: Arc<dyn AnalyzerPort>,
}

impl BreathingInteractor {
    pub fn new(analyzer_port: Arc<dyn AnalyzerPort>) -> Self {
        Self { analyzer_port }
    }

    /// Frame-size statistics always; per-frame PSNR when a reference is given
    pub async fn assess(
        &self,
        file: &Path,
        reference: Option<&Path>,
    ) -> Result<BreathingAssessment, DomainError> {
        let request = match reference {
            Some(reference) => AnalysisRequest::with_quality(
                vec![PerceptualMetric::Psnr],
                Some(reference.to_path_buf()),
            ),
            None => AnalysisRequest::bitstream_only(),
        };
        let metrics = self.analyzer_port.analyze(file, &request).await?;
        let report = BreathingReport::assess(&metrics);
        info!(
            score = report.score,
            "Breathing check for {}: {}",
            file.display(),
            report.rating
        );
        Ok(BreathingAssessment {
            file: file.to_path_buf(),
            reference: reference.map(Path::to_path_buf),
            metrics,
            report,
        })
    }
}
