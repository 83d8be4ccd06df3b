//! Pipeline error types.

use thiserror::Error;

use vcap_media::MediaError;
use vcap_models::{ContentIdError, FailurePayload, Modality, PipelineStage};
use vcap_storage::StorageError;

pub type PipelineResult<T> = Result<T, PipelineError>;

/// A pipeline run that ended in `Failed(stage, reason)`.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Invalid reference: {0}")]
    InvalidReference(#[from] ContentIdError),

    #[error("Result cache error: {0}")]
    Cache(#[from] StorageError),

    #[error("{stage} failed: {source}")]
    Stage {
        stage: PipelineStage,
        #[source]
        source: MediaError,
    },
}

impl PipelineError {
    /// Attribute a media error to the stage that produced it.
    pub fn in_stage(stage: PipelineStage, source: MediaError) -> Self {
        Self::Stage { stage, source }
    }

    /// Stage the run failed in.
    pub fn failed_stage(&self) -> PipelineStage {
        match self {
            PipelineError::InvalidReference(_) => PipelineStage::IdentifierExtractor,
            PipelineError::Cache(_) => PipelineStage::ResultCache,
            PipelineError::Stage { stage, .. } => *stage,
        }
    }

    /// Taxonomy name of the failure.
    pub fn reason(&self) -> &'static str {
        match self {
            PipelineError::InvalidReference(_) => "InvalidReferenceError",
            PipelineError::Cache(e) => e.reason(),
            PipelineError::Stage { stage, source } => {
                source.reason().unwrap_or_else(|| stage_reason(*stage))
            }
        }
    }

    /// Failing modality, for feature extraction failures.
    pub fn modality(&self) -> Option<Modality> {
        match self {
            PipelineError::Stage { source, .. } => source.modality(),
            _ => None,
        }
    }

    /// Structured payload surfaced to callers.
    pub fn to_payload(&self) -> FailurePayload {
        let detail = match self {
            PipelineError::Stage { source, .. } => source.to_string(),
            other => other.to_string(),
        };
        FailurePayload::new(self.failed_stage(), self.reason(), detail).with_modality(self.modality())
    }
}

/// Reason reported for an error a stage did not classify itself.
fn stage_reason(stage: PipelineStage) -> &'static str {
    match stage {
        PipelineStage::IdentifierExtractor => "InvalidReferenceError",
        PipelineStage::ResultCache => "CacheIOError",
        PipelineStage::MediaAcquirer => "AcquisitionFailedError",
        PipelineStage::FeatureExtractor => "ExtractionFailedError",
        PipelineStage::DurationProbe => "ProbeFailedError",
        PipelineStage::CaptionPredictor => "PredictionFailedError",
    }
}
