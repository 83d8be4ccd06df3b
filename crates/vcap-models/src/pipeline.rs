//! Pipeline request and response models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;
use validator::Validate;

use crate::artifact::Modality;

/// Stage of the caption pipeline that produced an outcome.
///
/// Serialized with the component names surfaced to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PipelineStage {
    IdentifierExtractor,
    ResultCache,
    MediaAcquirer,
    FeatureExtractor,
    DurationProbe,
    CaptionPredictor,
}

impl PipelineStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStage::IdentifierExtractor => "IdentifierExtractor",
            PipelineStage::ResultCache => "ResultCache",
            PipelineStage::MediaAcquirer => "MediaAcquirer",
            PipelineStage::FeatureExtractor => "FeatureExtractor",
            PipelineStage::DurationProbe => "DurationProbe",
            PipelineStage::CaptionPredictor => "CaptionPredictor",
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request body accepted by the transport.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CaptionRequest {
    /// Media reference (URL or bare identifier)
    #[validate(length(min = 1, max = 2048))]
    pub url: String,
}

/// One pipeline execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRequest {
    /// Correlation ID for logs
    pub request_id: String,
    /// Raw media reference (untrusted)
    pub reference: String,
    pub received_at: DateTime<Utc>,
}

impl PipelineRequest {
    pub fn new(reference: impl Into<String>) -> Self {
        Self::with_request_id(Uuid::new_v4().to_string(), reference)
    }

    pub fn with_request_id(request_id: impl Into<String>, reference: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            reference: reference.into(),
            received_at: Utc::now(),
        }
    }
}

/// Structured failure returned to callers.
///
/// `{ "success": false, "stage": "...", "reason": "...", "detail": "..." }`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailurePayload {
    pub success: bool,
    pub stage: PipelineStage,
    /// Error taxonomy name (e.g. `AcquisitionFailedError`)
    pub reason: String,
    /// Human-readable description
    pub detail: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modality: Option<Modality>,
}

impl FailurePayload {
    pub fn new(stage: PipelineStage, reason: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            success: false,
            stage,
            reason: reason.into(),
            detail: detail.into(),
            modality: None,
        }
    }

    pub fn with_modality(mut self, modality: Option<Modality>) -> Self {
        self.modality = modality;
        self
    }
}
