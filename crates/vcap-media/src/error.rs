//! Error types for media stages.

use std::path::PathBuf;
use thiserror::Error;

use vcap_models::Modality;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors that can occur while running external media jobs.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("{tool} not found")]
    ToolNotFound { tool: String },

    #[error("{job} job failed ({}): {message}", exit_label(.exit_status))]
    JobFailed {
        job: String,
        exit_status: Option<i32>,
        message: String,
    },

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Acquisition failed after {attempts} attempt(s): {message}")]
    AcquisitionFailed { attempts: u32, message: String },

    #[error("{modality} feature extraction failed ({}): {message}", exit_label(.exit_status))]
    ExtractionFailed {
        modality: Modality,
        exit_status: Option<i32>,
        message: String,
    },

    #[error("Duration probe failed: {0}")]
    ProbeFailed(String),

    #[error("Caption prediction failed ({}): {message}", exit_label(.exit_status))]
    PredictionFailed {
        exit_status: Option<i32>,
        message: String,
    },

    #[error("Malformed caption output: {0}")]
    MalformedOutput(String),

    #[error("Timed out after {0} seconds")]
    Timeout(u64),

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),
}

/// Fetch-service messages that no retry can change.
const PERMANENT_JOB_MESSAGES: &[&str] = &[
    "video unavailable",
    "private video",
    "has been removed",
    "is not available in your country",
    "sign in to confirm your age",
    "unsupported url",
];

fn exit_label(exit_status: &Option<i32>) -> String {
    match exit_status {
        Some(code) => format!("exit status {}", code),
        None => "no exit status".to_string(),
    }
}

impl MediaError {
    /// Create a generic external job failure.
    pub fn job_failed(
        job: impl Into<String>,
        exit_status: Option<i32>,
        message: impl Into<String>,
    ) -> Self {
        Self::JobFailed {
            job: job.into(),
            exit_status,
            message: message.into(),
        }
    }

    /// Create an unsupported format error.
    pub fn unsupported_format(message: impl Into<String>) -> Self {
        Self::UnsupportedFormat(message.into())
    }

    /// Create an acquisition failure error.
    pub fn acquisition_failed(attempts: u32, message: impl Into<String>) -> Self {
        Self::AcquisitionFailed {
            attempts,
            message: message.into(),
        }
    }

    /// Create a feature extraction failure error.
    pub fn extraction_failed(
        modality: Modality,
        exit_status: Option<i32>,
        message: impl Into<String>,
    ) -> Self {
        Self::ExtractionFailed {
            modality,
            exit_status,
            message: message.into(),
        }
    }

    /// Create a duration probe failure error.
    pub fn probe_failed(message: impl Into<String>) -> Self {
        Self::ProbeFailed(message.into())
    }

    /// Create a caption prediction failure error.
    pub fn prediction_failed(exit_status: Option<i32>, message: impl Into<String>) -> Self {
        Self::PredictionFailed {
            exit_status,
            message: message.into(),
        }
    }

    /// Create a malformed output error.
    pub fn malformed_output(message: impl Into<String>) -> Self {
        Self::MalformedOutput(message.into())
    }

    /// Taxonomy name surfaced to callers, for stage-level errors.
    ///
    /// Runner-level errors (`JobFailed`, `Io`, ...) return `None`; stages
    /// always wrap those before they leave the component.
    pub fn reason(&self) -> Option<&'static str> {
        match self {
            MediaError::UnsupportedFormat(_) => Some("UnsupportedFormatError"),
            MediaError::AcquisitionFailed { .. } => Some("AcquisitionFailedError"),
            MediaError::ExtractionFailed { .. } => Some("ExtractionFailedError"),
            MediaError::ProbeFailed(_) => Some("ProbeFailedError"),
            MediaError::PredictionFailed { .. } => Some("PredictionFailedError"),
            MediaError::MalformedOutput(_) => Some("MalformedOutputError"),
            _ => None,
        }
    }

    /// Modality of a feature extraction failure.
    pub fn modality(&self) -> Option<Modality> {
        match self {
            MediaError::ExtractionFailed { modality, .. } => Some(*modality),
            _ => None,
        }
    }

    /// Whether another attempt could succeed.
    ///
    /// Missing tools, unsupported formats and jobs that report a permanent
    /// condition (removed or private media, bad URL) are not retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            MediaError::ToolNotFound { .. }
            | MediaError::UnsupportedFormat(_)
            | MediaError::FileNotFound(_) => false,
            MediaError::JobFailed { message, .. } => {
                let message = message.to_lowercase();
                !PERMANENT_JOB_MESSAGES.iter().any(|m| message.contains(m))
            }
            _ => true,
        }
    }

    /// Exit status reported by the external process, when there was one.
    pub fn exit_status(&self) -> Option<i32> {
        match self {
            MediaError::JobFailed { exit_status, .. }
            | MediaError::ExtractionFailed { exit_status, .. }
            | MediaError::PredictionFailed { exit_status, .. } => *exit_status,
            _ => None,
        }
    }
}
