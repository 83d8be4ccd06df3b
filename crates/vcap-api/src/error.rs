//! API error types.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;
use tracing::warn;

use vcap_media::MediaError;
use vcap_models::{FailurePayload, PipelineStage};
use vcap_worker::PipelineError;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    /// Request body missing, malformed or out of bounds.
    #[error("Invalid request: {0}")]
    Validation(String),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

impl ApiError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Pipeline(err) => match err {
                PipelineError::InvalidReference(_) => StatusCode::BAD_REQUEST,
                PipelineError::Cache(_) => StatusCode::INTERNAL_SERVER_ERROR,
                PipelineError::Stage {
                    source: MediaError::UnsupportedFormat(_),
                    ..
                } => StatusCode::UNPROCESSABLE_ENTITY,
                PipelineError::Stage {
                    source: MediaError::Timeout(_),
                    ..
                } => StatusCode::GATEWAY_TIMEOUT,
                PipelineError::Stage { .. } => StatusCode::BAD_GATEWAY,
            },
        }
    }

    /// Failure body; request validation is reported as an identifier failure.
    pub fn payload(&self) -> FailurePayload {
        match self {
            ApiError::Validation(msg) => FailurePayload::new(
                PipelineStage::IdentifierExtractor,
                "InvalidReferenceError",
                msg.clone(),
            ),
            ApiError::Pipeline(err) => err.to_payload(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            warn!(status = %status, error = %self, "Caption request failed");
        }

        (status, Json(self.payload())).into_response()
    }
}
