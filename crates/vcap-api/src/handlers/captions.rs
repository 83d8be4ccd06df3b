//! Caption handlers.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::{Extension, Json};
use serde_json::Value;
use validator::Validate;

use vcap_models::{CaptionRequest, PipelineRequest};

use crate::error::{ApiError, ApiResult};
use crate::middleware::RequestId;
use crate::state::AppState;

/// Caption the referenced media.
///
/// Served on `GET /` (JSON body `{"url": ...}`) and `POST /api/captions`.
/// Responds with the caption document exactly as the captioning job wrote it.
/// A run still going after the request timeout fails in the stage it was in.
pub async fn create_caption(
    State(state): State<AppState>,
    request_id: Option<Extension<RequestId>>,
    body: Result<Json<CaptionRequest>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let Json(body) = body.map_err(|e| ApiError::validation(e.body_text()))?;
    body.validate()
        .map_err(|e| ApiError::validation(format!("url: {}", e)))?;

    let request = match request_id {
        Some(Extension(id)) => PipelineRequest::with_request_id(id.0, body.url),
        None => PipelineRequest::new(body.url),
    };

    let output = state
        .pipeline
        .run_with_timeout(&request, state.config.request_timeout)
        .await?;
    Ok(Json(output.caption.into_payload()))
}
