//! Structured pipeline logging.
//!
//! Provides consistent lifecycle logging for pipeline runs and the
//! tracing-subscriber setup shared by the binaries.

use std::time::Duration;
use tracing::{error, info, Span};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use vcap_models::{ContentId, PipelineStage};

use crate::error::PipelineError;
use crate::state::PipelineState;

/// Pipeline logger carrying request and content id context.
#[derive(Debug, Clone)]
pub struct PipelineLogger {
    request_id: String,
    content_id: Option<String>,
}

impl PipelineLogger {
    pub fn new(request_id: &str) -> Self {
        Self {
            request_id: request_id.to_string(),
            content_id: None,
        }
    }

    /// Attach the resolved content id to subsequent events.
    pub fn set_content_id(&mut self, id: &ContentId) {
        self.content_id = Some(id.to_string());
    }

    fn content_id_field(&self) -> &str {
        self.content_id.as_deref().unwrap_or("-")
    }

    pub fn log_start(&self, reference: &str) {
        info!(
            request_id = %self.request_id,
            reference,
            "Pipeline started"
        );
    }

    /// Log a state machine transition.
    pub fn log_transition(&self, state: PipelineState) {
        info!(
            request_id = %self.request_id,
            content_id = %self.content_id_field(),
            state = state.as_str(),
            "Pipeline state"
        );
    }

    pub fn log_stage_complete(&self, stage: PipelineStage, elapsed: Duration) {
        info!(
            request_id = %self.request_id,
            content_id = %self.content_id_field(),
            stage = stage.as_str(),
            elapsed_ms = elapsed.as_millis() as u64,
            "Stage complete"
        );
    }

    pub fn log_failure(&self, err: &PipelineError) {
        error!(
            request_id = %self.request_id,
            content_id = %self.content_id_field(),
            stage = err.failed_stage().as_str(),
            reason = err.reason(),
            modality = ?err.modality(),
            error = %err,
            "Pipeline failed"
        );
    }

    pub fn log_completion(&self, cache_hit: bool, elapsed: Duration) {
        info!(
            request_id = %self.request_id,
            content_id = %self.content_id_field(),
            cache_hit,
            elapsed_ms = elapsed.as_millis() as u64,
            "Pipeline completed"
        );
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn content_id(&self) -> Option<&str> {
        self.content_id.as_deref()
    }

    /// Span wrapping one pipeline run.
    pub fn create_span(&self) -> Span {
        tracing::info_span!("pipeline", request_id = %self.request_id)
    }
}

/// Initialize tracing: colored output for dev, JSON when `LOG_FORMAT=json`.
pub fn init_tracing(default_directive: &str) {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let mut env_filter = EnvFilter::from_default_env();
    if let Ok(directive) = default_directive.parse() {
        env_filter = env_filter.add_directive(directive);
    }

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_ansi(true).with_target(true))
            .with(env_filter)
            .init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logger_context() {
        let mut logger = PipelineLogger::new("req-1");
        assert_eq!(logger.request_id(), "req-1");
        assert_eq!(logger.content_id(), None);

        logger.set_content_id(&ContentId::parse("abc123").unwrap());
        assert_eq!(logger.content_id(), Some("abc123"));
    }
}
