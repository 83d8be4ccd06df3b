//! Application state.

use std::sync::Arc;

use vcap_worker::{CaptionPipeline, PipelineConfig};

use crate::config::ApiConfig;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub pipeline_config: PipelineConfig,
    pub pipeline: Arc<CaptionPipeline>,
}

impl AppState {
    /// Production state: external processes and the filesystem cache.
    pub fn new(config: ApiConfig, pipeline_config: PipelineConfig) -> Self {
        let pipeline = Arc::new(CaptionPipeline::from_config(&pipeline_config));
        Self::with_pipeline(config, pipeline_config, pipeline)
    }

    pub fn with_pipeline(
        config: ApiConfig,
        pipeline_config: PipelineConfig,
        pipeline: Arc<CaptionPipeline>,
    ) -> Self {
        Self {
            config,
            pipeline_config,
            pipeline,
        }
    }
}
