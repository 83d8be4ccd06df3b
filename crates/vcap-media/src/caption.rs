//! Caption prediction with the dense video captioning model.

use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use vcap_models::{ArtifactLayout, CaptionArtifact, ContentId, FeatureSet, FeatureStream};

use crate::error::{MediaError, MediaResult};
use crate::fs_utils::remove_file_quietly;
use crate::runner::{CaptionArgs, ExternalJobRunner};

pub struct CaptionPredictor {
    runner: Arc<dyn ExternalJobRunner>,
    layout: ArtifactLayout,
}

impl CaptionPredictor {
    pub fn new(runner: Arc<dyn ExternalJobRunner>, layout: ArtifactLayout) -> Self {
        Self { runner, layout }
    }

    /// Run the captioning job and parse its JSON output.
    ///
    /// The job writes into a staging file that is removed afterwards;
    /// persisting the caption is the result cache's job.
    pub async fn predict(
        &self,
        duration_secs: f64,
        features: &FeatureSet,
        id: &ContentId,
    ) -> MediaResult<CaptionArtifact> {
        let stream_path = |stream: FeatureStream| {
            features.path(stream).map(Path::to_path_buf).ok_or_else(|| {
                MediaError::prediction_failed(None, format!("missing {} features", stream.suffix()))
            })
        };
        let rgb_path = stream_path(FeatureStream::Rgb)?;
        let flow_path = stream_path(FeatureStream::Flow)?;
        let vggish_path = stream_path(FeatureStream::Vggish)?;

        tokio::fs::create_dir_all(&self.layout.caption_root)
            .await
            .map_err(|e| MediaError::prediction_failed(None, format!("caption root unavailable: {}", e)))?;

        let staging = self
            .layout
            .caption_staging_path(id, &Uuid::new_v4().simple().to_string());
        let args = CaptionArgs {
            duration_secs,
            rgb_path,
            flow_path,
            vggish_path,
            output_path: staging.clone(),
        };

        let result = self.run_job(&args).await;
        remove_file_quietly(&staging).await;

        match &result {
            Ok(_) => info!(content_id = %id, duration_secs, "Caption predicted"),
            Err(e) => warn!(content_id = %id, error = %e, "Caption prediction failed"),
        }
        result
    }

    async fn run_job(&self, args: &CaptionArgs) -> MediaResult<CaptionArtifact> {
        let exit = self
            .runner
            .predict_caption(args)
            .await
            .map_err(|e| MediaError::prediction_failed(e.exit_status(), e.to_string()))?;

        if !exit.success() {
            return Err(MediaError::prediction_failed(exit.code, exit.last_line()));
        }

        let bytes = match tokio::fs::read(&args.output_path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(MediaError::malformed_output("captioning job wrote no output"));
            }
            Err(e) => {
                return Err(MediaError::malformed_output(format!("unreadable output: {}", e)));
            }
        };

        CaptionArtifact::from_slice(&bytes)
            .map_err(|e| MediaError::malformed_output(format!("invalid JSON: {}", e)))
    }
}
