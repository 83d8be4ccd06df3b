//! Visual and audio feature extraction.

use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use vcap_models::{
    ArtifactLayout, ContentId, FeatureArtifact, FeatureFile, FeatureSet, MediaArtifact, Modality,
};

use crate::error::{MediaError, MediaResult};
use crate::fs_utils::{move_file, nonempty_file_size, remove_dir_quietly};
use crate::runner::{ExternalJobRunner, FeatureArgs};

/// Runs one extraction job per modality and publishes verified outputs.
pub struct FeatureExtractor {
    runner: Arc<dyn ExternalJobRunner>,
    layout: ArtifactLayout,
}

impl FeatureExtractor {
    pub fn new(runner: Arc<dyn ExternalJobRunner>, layout: ArtifactLayout) -> Self {
        Self { runner, layout }
    }

    /// Extract both modalities concurrently.
    ///
    /// When both fail, the visual failure is returned.
    pub async fn extract_all(&self, media: &MediaArtifact, id: &ContentId) -> MediaResult<FeatureSet> {
        tokio::fs::create_dir_all(&self.layout.feature_root)
            .await
            .map_err(|e| {
                MediaError::extraction_failed(
                    Modality::Visual,
                    None,
                    format!("feature root unavailable: {}", e),
                )
            })?;

        let (visual, audio) = tokio::join!(
            self.extract(Modality::Visual, media, id),
            self.extract(Modality::Audio, media, id)
        );

        Ok(FeatureSet {
            visual: visual?,
            audio: audio?,
        })
    }

    /// Extract one modality, reusing published artifacts when complete.
    pub async fn extract(
        &self,
        modality: Modality,
        media: &MediaArtifact,
        id: &ContentId,
    ) -> MediaResult<FeatureArtifact> {
        if let Some(existing) = self.existing(modality, id).await {
            info!(content_id = %id, modality = %modality, "Reusing existing features");
            return Ok(existing);
        }

        let staging = self
            .layout
            .feature_staging_dir(id, modality, &Uuid::new_v4().simple().to_string());
        tokio::fs::create_dir_all(&staging).await.map_err(|e| {
            MediaError::extraction_failed(modality, None, format!("staging dir unavailable: {}", e))
        })?;

        let result = self.run_job(modality, media, id, &staging).await;
        remove_dir_quietly(&staging).await;

        match &result {
            Ok(_) => info!(content_id = %id, modality = %modality, "Features extracted"),
            Err(e) => warn!(content_id = %id, modality = %modality, error = %e, "Feature extraction failed"),
        }
        result
    }

    async fn existing(&self, modality: Modality, id: &ContentId) -> Option<FeatureArtifact> {
        let mut files = Vec::with_capacity(modality.streams().len());
        for &stream in modality.streams() {
            let path = self.layout.feature_path(id, stream);
            nonempty_file_size(&path).await?;
            files.push(FeatureFile { stream, path });
        }
        Some(FeatureArtifact { modality, files })
    }

    async fn run_job(
        &self,
        modality: Modality,
        media: &MediaArtifact,
        id: &ContentId,
        staging: &Path,
    ) -> MediaResult<FeatureArtifact> {
        let exit = self
            .runner
            .extract_features(&FeatureArgs {
                modality,
                video_path: media.path.clone(),
                output_dir: staging.to_path_buf(),
            })
            .await
            .map_err(|e| MediaError::extraction_failed(modality, e.exit_status(), e.to_string()))?;

        if !exit.success() {
            return Err(MediaError::extraction_failed(modality, exit.code, exit.last_line()));
        }

        // Outputs are named after the media file stem.
        let stem = media
            .path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| id.to_string());

        let mut produced = Vec::with_capacity(modality.streams().len());
        for &stream in modality.streams() {
            let path = staging.join(stream.file_name(&stem));
            if nonempty_file_size(&path).await.is_none() {
                return Err(MediaError::extraction_failed(
                    modality,
                    exit.code,
                    format!("expected output {} missing or empty", path.display()),
                ));
            }
            produced.push((stream, path));
        }

        let mut files = Vec::with_capacity(produced.len());
        for (stream, staged) in produced {
            let dest = self.layout.feature_path(id, stream);
            move_file(&staged, &dest).await.map_err(|e| {
                MediaError::extraction_failed(modality, exit.code, format!("failed to publish: {}", e))
            })?;
            files.push(FeatureFile { stream, path: dest });
        }

        Ok(FeatureArtifact { modality, files })
    }
}
