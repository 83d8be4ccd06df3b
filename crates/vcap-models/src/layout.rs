//! Artifact store layout.
//!
//! Every derived artifact lives at a path keyed by its content identifier.
//! Staging paths are hidden siblings in the same root so that the final
//! rename never crosses a filesystem boundary.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::artifact::{FeatureStream, Modality};
use crate::content_id::ContentId;

/// Container of the media artifact.
pub const MEDIA_CONTAINER: &str = "mp4";

/// Keyed directory roots for media, feature and caption artifacts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactLayout {
    pub media_root: PathBuf,
    pub feature_root: PathBuf,
    pub caption_root: PathBuf,
}

impl ArtifactLayout {
    pub fn new(
        media_root: impl Into<PathBuf>,
        feature_root: impl Into<PathBuf>,
        caption_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            media_root: media_root.into(),
            feature_root: feature_root.into(),
            caption_root: caption_root.into(),
        }
    }

    /// Layout with the three roots nested under one base directory.
    pub fn under(base: impl AsRef<Path>) -> Self {
        let base = base.as_ref();
        Self::new(
            base.join("saved_videos"),
            base.join("saved_features"),
            base.join("saved_captions"),
        )
    }

    /// All roots, in pipeline order.
    pub fn roots(&self) -> [&Path; 3] {
        [&self.media_root, &self.feature_root, &self.caption_root]
    }

    /// `{media_root}/{id}.mp4`
    pub fn media_path(&self, id: &ContentId) -> PathBuf {
        self.media_root.join(format!("{}.{}", id, MEDIA_CONTAINER))
    }

    /// Hidden staging file the fetch job writes to before the rename.
    pub fn media_staging_path(&self, id: &ContentId, token: &str) -> PathBuf {
        self.media_root
            .join(format!(".{}.{}.download.{}", id, token, MEDIA_CONTAINER))
    }

    /// `{feature_root}/{id}_{stream}.npy`
    pub fn feature_path(&self, id: &ContentId, stream: FeatureStream) -> PathBuf {
        self.feature_root.join(stream.file_name(id.as_str()))
    }

    /// Hidden per-job output directory for one modality's extraction.
    pub fn feature_staging_dir(&self, id: &ContentId, modality: Modality, token: &str) -> PathBuf {
        self.feature_root
            .join(format!(".staging-{}-{}-{}", id, modality, token))
    }

    /// `{caption_root}/{id}_captions.json`
    pub fn caption_path(&self, id: &ContentId) -> PathBuf {
        self.caption_root.join(format!("{}_captions.json", id))
    }

    /// Hidden file the captioning job writes its output to.
    pub fn caption_staging_path(&self, id: &ContentId, token: &str) -> PathBuf {
        self.caption_root
            .join(format!(".{}.{}.prediction.json", id, token))
    }
}
