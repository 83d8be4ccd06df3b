//! Caption result cache.

use async_trait::async_trait;
use std::io::ErrorKind;
use tokio::fs;
use tracing::{debug, warn};
use uuid::Uuid;

use vcap_models::{ArtifactLayout, CaptionArtifact, ContentId};

use crate::error::{StorageError, StorageResult};

/// Keyed store of finished caption artifacts.
#[async_trait]
pub trait ResultCache: Send + Sync {
    /// Cached artifact for `id`, or `None` on a miss.
    ///
    /// An entry that exists but cannot be parsed is treated as a miss.
    async fn lookup(&self, id: &ContentId) -> StorageResult<Option<CaptionArtifact>>;

    /// Whether an entry exists for `id`.
    async fn exists(&self, id: &ContentId) -> bool;

    /// Persist `artifact` for `id`; last write wins.
    async fn store(&self, id: &ContentId, artifact: &CaptionArtifact) -> StorageResult<()>;
}

/// Result cache backed by `{caption_root}/{id}_captions.json`.
#[derive(Debug, Clone)]
pub struct FsResultCache {
    layout: ArtifactLayout,
}

impl FsResultCache {
    pub fn new(layout: ArtifactLayout) -> Self {
        Self { layout }
    }
}

#[async_trait]
impl ResultCache for FsResultCache {
    async fn lookup(&self, id: &ContentId) -> StorageResult<Option<CaptionArtifact>> {
        let path = self.layout.caption_path(id);

        let data = match fs::read(&path).await {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(content_id = %id, "Result cache miss");
                return Ok(None);
            }
            Err(e) => return Err(StorageError::read_failed(path, e)),
        };

        match CaptionArtifact::from_slice(&data) {
            Ok(artifact) => {
                debug!(content_id = %id, "Result cache hit");
                Ok(Some(artifact))
            }
            Err(e) => {
                warn!(
                    content_id = %id,
                    path = %path.display(),
                    error = %e,
                    "Result cache miss (corrupt entry)"
                );
                Ok(None)
            }
        }
    }

    async fn exists(&self, id: &ContentId) -> bool {
        let path = self.layout.caption_path(id);
        match fs::try_exists(&path).await {
            Ok(exists) => exists,
            Err(e) => {
                warn!(content_id = %id, error = %e, "Result cache existence check failed");
                false
            }
        }
    }

    async fn store(&self, id: &ContentId, artifact: &CaptionArtifact) -> StorageResult<()> {
        let path = self.layout.caption_path(id);
        let bytes = artifact
            .to_vec()
            .map_err(|e| StorageError::Serialization(e.to_string()))?;

        fs::create_dir_all(&self.layout.caption_root)
            .await
            .map_err(|e| StorageError::write_failed(&self.layout.caption_root, e))?;

        // Readers only ever see a complete document under the final name.
        let tmp = self
            .layout
            .caption_root
            .join(format!(".{}.{}.tmp", id, Uuid::new_v4().simple()));
        if let Err(e) = fs::write(&tmp, &bytes).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(StorageError::write_failed(&tmp, e));
        }
        if let Err(e) = fs::rename(&tmp, &path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(StorageError::write_failed(&path, e));
        }

        debug!(content_id = %id, path = %path.display(), bytes = bytes.len(), "Stored caption result");
        Ok(())
    }
}
