//! Media acquisition through the fetch service.
//!
//! Picks one progressive encoding under the quality ceiling, transfers it
//! into a staging file with bounded retries and publishes it at the
//! content id's media path.

use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use vcap_models::layout::MEDIA_CONTAINER;
use vcap_models::{ArtifactLayout, ContentId, Encoding, MediaArtifact};

use crate::error::{MediaError, MediaResult};
use crate::fs_utils::{move_file, nonempty_file_size, remove_file_quietly};
use crate::retry::{retry_async_if, RetryConfig, RetryResult};
use crate::runner::{ExternalJobRunner, FetchArgs, ListEncodingsArgs};

/// Format and retry constraints for acquisition.
#[derive(Debug, Clone, PartialEq)]
pub struct AcquisitionPolicy {
    /// Required container
    pub container: String,
    /// Inclusive frame height ceiling
    pub max_height: u32,
    /// Inclusive frame rate ceiling
    pub max_fps: f64,
    /// Retries after the first transfer attempt
    pub max_retries: u32,
    /// First backoff delay; doubles per retry
    pub retry_base_delay: Duration,
}

impl Default for AcquisitionPolicy {
    fn default() -> Self {
        Self {
            container: MEDIA_CONTAINER.to_string(),
            max_height: 480,
            max_fps: 30.0,
            max_retries: 2,
            retry_base_delay: Duration::from_secs(1),
        }
    }
}

impl AcquisitionPolicy {
    fn within_ceiling(&self, encoding: &Encoding) -> bool {
        let height_ok = encoding.height.map_or(false, |h| h <= self.max_height);
        let fps_ok = encoding.fps.map_or(true, |fps| fps <= self.max_fps);
        height_ok && fps_ok
    }
}

/// Ranking used by [`select_encoding`]: higher height, then higher fps,
/// then the lexicographically smaller format id wins.
fn compare_rank(a: &Encoding, b: &Encoding) -> Ordering {
    a.height
        .unwrap_or(0)
        .cmp(&b.height.unwrap_or(0))
        .then_with(|| a.fps.unwrap_or(0.0).total_cmp(&b.fps.unwrap_or(0.0)))
        .then_with(|| b.format_id.cmp(&a.format_id))
}

/// Select the encoding to fetch.
///
/// Progressive encodings in the policy container are filtered to the
/// quality ceiling, then the best-ranked one is chosen. The result does
/// not depend on the order of `encodings`. Encodings without a known
/// height cannot be checked against the ceiling and are never selected.
pub fn select_encoding(encodings: &[Encoding], policy: &AcquisitionPolicy) -> MediaResult<Encoding> {
    let progressive: Vec<&Encoding> = encodings
        .iter()
        .filter(|e| e.has_container(&policy.container) && e.is_progressive())
        .collect();

    if progressive.is_empty() {
        return Err(MediaError::unsupported_format(format!(
            "no progressive {} encoding among {} available",
            policy.container,
            encodings.len()
        )));
    }

    progressive
        .into_iter()
        .filter(|e| policy.within_ceiling(e))
        .max_by(|a, b| compare_rank(a, b))
        .cloned()
        .ok_or_else(|| {
            MediaError::unsupported_format(format!(
                "no progressive {} encoding within {}p/{}fps",
                policy.container, policy.max_height, policy.max_fps
            ))
        })
}

/// Fetches the media artifact for a content id.
pub struct MediaAcquirer {
    runner: Arc<dyn ExternalJobRunner>,
    layout: ArtifactLayout,
    policy: AcquisitionPolicy,
}

impl MediaAcquirer {
    pub fn new(
        runner: Arc<dyn ExternalJobRunner>,
        layout: ArtifactLayout,
        policy: AcquisitionPolicy,
    ) -> Self {
        Self {
            runner,
            layout,
            policy,
        }
    }

    /// Acquire the media artifact, reusing a previously published one.
    pub async fn acquire(&self, reference: &str, id: &ContentId) -> MediaResult<MediaArtifact> {
        let final_path = self.layout.media_path(id);

        if let Some(size_bytes) = nonempty_file_size(&final_path).await {
            info!(content_id = %id, path = %final_path.display(), "Reusing existing media artifact");
            return Ok(MediaArtifact {
                content_id: id.clone(),
                path: final_path,
                container: self.policy.container.clone(),
                encoding: None,
                size_bytes,
            });
        }

        tokio::fs::create_dir_all(&self.layout.media_root)
            .await
            .map_err(|e| MediaError::acquisition_failed(0, format!("media root unavailable: {}", e)))?;

        let encodings = self
            .runner
            .list_encodings(&ListEncodingsArgs {
                reference: reference.to_string(),
            })
            .await
            .map_err(|e| MediaError::acquisition_failed(1, format!("listing encodings failed: {}", e)))?;

        let encoding = select_encoding(&encodings, &self.policy)?;
        debug!(
            content_id = %id,
            format_id = %encoding.format_id,
            height = ?encoding.height,
            fps = ?encoding.fps,
            "Selected encoding"
        );

        let staging = self
            .layout
            .media_staging_path(id, &Uuid::new_v4().simple().to_string());
        let retry = RetryConfig::new("media_fetch")
            .with_max_retries(self.policy.max_retries)
            .with_base_delay(self.policy.retry_base_delay);

        let outcome = retry_async_if(
            &retry,
            || self.fetch_once(reference, &encoding, &staging),
            MediaError::is_retryable,
        )
        .await;
        metrics::counter!("vcap_media_fetch_attempts_total").increment(u64::from(outcome.attempts()));

        let (size_bytes, attempts) = match outcome {
            RetryResult::Success { value, attempts } => (value, attempts),
            RetryResult::Failed { error, attempts } => {
                remove_file_quietly(&staging).await;
                warn!(content_id = %id, attempts, error = %error, "Media fetch failed");
                return Err(MediaError::acquisition_failed(attempts, error.to_string()));
            }
        };

        if let Err(e) = move_file(&staging, &final_path).await {
            remove_file_quietly(&staging).await;
            return Err(MediaError::acquisition_failed(
                attempts,
                format!("failed to publish media artifact: {}", e),
            ));
        }

        info!(
            content_id = %id,
            format_id = %encoding.format_id,
            size_bytes,
            attempts,
            "Media acquired"
        );

        Ok(MediaArtifact {
            content_id: id.clone(),
            path: final_path,
            container: self.policy.container.clone(),
            encoding: Some(encoding),
            size_bytes,
        })
    }

    /// One transfer attempt into the staging file; returns its size.
    async fn fetch_once(
        &self,
        reference: &str,
        encoding: &Encoding,
        staging: &std::path::Path,
    ) -> MediaResult<u64> {
        remove_file_quietly(staging).await;

        let exit = self
            .runner
            .fetch(&FetchArgs {
                reference: reference.to_string(),
                format_id: encoding.format_id.clone(),
                output: staging.to_path_buf(),
            })
            .await?;

        if !exit.success() {
            return Err(MediaError::job_failed("fetch", exit.code, exit.last_line()));
        }

        nonempty_file_size(staging)
            .await
            .ok_or_else(|| MediaError::job_failed("fetch", exit.code, "fetch produced no output"))
    }
}
