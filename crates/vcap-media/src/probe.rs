//! Media duration probing with ffprobe.

use std::sync::Arc;
use tracing::debug;

use vcap_models::MediaArtifact;

use crate::error::{MediaError, MediaResult};
use crate::runner::{ExternalJobRunner, ProbeArgs};

pub struct DurationProbe {
    runner: Arc<dyn ExternalJobRunner>,
}

impl DurationProbe {
    pub fn new(runner: Arc<dyn ExternalJobRunner>) -> Self {
        Self { runner }
    }

    /// Duration of the media artifact in seconds.
    pub async fn probe(&self, media: &MediaArtifact) -> MediaResult<f64> {
        let exit = self
            .runner
            .probe_duration(&ProbeArgs {
                media_path: media.path.clone(),
            })
            .await
            .map_err(|e| MediaError::probe_failed(e.to_string()))?;

        if !exit.success() {
            return Err(MediaError::probe_failed(format!(
                "probe exited with {:?}: {}",
                exit.code,
                exit.last_line()
            )));
        }

        let duration = parse_duration(&exit.stdout)?;
        debug!(path = %media.path.display(), duration, "Probed media duration");
        Ok(duration)
    }
}

/// Parse ffprobe's bare `format=duration` output.
pub fn parse_duration(raw: &str) -> MediaResult<f64> {
    let value = raw.trim();
    let duration: f64 = value
        .parse()
        .map_err(|_| MediaError::probe_failed(format!("non-numeric duration {:?}", value)))?;

    if !duration.is_finite() || duration <= 0.0 {
        return Err(MediaError::probe_failed(format!("invalid duration {}", duration)));
    }
    Ok(duration)
}
