//! Pipeline configuration.

use std::path::PathBuf;
use std::time::Duration;

use vcap_media::{AcquisitionPolicy, ToolchainConfig};
use vcap_models::ArtifactLayout;

/// Pipeline configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Artifact store roots
    pub layout: ArtifactLayout,
    /// External tool locations and job timeout
    pub toolchain: ToolchainConfig,
    /// Encoding constraints and fetch retries
    pub acquisition: AcquisitionPolicy,
    /// Collapse concurrent runs for the same content id
    pub single_flight: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            layout: ArtifactLayout::under("./data"),
            toolchain: ToolchainConfig::default(),
            acquisition: AcquisitionPolicy::default(),
            single_flight: true,
        }
    }
}

impl PipelineConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let layout = ArtifactLayout::new(
            env_path("MEDIA_ROOT").unwrap_or(defaults.layout.media_root),
            env_path("FEATURE_ROOT").unwrap_or(defaults.layout.feature_root),
            env_path("CAPTION_ROOT").unwrap_or(defaults.layout.caption_root),
        );

        let toolchain = ToolchainConfig {
            ytdlp_bin: env_path("YTDLP_BIN").unwrap_or(defaults.toolchain.ytdlp_bin),
            ffprobe_bin: env_path("FFPROBE_BIN").unwrap_or(defaults.toolchain.ffprobe_bin),
            feature_env_root: env_path("FEATURE_ENV_ROOT")
                .unwrap_or(defaults.toolchain.feature_env_root),
            video_features_dir: env_path("VIDEO_FEATURES_DIR")
                .unwrap_or(defaults.toolchain.video_features_dir),
            bmt_dir: env_path("BMT_DIR").unwrap_or(defaults.toolchain.bmt_dir),
            job_timeout: Duration::from_secs(
                std::env::var("JOB_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(3600),
            ),
        };

        let acquisition = AcquisitionPolicy {
            container: defaults.acquisition.container,
            max_height: std::env::var("FETCH_MAX_HEIGHT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(480),
            max_fps: std::env::var("FETCH_MAX_FPS")
                .ok()
                .and_then(|s| parse_fps_ceiling(&s))
                .unwrap_or(30.0),
            max_retries: std::env::var("FETCH_MAX_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(2),
            retry_base_delay: Duration::from_millis(
                std::env::var("FETCH_RETRY_BASE_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(1000),
            ),
        };

        let single_flight = std::env::var("PIPELINE_SINGLE_FLIGHT")
            .map(|v| v.to_lowercase() != "false" && v != "0")
            .unwrap_or(true);

        Self {
            layout,
            toolchain,
            acquisition,
            single_flight,
        }
    }
}

fn env_path(key: &str) -> Option<PathBuf> {
    std::env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .map(PathBuf::from)
}

/// A usable fps ceiling: finite and positive.
fn parse_fps_ceiling(raw: &str) -> Option<f64> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|fps| fps.is_finite() && *fps > 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_service_layout() {
        let config = PipelineConfig::default();

        assert_eq!(config.layout.media_root, PathBuf::from("./data/saved_videos"));
        assert_eq!(config.layout.caption_root, PathBuf::from("./data/saved_captions"));
        assert_eq!(config.acquisition.max_height, 480);
        assert_eq!(config.acquisition.max_fps, 30.0);
        assert_eq!(config.acquisition.max_retries, 2);
        assert_eq!(config.toolchain.job_timeout, Duration::from_secs(3600));
        assert!(config.single_flight);
    }

    #[test]
    fn test_fps_ceiling_rejects_non_finite_values() {
        assert_eq!(parse_fps_ceiling("60"), Some(60.0));
        assert_eq!(parse_fps_ceiling(" 29.97 "), Some(29.97));
        assert_eq!(parse_fps_ceiling("NaN"), None);
        assert_eq!(parse_fps_ceiling("inf"), None);
        assert_eq!(parse_fps_ceiling("-30"), None);
        assert_eq!(parse_fps_ceiling("0"), None);
        assert_eq!(parse_fps_ceiling("fast"), None);
    }
}
