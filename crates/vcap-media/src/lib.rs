//! External media jobs for the caption pipeline.
//!
//! This crate provides:
//! - The `ExternalJobRunner` seam and its process-backed implementation
//! - Media acquisition through yt-dlp with encoding selection and retries
//! - Concurrent visual/audio feature extraction
//! - Duration probing with ffprobe
//! - Caption prediction
//! - Staging-file helpers for atomic artifact publication

pub mod caption;
pub mod command;
pub mod download;
pub mod error;
pub mod features;
pub mod fs_utils;
pub mod probe;
pub mod retry;
pub mod runner;
#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use caption::CaptionPredictor;
pub use command::{ensure_available, JobCommand, ProcessJobRunner, ToolchainConfig};
pub use download::{select_encoding, AcquisitionPolicy, MediaAcquirer};
pub use error::{MediaError, MediaResult};
pub use features::FeatureExtractor;
pub use probe::{parse_duration, DurationProbe};
pub use retry::{retry_async, retry_async_if, RetryConfig, RetryResult};
pub use runner::{
    CaptionArgs, ExternalJobRunner, FeatureArgs, FetchArgs, JobExit, ListEncodingsArgs, ProbeArgs,
};
