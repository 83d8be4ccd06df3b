//! External job runner seam.
//!
//! Every slow, fallible collaborator (yt-dlp, feature extraction, ffprobe,
//! captioning) is reached through [`ExternalJobRunner`] so that stages can be
//! exercised without the real tools.

use async_trait::async_trait;
use std::path::PathBuf;

use vcap_models::{Encoding, Modality};

use crate::error::MediaResult;

/// Arguments for enumerating the encodings of a reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListEncodingsArgs {
    pub reference: String,
}

/// Arguments for transferring one encoding to a local file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchArgs {
    pub reference: String,
    pub format_id: String,
    /// Staging file the job writes to
    pub output: PathBuf,
}

/// Arguments for one modality's feature extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureArgs {
    pub modality: Modality,
    pub video_path: PathBuf,
    /// Staging directory; outputs are named `{video_stem}_{stream}.npy`
    pub output_dir: PathBuf,
}

/// Arguments for probing a media file's duration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeArgs {
    pub media_path: PathBuf,
}

/// Arguments for the captioning job.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptionArgs {
    pub duration_secs: f64,
    pub rgb_path: PathBuf,
    pub flow_path: PathBuf,
    pub vggish_path: PathBuf,
    /// Staging file the job writes its JSON document to
    pub output_path: PathBuf,
}

/// Outcome of an external process that ran to completion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobExit {
    /// Exit code; `None` when terminated by a signal
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl JobExit {
    /// Successful exit with the given stdout.
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// Failed exit with the given code and stderr.
    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Last non-empty output line, for error messages.
    pub fn last_line(&self) -> String {
        self.stdout
            .lines()
            .chain(self.stderr.lines())
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .last()
            .unwrap_or("no output")
            .to_string()
    }
}

/// Invokes the external tools the pipeline depends on.
///
/// Implementations return `Err` only when the job could not be run to
/// completion (tool missing, spawn failure, timeout). A job that ran and
/// exited non-zero is reported through [`JobExit::code`].
#[async_trait]
pub trait ExternalJobRunner: Send + Sync {
    /// Enumerate available encodings for a reference.
    async fn list_encodings(&self, args: &ListEncodingsArgs) -> MediaResult<Vec<Encoding>>;

    /// Download one encoding to `args.output`.
    async fn fetch(&self, args: &FetchArgs) -> MediaResult<JobExit>;

    /// Run one modality's feature extraction into `args.output_dir`.
    async fn extract_features(&self, args: &FeatureArgs) -> MediaResult<JobExit>;

    /// Probe media duration; the value is printed on stdout.
    async fn probe_duration(&self, args: &ProbeArgs) -> MediaResult<JobExit>;

    /// Run the captioning model, writing JSON to `args.output_path`.
    async fn predict_caption(&self, args: &CaptionArgs) -> MediaResult<JobExit>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_exit_success() {
        assert!(JobExit::ok("42.5\n").success());
        assert!(!JobExit::failed(1, "boom").success());
        assert!(!JobExit::default().success());
    }

    #[test]
    fn test_last_line_prefers_stderr() {
        let exit = JobExit {
            code: Some(1),
            stdout: "loading model\n".into(),
            stderr: "Traceback\nRuntimeError: CUDA out of memory\n\n".into(),
        };
        assert_eq!(exit.last_line(), "RuntimeError: CUDA out of memory");

        assert_eq!(JobExit::ok("42.5\n").last_line(), "42.5");
        assert_eq!(JobExit::failed(1, "").last_line(), "no output");
    }
}
