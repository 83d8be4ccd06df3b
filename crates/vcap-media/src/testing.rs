//! Scriptable in-memory [`ExternalJobRunner`] for tests.
//!
//! Records every call and writes plausible artifacts where the real tools
//! would, so stages and the orchestrator can run end to end without yt-dlp,
//! Python environments or ffprobe.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use vcap_models::{Encoding, Modality};

use crate::error::{MediaError, MediaResult};
use crate::runner::{
    CaptionArgs, ExternalJobRunner, FeatureArgs, FetchArgs, JobExit, ListEncodingsArgs, ProbeArgs,
};

/// Kind of job a call was made for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobKind {
    ListEncodings,
    Fetch,
    Extract(Modality),
    Probe,
    Predict,
}

#[derive(Debug, Clone)]
enum CaptionOutput {
    Json(String),
    Missing,
}

#[derive(Debug)]
struct Script {
    encodings: Vec<Encoding>,
    listing_fails: bool,
    fetch_failures_left: u32,
    fetch_error: String,
    fetch_delay: Duration,
    extraction_exit: HashMap<Modality, i32>,
    missing_output: Vec<Modality>,
    probe_stdout: String,
    caption_exit: i32,
    caption_output: CaptionOutput,
}

/// Fake runner whose behavior is configured with builder methods.
#[derive(Debug)]
pub struct FakeJobRunner {
    script: Mutex<Script>,
    calls: Mutex<Vec<JobKind>>,
}

impl Default for FakeJobRunner {
    fn default() -> Self {
        Self::new()
    }
}

/// A progressive mp4 encoding.
pub fn progressive_mp4(format_id: &str, height: u32, fps: f64) -> Encoding {
    Encoding {
        format_id: format_id.to_string(),
        ext: "mp4".to_string(),
        vcodec: Some("avc1.42001E".to_string()),
        acodec: Some("mp4a.40.2".to_string()),
        height: Some(height),
        fps: Some(fps),
        filesize: None,
    }
}

impl FakeJobRunner {
    /// Every job succeeds: duration 42.5, caption `{"caption": "a person walks"}`.
    pub fn new() -> Self {
        Self {
            script: Mutex::new(Script {
                encodings: vec![progressive_mp4("18", 360, 30.0)],
                listing_fails: false,
                fetch_failures_left: 0,
                fetch_error: "ERROR: Unable to download video data".to_string(),
                fetch_delay: Duration::ZERO,
                extraction_exit: HashMap::new(),
                missing_output: Vec::new(),
                probe_stdout: "42.500000\n".to_string(),
                caption_exit: 0,
                caption_output: CaptionOutput::Json(r#"{"caption": "a person walks"}"#.to_string()),
            }),
            calls: Mutex::new(Vec::new()),
        }
    }

    fn script(&self) -> std::sync::MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn with_encodings(self, encodings: Vec<Encoding>) -> Self {
        self.script().encodings = encodings;
        self
    }

    /// Encoding enumeration fails to run.
    pub fn failing_listing(self) -> Self {
        self.script().listing_fails = true;
        self
    }

    /// The first `attempts` fetches exit non-zero.
    pub fn failing_fetch(self, attempts: u32) -> Self {
        self.script().fetch_failures_left = attempts;
        self
    }

    /// Like [`failing_fetch`](Self::failing_fetch), with the error text the fetch prints.
    pub fn failing_fetch_with(self, attempts: u32, stderr: impl Into<String>) -> Self {
        {
            let mut script = self.script();
            script.fetch_failures_left = attempts;
            script.fetch_error = stderr.into();
        }
        self
    }

    /// Every fetch sleeps before writing its output.
    pub fn with_fetch_delay(self, delay: Duration) -> Self {
        self.script().fetch_delay = delay;
        self
    }

    /// Extraction for `modality` exits with `code`.
    pub fn failing_extraction(self, modality: Modality, code: i32) -> Self {
        self.script().extraction_exit.insert(modality, code);
        self
    }

    /// Extraction for `modality` exits 0 without writing its outputs.
    pub fn missing_feature_output(self, modality: Modality) -> Self {
        self.script().missing_output.push(modality);
        self
    }

    pub fn with_probe_output(self, stdout: impl Into<String>) -> Self {
        self.script().probe_stdout = stdout.into();
        self
    }

    pub fn failing_prediction(self, code: i32) -> Self {
        self.script().caption_exit = code;
        self
    }

    /// Captioning writes `raw` verbatim as its output document.
    pub fn with_caption_output(self, raw: impl Into<String>) -> Self {
        self.script().caption_output = CaptionOutput::Json(raw.into());
        self
    }

    /// Captioning exits 0 without writing an output file.
    pub fn without_caption_output(self) -> Self {
        self.script().caption_output = CaptionOutput::Missing;
        self
    }

    fn record(&self, kind: JobKind) {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).push(kind);
    }

    /// Number of calls made for a job kind.
    pub fn calls(&self, kind: JobKind) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|k| **k == kind)
            .count()
    }

    /// Number of calls made for any job.
    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

#[async_trait]
impl ExternalJobRunner for FakeJobRunner {
    async fn list_encodings(&self, _args: &ListEncodingsArgs) -> MediaResult<Vec<Encoding>> {
        self.record(JobKind::ListEncodings);
        let script = self.script();
        if script.listing_fails {
            return Err(MediaError::job_failed("list_encodings", Some(1), "HTTP Error 403"));
        }
        Ok(script.encodings.clone())
    }

    async fn fetch(&self, args: &FetchArgs) -> MediaResult<JobExit> {
        self.record(JobKind::Fetch);
        let (fail, error, delay) = {
            let mut script = self.script();
            let fail = script.fetch_failures_left > 0;
            if fail {
                script.fetch_failures_left -= 1;
            }
            (fail, script.fetch_error.clone(), script.fetch_delay)
        };

        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if fail {
            return Ok(JobExit::failed(1, error));
        }

        tokio::fs::write(&args.output, b"fake mp4 data").await?;
        Ok(JobExit::ok(""))
    }

    async fn extract_features(&self, args: &FeatureArgs) -> MediaResult<JobExit> {
        self.record(JobKind::Extract(args.modality));
        let (exit_code, write_outputs) = {
            let script = self.script();
            (
                script.extraction_exit.get(&args.modality).copied().unwrap_or(0),
                !script.missing_output.contains(&args.modality),
            )
        };

        if exit_code != 0 {
            return Ok(JobExit::failed(exit_code, "RuntimeError: CUDA out of memory"));
        }

        if write_outputs {
            let stem = args
                .video_path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            for stream in args.modality.streams() {
                tokio::fs::write(args.output_dir.join(stream.file_name(&stem)), b"fake npy").await?;
            }
        }
        Ok(JobExit::ok(""))
    }

    async fn probe_duration(&self, _args: &ProbeArgs) -> MediaResult<JobExit> {
        self.record(JobKind::Probe);
        Ok(JobExit::ok(self.script().probe_stdout.clone()))
    }

    async fn predict_caption(&self, args: &CaptionArgs) -> MediaResult<JobExit> {
        self.record(JobKind::Predict);
        let (exit_code, output) = {
            let script = self.script();
            (script.caption_exit, script.caption_output.clone())
        };

        if exit_code != 0 {
            return Ok(JobExit::failed(exit_code, "Traceback: model checkpoint not found"));
        }
        if let CaptionOutput::Json(raw) = output {
            tokio::fs::write(&args.output_path, raw).await?;
        }
        Ok(JobExit::ok(""))
    }
}
