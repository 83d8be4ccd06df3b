//! Process-backed [`ExternalJobRunner`].
//!
//! Each job kind has a pure command builder (tested on its argument list)
//! and goes through one runner that captures output and enforces the job
//! timeout.

use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

use vcap_models::{Encoding, Modality};

use crate::error::{MediaError, MediaResult};
use crate::runner::{
    CaptionArgs, ExternalJobRunner, FeatureArgs, FetchArgs, JobExit, ListEncodingsArgs, ProbeArgs,
};

/// Locations of the external tools.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolchainConfig {
    /// yt-dlp executable (name on PATH or absolute path)
    pub ytdlp_bin: PathBuf,
    /// ffprobe executable (name on PATH or absolute path)
    pub ffprobe_bin: PathBuf,
    /// Root holding one Python environment per job (`{root}/{env}/bin/python`)
    pub feature_env_root: PathBuf,
    /// Checkout of the video_features project (working dir for extraction)
    pub video_features_dir: PathBuf,
    /// Checkout of the BMT captioning project (working dir for prediction)
    pub bmt_dir: PathBuf,
    /// Upper bound for a single external job
    pub job_timeout: Duration,
}

impl Default for ToolchainConfig {
    fn default() -> Self {
        Self {
            ytdlp_bin: PathBuf::from("yt-dlp"),
            ffprobe_bin: PathBuf::from("ffprobe"),
            feature_env_root: PathBuf::from("/usr/local/envs"),
            video_features_dir: PathBuf::from("/content/BMT/submodules/video_features"),
            bmt_dir: PathBuf::from("/content/BMT"),
            job_timeout: Duration::from_secs(3600),
        }
    }
}

impl ToolchainConfig {
    /// Interpreter of a named Python environment.
    pub fn python_for(&self, env: &str) -> PathBuf {
        self.feature_env_root.join(env).join("bin").join("python")
    }
}

/// A fully specified external invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
}

impl JobCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn path_arg(self, path: &Path) -> Self {
        self.arg(path.to_string_lossy())
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Shell-like rendering for logs.
    pub fn display(&self) -> String {
        let mut parts = vec![self.program.to_string_lossy().into_owned()];
        parts.extend(self.args.iter().cloned());
        parts.join(" ")
    }
}

/// `yt-dlp -J` dumps the reference metadata, including every format.
pub fn list_encodings_command(config: &ToolchainConfig, args: &ListEncodingsArgs) -> JobCommand {
    JobCommand::new(&config.ytdlp_bin)
        .args(["-J", "--no-playlist", "--no-warnings"])
        .arg(&args.reference)
}

pub fn fetch_command(config: &ToolchainConfig, args: &FetchArgs) -> JobCommand {
    JobCommand::new(&config.ytdlp_bin)
        .args(["--no-playlist", "--no-part", "--force-overwrites", "--no-warnings"])
        .arg("-f")
        .arg(&args.format_id)
        .arg("-o")
        .path_arg(&args.output)
        .arg(&args.reference)
}

pub fn feature_command(config: &ToolchainConfig, args: &FeatureArgs) -> JobCommand {
    let feature_type = args.modality.feature_type();
    JobCommand::new(config.python_for(feature_type))
        .arg("main.py")
        .arg("--feature_type")
        .arg(feature_type)
        .arg("--video_paths")
        .path_arg(&args.video_path)
        .arg("--output_path")
        .path_arg(&args.output_dir)
        .current_dir(&config.video_features_dir)
}

pub fn probe_command(config: &ToolchainConfig, args: &ProbeArgs) -> JobCommand {
    JobCommand::new(&config.ffprobe_bin)
        .args(["-hide_banner", "-loglevel", "panic", "-v", "error"])
        .args(["-show_entries", "format=duration"])
        .args(["-of", "default=noprint_wrappers=1:nokey=1"])
        .path_arg(&args.media_path)
}

pub fn caption_command(config: &ToolchainConfig, args: &CaptionArgs) -> JobCommand {
    let script = config.bmt_dir.join("sample").join("single_video_prediction.py");
    JobCommand::new(config.python_for("bmt"))
        .path_arg(&script)
        .arg("--duration_in_secs")
        .arg(args.duration_secs.to_string())
        .arg("--rgb_features_path")
        .path_arg(&args.rgb_path)
        .arg("--flow_features_path")
        .path_arg(&args.flow_path)
        .arg("--vggish_features_path")
        .path_arg(&args.vggish_path)
        .arg("--generated_captions_output_path")
        .path_arg(&args.output_path)
        .current_dir(&config.bmt_dir)
}

#[derive(Debug, Deserialize)]
struct FormatListing {
    #[serde(default)]
    formats: Vec<serde_json::Value>,
}

/// Parse the `formats` array of a `yt-dlp -J` document.
///
/// Entries that do not look like encodings (e.g. storyboards without a
/// `format_id`) are skipped.
pub fn parse_format_listing(json: &str) -> MediaResult<Vec<Encoding>> {
    let listing: FormatListing = serde_json::from_str(json)?;
    Ok(listing
        .formats
        .into_iter()
        .filter_map(|f| serde_json::from_value::<Encoding>(f).ok())
        .collect())
}

/// Fail fast with `ToolNotFound` instead of a spawn error.
pub fn ensure_available(program: &Path) -> MediaResult<()> {
    let tool = program.to_string_lossy().into_owned();
    if program.components().count() > 1 {
        if program.is_file() {
            return Ok(());
        }
        return Err(MediaError::ToolNotFound { tool });
    }
    which::which(program)
        .map(|_| ())
        .map_err(|_| MediaError::ToolNotFound { tool })
}

/// Runs jobs as child processes.
#[derive(Debug, Clone)]
pub struct ProcessJobRunner {
    config: ToolchainConfig,
}

impl ProcessJobRunner {
    pub fn new(config: ToolchainConfig) -> Self {
        Self { config }
    }

    async fn run(&self, job: &str, cmd: &JobCommand) -> MediaResult<JobExit> {
        ensure_available(&cmd.program)?;

        debug!(job, command = %cmd.display(), "Running external job");

        let mut command = Command::new(&cmd.program);
        command
            .args(&cmd.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &cmd.cwd {
            command.current_dir(cwd);
        }

        let child = command.spawn()?;
        let timeout = self.config.job_timeout;

        // Dropping the wait future on timeout drops the child, which kills it.
        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(result) => result?,
            Err(_) => {
                warn!(job, timeout_secs = timeout.as_secs(), "External job timed out, killed");
                return Err(MediaError::Timeout(timeout.as_secs()));
            }
        };

        let exit = JobExit {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };

        debug!(
            job,
            exit_code = ?exit.code,
            stdout = %exit.stdout,
            stderr = %exit.stderr,
            "External job finished"
        );

        Ok(exit)
    }
}

#[async_trait]
impl ExternalJobRunner for ProcessJobRunner {
    async fn list_encodings(&self, args: &ListEncodingsArgs) -> MediaResult<Vec<Encoding>> {
        let exit = self
            .run("list_encodings", &list_encodings_command(&self.config, args))
            .await?;
        if !exit.success() {
            return Err(MediaError::job_failed("list_encodings", exit.code, exit.last_line()));
        }
        parse_format_listing(&exit.stdout)
    }

    async fn fetch(&self, args: &FetchArgs) -> MediaResult<JobExit> {
        self.run("fetch", &fetch_command(&self.config, args)).await
    }

    async fn extract_features(&self, args: &FeatureArgs) -> MediaResult<JobExit> {
        let job = match args.modality {
            Modality::Visual => "extract_visual",
            Modality::Audio => "extract_audio",
        };
        self.run(job, &feature_command(&self.config, args)).await
    }

    async fn probe_duration(&self, args: &ProbeArgs) -> MediaResult<JobExit> {
        self.run("probe_duration", &probe_command(&self.config, args)).await
    }

    async fn predict_caption(&self, args: &CaptionArgs) -> MediaResult<JobExit> {
        self.run("predict_caption", &caption_command(&self.config, args)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ToolchainConfig {
        ToolchainConfig {
            feature_env_root: PathBuf::from("/envs"),
            video_features_dir: PathBuf::from("/vf"),
            bmt_dir: PathBuf::from("/bmt"),
            ..Default::default()
        }
    }

    #[test]
    fn test_fetch_command() {
        let cmd = fetch_command(
            &config(),
            &FetchArgs {
                reference: "abc123".into(),
                format_id: "18".into(),
                output: PathBuf::from("/m/.abc123.t.download.mp4"),
            },
        );

        assert_eq!(cmd.program, PathBuf::from("yt-dlp"));
        let args = cmd.args.join(" ");
        assert!(args.contains("-f 18"));
        assert!(args.contains("-o /m/.abc123.t.download.mp4"));
        assert_eq!(cmd.args.last().map(String::as_str), Some("abc123"));
    }

    #[test]
    fn test_feature_command_uses_modality_env() {
        let cmd = feature_command(
            &config(),
            &FeatureArgs {
                modality: Modality::Audio,
                video_path: PathBuf::from("/m/abc123.mp4"),
                output_dir: PathBuf::from("/f/.staging"),
            },
        );

        assert_eq!(cmd.program, PathBuf::from("/envs/vggish/bin/python"));
        assert_eq!(
            cmd.args,
            vec![
                "main.py",
                "--feature_type",
                "vggish",
                "--video_paths",
                "/m/abc123.mp4",
                "--output_path",
                "/f/.staging"
            ]
        );
        assert_eq!(cmd.cwd, Some(PathBuf::from("/vf")));
    }

    #[test]
    fn test_probe_command() {
        let cmd = probe_command(&config(), &ProbeArgs { media_path: "/m/abc123.mp4".into() });
        assert_eq!(
            cmd.display(),
            "ffprobe -hide_banner -loglevel panic -v error -show_entries format=duration \
             -of default=noprint_wrappers=1:nokey=1 /m/abc123.mp4"
        );
    }

    #[test]
    fn test_caption_command() {
        let cmd = caption_command(
            &config(),
            &CaptionArgs {
                duration_secs: 42.5,
                rgb_path: "/f/a_rgb.npy".into(),
                flow_path: "/f/a_flow.npy".into(),
                vggish_path: "/f/a_vggish.npy".into(),
                output_path: "/c/.a.t.prediction.json".into(),
            },
        );

        assert_eq!(cmd.program, PathBuf::from("/envs/bmt/bin/python"));
        assert_eq!(cmd.args[0], "/bmt/sample/single_video_prediction.py");
        assert!(cmd.display().contains("--duration_in_secs 42.5"));
        assert!(cmd
            .display()
            .contains("--generated_captions_output_path /c/.a.t.prediction.json"));
        assert_eq!(cmd.cwd, Some(PathBuf::from("/bmt")));
    }

    #[test]
    fn test_parse_format_listing_skips_non_encodings() {
        let json = r#"{
            "id": "abc123",
            "formats": [
                {"format_id": "sb0", "ext": "mhtml", "vcodec": "none", "acodec": "none"},
                {"format_id": "18", "ext": "mp4", "vcodec": "avc1.42001E", "acodec": "mp4a.40.2", "height": 360, "fps": 30},
                {"ext": "mp4"}
            ]
        }"#;

        let encodings = parse_format_listing(json).unwrap();
        assert_eq!(encodings.len(), 2);
        assert_eq!(encodings[1].format_id, "18");
        assert!(parse_format_listing("not json").is_err());
        assert!(parse_format_listing("{}").unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_tool_is_reported() {
        let runner = ProcessJobRunner::new(ToolchainConfig {
            ffprobe_bin: PathBuf::from("/nonexistent/ffprobe"),
            ..config()
        });

        let err = runner
            .probe_duration(&ProbeArgs { media_path: "/m/x.mp4".into() })
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::ToolNotFound { .. }));
    }

    #[tokio::test]
    async fn test_run_captures_exit_and_output() {
        let runner = ProcessJobRunner::new(config());
        let cmd = JobCommand::new("sh").args(["-c", "echo 42.5; echo oops >&2; exit 3"]);

        let exit = runner.run("test", &cmd).await.unwrap();
        assert_eq!(exit.code, Some(3));
        assert_eq!(exit.stdout.trim(), "42.5");
        assert_eq!(exit.stderr.trim(), "oops");
    }

    #[tokio::test]
    async fn test_run_times_out() {
        let runner = ProcessJobRunner::new(ToolchainConfig {
            job_timeout: Duration::from_millis(100),
            ..config()
        });
        let cmd = JobCommand::new("sh").args(["-c", "sleep 5"]);

        let err = runner.run("test", &cmd).await.unwrap_err();
        assert!(matches!(err, MediaError::Timeout(_)));
    }
}
