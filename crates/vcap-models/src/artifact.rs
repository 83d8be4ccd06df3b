//! Pipeline artifact models.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::content_id::ContentId;

/// One encoding of a media reference as reported by the fetch service.
///
/// Mirrors the subset of a yt-dlp `formats[]` entry the acquirer ranks on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Encoding {
    /// Fetch-service format identifier (passed back to select this encoding)
    pub format_id: String,
    /// Container extension (e.g. "mp4", "webm")
    #[serde(default)]
    pub ext: String,
    /// Video codec, "none" for audio-only encodings
    #[serde(default)]
    pub vcodec: Option<String>,
    /// Audio codec, "none" for video-only encodings
    #[serde(default)]
    pub acodec: Option<String>,
    /// Frame height in pixels
    #[serde(default)]
    pub height: Option<u32>,
    /// Frames per second
    #[serde(default)]
    pub fps: Option<f64>,
    /// File size in bytes, when known
    #[serde(default)]
    pub filesize: Option<u64>,
}

impl Encoding {
    /// Whether this encoding carries both a video and an audio stream.
    pub fn is_progressive(&self) -> bool {
        has_codec(&self.vcodec) && has_codec(&self.acodec)
    }

    /// Whether this encoding uses the given container.
    pub fn has_container(&self, container: &str) -> bool {
        self.ext.eq_ignore_ascii_case(container)
    }
}

fn has_codec(codec: &Option<String>) -> bool {
    codec
        .as_deref()
        .map(|c| !c.is_empty() && c != "none")
        .unwrap_or(false)
}

/// Downloaded media file for a content identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaArtifact {
    pub content_id: ContentId,
    /// Final location in the media root
    pub path: PathBuf,
    /// Container format
    pub container: String,
    /// Encoding that was fetched; `None` when an existing artifact was reused
    pub encoding: Option<Encoding>,
    /// File size in bytes
    pub size_bytes: u64,
}

/// Independent feature modality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Modality {
    /// Visual/motion features (I3D)
    Visual,
    /// Audio features (VGGish)
    Audio,
}

impl Modality {
    pub const ALL: [Modality; 2] = [Modality::Visual, Modality::Audio];

    pub fn as_str(&self) -> &'static str {
        match self {
            Modality::Visual => "visual",
            Modality::Audio => "audio",
        }
    }

    /// Feature type selector understood by the extraction job.
    pub fn feature_type(&self) -> &'static str {
        match self {
            Modality::Visual => "i3d",
            Modality::Audio => "vggish",
        }
    }

    /// Feature streams this modality produces.
    pub fn streams(&self) -> &'static [FeatureStream] {
        match self {
            Modality::Visual => &[FeatureStream::Rgb, FeatureStream::Flow],
            Modality::Audio => &[FeatureStream::Vggish],
        }
    }
}

impl fmt::Display for Modality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single feature file stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureStream {
    /// I3D appearance stream
    Rgb,
    /// I3D optical-flow (motion) stream
    Flow,
    /// VGGish audio embedding
    Vggish,
}

impl FeatureStream {
    /// Filename suffix used by the extraction job (`{stem}_{suffix}.npy`).
    pub fn suffix(&self) -> &'static str {
        match self {
            FeatureStream::Rgb => "rgb",
            FeatureStream::Flow => "flow",
            FeatureStream::Vggish => "vggish",
        }
    }

    /// Output filename for a media stem.
    pub fn file_name(&self, stem: &str) -> String {
        format!("{}_{}.npy", stem, self.suffix())
    }
}

/// A verified feature file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureFile {
    pub stream: FeatureStream,
    pub path: PathBuf,
}

/// Feature files produced for one modality.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureArtifact {
    pub modality: Modality,
    pub files: Vec<FeatureFile>,
}

impl FeatureArtifact {
    /// Path of a stream belonging to this modality.
    pub fn path(&self, stream: FeatureStream) -> Option<&Path> {
        self.files
            .iter()
            .find(|f| f.stream == stream)
            .map(|f| f.path.as_path())
    }
}

/// Both modalities' features for one content identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSet {
    pub visual: FeatureArtifact,
    pub audio: FeatureArtifact,
}

impl FeatureSet {
    /// Path of a stream in either modality.
    pub fn path(&self, stream: FeatureStream) -> Option<&Path> {
        self.visual.path(stream).or_else(|| self.audio.path(stream))
    }
}

/// Final structured caption for a content identifier.
///
/// The document is produced by the captioning job and passed through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CaptionArtifact(serde_json::Value);

impl CaptionArtifact {
    pub fn new(payload: serde_json::Value) -> Self {
        Self(payload)
    }

    /// Parse a caption document.
    pub fn from_slice(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes).map(Self)
    }

    /// The caption document.
    pub fn payload(&self) -> &serde_json::Value {
        &self.0
    }

    pub fn into_payload(self) -> serde_json::Value {
        self.0
    }

    /// Serialize for persistence.
    pub fn to_vec(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec_pretty(&self.0)
    }
}
