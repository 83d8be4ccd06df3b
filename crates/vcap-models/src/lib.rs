//! Shared data models for the video caption pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Content identifiers and reference parsing
//! - Media, feature and caption artifacts
//! - The on-disk artifact layout
//! - Pipeline stages, requests and the surfaced response shapes

pub mod artifact;
pub mod content_id;
pub mod layout;
pub mod pipeline;
pub mod utils;

// Re-export common types
pub use artifact::{
    CaptionArtifact, Encoding, FeatureArtifact, FeatureFile, FeatureSet, FeatureStream, MediaArtifact,
    Modality,
};
pub use content_id::ContentId;
pub use layout::ArtifactLayout;
pub use pipeline::{CaptionRequest, FailurePayload, PipelineRequest, PipelineStage};
pub use utils::{extract_content_id, extract_youtube_id, ContentIdError, ContentIdResult};
