//! Pipeline state machine.

use std::fmt;

use vcap_models::PipelineStage;

/// States a pipeline run moves through.
///
/// `Start → IdentifierResolved → CacheChecked → CacheHit → Done`, or on a
/// miss `CacheMiss → Acquiring → FeaturesExtracting → DurationProbed →
/// Predicting → Cached → Done`. Any stage may move to the absorbing
/// `Failed` state instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Start,
    IdentifierResolved,
    CacheChecked,
    CacheHit,
    CacheMiss,
    Acquiring,
    FeaturesExtracting,
    DurationProbed,
    Predicting,
    Cached,
    Done,
    Failed(PipelineStage),
}

impl PipelineState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineState::Start => "start",
            PipelineState::IdentifierResolved => "identifier_resolved",
            PipelineState::CacheChecked => "cache_checked",
            PipelineState::CacheHit => "cache_hit",
            PipelineState::CacheMiss => "cache_miss",
            PipelineState::Acquiring => "acquiring",
            PipelineState::FeaturesExtracting => "features_extracting",
            PipelineState::DurationProbed => "duration_probed",
            PipelineState::Predicting => "predicting",
            PipelineState::Cached => "cached",
            PipelineState::Done => "done",
            PipelineState::Failed(_) => "failed",
        }
    }

    /// Stage whose work runs while in this state.
    pub fn stage(&self) -> Option<PipelineStage> {
        match self {
            PipelineState::Start => Some(PipelineStage::IdentifierExtractor),
            PipelineState::IdentifierResolved | PipelineState::CacheChecked => {
                Some(PipelineStage::ResultCache)
            }
            PipelineState::Acquiring => Some(PipelineStage::MediaAcquirer),
            PipelineState::FeaturesExtracting => Some(PipelineStage::FeatureExtractor),
            PipelineState::DurationProbed => Some(PipelineStage::DurationProbe),
            PipelineState::Predicting => Some(PipelineStage::CaptionPredictor),
            PipelineState::Failed(stage) => Some(*stage),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineState::Done | PipelineState::Failed(_))
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineState::Failed(stage) => write!(f, "failed({})", stage),
            other => f.write_str(other.as_str()),
        }
    }
}
