//! Content identifier.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum length of a content identifier.
pub const MAX_CONTENT_ID_LEN: usize = 64;

/// Stable key derived from a media reference.
///
/// Used as the cache key and as the filename prefix of every derived
/// artifact. Only constructed through [`crate::extract_content_id`] or
/// [`ContentId::parse`], so the inner string is always a safe path component
/// (`[A-Za-z0-9_-]`, 1..=64 chars).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ContentId(String);

impl ContentId {
    /// Validate a raw token as a content identifier.
    pub fn parse(raw: &str) -> Option<Self> {
        if is_valid_content_id(raw) {
            Some(Self(raw.to_string()))
        } else {
            None
        }
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for ContentId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl<'de> Deserialize<'de> for ContentId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        ContentId::parse(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid content id: {raw:?}")))
    }
}

/// Check whether a token only uses characters that are safe in a path component.
pub(crate) fn is_valid_content_id(s: &str) -> bool {
    !s.is_empty()
        && s.len() <= MAX_CONTENT_ID_LEN
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}
