//! Reference parsing and content identifier extraction.
//!
//! A media reference is either a YouTube URL or a bare identifier token.
//! References are treated as untrusted input: the extracted identifier is
//! strictly validated before it is ever used as a cache key or path component.

use thiserror::Error;
use url::Url;

use crate::content_id::{is_valid_content_id, ContentId};

/// Errors that can occur during content identifier extraction.
///
/// Every variant surfaces as `InvalidReferenceError`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContentIdError {
    /// Reference is empty or whitespace
    #[error("Reference is empty")]
    Empty,
    /// Reference is neither a URL nor a bare identifier
    #[error("Reference does not match a supported addressing scheme")]
    UnsupportedReference,
    /// URL is not a valid YouTube URL
    #[error("URL is not a valid YouTube URL")]
    InvalidYoutubeUrl,
    /// Video ID has invalid format
    #[error("Video ID has invalid format")]
    InvalidVideoId,
    /// Video ID not found in URL
    #[error("Video ID not found in URL")]
    VideoIdNotFound,
}

/// Result type for content identifier extraction.
pub type ContentIdResult<T> = Result<T, ContentIdError>;

/// Derive the content identifier for a media reference.
///
/// - A bare token (`[A-Za-z0-9_-]`, up to 64 chars) is its own identifier
/// - A YouTube URL yields its 11-character video ID
///
/// Pure and deterministic: the same reference always yields the same identifier.
pub fn extract_content_id(reference: &str) -> ContentIdResult<ContentId> {
    let reference = reference.trim();

    if reference.is_empty() {
        return Err(ContentIdError::Empty);
    }

    if is_valid_content_id(reference) {
        return ContentId::parse(reference).ok_or(ContentIdError::UnsupportedReference);
    }

    let id = extract_youtube_id(reference)?;
    ContentId::parse(&id).ok_or(ContentIdError::InvalidVideoId)
}

/// Extract the YouTube video ID from a URL.
///
/// Supports:
/// - https://youtube.com/watch?v=VIDEO_ID (also `&v=`)
/// - https://youtu.be/VIDEO_ID
/// - https://youtube.com/embed/VIDEO_ID, /v/VIDEO_ID, /shorts/VIDEO_ID, /live/VIDEO_ID
/// - Missing scheme, mixed-case hosts, extra query parameters and fragments
pub fn extract_youtube_id(url: &str) -> ContentIdResult<String> {
    let url = url.trim();
    let parsed = parse_reference_url(url).ok_or(ContentIdError::UnsupportedReference)?;

    let host = parsed
        .host_str()
        .map(|h| h.to_ascii_lowercase())
        .ok_or(ContentIdError::UnsupportedReference)?;

    if !is_youtube_host(&host) {
        return Err(ContentIdError::InvalidYoutubeUrl);
    }

    let candidate = if host == "youtu.be" {
        first_path_segment(&parsed)
    } else {
        extract_from_query(&parsed).or_else(|| extract_from_path(&parsed))
    };

    let id = candidate.ok_or(ContentIdError::VideoIdNotFound)?;
    validate_youtube_id(id)
}

/// Parse a reference as an http(s) URL, tolerating a missing scheme.
fn parse_reference_url(reference: &str) -> Option<Url> {
    let parsed = if reference.contains("://") {
        Url::parse(reference).ok()?
    } else {
        Url::parse(&format!("https://{}", reference)).ok()?
    };

    match parsed.scheme() {
        "http" | "https" => Some(parsed),
        _ => None,
    }
}

fn is_youtube_host(host: &str) -> bool {
    host == "youtu.be"
        || host == "youtube.com"
        || host.ends_with(".youtube.com")
        || host == "youtube-nocookie.com"
        || host.ends_with(".youtube-nocookie.com")
}

fn first_path_segment(url: &Url) -> Option<String> {
    url.path_segments()
        .and_then(|mut segments| segments.next())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Extract ID from `?v=VIDEO_ID` / `&v=VIDEO_ID`
fn extract_from_query(url: &Url) -> Option<String> {
    url.query_pairs()
        .find(|(key, _)| key == "v")
        .map(|(_, value)| value.trim().to_string())
}

/// Extract ID from `/embed/`, `/v/`, `/shorts/` and `/live/` paths
fn extract_from_path(url: &Url) -> Option<String> {
    let segments: Vec<&str> = url.path_segments()?.collect();
    match segments.as_slice() {
        [prefix, id, ..] if matches!(*prefix, "embed" | "v" | "shorts" | "live") && !id.is_empty() => {
            Some((*id).to_string())
        }
        _ => None,
    }
}

/// YouTube video IDs are exactly 11 characters of `[A-Za-z0-9_-]`.
fn validate_youtube_id(id: String) -> ContentIdResult<String> {
    if id.len() != 11 || !is_valid_content_id(&id) {
        return Err(ContentIdError::InvalidVideoId);
    }
    Ok(id)
}
