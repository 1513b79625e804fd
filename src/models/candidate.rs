//! Image candidates discovered on a results page.

use serde::{Deserialize, Serialize};

/// A discovered, not-yet-downloaded image reference.
///
/// Identity is the source image URL; everything else is optional metadata
/// that may be missing on partially loaded result entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageCandidate {
    /// Direct URL of the full-size image.
    pub url: String,
    pub thumbnail_url: Option<String>,
    /// Title or alt text shown with the result.
    pub title: Option<String>,
    /// Page the image was found on.
    pub source_page: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    /// Declared format (e.g. "jpg", "png").
    pub format: Option<String>,
    pub host: Option<String>,
}

impl ImageCandidate {
    /// Create a candidate with only the source URL set.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            thumbnail_url: None,
            title: None,
            source_page: None,
            width: None,
            height: None,
            format: None,
            host: None,
        }
    }

    /// Dedup key.
    pub fn key(&self) -> &str {
        &self.url
    }
}
