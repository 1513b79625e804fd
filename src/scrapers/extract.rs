//! Result extraction from rendered results pages.
//!
//! Each result carries a JSON metadata blob in a `div.rg_meta` element.
//! Extraction is incremental: a [`ResultExtractor`] remembers every source
//! URL it has emitted and only yields new ones on later calls.

use std::collections::HashSet;

use scraper::{Html, Selector};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::models::ImageCandidate;

const META_SELECTOR: &str = "div.rg_meta";

/// Metadata blob as embedded in the page.
#[derive(Debug, Default, Deserialize)]
struct RawMeta {
    /// Original image URL.
    #[serde(default)]
    ou: Option<String>,
    /// Thumbnail URL.
    #[serde(default)]
    tu: Option<String>,
    /// Title.
    #[serde(default)]
    pt: Option<String>,
    /// Referring page.
    #[serde(default)]
    ru: Option<String>,
    /// Host name.
    #[serde(default)]
    rh: Option<String>,
    /// Format.
    #[serde(default)]
    ity: Option<String>,
    #[serde(default)]
    ow: Option<Value>,
    #[serde(default)]
    oh: Option<Value>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn dimension(value: Option<Value>) -> Option<u32> {
    match value? {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn is_http_url(candidate: &str) -> bool {
    url::Url::parse(candidate)
        .map(|u| matches!(u.scheme(), "http" | "https") && u.host_str().is_some())
        .unwrap_or(false)
}

impl RawMeta {
    /// Convert to a candidate; `None` when the source URL is unusable.
    fn into_candidate(self) -> Option<ImageCandidate> {
        let url = non_empty(self.ou).filter(|u| is_http_url(u))?;
        Some(ImageCandidate {
            url,
            thumbnail_url: non_empty(self.tu),
            title: non_empty(self.pt),
            source_page: non_empty(self.ru),
            width: dimension(self.ow),
            height: dimension(self.oh),
            format: non_empty(self.ity).map(|f| f.to_lowercase()),
            host: non_empty(self.rh),
        })
    }
}

/// Incremental extractor bound to one harvest session.
#[derive(Debug, Default)]
pub struct ResultExtractor {
    seen: HashSet<String>,
}

impl ResultExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a URL as already emitted (e.g. from a first-page fetch).
    pub fn mark_seen(&mut self, url: impl Into<String>) {
        self.seen.insert(url.into());
    }

    pub fn seen_count(&self) -> usize {
        self.seen.len()
    }

    /// Candidates on `page` not emitted by an earlier call.
    ///
    /// The page is parsed up front; each metadata blob is decoded only as
    /// the returned iterator is advanced.
    pub fn extract(&mut self, page: &str) -> Extraction<'_> {
        let blobs = collect_meta_blobs(page);
        debug!("Found {} result entries on page", blobs.len());
        Extraction {
            blobs: blobs.into_iter(),
            seen: &mut self.seen,
            malformed: 0,
        }
    }
}

fn collect_meta_blobs(page: &str) -> Vec<String> {
    let document = Html::parse_document(page);
    let selector = match Selector::parse(META_SELECTOR) {
        Ok(selector) => selector,
        Err(_) => return Vec::new(),
    };
    document
        .select(&selector)
        .map(|el| el.text().collect::<String>())
        .collect()
}

/// One pass over a page delta. Consumed once; not restartable.
pub struct Extraction<'a> {
    blobs: std::vec::IntoIter<String>,
    seen: &'a mut HashSet<String>,
    malformed: usize,
}

impl Extraction<'_> {
    /// Entries dropped so far because they were unparseable or had no usable source URL.
    pub fn malformed(&self) -> usize {
        self.malformed
    }
}

impl Iterator for Extraction<'_> {
    type Item = ImageCandidate;

    fn next(&mut self) -> Option<Self::Item> {
        for blob in self.blobs.by_ref() {
            let candidate = serde_json::from_str::<RawMeta>(blob.trim())
                .ok()
                .and_then(RawMeta::into_candidate);

            match candidate {
                Some(candidate) => {
                    if self.seen.insert(candidate.url.clone()) {
                        return Some(candidate);
                    }
                }
                None => {
                    self.malformed += 1;
                    debug!("Dropping malformed result entry");
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(json: &str) -> String {
        format!(r#"<div class="rg_meta notranslate">{}</div>"#, json)
    }

    fn page(entries: &[String]) -> String {
        format!("<html><body>{}</body></html>", entries.concat())
    }

    #[test]
    fn test_extracts_all_fields() {
        let html = page(&[meta(
            r#"{"ou":"https://img.example/a.jpg","tu":"https://thumb.example/a","pt":"Sunset &amp; sea","ru":"https://blog.example/post","rh":"blog.example","ity":"JPG","ow":1920,"oh":"1080"}"#,
        )]);

        let mut extractor = ResultExtractor::new();
        let items: Vec<_> = extractor.extract(&html).collect();

        assert_eq!(items.len(), 1);
        let item = &items[0];
        assert_eq!(item.url, "https://img.example/a.jpg");
        assert_eq!(item.thumbnail_url.as_deref(), Some("https://thumb.example/a"));
        assert_eq!(item.title.as_deref(), Some("Sunset & sea"));
        assert_eq!(item.source_page.as_deref(), Some("https://blog.example/post"));
        assert_eq!(item.host.as_deref(), Some("blog.example"));
        assert_eq!(item.format.as_deref(), Some("jpg"));
        assert_eq!(item.width, Some(1920));
        assert_eq!(item.height, Some(1080));
    }

    #[test]
    fn test_missing_optional_fields_are_empty() {
        let html = page(&[meta(r#"{"ou":"https://img.example/b.png"}"#)]);
        let mut extractor = ResultExtractor::new();
        let items: Vec<_> = extractor.extract(&html).collect();
        assert_eq!(items, vec![ImageCandidate::new("https://img.example/b.png")]);
    }

    #[test]
    fn test_malformed_entries_are_dropped_not_fatal() {
        let html = page(&[
            meta(r#"{"ou":"https://img.example/1.jpg"}"#),
            meta(r#"{"tu":"https://thumb.example/no-source"}"#),
            meta(r#"{"ou":"","pt":"empty source"}"#),
            meta(r#"{"ou":"javascript:alert(1)"}"#),
            meta(r#"{not json"#),
            meta(r#"{"ou":"https://img.example/2.jpg","ow":"wide"}"#),
        ]);

        let mut extractor = ResultExtractor::new();
        let mut extraction = extractor.extract(&html);
        let urls: Vec<String> = extraction.by_ref().map(|c| c.url).collect();

        assert_eq!(
            urls,
            vec!["https://img.example/1.jpg", "https://img.example/2.jpg"]
        );
        assert_eq!(extraction.malformed(), 4);
    }

    #[test]
    fn test_extraction_is_incremental() {
        let first = page(&[
            meta(r#"{"ou":"https://img.example/1.jpg"}"#),
            meta(r#"{"ou":"https://img.example/2.jpg"}"#),
        ]);
        let second = page(&[
            meta(r#"{"ou":"https://img.example/1.jpg"}"#),
            meta(r#"{"ou":"https://img.example/2.jpg"}"#),
            meta(r#"{"ou":"https://img.example/3.jpg"}"#),
        ]);

        let mut extractor = ResultExtractor::new();
        assert_eq!(extractor.extract(&first).count(), 2);
        let delta: Vec<String> = extractor.extract(&second).map(|c| c.url).collect();
        assert_eq!(delta, vec!["https://img.example/3.jpg"]);
        assert_eq!(extractor.extract(&second).count(), 0);
        assert_eq!(extractor.seen_count(), 3);
    }

    #[test]
    fn test_duplicates_within_one_page_emitted_once() {
        let html = page(&[
            meta(r#"{"ou":"https://img.example/1.jpg","pt":"first"}"#),
            meta(r#"{"ou":"https://img.example/1.jpg","pt":"again"}"#),
        ]);
        let mut extractor = ResultExtractor::new();
        let items: Vec<_> = extractor.extract(&html).collect();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title.as_deref(), Some("first"));
    }

    #[test]
    fn test_mark_seen_suppresses_known_urls() {
        let html = page(&[meta(r#"{"ou":"https://img.example/1.jpg"}"#)]);
        let mut extractor = ResultExtractor::new();
        extractor.mark_seen("https://img.example/1.jpg");
        assert_eq!(extractor.extract(&html).count(), 0);
    }

    #[test]
    fn test_page_without_results() {
        let mut extractor = ResultExtractor::new();
        assert_eq!(extractor.extract("<html><body>No results</body></html>").count(), 0);
        assert_eq!(extractor.extract("").count(), 0);
    }
}
