//! HTTP access to the results page and the search-by-image resolver.

use std::sync::LazyLock;

use regex::Regex;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE};
use tracing::debug;

use super::filters::encode;
use super::url::{build_search_url, build_similar_url};
use crate::config::Settings;
use crate::error::SearchError;
use crate::models::SearchQuery;

/// Fetches results pages without a browser.
#[derive(Clone)]
pub struct SearchClient {
    client: reqwest::Client,
    endpoint: String,
    similar_endpoint: String,
}

impl SearchClient {
    pub fn new(settings: &Settings) -> Result<Self, reqwest::Error> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("text/html,*/*;q=0.8"));
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));

        let client = reqwest::Client::builder()
            .user_agent(&settings.user_agent)
            .default_headers(headers)
            .timeout(settings.request_timeout())
            .cookie_store(true)
            .build()?;

        Ok(Self {
            client,
            endpoint: settings.search_endpoint.clone(),
            similar_endpoint: settings.similar_endpoint.clone(),
        })
    }

    /// Results-page URL for a query. Fails on bad filters, never touches the network.
    pub fn search_url(&self, query: &SearchQuery) -> Result<String, SearchError> {
        let encoded = encode(query.filters())?;
        Ok(build_search_url(&self.endpoint, query.term(), &encoded))
    }

    /// Fetch a page body as text.
    pub async fn fetch_page(&self, url: &str) -> Result<String, SearchError> {
        debug!("Fetching results page {}", url);
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|source| SearchError::Fetch {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(SearchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        response.text().await.map_err(|source| SearchError::Fetch {
            url: url.to_string(),
            source,
        })
    }

    /// Resolve a seed image into the engine's best-guess query term.
    pub async fn resolve_similar(&self, image_url: &str) -> Result<String, SearchError> {
        url::Url::parse(image_url).map_err(|e| SearchError::InvalidUrl {
            url: image_url.to_string(),
            reason: e.to_string(),
        })?;

        let lookup_url = build_similar_url(&self.similar_endpoint, image_url);
        let page = self.fetch_page(&lookup_url).await?;
        let term = extract_similar_term(&page)
            .ok_or_else(|| SearchError::SimilarUnresolved(image_url.to_string()))?;
        debug!("Seed image {} resolved to query {:?}", image_url, term);
        Ok(term)
    }

    /// Resolve the seed image if the query has one, then build the results URL.
    pub async fn prepare(&self, query: SearchQuery) -> Result<(SearchQuery, String), SearchError> {
        // Validate filters before the seed lookup so bad input never hits the network.
        encode(query.filters())?;

        let query = match query.similar_to() {
            Some(seed) => {
                let term = self.resolve_similar(seed).await?;
                query.with_term(term)
            }
            None => query,
        };
        let url = self.search_url(&query)?;
        Ok((query, url))
    }
}

/// `None` only if the pattern fails to compile, which disables resolution.
static SIMILAR_TERM: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r#"/search\?sa=X&(?:amp;)?q=([^&"']+)"#).ok());

/// Pull the suggested query out of a search-by-image page.
pub fn extract_similar_term(page: &str) -> Option<String> {
    let raw = SIMILAR_TERM.as_ref()?.captures(page)?.get(1)?.as_str();
    let decoded: String = url::form_urlencoded::parse(format!("q={}", raw).as_bytes())
        .map(|(_, v)| v.into_owned())
        .next()?;
    let term = decoded.trim().to_string();
    if term.is_empty() {
        None
    } else {
        Some(term)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FilterError;
    use crate::models::FilterKey;

    #[test]
    fn test_extract_similar_term() {
        assert!(SIMILAR_TERM.is_some());
        let page = r#"<a class="fKDtNb" href="/search?sa=X&amp;q=golden+retriever+puppy&amp;tbm=isch">"#;
        assert_eq!(
            extract_similar_term(page).as_deref(),
            Some("golden retriever puppy")
        );

        let page = r#"<a href="/search?sa=X&q=caf%C3%A9&ved=1">"#;
        assert_eq!(extract_similar_term(page).as_deref(), Some("café"));

        assert_eq!(extract_similar_term("<html>nothing here</html>"), None);
    }

    #[tokio::test]
    async fn test_prepare_rejects_bad_filters_before_network() {
        let settings = Settings {
            similar_endpoint: "http://127.0.0.1:9/unreachable".to_string(),
            ..Default::default()
        };
        let client = SearchClient::new(&settings).unwrap();
        let query = SearchQuery::new("cats", 5)
            .with_filter(FilterKey::Color, "teel")
            .with_similar_to("https://img.example/cat.jpg");

        let err = client.prepare(query).await.unwrap_err();
        assert!(matches!(
            err,
            SearchError::Filter(FilterError::UnsupportedFilterValue { .. })
        ));
    }

    #[test]
    fn test_search_url_uses_configured_endpoint() {
        let settings = Settings {
            search_endpoint: "http://127.0.0.1:8080/search".to_string(),
            ..Default::default()
        };
        let client = SearchClient::new(&settings).unwrap();
        let url = client
            .search_url(&SearchQuery::new("ocean", 5).with_filter(FilterKey::Type, "photo"))
            .unwrap();
        assert!(url.starts_with("http://127.0.0.1:8080/search?q=ocean&"));
        assert!(url.contains("&tbs=itp:photo&"));
    }
}
