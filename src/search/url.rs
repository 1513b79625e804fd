//! Search URL construction.
//!
//! Parameter order and spelling match what the engine's own result pages
//! link to; only the endpoint is configurable.

use url::form_urlencoded;

use super::filters::EncodedFilters;

/// Default image search endpoint.
pub const DEFAULT_SEARCH_ENDPOINT: &str = "https://www.google.com/search";

/// Default search-by-image endpoint used to resolve seed images.
pub const DEFAULT_SIMILAR_ENDPOINT: &str = "https://www.google.com/searchbyimage";

const IMAGE_SEARCH_PARAMS: &str = "&espv=2&biw=1366&bih=667&site=webhp&source=lnms&tbm=isch";
const TRAILING_PARAMS: &str = "&sa=X&ei=XosDVaCXD8TasATItgE&ved=0CAcQ_AUoAg";

/// Encode a free-text term with form semantics (spaces become `+`).
pub fn encode_term(term: &str) -> String {
    form_urlencoded::byte_serialize(term.as_bytes()).collect()
}

/// Build the results-page URL for a term and its encoded filters.
pub fn build_search_url(endpoint: &str, term: &str, filters: &EncodedFilters) -> String {
    let mut url = format!("{}?q={}", endpoint, encode_term(term));

    if let Some(site) = filters.site() {
        url.push_str("&as_sitesearch=");
        url.push_str(&urlencoding::encode(site));
    }

    url.push_str(IMAGE_SEARCH_PARAMS);

    if let Some(tbs) = filters.tbs() {
        url.push_str("&tbs=");
        url.push_str(&tbs);
    }

    if let Some(language) = filters.language() {
        url.push_str("&lr=");
        url.push_str(language);
    }

    url.push_str(TRAILING_PARAMS);

    if filters.safe_search() {
        url.push_str("&safe=active");
    }

    url
}

/// Build the search-by-image URL for a seed image.
pub fn build_similar_url(endpoint: &str, image_url: &str) -> String {
    format!(
        "{}?site=search&sa=X&image_url={}",
        endpoint,
        urlencoding::encode(image_url)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FilterKey, FilterSet};
    use crate::search::filters::encode;

    fn query_pairs(url: &str) -> Vec<(String, String)> {
        url::Url::parse(url)
            .unwrap()
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect()
    }

    fn param(url: &str, name: &str) -> Option<String> {
        query_pairs(url)
            .into_iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v)
    }

    fn url_for(term: &str, filters: FilterSet) -> String {
        build_search_url(DEFAULT_SEARCH_ENDPOINT, term, &encode(&filters).unwrap())
    }

    #[test]
    fn test_plain_query() {
        let url = url_for("dogs", FilterSet::new());
        assert_eq!(
            url,
            "https://www.google.com/search?q=dogs&espv=2&biw=1366&bih=667&site=webhp\
             &source=lnms&tbm=isch&sa=X&ei=XosDVaCXD8TasATItgE&ved=0CAcQ_AUoAg"
        );
        assert_eq!(param(&url, "tbs"), None);
        assert_eq!(param(&url, "safe"), None);
    }

    #[test]
    fn test_term_uses_form_encoding() {
        let url = url_for("café au lait", FilterSet::new());
        assert!(url.contains("q=caf%C3%A9+au+lait"));
        assert!(!url.contains("caf%25C3%25A9"));
    }

    #[test]
    fn test_tbs_parameter_carries_filters() {
        let url = url_for(
            "ocean",
            FilterSet::new()
                .with(FilterKey::Color, "blue")
                .with(FilterKey::Type, "photo")
                .with(FilterKey::Size, "large"),
        );
        assert!(url.contains("&tbm=isch&tbs=ic:specific,isc:blue,isz:l,itp:photo&sa=X"));
        assert_eq!(
            param(&url, "tbs").as_deref(),
            Some("ic:specific,isc:blue,isz:l,itp:photo")
        );
    }

    #[test]
    fn test_language_safe_search_and_site() {
        let url = url_for(
            "flowers",
            FilterSet::new()
                .with(FilterKey::Language, "English")
                .with(FilterKey::SafeSearch, "on")
                .with(FilterKey::Site, "example.org"),
        );
        assert_eq!(param(&url, "lr").as_deref(), Some("lang_en"));
        assert_eq!(param(&url, "safe").as_deref(), Some("active"));
        assert_eq!(param(&url, "as_sitesearch").as_deref(), Some("example.org"));
        assert!(url.ends_with("&safe=active"));
    }

    #[test]
    fn test_safe_search_off_omits_param() {
        let url = url_for(
            "puppies",
            FilterSet::new().with(FilterKey::SafeSearch, "off"),
        );
        assert_eq!(param(&url, "safe"), None);
    }

    #[test]
    fn test_similar_url_encodes_seed() {
        let url = build_similar_url(
            DEFAULT_SIMILAR_ENDPOINT,
            "https://img.example/cat.jpg?size=2",
        );
        assert_eq!(
            param(&url, "image_url").as_deref(),
            Some("https://img.example/cat.jpg?size=2")
        );
    }
}
