//! Search query definition.

use super::{FilterKey, FilterSet};

/// A fully specified search request.
///
/// Built once with the `with_*` methods and then shared read-only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    term: String,
    filters: FilterSet,
    limit: usize,
    similar_to: Option<String>,
}

impl SearchQuery {
    pub fn new(term: impl Into<String>, limit: usize) -> Self {
        Self {
            term: term.into(),
            filters: FilterSet::new(),
            limit,
            similar_to: None,
        }
    }

    pub fn with_filters(mut self, filters: FilterSet) -> Self {
        self.filters = filters;
        self
    }

    pub fn with_filter(mut self, key: FilterKey, value: impl Into<String>) -> Self {
        self.filters.insert(key, value);
        self
    }

    /// Search for images similar to the image at `url` instead of by term.
    pub fn with_similar_to(mut self, url: impl Into<String>) -> Self {
        self.similar_to = Some(url.into());
        self
    }

    /// Replace the term, keeping filters and limit. Used once a seed image
    /// has been resolved to a query.
    pub fn with_term(mut self, term: impl Into<String>) -> Self {
        self.term = term.into();
        self
    }

    pub fn term(&self) -> &str {
        &self.term
    }

    pub fn filters(&self) -> &FilterSet {
        &self.filters
    }

    /// Requested number of results.
    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn similar_to(&self) -> Option<&str> {
        self.similar_to.as_deref()
    }

    /// Target-site restriction, if any.
    pub fn site(&self) -> Option<&str> {
        self.filters.get(FilterKey::Site)
    }
}
