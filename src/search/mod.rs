//! Query encoding and single-page search.
//!
//! [`filters`] turns a [`FilterSet`](crate::models::FilterSet) into engine
//! tokens, [`url`] assembles the results-page URL, and [`SearchClient`]
//! fetches that page over plain HTTP.

pub mod client;
pub mod filters;
pub mod url;

pub use client::SearchClient;
pub use filters::{encode, EncodedFilters};
pub use self::url::{build_search_url, DEFAULT_SEARCH_ENDPOINT, DEFAULT_SIMILAR_ENDPOINT};
