//! Typed errors for the search, harvest, and download pipeline.
//!
//! Uses `thiserror` for library errors; the binary wraps them in `anyhow`.

use thiserror::Error;

use crate::models::FilterKey;

/// Errors raised while turning filter options into engine query parameters.
///
/// These are caller input errors and are always raised before any network
/// activity takes place.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterError {
    /// The value is not in the key's token table.
    #[error("unsupported value {value:?} for filter '{key}'")]
    UnsupportedFilterValue { key: FilterKey, value: String },

    /// The key is not one of the recognized filter names.
    #[error("unknown filter '{0}'")]
    UnknownFilterKey(String),

    /// Two filters write the same engine token.
    #[error("filters '{first}' and '{second}' cannot be combined")]
    ConflictingFilters { first: FilterKey, second: FilterKey },
}

/// Errors raised while provisioning a browser driver.
#[derive(Debug, Error)]
pub enum ProvisionError {
    /// Every provisioning step failed. Each entry is `"<step>: <reason>"`.
    #[error("no browser driver available (tried: {})", attempts.join("; "))]
    NoDriverAvailable { attempts: Vec<String> },
}

/// Errors from a single provisioning step or a driver launch.
#[derive(Debug, Error)]
pub enum DriverError {
    /// The step has nothing to offer (e.g. no explicit path configured).
    #[error("not configured")]
    NotConfigured,

    /// The resolved executable does not exist or is not a file.
    #[error("executable not found: {0}")]
    NotFound(String),

    /// The managed installer failed (network, archive, platform).
    #[error("managed install failed: {0}")]
    Install(String),

    /// The browser process could not be started or connected to.
    #[error("launch failed: {0}")]
    Launch(String),

    /// A command sent to a running browser failed.
    #[error("browser command failed: {0}")]
    Command(String),
}

/// Errors that abort extended harvesting.
#[derive(Debug, Error)]
pub enum HarvestError {
    /// No driver could be provisioned.
    #[error(transparent)]
    Provision(#[from] ProvisionError),
}

/// Errors from single-page search.
#[derive(Debug, Error)]
pub enum SearchError {
    /// Filter encoding failed.
    #[error(transparent)]
    Filter(#[from] FilterError),

    /// The results page could not be fetched.
    #[error("failed to fetch results page {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The results page answered with a non-success status.
    #[error("results page {url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    /// The search-by-image page did not yield a query term.
    #[error("could not resolve a query from seed image {0}")]
    SimilarUnresolved(String),

    /// The configured endpoint or seed URL could not be parsed.
    #[error("invalid URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
}
