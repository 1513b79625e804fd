//! Domain models shared across the search, harvest, and download stages.

mod candidate;
mod filter;
mod outcome;
mod query;

pub use candidate::ImageCandidate;
pub use filter::{FilterKey, FilterSet};
pub use outcome::{BatchSummary, DownloadOutcome, DownloadReport, FailureKind, SkipReason};
pub use query::SearchQuery;
