//! imgharvest: image search harvesting and batch downloads.
//!
//! Filter options are encoded into the engine's query grammar, the first
//! results page is fetched and parsed, a headless browser extends the result
//! set when one page is not enough, and a worker pool downloads the images.

pub mod cli;
pub mod config;
pub mod error;
pub mod models;
pub mod scrapers;
pub mod search;
pub mod services;

pub use config::Settings;
pub use error::{DriverError, FilterError, HarvestError, ProvisionError, SearchError};
pub use models::{
    BatchSummary, DownloadOutcome, DownloadReport, FailureKind, FilterKey, FilterSet,
    ImageCandidate, SearchQuery, SkipReason,
};
pub use services::{Pipeline, RunReport, SearchOutcome, Shortfall};
