//! Service layer for imgharvest.
//!
//! Download management and the end-to-end pipeline, usable from the CLI or
//! embedded in other tools.

pub mod download;
pub mod pipeline;

pub use download::{DownloadConfig, DownloadEvent, DownloadManager, DownloadRequest};
pub use pipeline::{Pipeline, RunReport, SearchOutcome, Shortfall};
