//! Download manager types and events.

use std::path::PathBuf;
use std::time::Duration;

use crate::config::Settings;
use crate::models::{FailureKind, ImageCandidate, SkipReason};
use crate::scrapers::retry::RetryPolicy;

/// Events emitted during download operations.
#[derive(Debug, Clone)]
pub enum DownloadEvent {
    /// A worker picked up a candidate.
    Started {
        worker_id: usize,
        index: usize,
        url: String,
    },
    /// Bytes received so far for one candidate.
    Progress {
        worker_id: usize,
        index: usize,
        bytes: u64,
        total: Option<u64>,
    },
    /// A transient failure; the candidate will be attempted again.
    Retrying {
        worker_id: usize,
        index: usize,
        attempt: u32,
        delay: Duration,
    },
    /// Saved to disk.
    Completed {
        worker_id: usize,
        index: usize,
        path: PathBuf,
        bytes: u64,
    },
    Skipped {
        worker_id: usize,
        index: usize,
        reason: SkipReason,
    },
    Failed {
        worker_id: usize,
        index: usize,
        kind: FailureKind,
        error: String,
    },
}

/// Configuration for the download manager.
#[derive(Debug, Clone)]
pub struct DownloadConfig {
    pub output_dir: PathBuf,
    pub user_agent: String,
    /// Bound on one attempt, connect through last body byte.
    pub request_timeout: Duration,
    /// Concurrent workers; at least one.
    pub workers: usize,
    pub retry: RetryPolicy,
    /// Payloads smaller than this are rejected as corrupt.
    pub min_bytes: u64,
    pub overwrite: bool,
}

impl DownloadConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            output_dir: settings.output_dir.clone(),
            user_agent: settings.user_agent.clone(),
            request_timeout: settings.request_timeout(),
            workers: settings.download_workers.max(1),
            retry: RetryPolicy::new(settings.max_retries, settings.retry_base_ms),
            min_bytes: settings.min_image_bytes,
            overwrite: settings.overwrite,
        }
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }
}

/// How the destination file name is formed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Naming {
    /// `N. stem.ext`, N being the one-based batch position.
    Numbered,
    /// `stem.ext`, suffixed ` (n)` if taken.
    Unique,
}

/// One unit of work for a worker.
#[derive(Debug, Clone)]
pub struct DownloadRequest {
    /// Zero-based position in the batch.
    pub index: usize,
    pub url: String,
    /// Name to use when the URL has none (usually the result title).
    pub title: Option<String>,
    pub naming: Naming,
}

impl DownloadRequest {
    pub fn from_candidate(index: usize, candidate: &ImageCandidate) -> Self {
        Self {
            index,
            url: candidate.url.clone(),
            title: candidate.title.clone(),
            naming: Naming::Numbered,
        }
    }

    pub fn single(url: impl Into<String>) -> Self {
        Self {
            index: 0,
            url: url.into(),
            title: None,
            naming: Naming::Unique,
        }
    }
}
