//! Concurrent image download manager.
//!
//! A bounded pool of workers pulls candidates from a shared queue. Each item
//! is fetched, staged next to its destination, validated and only then
//! moved into place, so a failed or rejected fetch never leaves a file at
//! the final path. One bad item never stops the batch.

pub mod storage;
mod types;

use std::collections::{HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use reqwest::header::{CONTENT_TYPE, RETRY_AFTER};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::models::{DownloadOutcome, DownloadReport, FailureKind, ImageCandidate, SkipReason};
use crate::scrapers::retry::is_retryable_status;
use storage::{choose_extension, ensure_unique_path, numbered_filename, stem_for_url, StagedFile};

pub use types::{DownloadConfig, DownloadEvent, DownloadRequest, Naming};

/// Why one attempt failed.
#[derive(Debug)]
struct AttemptError {
    kind: FailureKind,
    message: String,
    retryable: bool,
    retry_after: Option<String>,
}

impl AttemptError {
    fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            retryable: kind.is_retryable(),
            retry_after: None,
        }
    }

    fn from_reqwest(error: reqwest::Error) -> Self {
        let kind = if error.is_timeout() {
            FailureKind::Timeout
        } else if error.is_builder() {
            FailureKind::InvalidUrl
        } else {
            FailureKind::NetworkError
        };
        Self::new(kind, format!("{:#}", anyhow::Error::from(error)))
    }

    fn io(error: std::io::Error) -> Self {
        Self::new(FailureKind::Io, error.to_string())
    }
}

/// Reject anything that is not an absolute http(s) URL with a host.
fn validate_url(raw: &str) -> Result<(), String> {
    let parsed = url::Url::parse(raw).map_err(|e| e.to_string())?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(format!("unsupported scheme '{}'", parsed.scheme()));
    }
    if parsed.host_str().is_none() {
        return Err("missing host".to_string());
    }
    Ok(())
}

/// Fetches and persists images.
#[derive(Clone)]
pub struct DownloadManager {
    client: reqwest::Client,
    config: Arc<DownloadConfig>,
    event_tx: Option<mpsc::Sender<DownloadEvent>>,
}

impl DownloadManager {
    pub fn new(config: DownloadConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            client,
            config: Arc::new(config),
            event_tx: None,
        })
    }

    /// Stream [`DownloadEvent`]s to `tx` as the batch runs.
    pub fn with_events(mut self, tx: mpsc::Sender<DownloadEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    pub fn config(&self) -> &DownloadConfig {
        &self.config
    }

    async fn emit(&self, event: DownloadEvent) {
        if let Some(tx) = &self.event_tx {
            let _ = tx.send(event).await;
        }
    }

    /// Download candidates in order, one report per candidate.
    pub async fn download_all(
        &self,
        candidates: &[ImageCandidate],
        cancel: &CancellationToken,
    ) -> Vec<DownloadReport> {
        let requests = candidates
            .iter()
            .enumerate()
            .map(|(index, candidate)| DownloadRequest::from_candidate(index, candidate))
            .collect();
        self.run_batch(requests, cancel).await
    }

    /// Download a single URL into the output directory without numbering.
    pub async fn download_single(&self, url: &str) -> DownloadReport {
        self.download(0, DownloadRequest::single(url)).await
    }

    /// Run requests through the worker pool; reports come back sorted by index.
    ///
    /// Once `cancel` fires no new item starts. Items already in flight run
    /// to completion; items never started are reported as cancelled.
    pub async fn run_batch(
        &self,
        requests: Vec<DownloadRequest>,
        cancel: &CancellationToken,
    ) -> Vec<DownloadReport> {
        if requests.is_empty() {
            return Vec::new();
        }

        let expected: Vec<(usize, String)> =
            requests.iter().map(|r| (r.index, r.url.clone())).collect();
        let worker_count = self.config.workers.max(1).min(requests.len());
        info!(
            "Downloading {} images with {} workers into {}",
            requests.len(),
            worker_count,
            self.config.output_dir.display()
        );

        let queue = Arc::new(Mutex::new(VecDeque::from(requests)));
        let reports = Arc::new(Mutex::new(Vec::with_capacity(expected.len())));

        let mut workers = JoinSet::new();
        for worker_id in 0..worker_count {
            let manager = self.clone();
            let queue = queue.clone();
            let reports = reports.clone();
            let cancel = cancel.clone();

            workers.spawn(async move {
                loop {
                    if cancel.is_cancelled() {
                        debug!("Worker {} stopping: batch cancelled", worker_id);
                        break;
                    }
                    let Some(request) = queue.lock().await.pop_front() else {
                        break;
                    };
                    let report = manager.download(worker_id, request).await;
                    reports.lock().await.push(report);
                }
            });
        }

        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                warn!("Download worker ended abnormally: {}", e);
            }
        }

        let mut reports = std::mem::take(&mut *reports.lock().await);
        for request in queue.lock().await.drain(..) {
            self.emit(DownloadEvent::Skipped {
                worker_id: 0,
                index: request.index,
                reason: SkipReason::Cancelled,
            })
            .await;
            reports.push(DownloadReport {
                index: request.index,
                url: request.url,
                outcome: DownloadOutcome::Skipped {
                    reason: SkipReason::Cancelled,
                },
                elapsed_ms: 0,
                attempts: 0,
            });
        }

        // A worker that died mid-item leaves no report behind.
        let reported: HashSet<usize> = reports.iter().map(|r| r.index).collect();
        for (index, url) in expected {
            if !reported.contains(&index) {
                reports.push(DownloadReport {
                    index,
                    url,
                    outcome: DownloadOutcome::failed(FailureKind::Io, "download worker failed"),
                    elapsed_ms: 0,
                    attempts: 0,
                });
            }
        }

        reports.sort_by_key(|r| r.index);
        reports
    }

    /// Attempt one item, retrying transient failures.
    async fn download(&self, worker_id: usize, request: DownloadRequest) -> DownloadReport {
        let started = Instant::now();
        self.emit(DownloadEvent::Started {
            worker_id,
            index: request.index,
            url: request.url.clone(),
        })
        .await;

        let mut attempts = 0u32;
        let outcome = if let Err(reason) = validate_url(&request.url) {
            DownloadOutcome::failed(FailureKind::InvalidUrl, reason)
        } else if let Some(existing) = self.existing_destination(&request) {
            debug!("{} already exists, skipping", existing.display());
            DownloadOutcome::Skipped {
                reason: SkipReason::AlreadyExists,
            }
        } else {
            loop {
                match self.attempt(worker_id, &request).await {
                    Ok(outcome) => {
                        attempts += 1;
                        break outcome;
                    }
                    Err(err) => {
                        let delay = err
                            .retryable
                            .then(|| self.config.retry.delay_for(attempts, err.retry_after.as_deref()))
                            .flatten();
                        attempts += 1;
                        match delay {
                            Some(delay) => {
                                debug!(
                                    "Attempt {} for {} failed ({}), retrying in {:?}",
                                    attempts, request.url, err.message, delay
                                );
                                self.emit(DownloadEvent::Retrying {
                                    worker_id,
                                    index: request.index,
                                    attempt: attempts,
                                    delay,
                                })
                                .await;
                                tokio::time::sleep(delay).await;
                            }
                            None => break DownloadOutcome::failed(err.kind, err.message),
                        }
                    }
                }
            }
        };

        let event = match &outcome {
            DownloadOutcome::Saved { path, bytes } => DownloadEvent::Completed {
                worker_id,
                index: request.index,
                path: path.clone(),
                bytes: *bytes,
            },
            DownloadOutcome::Skipped { reason } => DownloadEvent::Skipped {
                worker_id,
                index: request.index,
                reason: *reason,
            },
            DownloadOutcome::Failed { kind, error } => {
                warn!("Failed to download {} ({}): {}", request.url, kind, error);
                DownloadEvent::Failed {
                    worker_id,
                    index: request.index,
                    kind: *kind,
                    error: error.clone(),
                }
            }
        };
        self.emit(event).await;

        DownloadReport {
            index: request.index,
            url: request.url,
            outcome,
            elapsed_ms: started.elapsed().as_millis() as u64,
            attempts,
        }
    }

    /// Destination already on disk, when it can be predicted from the URL.
    ///
    /// URLs without an extension are only checked after the body is sniffed;
    /// see the collision check in [`Self::attempt`].
    fn existing_destination(&self, request: &DownloadRequest) -> Option<PathBuf> {
        if self.config.overwrite || request.naming != Naming::Numbered {
            return None;
        }
        let ext = storage::extension_from_url(&request.url)?;
        let stem = stem_for_url(&request.url, request.title.as_deref());
        let path = self
            .config
            .output_dir
            .join(numbered_filename(request.index, &stem, ext));
        path.exists().then_some(path)
    }

    async fn attempt(
        &self,
        worker_id: usize,
        request: &DownloadRequest,
    ) -> Result<DownloadOutcome, AttemptError> {
        let mut response = self
            .client
            .get(&request.url)
            .send()
            .await
            .map_err(AttemptError::from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            let mut err = AttemptError::new(FailureKind::Corrupt, format!("HTTP {}", status));
            err.retryable = is_retryable_status(status);
            err.retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            return Err(err);
        }

        let min_bytes = self.config.min_bytes;
        let total = response.content_length();
        if let Some(len) = total.filter(|len| *len < min_bytes) {
            return Err(AttemptError::new(
                FailureKind::Corrupt,
                format!("payload of {} bytes is below the {} byte minimum", len, min_bytes),
            ));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let mut staged = StagedFile::create_in(&self.config.output_dir)
            .await
            .map_err(AttemptError::io)?;
        while let Some(chunk) = response.chunk().await.map_err(AttemptError::from_reqwest)? {
            staged.write_chunk(&chunk).await.map_err(AttemptError::io)?;
            self.emit(DownloadEvent::Progress {
                worker_id,
                index: request.index,
                bytes: staged.bytes(),
                total,
            })
            .await;
        }

        let bytes = staged.bytes();
        if bytes == 0 {
            return Err(AttemptError::new(FailureKind::Corrupt, "empty response body"));
        }
        if bytes < min_bytes {
            return Err(AttemptError::new(
                FailureKind::Corrupt,
                format!("payload of {} bytes is below the {} byte minimum", bytes, min_bytes),
            ));
        }

        let dir = &self.config.output_dir;
        let ext = choose_extension(content_type.as_deref(), staged.head(), &request.url);
        let stem = stem_for_url(&request.url, request.title.as_deref());
        let dest = match request.naming {
            Naming::Numbered => dir.join(numbered_filename(request.index, &stem, ext)),
            Naming::Unique if self.config.overwrite => dir.join(format!("{}.{}", stem, ext)),
            Naming::Unique => ensure_unique_path(dir, &stem, ext),
        };

        if request.naming == Naming::Numbered && !self.config.overwrite && dest.exists() {
            debug!("{} already exists, discarding download", dest.display());
            return Ok(DownloadOutcome::Skipped {
                reason: SkipReason::AlreadyExists,
            });
        }

        // persist_noclobber still guards against a file appearing since the check.
        match staged.commit(&dest, self.config.overwrite).await {
            Ok(()) => {
                debug!("Saved {} ({} bytes)", dest.display(), bytes);
                Ok(DownloadOutcome::Saved { path: dest, bytes })
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(DownloadOutcome::Skipped {
                reason: SkipReason::AlreadyExists,
            }),
            Err(e) => Err(AttemptError::io(e)),
        }
    }
}
