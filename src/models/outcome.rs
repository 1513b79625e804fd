//! Per-candidate download outcomes and batch summaries.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Why a candidate was not fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The batch was cancelled before this candidate started.
    Cancelled,
    /// The destination file already exists and overwriting is disabled.
    AlreadyExists,
}

/// Classification of a failed download.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Non-success status, empty body, or payload below the size threshold.
    Corrupt,
    Timeout,
    NetworkError,
    InvalidUrl,
    /// The payload could not be written to disk.
    Io,
}

impl FailureKind {
    /// Whether another attempt could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, FailureKind::Timeout | FailureKind::NetworkError)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Corrupt => "corrupt",
            FailureKind::Timeout => "timeout",
            FailureKind::NetworkError => "network_error",
            FailureKind::InvalidUrl => "invalid_url",
            FailureKind::Io => "io",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of attempting one candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DownloadOutcome {
    Saved { path: PathBuf, bytes: u64 },
    Skipped { reason: SkipReason },
    Failed { kind: FailureKind, error: String },
}

impl DownloadOutcome {
    pub fn failed(kind: FailureKind, error: impl Into<String>) -> Self {
        DownloadOutcome::Failed {
            kind,
            error: error.into(),
        }
    }

    pub fn is_saved(&self) -> bool {
        matches!(self, DownloadOutcome::Saved { .. })
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            DownloadOutcome::Failed { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

/// Outcome plus bookkeeping for one candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadReport {
    /// Position of the candidate in the batch (discovery order).
    pub index: usize,
    pub url: String,
    #[serde(flatten)]
    pub outcome: DownloadOutcome,
    pub elapsed_ms: u64,
    /// Number of fetch attempts made (0 when skipped).
    pub attempts: u32,
}

/// Aggregate counts for a batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub saved: usize,
    pub skipped: usize,
    pub failed: usize,
    pub bytes: u64,
}

impl BatchSummary {
    pub fn from_reports(reports: &[DownloadReport]) -> Self {
        reports
            .iter()
            .fold(Self::default(), |mut summary, report| {
                match &report.outcome {
                    DownloadOutcome::Saved { bytes, .. } => {
                        summary.saved += 1;
                        summary.bytes += bytes;
                    }
                    DownloadOutcome::Skipped { .. } => summary.skipped += 1,
                    DownloadOutcome::Failed { .. } => summary.failed += 1,
                }
                summary
            })
    }

    pub fn total(&self) -> usize {
        self.saved + self.skipped + self.failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(index: usize, outcome: DownloadOutcome) -> DownloadReport {
        DownloadReport {
            index,
            url: format!("https://img.example/{}.jpg", index),
            outcome,
            elapsed_ms: 5,
            attempts: 1,
        }
    }

    #[test]
    fn test_summary_counts_each_outcome() {
        let reports = vec![
            report(
                0,
                DownloadOutcome::Saved {
                    path: PathBuf::from("a.jpg"),
                    bytes: 2048,
                },
            ),
            report(
                1,
                DownloadOutcome::Skipped {
                    reason: SkipReason::Cancelled,
                },
            ),
            report(2, DownloadOutcome::failed(FailureKind::Timeout, "timed out")),
            report(
                3,
                DownloadOutcome::Saved {
                    path: PathBuf::from("b.jpg"),
                    bytes: 1024,
                },
            ),
        ];

        let summary = BatchSummary::from_reports(&reports);
        assert_eq!(summary.saved, 2);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.bytes, 3072);
        assert_eq!(summary.total(), 4);
    }

    #[test]
    fn test_report_serializes_with_status_tag() {
        let json = serde_json::to_value(report(
            7,
            DownloadOutcome::failed(FailureKind::Corrupt, "payload too small"),
        ))
        .unwrap();

        assert_eq!(json["status"], "failed");
        assert_eq!(json["kind"], "corrupt");
        assert_eq!(json["index"], 7);
    }

    #[test]
    fn test_only_transient_failures_retry() {
        assert!(FailureKind::Timeout.is_retryable());
        assert!(FailureKind::NetworkError.is_retryable());
        assert!(!FailureKind::Corrupt.is_retryable());
        assert!(!FailureKind::InvalidUrl.is_retryable());
        assert!(!FailureKind::Io.is_retryable());
    }
}
