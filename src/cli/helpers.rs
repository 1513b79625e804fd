//! Shared helper functions for CLI commands.

use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::mpsc;

use crate::models::{BatchSummary, DownloadOutcome, DownloadReport};
use crate::services::{DownloadEvent, Shortfall};

/// Truncate a string to `max` characters, adding "..." when cut.
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Split a `key=value` filter argument.
pub fn parse_filter_arg(arg: &str) -> Result<(String, String), String> {
    let (key, value) = arg
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{}'", arg))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("missing filter name in '{}'", arg));
    }
    Ok((key.to_string(), value.trim().to_string()))
}

/// Progress bar for a download batch.
pub fn download_progress(len: usize) -> ProgressBar {
    let bar = ProgressBar::new(len as u64);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );
    bar
}

/// Drive `bar` from download events until the sender side closes.
pub async fn track_progress(mut rx: mpsc::Receiver<DownloadEvent>, bar: ProgressBar) {
    while let Some(event) = rx.recv().await {
        match event {
            DownloadEvent::Completed { .. }
            | DownloadEvent::Skipped { .. }
            | DownloadEvent::Failed { .. } => bar.inc(1),
            DownloadEvent::Retrying { index, attempt, .. } => {
                bar.set_message(format!("retrying #{} (attempt {})", index + 1, attempt + 1));
            }
            DownloadEvent::Started { .. } | DownloadEvent::Progress { .. } => {}
        }
    }
    bar.finish_and_clear();
}

/// One line per report.
pub fn print_reports(reports: &[DownloadReport]) {
    for report in reports {
        let line = match &report.outcome {
            DownloadOutcome::Saved { path, bytes } => format!(
                "{} {} ({} bytes)",
                style("✓").green(),
                path.display(),
                bytes
            ),
            DownloadOutcome::Skipped { reason } => format!(
                "{} {} (skipped: {:?})",
                style("-").dim(),
                truncate(&report.url, 80),
                reason
            ),
            DownloadOutcome::Failed { kind, error } => format!(
                "{} {} ({}: {})",
                style("✗").red(),
                truncate(&report.url, 80),
                kind,
                error
            ),
        };
        println!("{:>4}. {}", report.index + 1, line);
    }
}

/// Batch totals plus the reason for any shortfall.
pub fn print_summary(summary: &BatchSummary, requested: usize, shortfall: Option<&Shortfall>) {
    println!("\n{}", style("Download Summary").bold());
    println!("{}", "-".repeat(40));
    println!("{:<20} {}", "Requested:", requested);
    println!("{:<20} {}", "Saved:", style(summary.saved).green());
    println!("{:<20} {}", "Skipped:", summary.skipped);
    println!("{:<20} {}", "Failed:", style(summary.failed).red());
    println!("{:<20} {}", "Bytes:", summary.bytes);
    if let Some(shortfall) = shortfall {
        println!("{} Fewer results than requested: {}", style("!").yellow(), shortfall);
    }
}
