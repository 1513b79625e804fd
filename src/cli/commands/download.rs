//! Single-image download command.

use console::style;

use crate::config::Settings;
use crate::models::DownloadOutcome;
use crate::services::{DownloadConfig, DownloadManager};

use crate::cli::helpers::print_reports;

/// Download one URL straight into the output directory.
pub async fn cmd_download(settings: &Settings, url: &str, json: bool) -> anyhow::Result<()> {
    settings.ensure_directories()?;
    let manager = DownloadManager::new(DownloadConfig::from_settings(settings))?;
    let report = manager.download_single(url).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_reports(std::slice::from_ref(&report));
    }

    match &report.outcome {
        DownloadOutcome::Failed { kind, error } => {
            anyhow::bail!("{} download failed: {}", kind, error)
        }
        DownloadOutcome::Skipped { .. } | DownloadOutcome::Saved { .. } => {
            if !json {
                println!("{} Done", style("✓").green());
            }
            Ok(())
        }
    }
}
