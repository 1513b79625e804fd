//! End-to-end flow: encode, search, harvest if short, download.

use std::fmt;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::Settings;
use crate::error::{HarvestError, SearchError};
use crate::models::{BatchSummary, DownloadReport, ImageCandidate, SearchQuery};
use crate::scrapers::browser::{DriverProvisioner, ProvisionContext};
use crate::scrapers::extract::ResultExtractor;
use crate::scrapers::harvest::{ExtendedHarvester, HarvestConfig, HarvestEnd};
use crate::search::SearchClient;
use crate::services::download::{DownloadConfig, DownloadEvent, DownloadManager};

/// Why fewer candidates than requested came back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Shortfall {
    /// The engine ran out of results.
    ResultsExhausted,
    /// The scroll budget ran out before the count was met.
    BudgetExhausted,
    /// No browser could be started; only first-page results are included.
    DriverUnavailable(String),
    /// The browser failed mid-harvest; only first-page results are included.
    HarvestFailed(String),
}

impl fmt::Display for Shortfall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Shortfall::ResultsExhausted => f.write_str("no more results available"),
            Shortfall::BudgetExhausted => f.write_str("scroll budget exhausted"),
            Shortfall::DriverUnavailable(reason) => write!(f, "browser unavailable: {}", reason),
            Shortfall::HarvestFailed(reason) => write!(f, "extended harvest failed: {}", reason),
        }
    }
}

/// Candidates found for a query.
#[derive(Debug, Clone)]
pub struct SearchOutcome {
    /// The query actually searched (the seed image resolved to a term).
    pub query: SearchQuery,
    pub url: String,
    /// Discovery order, no duplicates, at most the requested count.
    pub candidates: Vec<ImageCandidate>,
    /// Set when `candidates` is shorter than requested.
    pub shortfall: Option<Shortfall>,
}

/// Search outcome plus the download reports for it.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub search: SearchOutcome,
    pub reports: Vec<DownloadReport>,
    pub summary: BatchSummary,
}

/// Wires the search client, harvester and download manager together.
pub struct Pipeline {
    client: SearchClient,
    harvester: ExtendedHarvester,
    provisioner: Option<DriverProvisioner>,
    provision_ctx: ProvisionContext,
    downloads: DownloadManager,
}

impl Pipeline {
    /// Build from settings, using the chromiumoxide driver when compiled in.
    pub fn new(settings: &Settings) -> anyhow::Result<Self> {
        #[cfg(feature = "browser")]
        let provisioner = Some(DriverProvisioner::chromium());
        #[cfg(not(feature = "browser"))]
        let provisioner = None;

        Ok(Self {
            client: SearchClient::new(settings)?,
            harvester: ExtendedHarvester::new(HarvestConfig::from_settings(settings)),
            provisioner,
            provision_ctx: ProvisionContext::from_settings(settings),
            downloads: DownloadManager::new(DownloadConfig::from_settings(settings))?,
        })
    }

    /// Replace the driver provisioner (`None` disables extended harvesting).
    pub fn with_provisioner(mut self, provisioner: Option<DriverProvisioner>) -> Self {
        self.provisioner = provisioner;
        self
    }

    pub fn with_events(mut self, tx: mpsc::Sender<DownloadEvent>) -> Self {
        self.downloads = self.downloads.with_events(tx);
        self
    }

    pub fn downloads(&self) -> &DownloadManager {
        &self.downloads
    }

    /// Collect up to `query.limit()` candidates.
    ///
    /// Filter errors abort before any request is made. A missing or failing
    /// browser never fails the search; the first page is returned with a
    /// [`Shortfall`] explaining the gap.
    pub async fn search(&self, query: SearchQuery) -> Result<SearchOutcome, SearchError> {
        let (query, url) = self.client.prepare(query).await?;
        let limit = query.limit();
        info!("Searching for {:?} (want {})", query.term(), limit);

        let page = self.client.fetch_page(&url).await?;
        let mut extractor = ResultExtractor::new();
        let mut extraction = extractor.extract(&page);
        let mut candidates: Vec<ImageCandidate> = extraction.by_ref().collect();
        if extraction.malformed() > 0 {
            warn!(
                "Extraction incomplete: dropped {} malformed result entries",
                extraction.malformed()
            );
        }
        info!("First page yielded {} candidates", candidates.len());

        if candidates.len() >= limit {
            candidates.truncate(limit);
            return Ok(SearchOutcome {
                query,
                url,
                candidates,
                shortfall: None,
            });
        }

        let (candidates, shortfall) = match &self.provisioner {
            None => (
                candidates,
                Some(Shortfall::DriverUnavailable(
                    "browser support not compiled in".to_string(),
                )),
            ),
            Some(provisioner) => {
                let seed = candidates.clone();
                match self
                    .harvester
                    .harvest(&self.provision_ctx, provisioner, &url, limit, seed)
                    .await
                {
                    Ok(result) => {
                        let shortfall = match result.end {
                            _ if result.candidates.len() >= limit => None,
                            HarvestEnd::BudgetExhausted => Some(Shortfall::BudgetExhausted),
                            HarvestEnd::Stalled | HarvestEnd::TargetReached => {
                                Some(Shortfall::ResultsExhausted)
                            }
                            HarvestEnd::Failed(ref reason) => {
                                Some(Shortfall::HarvestFailed(reason.clone()))
                            }
                        };
                        (result.candidates, shortfall)
                    }
                    Err(HarvestError::Provision(e)) => {
                        (candidates, Some(Shortfall::DriverUnavailable(e.to_string())))
                    }
                }
            }
        };

        if let Some(shortfall) = &shortfall {
            warn!(
                "Found {} of {} requested images: {}",
                candidates.len(),
                limit,
                shortfall
            );
        }

        Ok(SearchOutcome {
            query,
            url,
            candidates,
            shortfall,
        })
    }

    /// Search, then download everything found.
    pub async fn run(
        &self,
        query: SearchQuery,
        cancel: &CancellationToken,
    ) -> Result<RunReport, SearchError> {
        let search = self.search(query).await?;
        let reports = self.downloads.download_all(&search.candidates, cancel).await;
        let summary = BatchSummary::from_reports(&reports);
        info!(
            "Saved {}, skipped {}, failed {}",
            summary.saved, summary.skipped, summary.failed
        );
        Ok(RunReport {
            search,
            reports,
            summary,
        })
    }

    /// Download one URL, bypassing search.
    pub async fn download_single(&self, url: &str) -> DownloadReport {
        self.downloads.download_single(url).await
    }
}
