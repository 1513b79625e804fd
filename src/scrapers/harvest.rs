//! Extended harvesting: scroll a live results page until enough candidates load.
//!
//! The engine only reveals further results through client-side script, so
//! the harvester drives a browser through scroll/extract cycles:
//!
//! ```text
//! Idle -> Provisioning -> LoadingPage -> Scrolling -> Extracting -> Scrolling | Done | Stalled
//! ```
//!
//! A cycle that turns up nothing new counts toward the stall limit; reaching
//! the limit ends the harvest normally with whatever was collected.

use std::fmt;
use std::time::Duration;

use indexmap::IndexMap;
use tracing::{debug, info, warn};

use super::browser::{BrowserDriver, DriverProvisioner, ProvisionContext};
use super::extract::ResultExtractor;
use crate::config::Settings;
use crate::error::{DriverError, HarvestError};
use crate::models::ImageCandidate;

/// Harvest state machine states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HarvestState {
    Idle,
    Provisioning,
    LoadingPage,
    Scrolling,
    Extracting,
    Stalled,
    Done,
    Failed,
}

impl fmt::Display for HarvestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HarvestState::Idle => "idle",
            HarvestState::Provisioning => "provisioning",
            HarvestState::LoadingPage => "loading_page",
            HarvestState::Scrolling => "scrolling",
            HarvestState::Extracting => "extracting",
            HarvestState::Stalled => "stalled",
            HarvestState::Done => "done",
            HarvestState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Why a harvest stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HarvestEnd {
    /// The requested count was reached.
    TargetReached,
    /// Consecutive cycles produced nothing new; results ran out.
    Stalled,
    /// The scroll-cycle budget ran out first.
    BudgetExhausted,
    /// The driver failed mid-harvest. Candidates collected before the
    /// failure are still returned.
    Failed(String),
}

/// Loop bounds for one harvest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HarvestConfig {
    /// Wait after each scroll for new results to render.
    pub settle: Duration,
    /// Consecutive empty cycles before stopping.
    pub stall_limit: u32,
    /// Hard cap on scroll cycles.
    pub max_cycles: u32,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}

impl HarvestConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            settle: settings.settle_interval(),
            stall_limit: settings.stall_limit.max(1),
            max_cycles: settings.max_scroll_cycles,
        }
    }
}

/// What a finished harvest produced.
#[derive(Debug, Clone)]
pub struct HarvestResult {
    /// Discovery order, at most the requested count.
    pub candidates: Vec<ImageCandidate>,
    pub end: HarvestEnd,
    /// Scroll cycles performed.
    pub cycles: u32,
    /// Result entries dropped as unparseable.
    pub malformed: usize,
}

/// One driver plus everything accumulated while driving it.
///
/// The driver is exclusively owned; [`HarvestSession::release`] must run on
/// every exit path, which [`ExtendedHarvester`] guarantees.
pub struct HarvestSession {
    driver: Box<dyn BrowserDriver>,
    candidates: IndexMap<String, ImageCandidate>,
    extractor: ResultExtractor,
    state: HarvestState,
    stall_count: u32,
    cycles: u32,
    malformed: usize,
    show_more_used: bool,
}

impl HarvestSession {
    /// Start a session seeded with candidates already known (e.g. the first page).
    pub fn new(driver: Box<dyn BrowserDriver>, seed: Vec<ImageCandidate>) -> Self {
        let mut extractor = ResultExtractor::new();
        let mut candidates = IndexMap::with_capacity(seed.len());
        for candidate in seed {
            extractor.mark_seen(candidate.key());
            candidates.entry(candidate.url.clone()).or_insert(candidate);
        }

        Self {
            driver,
            candidates,
            extractor,
            state: HarvestState::Idle,
            stall_count: 0,
            cycles: 0,
            malformed: 0,
            show_more_used: false,
        }
    }

    pub fn state(&self) -> HarvestState {
        self.state
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    fn transition(&mut self, next: HarvestState) {
        if self.state != next {
            debug!("Harvest state {} -> {}", self.state, next);
            self.state = next;
        }
    }

    /// Merge candidates from a page snapshot; returns how many were new.
    pub fn merge(&mut self, page: &str) -> usize {
        let mut extraction = self.extractor.extract(page);
        let mut added = 0;
        for candidate in extraction.by_ref() {
            if !self.candidates.contains_key(candidate.key()) {
                self.candidates.insert(candidate.url.clone(), candidate);
                added += 1;
            }
        }

        let malformed = extraction.malformed();
        if malformed > 0 {
            warn!(
                "Extraction incomplete: dropped {} malformed result entries",
                malformed
            );
            self.malformed += malformed;
        }
        added
    }

    async fn extract(&mut self) -> Result<usize, DriverError> {
        self.transition(HarvestState::Extracting);
        let page = self.driver.page_content().await?;
        Ok(self.merge(&page))
    }

    async fn run(
        &mut self,
        config: &HarvestConfig,
        url: &str,
        limit: usize,
    ) -> Result<HarvestEnd, DriverError> {
        self.transition(HarvestState::LoadingPage);
        self.driver.navigate(url).await?;

        let added = self.extract().await?;
        if self.len() >= limit {
            return Ok(HarvestEnd::TargetReached);
        }
        if added == 0 {
            self.stall_count += 1;
        }

        loop {
            if self.stall_count >= config.stall_limit {
                self.transition(HarvestState::Stalled);
                info!(
                    "No new results after {} attempts, stopping with {}",
                    self.stall_count,
                    self.len()
                );
                return Ok(HarvestEnd::Stalled);
            }
            if self.cycles >= config.max_cycles {
                info!("Scroll budget of {} cycles exhausted", config.max_cycles);
                return Ok(HarvestEnd::BudgetExhausted);
            }

            self.transition(HarvestState::Scrolling);
            self.driver.scroll_to_bottom().await?;
            tokio::time::sleep(config.settle).await;
            self.cycles += 1;

            let mut added = self.extract().await?;
            if added == 0 && !self.show_more_used && self.driver.click_show_more().await? {
                debug!("Clicked show-more control");
                self.show_more_used = true;
                tokio::time::sleep(config.settle).await;
                added = self.extract().await?;
            }

            debug!(
                "Cycle {}: {} new, {} total",
                self.cycles,
                added,
                self.len()
            );
            if self.len() >= limit {
                return Ok(HarvestEnd::TargetReached);
            }
            if added == 0 {
                self.stall_count += 1;
            } else {
                self.stall_count = 0;
            }
        }
    }

    /// Close the driver. Close failures are logged, never raised.
    pub async fn release(&mut self) {
        if let Err(e) = self.driver.close().await {
            warn!("Failed to close browser cleanly: {}", e);
        }
    }

    fn into_result(self, end: HarvestEnd, limit: usize) -> HarvestResult {
        HarvestResult {
            candidates: self.candidates.into_values().take(limit).collect(),
            end,
            cycles: self.cycles,
            malformed: self.malformed,
        }
    }
}

/// Drives harvest sessions.
#[derive(Debug, Clone, Default)]
pub struct ExtendedHarvester {
    config: HarvestConfig,
}

impl ExtendedHarvester {
    pub fn new(config: HarvestConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &HarvestConfig {
        &self.config
    }

    /// Provision a driver, then harvest `url` up to `limit` candidates.
    ///
    /// `seed` holds candidates already collected; they count toward the
    /// limit and are never returned twice.
    pub async fn harvest(
        &self,
        ctx: &ProvisionContext,
        provisioner: &DriverProvisioner,
        url: &str,
        limit: usize,
        seed: Vec<ImageCandidate>,
    ) -> Result<HarvestResult, HarvestError> {
        debug!("Harvest state {} -> {}", HarvestState::Idle, HarvestState::Provisioning);
        let driver = match provisioner.provision(ctx).await {
            Ok(driver) => driver,
            Err(e) => {
                warn!("Extended harvest unavailable: {}", e);
                return Err(e.into());
            }
        };
        Ok(self.harvest_with_driver(driver, url, limit, seed).await)
    }

    /// Harvest with an already-running driver. The driver is closed before
    /// returning, whether or not harvesting succeeded.
    ///
    /// A driver failure after the session started is reported as
    /// [`HarvestEnd::Failed`] alongside whatever was collected up to then.
    pub async fn harvest_with_driver(
        &self,
        driver: Box<dyn BrowserDriver>,
        url: &str,
        limit: usize,
        seed: Vec<ImageCandidate>,
    ) -> HarvestResult {
        let mut session = HarvestSession::new(driver, seed);
        let outcome = session.run(&self.config, url, limit).await;
        session.release().await;

        match outcome {
            Ok(end) => {
                session.transition(HarvestState::Done);
                info!(
                    "Harvested {} candidates in {} cycles",
                    session.len().min(limit),
                    session.cycles
                );
                session.into_result(end, limit)
            }
            Err(e) => {
                session.transition(HarvestState::Failed);
                warn!(
                    "Extended harvest aborted after {} cycles with {} candidates: {}",
                    session.cycles,
                    session.len().min(limit),
                    e
                );
                session.into_result(HarvestEnd::Failed(e.to_string()), limit)
            }
        }
    }
}
