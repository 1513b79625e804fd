//! Result scraping: page extraction, browser-driven harvesting, retry helpers.

pub mod browser;
pub mod extract;
pub mod harvest;
pub mod retry;

pub use extract::{Extraction, ResultExtractor};
pub use harvest::{
    ExtendedHarvester, HarvestConfig, HarvestEnd, HarvestResult, HarvestSession, HarvestState,
};
pub use retry::RetryPolicy;
