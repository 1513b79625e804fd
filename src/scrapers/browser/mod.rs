//! Browser automation for extended harvesting.
//!
//! The harvester only talks to the [`BrowserDriver`] trait. The real
//! implementation drives Chrome/Chromium over the DevTools protocol via
//! chromiumoxide (behind the `browser` feature); tests substitute in-memory
//! drivers.

use async_trait::async_trait;

use crate::error::DriverError;

#[cfg(feature = "browser")]
mod chromium;
mod managed;
mod provision;

#[cfg(feature = "browser")]
pub use chromium::{ChromiumDriver, ChromiumLauncher};
pub use managed::{host_platform, ManagedInstaller};
pub use provision::{
    DriverLauncher, DriverProvisioner, ExplicitPath, ManagedInstall, ProvisionContext,
    ProvisionStep, SystemPath, SYSTEM_BROWSER_NAMES,
};

#[cfg(test)]
pub(crate) use provision::tests as provision_tests;

/// Operations the harvester needs from a live browser session.
///
/// A driver is exclusively owned by one harvest session; none of these
/// calls may run concurrently against the same driver.
#[async_trait]
pub trait BrowserDriver: Send {
    /// Load a URL and wait for navigation to finish.
    async fn navigate(&mut self, url: &str) -> Result<(), DriverError>;

    /// Scroll the document to its current bottom.
    async fn scroll_to_bottom(&mut self) -> Result<(), DriverError>;

    /// Press the engine's "show more results" control if it is present.
    /// Returns whether anything was clicked.
    async fn click_show_more(&mut self) -> Result<bool, DriverError>;

    /// Current rendered HTML.
    async fn page_content(&mut self) -> Result<String, DriverError>;

    /// Shut the browser down. Safe to call more than once.
    async fn close(&mut self) -> Result<(), DriverError>;
}

/// Fixed launch configuration for harvesting browsers.
///
/// Headless, unsandboxed, no `/dev/shm`, no GPU, fixed viewport: chosen so
/// runs behave the same in containers as on a desktop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrowserSettings {
    pub headless: bool,
    pub window_width: u32,
    pub window_height: u32,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            headless: true,
            window_width: 1024,
            window_height: 768,
        }
    }
}

impl BrowserSettings {
    /// Command-line flags passed to the browser in addition to headless mode.
    pub fn args(&self) -> Vec<String> {
        vec![
            "--no-sandbox".to_string(),
            "--disable-dev-shm-usage".to_string(),
            "--disable-gpu".to_string(),
            format!("--window-size={},{}", self.window_width, self.window_height),
        ]
    }
}
