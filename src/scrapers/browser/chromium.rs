//! Chrome/Chromium driver over the DevTools protocol.

use std::path::Path;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::Page;
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::debug;

use super::{BrowserDriver, BrowserSettings, DriverLauncher};
use crate::error::DriverError;

const SCROLL_SCRIPT: &str = "window.scrollTo(0, document.body.scrollHeight)";
const SHOW_MORE_SELECTOR: &str = "#smb";

/// Launches chromiumoxide-backed drivers.
pub struct ChromiumLauncher;

#[async_trait]
impl DriverLauncher for ChromiumLauncher {
    async fn launch(
        &self,
        executable: &Path,
        settings: &BrowserSettings,
    ) -> Result<Box<dyn BrowserDriver>, DriverError> {
        let mut builder = BrowserConfig::builder()
            .chrome_executable(executable)
            .window_size(settings.window_width, settings.window_height)
            .args(settings.args());
        if !settings.headless {
            builder = builder.with_head();
        }
        let config = builder.build().map_err(DriverError::Launch)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| DriverError::Launch(e.to_string()))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                handler_task.abort();
                return Err(DriverError::Launch(e.to_string()));
            }
        };

        debug!("Launched browser {}", executable.display());
        Ok(Box::new(ChromiumDriver {
            browser: Some(browser),
            page,
            handler_task,
        }))
    }
}

/// One browser process with a single page.
pub struct ChromiumDriver {
    browser: Option<Browser>,
    page: Page,
    handler_task: JoinHandle<()>,
}

fn command_error(e: impl std::fmt::Display) -> DriverError {
    DriverError::Command(e.to_string())
}

#[async_trait]
impl BrowserDriver for ChromiumDriver {
    async fn navigate(&mut self, url: &str) -> Result<(), DriverError> {
        self.page.goto(url).await.map_err(command_error)?;
        self.page
            .wait_for_navigation()
            .await
            .map_err(command_error)?;
        Ok(())
    }

    async fn scroll_to_bottom(&mut self) -> Result<(), DriverError> {
        self.page
            .evaluate(SCROLL_SCRIPT)
            .await
            .map_err(command_error)?;
        Ok(())
    }

    async fn click_show_more(&mut self) -> Result<bool, DriverError> {
        let button = match self.page.find_element(SHOW_MORE_SELECTOR).await {
            Ok(button) => button,
            Err(_) => return Ok(false),
        };
        match button.click().await {
            Ok(_) => Ok(true),
            Err(e) => {
                // Present but hidden or detached.
                debug!("Show-more control not clickable: {}", e);
                Ok(false)
            }
        }
    }

    async fn page_content(&mut self) -> Result<String, DriverError> {
        self.page.content().await.map_err(command_error)
    }

    async fn close(&mut self) -> Result<(), DriverError> {
        let Some(mut browser) = self.browser.take() else {
            return Ok(());
        };
        let result = browser.close().await.map_err(command_error);
        if let Err(e) = browser.wait().await {
            debug!("Browser process did not exit cleanly: {}", e);
        }
        self.handler_task.abort();
        result.map(|_| ())
    }
}

impl Drop for ChromiumDriver {
    fn drop(&mut self) {
        self.handler_task.abort();
    }
}
