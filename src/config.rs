//! Configuration management for imgharvest using the prefer crate.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::search::{DEFAULT_SEARCH_ENDPOINT, DEFAULT_SIMILAR_ENDPOINT};

/// Environment variable naming an explicit browser executable.
pub const BROWSER_ENV_VAR: &str = "IMGHARVEST_BROWSER";

/// Chrome for Testing release index used by the managed browser install.
pub const DEFAULT_MANAGED_INDEX_URL: &str =
    "https://googlechromelabs.github.io/chrome-for-testing/last-known-good-versions-with-downloads.json";

/// Application settings.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Directory downloaded images are written to.
    pub output_dir: PathBuf,
    /// User agent for search and image requests.
    pub user_agent: String,
    /// Per-request timeout in seconds.
    pub request_timeout: u64,
    /// Number of concurrent download workers.
    pub download_workers: usize,
    /// Retries after the first attempt for transient failures.
    pub max_retries: u32,
    /// Base delay for exponential backoff in milliseconds.
    pub retry_base_ms: u64,
    /// Payloads smaller than this many bytes are treated as corrupt.
    pub min_image_bytes: u64,
    /// Replace files that already exist at the destination.
    pub overwrite: bool,
    /// Wait after each scroll for new results to render, in milliseconds.
    pub settle_ms: u64,
    /// Consecutive empty scroll cycles before harvesting stops.
    pub stall_limit: u32,
    /// Hard cap on scroll cycles per harvest.
    pub max_scroll_cycles: u32,
    /// Explicit browser executable (first provisioning step).
    pub browser_path: Option<PathBuf>,
    /// Allow downloading a managed browser build (second provisioning step).
    pub managed_browser: bool,
    /// Where managed browser builds are cached.
    pub browser_cache_dir: PathBuf,
    /// Release index for managed browser builds.
    pub managed_index_url: String,
    /// Results page endpoint.
    pub search_endpoint: String,
    /// Search-by-image endpoint.
    pub similar_endpoint: String,
}

impl Default for Settings {
    fn default() -> Self {
        let browser_cache_dir = dirs::cache_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("imgharvest")
            .join("browsers");

        Self {
            output_dir: PathBuf::from("downloads"),
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                         (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36"
                .to_string(),
            request_timeout: 10,
            download_workers: 4,
            max_retries: 3,
            retry_base_ms: 500,
            min_image_bytes: 1024,
            overwrite: false,
            settle_ms: 800,
            stall_limit: 3,
            max_scroll_cycles: 60,
            browser_path: None,
            managed_browser: true,
            browser_cache_dir,
            managed_index_url: DEFAULT_MANAGED_INDEX_URL.to_string(),
            search_endpoint: DEFAULT_SEARCH_ENDPOINT.to_string(),
            similar_endpoint: DEFAULT_SIMILAR_ENDPOINT.to_string(),
        }
    }
}

impl Settings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }

    pub fn settle_interval(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    /// Explicit browser path from settings, falling back to the environment.
    pub fn explicit_browser(&self) -> Option<PathBuf> {
        self.browser_path.clone().or_else(|| {
            std::env::var(BROWSER_ENV_VAR)
                .ok()
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from)
        })
    }

    /// Ensure the output directory exists.
    pub fn ensure_directories(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.output_dir)
    }
}

/// Configuration file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Output directory for downloads.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    /// Request timeout in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_workers: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_image_bytes: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settle_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stall_limit: Option<u32>,
    /// Path to a Chrome/Chromium executable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub browser_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub managed_browser: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_endpoint: Option<String>,
    /// Default filters, keyed by filter name. Command-line filters win.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub filters: BTreeMap<String, String>,

    /// Path to the config file this was loaded from (not serialized).
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration using prefer crate.
    /// Automatically discovers imgharvest config files in standard locations.
    pub async fn load() -> Self {
        match prefer::load("imgharvest").await {
            Ok(pref_config) => {
                let output_dir: Option<String> = pref_config.get("output_dir").ok();
                let user_agent: Option<String> = pref_config.get("user_agent").ok();
                let request_timeout: Option<u64> = pref_config.get("request_timeout").ok();
                let download_workers: Option<usize> =
                    pref_config.get("download_workers").ok();
                let max_retries: Option<u32> = pref_config.get("max_retries").ok();
                let min_image_bytes: Option<u64> = pref_config.get("min_image_bytes").ok();
                let settle_ms: Option<u64> = pref_config.get("settle_ms").ok();
                let stall_limit: Option<u32> = pref_config.get("stall_limit").ok();
                let browser_path: Option<String> = pref_config.get("browser_path").ok();
                let managed_browser: Option<bool> = pref_config.get("managed_browser").ok();
                let search_endpoint: Option<String> =
                    pref_config.get("search_endpoint").ok();
                let filters: BTreeMap<String, String> = pref_config
                    .get::<std::collections::HashMap<String, String>>("filters")
                    .unwrap_or_default()
                    .into_iter()
                    .collect();

                let source_path = pref_config.source_path().cloned();

                Config {
                    output_dir,
                    user_agent,
                    request_timeout,
                    download_workers,
                    max_retries,
                    min_image_bytes,
                    settle_ms,
                    stall_limit,
                    browser_path,
                    managed_browser,
                    search_endpoint,
                    filters,
                    source_path,
                }
            }
            Err(_) => Self::default(),
        }
    }

    /// Load configuration from a specific file path (TOML or JSON by extension).
    pub async fn load_from_path(path: &Path) -> Result<Self, String> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| format!("Failed to read config file: {}", e))?;

        let mut config = Self::parse(&contents, path)?;
        config.source_path = Some(path.to_path_buf());
        Ok(config)
    }

    fn parse(contents: &str, path: &Path) -> Result<Self, String> {
        let is_toml = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("toml"))
            .unwrap_or(false);

        if is_toml {
            toml::from_str(contents).map_err(|e| format!("Failed to parse config file: {}", e))
        } else {
            serde_json::from_str(contents)
                .map_err(|e| format!("Failed to parse config file: {}", e))
        }
    }

    /// Directory of the loaded config file, used for relative paths.
    pub fn base_dir(&self) -> Option<PathBuf> {
        self.source_path
            .as_ref()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
    }

    /// Resolve a path that may be relative to the config file.
    /// - Absolute paths are returned as-is
    /// - Paths starting with ~ are expanded
    /// - Relative paths are resolved against `base_dir`
    pub fn resolve_path(&self, path_str: &str, base_dir: &Path) -> PathBuf {
        let expanded = shellexpand::tilde(path_str);
        let path = Path::new(expanded.as_ref());

        if path.is_absolute() {
            path.to_path_buf()
        } else {
            base_dir.join(path)
        }
    }

    /// Apply configuration to settings.
    pub fn apply_to_settings(&self, settings: &mut Settings, base_dir: &Path) {
        if let Some(ref dir) = self.output_dir {
            settings.output_dir = self.resolve_path(dir, base_dir);
        }
        if let Some(ref user_agent) = self.user_agent {
            settings.user_agent = user_agent.clone();
        }
        if let Some(timeout) = self.request_timeout {
            settings.request_timeout = timeout;
        }
        if let Some(workers) = self.download_workers {
            settings.download_workers = workers.max(1);
        }
        if let Some(retries) = self.max_retries {
            settings.max_retries = retries;
        }
        if let Some(min) = self.min_image_bytes {
            settings.min_image_bytes = min;
        }
        if let Some(settle) = self.settle_ms {
            settings.settle_ms = settle;
        }
        if let Some(stall) = self.stall_limit {
            settings.stall_limit = stall.max(1);
        }
        if let Some(ref browser) = self.browser_path {
            settings.browser_path = Some(self.resolve_path(browser, base_dir));
        }
        if let Some(managed) = self.managed_browser {
            settings.managed_browser = managed;
        }
        if let Some(ref endpoint) = self.search_endpoint {
            settings.search_endpoint = endpoint.clone();
        }
    }
}

/// Options for loading settings.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Explicit config file path (overrides auto-discovery).
    pub config_path: Option<PathBuf>,
}

/// Load config and settings with explicit options.
///
/// Returns the config as well so callers can read its default filters.
pub async fn load_settings_with_options(options: LoadOptions) -> (Settings, Config) {
    let config = match &options.config_path {
        Some(path) => match Config::load_from_path(path).await {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("{}, using defaults", e);
                Config::default()
            }
        },
        None => Config::load().await,
    };

    let mut settings = Settings::default();
    let base_dir = config
        .base_dir()
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));
    config.apply_to_settings(&mut settings, &base_dir);

    (settings, config)
}
