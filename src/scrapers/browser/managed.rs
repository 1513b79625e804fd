//! Managed browser installs from the Chrome for Testing release index.
//!
//! Downloads the stable `chrome-headless-shell` build for the host platform
//! into a versioned cache directory. When the index cannot be reached, the
//! newest build already in the cache is used instead.

use std::collections::HashMap;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context};
use serde::Deserialize;
use tracing::{debug, info};

const CHANNEL: &str = "Stable";
const PRODUCT: &str = "chrome-headless-shell";

#[derive(Debug, Deserialize)]
struct ReleaseIndex {
    channels: HashMap<String, Channel>,
}

#[derive(Debug, Deserialize)]
struct Channel {
    version: String,
    downloads: HashMap<String, Vec<Download>>,
}

#[derive(Debug, Deserialize)]
struct Download {
    platform: String,
    url: String,
}

/// Release-index platform name for this host.
pub fn host_platform() -> Option<&'static str> {
    match (std::env::consts::OS, std::env::consts::ARCH) {
        ("linux", "x86_64") => Some("linux64"),
        ("macos", "aarch64") => Some("mac-arm64"),
        ("macos", "x86_64") => Some("mac-x64"),
        ("windows", "x86_64") => Some("win64"),
        ("windows", "x86") => Some("win32"),
        _ => None,
    }
}

/// Executable location inside an extracted archive.
fn executable_in(install_dir: &Path, platform: &str) -> PathBuf {
    let folder = format!("{}-{}", PRODUCT, platform);
    let binary = if platform.starts_with("win") {
        format!("{}.exe", PRODUCT)
    } else {
        PRODUCT.to_string()
    };
    install_dir.join(folder).join(binary)
}

/// Downloads and caches browser builds.
#[derive(Debug, Clone)]
pub struct ManagedInstaller {
    cache_dir: PathBuf,
    index_url: String,
    user_agent: String,
}

impl ManagedInstaller {
    pub fn new(cache_dir: PathBuf, index_url: String, user_agent: String) -> Self {
        Self {
            cache_dir,
            index_url,
            user_agent,
        }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Return a usable executable, downloading one if needed.
    pub async fn ensure_installed(&self) -> anyhow::Result<PathBuf> {
        let platform = host_platform()
            .ok_or_else(|| anyhow!("no managed builds for {}", std::env::consts::OS))?;

        let client = reqwest::Client::builder()
            .user_agent(&self.user_agent)
            .build()?;

        let (version, url) = match self.latest_release(&client, platform).await {
            Ok(release) => release,
            Err(e) => {
                debug!("Release index unavailable: {:#}", e);
                return self
                    .newest_cached(platform)
                    .ok_or_else(|| e.context("no cached browser build to fall back on"));
            }
        };

        let install_dir = self.cache_dir.join(&version);
        let executable = executable_in(&install_dir, platform);
        if executable.is_file() {
            debug!("Using cached browser build {}", version);
            return Ok(executable);
        }

        info!("Downloading browser build {} for {}", version, platform);
        let archive = client
            .get(&url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .with_context(|| format!("failed to download {}", url))?
            .bytes()
            .await
            .context("failed to read browser archive")?;

        let target = install_dir.clone();
        tokio::task::spawn_blocking(move || unpack(&archive, &target))
            .await
            .context("archive extraction task panicked")??;

        if executable.is_file() {
            Ok(executable)
        } else {
            Err(anyhow!(
                "archive did not contain {}",
                executable.display()
            ))
        }
    }

    async fn latest_release(
        &self,
        client: &reqwest::Client,
        platform: &str,
    ) -> anyhow::Result<(String, String)> {
        let index: ReleaseIndex = client
            .get(&self.index_url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
            .context("malformed release index")?;
        select_download(index, platform)
    }

    /// Newest cached install, compared by dotted version number.
    fn newest_cached(&self, platform: &str) -> Option<PathBuf> {
        let entries = std::fs::read_dir(&self.cache_dir).ok()?;
        entries
            .filter_map(Result::ok)
            .filter_map(|entry| {
                let version = entry.file_name().to_string_lossy().to_string();
                let key: Vec<u32> = version
                    .split('.')
                    .map(|part| part.parse().ok())
                    .collect::<Option<Vec<u32>>>()?;
                let executable = executable_in(&entry.path(), platform);
                executable.is_file().then_some((key, executable))
            })
            .max_by(|a, b| a.0.cmp(&b.0))
            .map(|(_, executable)| executable)
    }
}

fn select_download(mut index: ReleaseIndex, platform: &str) -> anyhow::Result<(String, String)> {
    let mut channel = index
        .channels
        .remove(CHANNEL)
        .ok_or_else(|| anyhow!("release index has no {} channel", CHANNEL))?;
    let url = channel
        .downloads
        .remove(PRODUCT)
        .unwrap_or_default()
        .into_iter()
        .find(|d| d.platform == platform)
        .map(|d| d.url)
        .ok_or_else(|| anyhow!("no {} download for {}", PRODUCT, platform))?;
    Ok((channel.version, url))
}

/// Staging directory next to `target`.
fn partial_dir(target: &Path) -> PathBuf {
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    target.with_file_name(format!("{}.partial", name))
}

/// Extract a zip archive into `target`, all-or-nothing.
fn unpack(archive: &[u8], target: &Path) -> anyhow::Result<()> {
    let partial = partial_dir(target);
    if partial.exists() {
        std::fs::remove_dir_all(&partial)?;
    }
    std::fs::create_dir_all(&partial)?;

    let result = extract_zip(archive, &partial).and_then(|()| {
        std::fs::rename(&partial, target)
            .with_context(|| format!("failed to move build into {}", target.display()))
    });
    if result.is_err() {
        let _ = std::fs::remove_dir_all(&partial);
    }
    result
}

fn extract_zip(archive: &[u8], dest: &Path) -> anyhow::Result<()> {
    let mut zip = zip::ZipArchive::new(Cursor::new(archive)).context("invalid zip archive")?;

    for i in 0..zip.len() {
        let mut entry = zip.by_index(i)?;
        let relative = match entry.enclosed_name() {
            Some(path) => path.to_path_buf(),
            None => continue,
        };
        let out_path = dest.join(relative);

        if entry.is_dir() {
            std::fs::create_dir_all(&out_path)?;
            continue;
        }
        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut out = std::fs::File::create(&out_path)?;
        std::io::copy(&mut entry, &mut out)?;

        #[cfg(unix)]
        if let Some(mode) = entry.unix_mode() {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&out_path, std::fs::Permissions::from_mode(mode))?;
        }
    }
    Ok(())
}
