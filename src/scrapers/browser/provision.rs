//! Driver provisioning through an ordered fallback chain.
//!
//! Each [`ProvisionStep`] resolves a browser executable; the provisioner
//! launches it and moves on to the next step if either resolution or launch
//! fails. The default chain is explicit path, managed install, then `PATH`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::managed::ManagedInstaller;
use super::{BrowserDriver, BrowserSettings};
use crate::config::Settings;
use crate::error::{DriverError, ProvisionError};

/// Executable names tried on `PATH`, in order.
pub const SYSTEM_BROWSER_NAMES: &[&str] = &[
    "chromium",
    "chromium-browser",
    "google-chrome",
    "google-chrome-stable",
    "chrome",
    "chrome-headless-shell",
    "headless_shell",
];

/// State shared by provisioning steps for one process.
///
/// Passed explicitly so tests can run provisioners side by side.
pub struct ProvisionContext {
    pub explicit_path: Option<PathBuf>,
    pub managed_enabled: bool,
    pub installer: ManagedInstaller,
    /// Executable resolved by an earlier managed install in this process.
    managed_cache: Mutex<Option<PathBuf>>,
}

impl ProvisionContext {
    pub fn new(explicit_path: Option<PathBuf>, installer: ManagedInstaller) -> Self {
        Self {
            explicit_path,
            managed_enabled: true,
            installer,
            managed_cache: Mutex::new(None),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        let installer = ManagedInstaller::new(
            settings.browser_cache_dir.clone(),
            settings.managed_index_url.clone(),
            settings.user_agent.clone(),
        );
        let mut ctx = Self::new(settings.explicit_browser(), installer);
        ctx.managed_enabled = settings.managed_browser;
        ctx
    }

    pub fn without_managed(mut self) -> Self {
        self.managed_enabled = false;
        self
    }
}

/// One way of finding a browser executable.
#[async_trait]
pub trait ProvisionStep: Send + Sync {
    /// Short label used in logs and in `NoDriverAvailable`.
    fn name(&self) -> &'static str;

    async fn resolve(&self, ctx: &ProvisionContext) -> Result<PathBuf, DriverError>;
}

/// Starts a browser from a resolved executable.
#[async_trait]
pub trait DriverLauncher: Send + Sync {
    async fn launch(
        &self,
        executable: &Path,
        settings: &BrowserSettings,
    ) -> Result<Box<dyn BrowserDriver>, DriverError>;
}

/// Step 1: a user-supplied executable path.
pub struct ExplicitPath;

#[async_trait]
impl ProvisionStep for ExplicitPath {
    fn name(&self) -> &'static str {
        "explicit"
    }

    async fn resolve(&self, ctx: &ProvisionContext) -> Result<PathBuf, DriverError> {
        let path = ctx.explicit_path.as_ref().ok_or(DriverError::NotConfigured)?;
        if path.is_file() {
            Ok(path.clone())
        } else {
            Err(DriverError::NotFound(path.display().to_string()))
        }
    }
}

/// Step 2: download and cache a matching browser build.
pub struct ManagedInstall;

#[async_trait]
impl ProvisionStep for ManagedInstall {
    fn name(&self) -> &'static str {
        "managed"
    }

    async fn resolve(&self, ctx: &ProvisionContext) -> Result<PathBuf, DriverError> {
        if !ctx.managed_enabled {
            return Err(DriverError::NotConfigured);
        }

        let mut cached = ctx.managed_cache.lock().await;
        if let Some(path) = cached.as_ref().filter(|p| p.is_file()) {
            return Ok(path.clone());
        }

        let path = ctx
            .installer
            .ensure_installed()
            .await
            .map_err(|e| DriverError::Install(format!("{:#}", e)))?;
        *cached = Some(path.clone());
        Ok(path)
    }
}

/// Step 3: a browser already on `PATH`.
pub struct SystemPath {
    names: Vec<String>,
}

impl SystemPath {
    pub fn with_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }
}

impl Default for SystemPath {
    fn default() -> Self {
        Self::with_names(SYSTEM_BROWSER_NAMES.iter().copied())
    }
}

#[async_trait]
impl ProvisionStep for SystemPath {
    fn name(&self) -> &'static str {
        "system"
    }

    async fn resolve(&self, _ctx: &ProvisionContext) -> Result<PathBuf, DriverError> {
        self.names
            .iter()
            .find_map(|name| which::which(name).ok())
            .ok_or_else(|| DriverError::NotFound(format!("none of {} on PATH", self.names.join(", "))))
    }
}

/// Resolves and launches a browser driver.
pub struct DriverProvisioner {
    steps: Vec<Box<dyn ProvisionStep>>,
    launcher: Arc<dyn DriverLauncher>,
    browser: BrowserSettings,
}

impl DriverProvisioner {
    /// Default chain: explicit path, managed install, system `PATH`.
    pub fn new(launcher: Arc<dyn DriverLauncher>) -> Self {
        Self::with_steps(
            vec![
                Box::new(ExplicitPath),
                Box::new(ManagedInstall),
                Box::new(SystemPath::default()),
            ],
            launcher,
        )
    }

    pub fn with_steps(steps: Vec<Box<dyn ProvisionStep>>, launcher: Arc<dyn DriverLauncher>) -> Self {
        Self {
            steps,
            launcher,
            browser: BrowserSettings::default(),
        }
    }

    /// Default chain backed by chromiumoxide.
    #[cfg(feature = "browser")]
    pub fn chromium() -> Self {
        Self::new(Arc::new(super::ChromiumLauncher))
    }

    pub fn browser_settings(&self) -> &BrowserSettings {
        &self.browser
    }

    /// Try each step in order and return the first driver that starts.
    pub async fn provision(
        &self,
        ctx: &ProvisionContext,
    ) -> Result<Box<dyn BrowserDriver>, ProvisionError> {
        let mut attempts = Vec::with_capacity(self.steps.len());

        for step in &self.steps {
            let executable = match step.resolve(ctx).await {
                Ok(path) => path,
                Err(DriverError::NotConfigured) => {
                    debug!("Provisioning step '{}' not configured", step.name());
                    attempts.push(format!("{}: not configured", step.name()));
                    continue;
                }
                Err(e) => {
                    warn!("Provisioning step '{}' failed (non-fatal): {}", step.name(), e);
                    attempts.push(format!("{}: {}", step.name(), e));
                    continue;
                }
            };

            match self.launcher.launch(&executable, &self.browser).await {
                Ok(driver) => {
                    info!(
                        "Browser provisioned via '{}' step: {}",
                        step.name(),
                        executable.display()
                    );
                    return Ok(driver);
                }
                Err(e) => {
                    warn!(
                        "Browser at {} from '{}' step failed to start: {}",
                        executable.display(),
                        step.name(),
                        e
                    );
                    attempts.push(format!("{}: {}", step.name(), e));
                }
            }
        }

        Err(ProvisionError::NoDriverAvailable { attempts })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Step returning a fixed result.
    pub(crate) struct FixedStep {
        pub name: &'static str,
        pub result: Result<PathBuf, String>,
        pub calls: Arc<AtomicUsize>,
    }

    impl FixedStep {
        pub fn ok(name: &'static str, path: &str) -> Self {
            Self {
                name,
                result: Ok(PathBuf::from(path)),
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }

        pub fn fail(name: &'static str, reason: &str) -> Self {
            Self {
                name,
                result: Err(reason.to_string()),
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    #[async_trait]
    impl ProvisionStep for FixedStep {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn resolve(&self, _ctx: &ProvisionContext) -> Result<PathBuf, DriverError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.result.clone().map_err(DriverError::Install)
        }
    }

    /// Driver that does nothing.
    pub(crate) struct NullDriver {
        pub executable: PathBuf,
    }

    #[async_trait]
    impl BrowserDriver for NullDriver {
        async fn navigate(&mut self, _url: &str) -> Result<(), DriverError> {
            Ok(())
        }
        async fn scroll_to_bottom(&mut self) -> Result<(), DriverError> {
            Ok(())
        }
        async fn click_show_more(&mut self) -> Result<bool, DriverError> {
            Ok(false)
        }
        async fn page_content(&mut self) -> Result<String, DriverError> {
            Ok(self.executable.display().to_string())
        }
        async fn close(&mut self) -> Result<(), DriverError> {
            Ok(())
        }
    }

    /// Launcher that only starts executables in `working`.
    pub(crate) struct ListLauncher {
        pub working: Vec<PathBuf>,
        pub launched: Arc<std::sync::Mutex<Vec<PathBuf>>>,
    }

    impl ListLauncher {
        pub fn new(working: &[&str]) -> Self {
            Self {
                working: working.iter().map(PathBuf::from).collect(),
                launched: Arc::new(std::sync::Mutex::new(Vec::new())),
            }
        }
    }

    #[async_trait]
    impl DriverLauncher for ListLauncher {
        async fn launch(
            &self,
            executable: &Path,
            _settings: &BrowserSettings,
        ) -> Result<Box<dyn BrowserDriver>, DriverError> {
            self.launched.lock().unwrap().push(executable.to_path_buf());
            if self.working.iter().any(|p| p == executable) {
                Ok(Box::new(NullDriver {
                    executable: executable.to_path_buf(),
                }))
            } else {
                Err(DriverError::Launch("version mismatch".to_string()))
            }
        }
    }

    pub(crate) fn test_context() -> ProvisionContext {
        let installer = ManagedInstaller::new(
            std::env::temp_dir().join("imgharvest-test-unused"),
            "http://127.0.0.1:9/unused.json".to_string(),
            "test".to_string(),
        );
        ProvisionContext::new(None, installer)
    }

    #[tokio::test]
    async fn test_falls_back_to_system_driver() {
        let explicit = FixedStep::fail("explicit", "no such file");
        let managed = FixedStep::fail("managed", "network unavailable");
        let system = FixedStep::ok("system", "/usr/bin/chromium");
        let managed_calls = managed.calls.clone();

        let provisioner = DriverProvisioner::with_steps(
            vec![Box::new(explicit), Box::new(managed), Box::new(system)],
            Arc::new(ListLauncher::new(&["/usr/bin/chromium"])),
        );

        let mut driver = provisioner.provision(&test_context()).await.unwrap();
        assert_eq!(driver.page_content().await.unwrap(), "/usr/bin/chromium");
        assert_eq!(managed_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_first_working_step_wins() {
        let explicit = FixedStep::ok("explicit", "/opt/chrome");
        let system = FixedStep::ok("system", "/usr/bin/chromium");
        let system_calls = system.calls.clone();

        let provisioner = DriverProvisioner::with_steps(
            vec![Box::new(explicit), Box::new(system)],
            Arc::new(ListLauncher::new(&["/opt/chrome", "/usr/bin/chromium"])),
        );

        let mut driver = provisioner.provision(&test_context()).await.unwrap();
        assert_eq!(driver.page_content().await.unwrap(), "/opt/chrome");
        assert_eq!(system_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_launch_failure_moves_to_next_step() {
        let launcher = ListLauncher::new(&["/usr/bin/chromium"]);
        let launched = launcher.launched.clone();
        let provisioner = DriverProvisioner::with_steps(
            vec![
                Box::new(FixedStep::ok("managed", "/cache/chrome-old")),
                Box::new(FixedStep::ok("system", "/usr/bin/chromium")),
            ],
            Arc::new(launcher),
        );

        assert!(provisioner.provision(&test_context()).await.is_ok());
        assert_eq!(
            *launched.lock().unwrap(),
            vec![PathBuf::from("/cache/chrome-old"), PathBuf::from("/usr/bin/chromium")]
        );
    }

    #[tokio::test]
    async fn test_all_steps_failing_is_no_driver_available() {
        let provisioner = DriverProvisioner::with_steps(
            vec![
                Box::new(FixedStep::fail("explicit", "no such file")),
                Box::new(FixedStep::fail("managed", "network unavailable")),
                Box::new(FixedStep::fail("system", "not on PATH")),
            ],
            Arc::new(ListLauncher::new(&[])),
        );

        match provisioner.provision(&test_context()).await {
            Err(ProvisionError::NoDriverAvailable { attempts }) => {
                assert_eq!(attempts.len(), 3);
                assert!(attempts[0].starts_with("explicit:"));
                assert!(attempts[1].contains("network unavailable"));
                assert!(attempts[2].starts_with("system:"));
            }
            Ok(_) => panic!("expected NoDriverAvailable"),
        }
    }

    #[tokio::test]
    async fn test_default_chain_with_bad_explicit_path_and_no_managed() {
        let mut ctx = test_context().without_managed();
        ctx.explicit_path = Some(PathBuf::from("/definitely/not/a/browser"));

        let provisioner = DriverProvisioner::with_steps(
            vec![
                Box::new(ExplicitPath),
                Box::new(ManagedInstall),
                Box::new(SystemPath::with_names(["imgharvest-no-such-browser"])),
            ],
            Arc::new(ListLauncher::new(&[])),
        );

        match provisioner.provision(&ctx).await {
            Err(ProvisionError::NoDriverAvailable { attempts }) => {
                assert!(attempts[0].contains("/definitely/not/a/browser"));
                assert_eq!(attempts[1], "managed: not configured");
                assert!(attempts[2].contains("imgharvest-no-such-browser"));
            }
            Ok(_) => panic!("expected NoDriverAvailable"),
        }
    }

    #[tokio::test]
    async fn test_explicit_path_accepts_existing_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let mut ctx = test_context();
        ctx.explicit_path = Some(file.path().to_path_buf());

        assert_eq!(ExplicitPath.resolve(&ctx).await.unwrap(), file.path());
        assert!(matches!(
            ExplicitPath.resolve(&test_context()).await,
            Err(DriverError::NotConfigured)
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_system_path_uses_which() {
        let step = SystemPath::with_names(["imgharvest-no-such-browser", "sh"]);
        let path = step.resolve(&test_context()).await.unwrap();
        assert!(path.ends_with("sh"));
    }
}
