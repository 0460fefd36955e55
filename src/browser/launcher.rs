use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig as CdpBrowserConfig};
use tokio::time::sleep;

use super::cdp::CdpContext;
use super::context::{BrowserContext, SessionTimeouts};
use super::discovery::resolve_browser;
use crate::config::Config;
use crate::error::{BridgeError, Result};

/// How long a freshly started or remote browser gets to expose its CDP endpoint.
const CDP_READY_TIMEOUT: Duration = Duration::from_secs(10);
const CDP_READY_POLL: Duration = Duration::from_millis(500);

/// What a session needs from the browser it is about to drive.
#[derive(Debug, Clone, Default)]
pub struct LaunchSpec {
    /// Persistent profile directory (launch mode only)
    pub user_data_dir: Option<PathBuf>,
    /// Unpacked extension root to load (launch mode only)
    pub extension_dir: Option<PathBuf>,
}

/// Obtains a [`BrowserContext`], either by launching a browser or by attaching
/// to one that is already running. Downstream components never know which.
#[async_trait]
pub trait ContextProvider: Send + Sync {
    async fn resolve_context(&self, spec: &LaunchSpec) -> Result<Arc<dyn BrowserContext>>;

    /// Whether this provider starts its own browser (and so needs an
    /// extension package and a profile directory)
    fn launches_browser(&self) -> bool;

    fn timeouts(&self) -> SessionTimeouts;
}

/// Pick the provider for the current configuration: attach when a
/// remote-debugging URL is configured, launch otherwise.
pub fn provider_from_config(config: &Config) -> Arc<dyn ContextProvider> {
    match config.remote_debugging_url() {
        Some(url) => {
            tracing::info!("Attaching to existing browser at {}", url);
            Arc::new(RemoteAttach::new(url, SessionTimeouts::from(&config.timeouts)))
        }
        None => Arc::new(LocalLauncher::from_config(config)),
    }
}

/// Launches a Chromium-family browser with the wallet extension loaded.
pub struct LocalLauncher {
    executable: Option<String>,
    headless: bool,
    extra_args: Vec<String>,
    timeouts: SessionTimeouts,
}

impl LocalLauncher {
    pub fn from_config(config: &Config) -> Self {
        Self {
            executable: config.browser.executable.clone(),
            headless: config.browser.headless,
            extra_args: config.browser.extra_args.clone(),
            timeouts: SessionTimeouts::from(&config.timeouts),
        }
    }

    /// Set headless mode
    pub fn headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    /// Browser arguments; chromiumoxide's defaults are disabled because they
    /// include `--disable-extensions`.
    fn build_args(&self, extension_dir: Option<&Path>) -> Vec<String> {
        let mut args = vec![
            "--no-first-run".to_string(),
            "--no-default-browser-check".to_string(),
            "--disable-blink-features=AutomationControlled".to_string(),
            "--disable-infobars".to_string(),
            "--window-size=1280,900".to_string(),
            "--disable-save-password-bubble".to_string(),
            "--disable-translate".to_string(),
            // Wallet popups run in background windows
            "--disable-background-timer-throttling".to_string(),
            "--disable-backgrounding-occluded-windows".to_string(),
            "--disable-renderer-backgrounding".to_string(),
        ];

        if let Some(dir) = extension_dir {
            args.push(format!("--disable-extensions-except={}", dir.display()));
            args.push(format!("--load-extension={}", dir.display()));
        }

        // Old headless mode cannot run extensions
        if self.headless {
            args.push("--headless=new".to_string());
        }

        args.extend(self.extra_args.iter().cloned());
        args
    }
}

#[async_trait]
impl ContextProvider for LocalLauncher {
    async fn resolve_context(&self, spec: &LaunchSpec) -> Result<Arc<dyn BrowserContext>> {
        let browser_info = resolve_browser(self.executable.as_deref())?;
        let args = self.build_args(spec.extension_dir.as_deref());

        tracing::debug!(
            "Launching browser: {:?} with args: {:?}",
            browser_info.path,
            args
        );

        let mut builder = CdpBrowserConfig::builder()
            .chrome_executable(&browser_info.path)
            .disable_default_args()
            .with_head()
            .launch_timeout(CDP_READY_TIMEOUT)
            .args(args);

        if let Some(dir) = &spec.user_data_dir {
            builder = builder.user_data_dir(dir);
        }

        let cdp_config = builder.build().map_err(BridgeError::BrowserLaunchFailed)?;

        let (browser, handler) = Browser::launch(cdp_config).await.map_err(|e| {
            BridgeError::BrowserLaunchFailed(format!(
                "Failed to launch {}: {}",
                browser_info.browser_type.name(),
                e
            ))
        })?;

        tracing::info!(
            "Launched {} ({})",
            browser_info.browser_type.name(),
            browser_info.version.as_deref().unwrap_or("unknown version")
        );

        Ok(Arc::new(CdpContext::new(browser, handler, true)))
    }

    fn launches_browser(&self) -> bool {
        true
    }

    fn timeouts(&self) -> SessionTimeouts {
        self.timeouts
    }
}

/// Attaches to an already running browser through its remote-debugging endpoint.
pub struct RemoteAttach {
    endpoint: String,
    timeouts: SessionTimeouts,
}

impl RemoteAttach {
    pub fn new(endpoint: impl Into<String>, timeouts: SessionTimeouts) -> Self {
        Self {
            endpoint: endpoint.into(),
            timeouts,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl ContextProvider for RemoteAttach {
    async fn resolve_context(&self, _spec: &LaunchSpec) -> Result<Arc<dyn BrowserContext>> {
        let ws_url = resolve_ws_url(&self.endpoint).await?;

        let (browser, handler) = Browser::connect(ws_url.clone()).await.map_err(|e| {
            BridgeError::CdpConnectionFailed(format!(
                "Failed to connect to browser at {}: {}",
                ws_url, e
            ))
        })?;

        Ok(Arc::new(CdpContext::new(browser, handler, false)))
    }

    fn launches_browser(&self) -> bool {
        false
    }

    fn timeouts(&self) -> SessionTimeouts {
        self.timeouts
    }
}

/// Turn a remote-debugging endpoint into the browser WebSocket URL.
///
/// Accepts `ws://` URLs as-is; `http://host:port`, `host:port` and a bare
/// port are resolved through `/json/version`.
pub async fn resolve_ws_url(endpoint: &str) -> Result<String> {
    let endpoint = endpoint.trim();
    if endpoint.starts_with("ws://") || endpoint.starts_with("wss://") {
        return Ok(endpoint.to_string());
    }

    let url = format!("{}/json/version", http_base(endpoint));

    // Build client with NO_PROXY for localhost
    let client = reqwest::Client::builder()
        .no_proxy()
        .timeout(Duration::from_secs(5))
        .build()?;

    let attempts = (CDP_READY_TIMEOUT.as_millis() / CDP_READY_POLL.as_millis()).max(1);
    let mut last_error = String::from("no response");

    for i in 0..attempts {
        match client.get(&url).send().await {
            Ok(response) if response.status().is_success() => {
                let json: serde_json::Value = response.json().await.map_err(|e| {
                    BridgeError::CdpConnectionFailed(format!(
                        "Failed to parse CDP response: {}",
                        e
                    ))
                })?;

                return json
                    .get("webSocketDebuggerUrl")
                    .and_then(|v| v.as_str())
                    .map(|s| s.to_string())
                    .ok_or_else(|| {
                        BridgeError::CdpConnectionFailed(
                            "No WebSocket URL in CDP response".to_string(),
                        )
                    });
            }
            Ok(response) => {
                last_error = format!("HTTP {}", response.status());
                tracing::debug!("CDP not ready yet (attempt {})", i + 1);
            }
            Err(e) => {
                last_error = e.to_string();
                tracing::debug!("CDP connection attempt {} failed: {}", i + 1, e);
            }
        }

        sleep(CDP_READY_POLL).await;
    }

    Err(BridgeError::CdpConnectionFailed(format!(
        "Timeout waiting for {}: {}",
        url, last_error
    )))
}

fn http_base(endpoint: &str) -> String {
    let trimmed = endpoint.trim_end_matches('/');
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else if trimmed.parse::<u16>().is_ok() {
        format!("http://127.0.0.1:{}", trimmed)
    } else {
        format!("http://{}", trimmed)
    }
}
