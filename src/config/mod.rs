mod wallet;

pub use wallet::{DappConfig, NetworkConfig, OnboardingSelectors, WalletConfig, WalletSelectors};

use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, Result};

/// Environment variable that switches the bridge into attach mode.
pub const REMOTE_DEBUGGING_ENV: &str = "WALLETBRIDGE_REMOTE_DEBUGGING_URL";

/// Normalize a pinned extension version: surrounding whitespace and a leading
/// `v` are dropped, the rest must be semver.
pub fn parse_version(version: &str) -> Result<String> {
    let trimmed = version.trim().trim_start_matches('v');
    semver::Version::parse(trimmed)
        .map(|v| v.to_string())
        .map_err(|e| BridgeError::InvalidVersion {
            version: version.to_string(),
            reason: e.to_string(),
        })
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Browser configuration
    #[serde(default)]
    pub browser: BrowserConfig,

    /// On-disk caches (extension packages, pre-baked profiles)
    #[serde(default)]
    pub cache: CacheConfig,

    /// Wallet extension configuration
    #[serde(default)]
    pub wallet: WalletConfig,

    /// dApp page affordances
    #[serde(default)]
    pub dapp: DappConfig,

    /// Network the tests expect the wallet to be on
    #[serde(default)]
    pub network: NetworkConfig,

    #[serde(default)]
    pub timeouts: TimeoutConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserConfig {
    /// Browser executable path (overrides auto-discovery)
    pub executable: Option<String>,

    /// Engine name used to derive profile directory names
    #[serde(default = "default_engine")]
    pub engine: String,

    /// Default headless mode
    #[serde(default)]
    pub headless: bool,

    /// Attach to an already running browser instead of launching one
    pub remote_debugging_url: Option<String>,

    /// Extra browser arguments
    #[serde(default)]
    pub extra_args: Vec<String>,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            executable: None,
            engine: default_engine(),
            headless: false,
            remote_debugging_url: None,
            extra_args: Vec::new(),
        }
    }
}

fn default_engine() -> String {
    "chromium".to_string()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Cache root (defaults to `{cache_dir}/walletbridge`)
    pub root: Option<String>,

    /// Parent directory for per-test profiles (defaults to the OS temp dir)
    pub temp_root: Option<String>,
}

impl CacheConfig {
    pub fn root_dir(&self) -> PathBuf {
        match self.root.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            Some(dir) => expand_path(dir),
            None => dirs::cache_dir()
                .unwrap_or_else(|| PathBuf::from(".cache"))
                .join("walletbridge"),
        }
    }

    pub fn temp_dir(&self) -> PathBuf {
        match self
            .temp_root
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            Some(dir) => expand_path(dir),
            None => std::env::temp_dir(),
        }
    }
}

/// Timeouts in milliseconds. Every wait in the bridge is bounded by one of these.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    #[serde(default = "default_extension_discovery_ms")]
    pub extension_discovery_ms: u64,
    #[serde(default = "default_handshake_ms")]
    pub handshake_ms: u64,
    #[serde(default = "default_provider_poll_ms")]
    pub provider_poll_ms: u64,
    #[serde(default = "default_element_poll_ms")]
    pub element_poll_ms: u64,
    #[serde(default = "default_wallet_step_ms")]
    pub wallet_step_ms: u64,
    #[serde(default = "default_settlement_ms")]
    pub settlement_ms: u64,
}

fn default_extension_discovery_ms() -> u64 {
    10_000
}
fn default_handshake_ms() -> u64 {
    15_000
}
fn default_provider_poll_ms() -> u64 {
    500
}
fn default_element_poll_ms() -> u64 {
    100
}
fn default_wallet_step_ms() -> u64 {
    10_000
}
fn default_settlement_ms() -> u64 {
    20_000
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            extension_discovery_ms: default_extension_discovery_ms(),
            handshake_ms: default_handshake_ms(),
            provider_poll_ms: default_provider_poll_ms(),
            element_poll_ms: default_element_poll_ms(),
            wallet_step_ms: default_wallet_step_ms(),
            settlement_ms: default_settlement_ms(),
        }
    }
}

impl TimeoutConfig {
    pub fn extension_discovery(&self) -> Duration {
        Duration::from_millis(self.extension_discovery_ms)
    }
    pub fn handshake(&self) -> Duration {
        Duration::from_millis(self.handshake_ms)
    }
    pub fn provider_poll(&self) -> Duration {
        Duration::from_millis(self.provider_poll_ms)
    }
    pub fn element_poll(&self) -> Duration {
        Duration::from_millis(self.element_poll_ms)
    }
    pub fn wallet_step(&self) -> Duration {
        Duration::from_millis(self.wallet_step_ms)
    }
    pub fn settlement(&self) -> Duration {
        Duration::from_millis(self.settlement_ms)
    }
}

fn expand_path(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).to_string())
}

impl Config {
    /// Load configuration from all sources (defaults, file, env)
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration using an explicit config file path
    pub fn load_from(config_path: &Path) -> Result<Self> {
        let config: Config = Figment::new()
            // Start with defaults
            .merge(Serialized::defaults(Config::default()))
            // Merge config file if exists
            .merge(Toml::file(config_path))
            // Merge environment variables (WALLETBRIDGE_SECTION__KEY)
            .merge(Env::prefixed("WALLETBRIDGE_").split("__"))
            // The attach-mode switch keeps its short, documented name
            .merge(
                Env::raw()
                    .only(&[REMOTE_DEBUGGING_ENV])
                    .map(|_| "browser.remote_debugging_url".into()),
            )
            .extract()
            .map_err(|e| BridgeError::ConfigError(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Get the configuration file path
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("walletbridge")
            .join("config.toml")
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content =
            toml::to_string_pretty(self).map_err(|e| BridgeError::ConfigError(e.to_string()))?;

        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        parse_version(&self.wallet.version)?;

        if self.network.chain_id == 0 {
            return Err(BridgeError::ConfigError(
                "network.chain_id must be non-zero".to_string(),
            ));
        }

        if self.wallet.password.len() < 8 {
            return Err(BridgeError::ConfigError(
                "wallet.password must be at least 8 characters".to_string(),
            ));
        }

        Ok(())
    }

    /// Remote-debugging endpoint, if attach mode is active
    pub fn remote_debugging_url(&self) -> Option<&str> {
        self.browser
            .remote_debugging_url
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}
