use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Browser not found. Please install Chrome, Chromium, Brave, or Edge.")]
    BrowserNotFound,

    #[error("Browser launch failed: {0}")]
    BrowserLaunchFailed(String),

    #[error("CDP connection failed: {0}")]
    CdpConnectionFailed(String),

    #[error("Wallet extension not found in the browser session after {waited_ms}ms")]
    ExtensionNotFound { waited_ms: u64 },

    #[error("Extension error: {0}")]
    ExtensionError(String),

    #[error("Invalid extension version '{version}': {reason}")]
    InvalidVersion { version: String, reason: String },

    #[error(
        "No pre-baked wallet profile for fingerprint {fingerprint}. \
         Run `walletbridge prebake` first"
    )]
    ProfileCacheMissing { fingerprint: String },

    #[error("Page is closed")]
    PageClosed,

    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("JavaScript execution failed: {0}")]
    JavaScriptError(String),

    #[error("Injected wallet provider is not available on this page")]
    ProviderUnavailable,

    #[error("Provider rejected request ({code}): {message}")]
    Provider { code: i64, message: String },

    #[error("Wallet step '{step}' failed: {reason}")]
    WalletStep { step: &'static str, reason: String },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Zip error: {0}")]
    ZipError(#[from] zip::result::ZipError),

    #[error("CDP error: {0}")]
    Cdp(#[from] chromiumoxide::error::CdpError),

    #[error("{0}")]
    Other(String),
}

impl BridgeError {
    /// Setup errors mean the environment is misconfigured; they abort the
    /// test instead of degrading.
    pub fn is_fatal_setup(&self) -> bool {
        matches!(
            self,
            BridgeError::BrowserNotFound
                | BridgeError::BrowserLaunchFailed(_)
                | BridgeError::ExtensionNotFound { .. }
                | BridgeError::ExtensionError(_)
                | BridgeError::InvalidVersion { .. }
                | BridgeError::ProfileCacheMissing { .. }
                | BridgeError::ConfigError(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
