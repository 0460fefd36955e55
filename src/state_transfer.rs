//! Cookie and localStorage hand-off between browser contexts.
//!
//! The on-disk format is the common `storageState` JSON shape
//! (`{"cookies": [...], "origins": [{"origin", "localStorage": [{"name", "value"}]}]}`)
//! so state captured by other tooling can be replayed as-is.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::browser::{BrowserContext, PageHandle};
use crate::error::{BridgeError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredCookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    #[serde(default = "default_cookie_path")]
    pub path: String,
    /// Unix seconds; `None` for session cookies
    #[serde(default)]
    pub expires: Option<f64>,
    #[serde(default)]
    pub http_only: bool,
    #[serde(default)]
    pub secure: bool,
    #[serde(default)]
    pub same_site: Option<String>,
}

fn default_cookie_path() -> String {
    "/".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageEntry {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OriginState {
    pub origin: String,
    #[serde(default)]
    pub local_storage: Vec<StorageEntry>,
}

/// Snapshot of client-side state, replayed in order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StorageState {
    #[serde(default)]
    pub cookies: Vec<StoredCookie>,
    #[serde(default)]
    pub origins: Vec<OriginState>,
}

impl StorageState {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            BridgeError::Other(format!(
                "Failed to read storage state {}: {}",
                path.display(),
                e
            ))
        })?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty() && self.origins.iter().all(|o| o.local_storage.is_empty())
    }
}

/// Capture cookies and the localStorage of each origin, in the given order.
pub async fn capture(context: &dyn BrowserContext, origins: &[String]) -> Result<StorageState> {
    let page = context.new_page("about:blank").await?;
    let result = capture_with(page.as_ref(), origins).await;
    close_disposable(page.as_ref()).await;
    result
}

async fn capture_with(page: &dyn PageHandle, origins: &[String]) -> Result<StorageState> {
    let cookies = page.cookies().await?;
    let mut captured = Vec::with_capacity(origins.len());

    for origin in origins {
        page.goto(origin).await?;
        let raw = page.evaluate(READ_LOCAL_STORAGE_JS).await?;
        let local_storage: Vec<StorageEntry> = serde_json::from_value(raw)?;
        tracing::debug!(
            "Captured {} localStorage entries from {}",
            local_storage.len(),
            origin
        );
        captured.push(OriginState {
            origin: origin.clone(),
            local_storage,
        });
    }

    Ok(StorageState {
        cookies,
        origins: captured,
    })
}

/// Replay a captured state into `context` through one disposable page,
/// which is closed whether or not the replay succeeds.
pub async fn replay(context: &dyn BrowserContext, state: &StorageState) -> Result<()> {
    if state.is_empty() {
        return Ok(());
    }

    let page = context.new_page("about:blank").await?;
    let result = replay_with(page.as_ref(), state).await;
    close_disposable(page.as_ref()).await;
    result
}

async fn replay_with(page: &dyn PageHandle, state: &StorageState) -> Result<()> {
    page.set_cookies(&state.cookies).await?;

    for origin in &state.origins {
        if origin.local_storage.is_empty() {
            continue;
        }
        page.goto(&origin.origin).await?;
        page.evaluate(&write_local_storage_js(&origin.local_storage)?)
            .await?;
        tracing::debug!(
            "Replayed {} localStorage entries into {}",
            origin.local_storage.len(),
            origin.origin
        );
    }

    Ok(())
}

async fn close_disposable(page: &dyn PageHandle) {
    if let Err(e) = page.close().await {
        tracing::warn!("Failed to close state transfer page: {}", e);
    }
}

const READ_LOCAL_STORAGE_JS: &str = r#"(function() {
    const out = [];
    for (let i = 0; i < localStorage.length; i++) {
        const name = localStorage.key(i);
        out.push({ name, value: localStorage.getItem(name) ?? '' });
    }
    return out;
})()"#;

fn write_local_storage_js(entries: &[StorageEntry]) -> Result<String> {
    let entries_json = serde_json::to_string(entries)?;
    Ok(format!(
        "(function() {{ for (const e of {entries_json}) {{ localStorage.setItem(e.name, e.value); }} return true; }})()"
    ))
}
