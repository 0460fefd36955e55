mod installer;
mod locator;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};

pub use installer::{
    extract_zip, read_manifest_name, resolve_extension_root, ExtensionInstaller,
    InstalledExtension,
};
pub use locator::{
    extension_id_from_url, is_valid_extension_id, DiscoveryPath, ExtensionLocator,
    EXTENSION_SCHEME,
};

use crate::browser::{BrowserContext, SharedPage};
use crate::config::WalletConfig;
use crate::error::Result;

/// A located wallet extension inside one session.
///
/// The id never changes once resolved. The control page is opened lazily at
/// `chrome-extension://{id}/{home_path}` and reopened if it was closed.
pub struct ExtensionHandle {
    id: String,
    home_path: String,
    notification_path: String,
    context: Arc<dyn BrowserContext>,
    control_page: Mutex<Option<SharedPage>>,
}

impl ExtensionHandle {
    pub fn new(id: impl Into<String>, context: Arc<dyn BrowserContext>, wallet: &WalletConfig) -> Self {
        Self {
            id: id.into(),
            home_path: wallet.home_path.clone(),
            notification_path: wallet.notification_path.clone(),
            context,
            control_page: Mutex::new(None),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn url_for(&self, path: &str) -> String {
        format!(
            "{}{}/{}",
            EXTENSION_SCHEME,
            self.id,
            path.trim_start_matches('/')
        )
    }

    pub fn home_url(&self) -> String {
        self.url_for(&self.home_path)
    }

    /// The extension's own UI page, reusing an open one when possible.
    pub async fn control_page(&self) -> Result<SharedPage> {
        let mut slot = self.control_page.lock().await;

        if let Some(page) = slot.as_ref() {
            if !page.is_closed().await {
                return Ok(page.clone());
            }
            tracing::debug!("[wallet] control page was closed, reopening");
        }

        let page = match self.find_open_page(&self.home_path).await? {
            Some(page) => page,
            None => self.context.new_page(&self.home_url()).await?,
        };
        *slot = Some(page.clone());
        Ok(page)
    }

    /// The page showing a pending approval: the wallet's notification popup
    /// if it opens within `wait`, otherwise the reloaded control page.
    pub async fn prompt_page(&self, wait: Duration, poll: Duration) -> Result<SharedPage> {
        let deadline = Instant::now() + wait;

        loop {
            if let Some(page) = self.find_open_page(&self.notification_path).await? {
                return Ok(page);
            }
            if Instant::now() >= deadline {
                break;
            }
            sleep(poll).await;
        }

        let page = self.control_page().await?;
        // The home page routes to pending confirmations on load
        page.reload().await?;
        Ok(page)
    }

    async fn find_open_page(&self, path: &str) -> Result<Option<SharedPage>> {
        let prefix = self.url_for(path);
        for page in self.context.pages().await? {
            if let Ok(Some(url)) = page.url().await {
                if url.starts_with(&prefix) {
                    return Ok(Some(page));
                }
            }
        }
        Ok(None)
    }
}

impl std::fmt::Debug for ExtensionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtensionHandle")
            .field("id", &self.id)
            .field("home_path", &self.home_path)
            .finish()
    }
}
