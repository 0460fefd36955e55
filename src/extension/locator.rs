use std::collections::HashSet;
use std::time::Duration;

use futures::stream::BoxStream;
use futures::StreamExt;
use tokio::time::{timeout_at, Instant};

use crate::browser::{BrowserContext, SessionTimeouts, TargetEntry};
use crate::config::WalletConfig;
use crate::error::{BridgeError, Result};

pub const EXTENSION_SCHEME: &str = "chrome-extension://";

/// Which step of the search produced the identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryPath {
    BackgroundScan,
    PageScan,
    BackgroundEvent,
    PageEvent,
    /// Found by the synchronous re-scan after an event wait timed out
    Rescan,
}

impl DiscoveryPath {
    pub fn is_event(&self) -> bool {
        matches!(self, DiscoveryPath::BackgroundEvent | DiscoveryPath::PageEvent)
    }
}

/// Chrome extension ids are 32 characters from `a` to `p`.
pub fn is_valid_extension_id(id: &str) -> bool {
    id.len() == 32 && id.bytes().all(|b| (b'a'..=b'p').contains(&b))
}

/// Extract the extension id from a `chrome-extension://{id}/...` URL.
pub fn extension_id_from_url(url: &str) -> Option<&str> {
    let rest = url.strip_prefix(EXTENSION_SCHEME)?;
    let id = rest.split(['/', '?', '#']).next()?;
    is_valid_extension_id(id).then_some(id)
}

/// Finds the wallet extension's identifier in a live browser context.
///
/// Background targets are scanned first, then pages; if neither shows the
/// extension, target-creation events are awaited (background first, then
/// pages), re-scanning after each wait. The event subscription is opened
/// before the first scan. Denylisted ids never match.
#[derive(Debug, Clone)]
pub struct ExtensionLocator {
    denylist: HashSet<String>,
    wait: Duration,
}

impl ExtensionLocator {
    pub fn new<I, S>(denylist: I, wait: Duration) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            denylist: denylist.into_iter().map(Into::into).collect(),
            wait,
        }
    }

    pub fn from_config(wallet: &WalletConfig, timeouts: &SessionTimeouts) -> Self {
        Self::new(wallet.denylist.iter().cloned(), timeouts.extension_discovery)
    }

    pub async fn locate(&self, context: &dyn BrowserContext) -> Result<String> {
        let (id, _) = self.locate_with_path(context).await?;
        Ok(id)
    }

    pub async fn locate_with_path(
        &self,
        context: &dyn BrowserContext,
    ) -> Result<(String, DiscoveryPath)> {
        let mut events = context.target_events().await?;

        if let Some(found) = self.scan(&context.targets().await?) {
            tracing::debug!("Extension {} found via {:?}", found.0, found.1);
            return Ok(found);
        }

        // Page targets seen while waiting for a background target
        let mut pending_pages = Vec::new();

        if let Some(id) = self
            .wait_for_event(&mut events, true, &mut pending_pages)
            .await
        {
            return Ok(self.found(id, DiscoveryPath::BackgroundEvent));
        }
        if let Some((id, _)) = self.scan(&context.targets().await?) {
            return Ok(self.found(id, DiscoveryPath::Rescan));
        }

        if let Some(id) = pending_pages.into_iter().next() {
            return Ok(self.found(id, DiscoveryPath::PageEvent));
        }
        let mut ignored = Vec::new();
        if let Some(id) = self.wait_for_event(&mut events, false, &mut ignored).await {
            return Ok(self.found(id, DiscoveryPath::PageEvent));
        }
        if let Some((id, _)) = self.scan(&context.targets().await?) {
            return Ok(self.found(id, DiscoveryPath::Rescan));
        }

        Err(BridgeError::ExtensionNotFound {
            waited_ms: (self.wait * 2).as_millis() as u64,
        })
    }

    fn found(&self, id: String, path: DiscoveryPath) -> (String, DiscoveryPath) {
        tracing::debug!("Extension {} found via {:?}", id, path);
        (id, path)
    }

    fn accept<'a>(&self, target: &'a TargetEntry) -> Option<&'a str> {
        let id = extension_id_from_url(&target.url)?;
        if self.denylist.contains(id) {
            tracing::debug!("Skipping denylisted extension {} ({})", id, target.url);
            return None;
        }
        Some(id)
    }

    fn scan(&self, targets: &[TargetEntry]) -> Option<(String, DiscoveryPath)> {
        let background = targets
            .iter()
            .filter(|t| t.is_background())
            .find_map(|t| self.accept(t))
            .map(|id| (id.to_string(), DiscoveryPath::BackgroundScan));

        background.or_else(|| {
            targets
                .iter()
                .filter(|t| t.is_page())
                .find_map(|t| self.accept(t))
                .map(|id| (id.to_string(), DiscoveryPath::PageScan))
        })
    }

    /// Wait up to the locator's bound for a matching new target. With
    /// `background_only`, matching page targets are collected into `pages`.
    async fn wait_for_event(
        &self,
        events: &mut BoxStream<'static, TargetEntry>,
        background_only: bool,
        pages: &mut Vec<String>,
    ) -> Option<String> {
        let deadline = Instant::now() + self.wait;

        loop {
            let target = match timeout_at(deadline, events.next()).await {
                Ok(Some(target)) => target,
                Ok(None) | Err(_) => return None,
            };

            let Some(id) = self.accept(&target) else {
                continue;
            };

            if target.is_background() || (!background_only && target.is_page()) {
                return Some(id.to_string());
            }
            if target.is_page() {
                pages.push(id.to_string());
            }
        }
    }
}
