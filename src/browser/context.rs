use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde_json::Value;
use tokio::time::{sleep, timeout_at, Instant};

use super::selector::Selector;
use crate::config::TimeoutConfig;
use crate::error::Result;
use crate::state_transfer::StoredCookie;

/// Kind of a browser target as reported over CDP.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetKind {
    ServiceWorker,
    BackgroundPage,
    Page,
    Other(String),
}

impl TargetKind {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "service_worker" => TargetKind::ServiceWorker,
            "background_page" => TargetKind::BackgroundPage,
            "page" => TargetKind::Page,
            other => TargetKind::Other(other.to_string()),
        }
    }
}

/// A browser target (tab, worker, background page).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetEntry {
    pub id: String,
    pub kind: TargetKind,
    pub url: String,
    pub title: String,
}

impl TargetEntry {
    pub fn new(id: impl Into<String>, kind: TargetKind, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            url: url.into(),
            title: String::new(),
        }
    }

    /// Service workers and background pages
    pub fn is_background(&self) -> bool {
        matches!(
            self.kind,
            TargetKind::ServiceWorker | TargetKind::BackgroundPage
        )
    }

    pub fn is_page(&self) -> bool {
        self.kind == TargetKind::Page
    }
}

/// One controllable browser context: the set of targets and pages of a
/// launched or attached browser.
#[async_trait]
pub trait BrowserContext: Send + Sync {
    /// Snapshot of the currently known targets
    async fn targets(&self) -> Result<Vec<TargetEntry>>;

    /// Stream of targets created after the call returns
    async fn target_events(&self) -> Result<BoxStream<'static, TargetEntry>>;

    async fn pages(&self) -> Result<Vec<SharedPage>>;

    async fn new_page(&self, url: &str) -> Result<SharedPage>;

    async fn close(&self) -> Result<()>;
}

/// A single page (tab) inside a [`BrowserContext`].
#[async_trait]
pub trait PageHandle: Send + Sync {
    async fn url(&self) -> Result<Option<String>>;

    async fn goto(&self, url: &str) -> Result<()>;

    async fn reload(&self) -> Result<()>;

    /// Evaluate an expression, awaiting promises, and return its JSON value
    async fn evaluate(&self, expression: &str) -> Result<Value>;

    async fn click(&self, selector: &Selector) -> Result<()>;

    async fn fill(&self, selector: &Selector, text: &str) -> Result<()>;

    async fn is_visible(&self, selector: &Selector) -> Result<bool>;

    async fn bring_to_front(&self) -> Result<()>;

    /// All cookies visible to the browser context
    async fn cookies(&self) -> Result<Vec<StoredCookie>>;

    async fn set_cookies(&self, cookies: &[StoredCookie]) -> Result<()>;

    async fn is_closed(&self) -> bool;

    async fn close(&self) -> Result<()>;
}

pub type SharedPage = Arc<dyn PageHandle>;

/// Wait budgets shared by every component of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionTimeouts {
    pub extension_discovery: Duration,
    pub handshake: Duration,
    pub provider_poll: Duration,
    pub element_poll: Duration,
    pub wallet_step: Duration,
    pub settlement: Duration,
}

impl Default for SessionTimeouts {
    fn default() -> Self {
        Self::from(&TimeoutConfig::default())
    }
}

impl From<&TimeoutConfig> for SessionTimeouts {
    fn from(config: &TimeoutConfig) -> Self {
        Self {
            extension_discovery: config.extension_discovery(),
            handshake: config.handshake(),
            provider_poll: config.provider_poll(),
            element_poll: config.element_poll(),
            wallet_step: config.wallet_step(),
            settlement: config.settlement(),
        }
    }
}

/// Poll until the element is visible. Returns `false` on timeout or when the
/// page goes away; evaluation errors count as "not visible yet".
pub async fn wait_for_visible(
    page: &dyn PageHandle,
    selector: &Selector,
    timeout: Duration,
    poll: Duration,
) -> bool {
    first_visible(page, &[selector], timeout, poll).await.is_some()
}

/// Poll until one of `selectors` is visible and return its index. Each check
/// is bounded by the overall deadline, so a stalled renderer cannot stretch
/// the wait past `timeout`.
pub async fn first_visible(
    page: &dyn PageHandle,
    selectors: &[&Selector],
    timeout: Duration,
    poll: Duration,
) -> Option<usize> {
    let deadline = Instant::now() + timeout;

    loop {
        for (index, selector) in selectors.iter().enumerate() {
            match timeout_at(deadline, page.is_visible(selector)).await {
                Ok(Ok(true)) => return Some(index),
                Ok(Ok(false)) => {}
                Ok(Err(e)) => {
                    if timeout_at(deadline, page.is_closed()).await.unwrap_or(false) {
                        return None;
                    }
                    tracing::trace!("visibility check for '{}' failed: {}", selector, e);
                }
                Err(_) => return None,
            }
        }

        if Instant::now() >= deadline {
            return None;
        }

        sleep(poll).await;
    }
}

/// Wait for the element, then click it. Returns `false` when it never appeared.
pub async fn click_when_visible(
    page: &dyn PageHandle,
    selector: &Selector,
    timeout: Duration,
    poll: Duration,
) -> Result<bool> {
    if !wait_for_visible(page, selector, timeout, poll).await {
        return Ok(false);
    }
    page.click(selector).await?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_kind_parses_cdp_types() {
        assert_eq!(TargetKind::parse("service_worker"), TargetKind::ServiceWorker);
        assert_eq!(TargetKind::parse("background_page"), TargetKind::BackgroundPage);
        assert_eq!(TargetKind::parse("page"), TargetKind::Page);
        assert_eq!(
            TargetKind::parse("iframe"),
            TargetKind::Other("iframe".to_string())
        );
    }

    #[test]
    fn background_targets_are_classified() {
        let worker = TargetEntry::new("1", TargetKind::ServiceWorker, "chrome-extension://x/bg.js");
        let tab = TargetEntry::new("2", TargetKind::Page, "https://app.example");
        assert!(worker.is_background());
        assert!(!worker.is_page());
        assert!(tab.is_page());
        assert!(!tab.is_background());
    }

    #[test]
    fn session_timeouts_follow_config() {
        let mut config = TimeoutConfig::default();
        config.handshake_ms = 2_500;
        let timeouts = SessionTimeouts::from(&config);
        assert_eq!(timeouts.handshake, Duration::from_millis(2_500));
        assert_eq!(timeouts.provider_poll, Duration::from_millis(500));
    }
}
