use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::Browser;
use chromiumoxide::cdp::browser_protocol::network::{
    Cookie, CookieParam, CookieSameSite, TimeSinceEpoch,
};
use chromiumoxide::cdp::browser_protocol::storage::GetCookiesParams;
use chromiumoxide::cdp::browser_protocol::target::{EventTargetCreated, TargetInfo};
use chromiumoxide::cdp::js_protocol::runtime::EvaluateParams;
use chromiumoxide::handler::Handler;
use chromiumoxide::layout::Point;
use chromiumoxide::Page;
use futures::stream::BoxStream;
use futures::StreamExt;
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use super::context::{BrowserContext, PageHandle, SharedPage, TargetEntry, TargetKind};
use super::selector::Selector;
use crate::error::{BridgeError, Result};
use crate::state_transfer::StoredCookie;

/// Liveness checks must not hang on a wedged renderer.
const LIVENESS_TIMEOUT: Duration = Duration::from_secs(2);

impl From<&TargetInfo> for TargetEntry {
    fn from(info: &TargetInfo) -> Self {
        TargetEntry {
            id: info.target_id.as_ref().to_string(),
            kind: TargetKind::parse(&info.r#type),
            url: info.url.clone(),
            title: info.title.clone(),
        }
    }
}

/// [`BrowserContext`] backed by a chromiumoxide [`Browser`].
pub struct CdpContext {
    browser: Mutex<Browser>,
    handler_task: JoinHandle<()>,
    /// Launched browsers are closed on teardown; attached ones are only detached
    owns_process: bool,
}

impl CdpContext {
    pub fn new(browser: Browser, mut handler: Handler, owns_process: bool) -> Self {
        // Spawn handler to process events
        let handler_task = tokio::spawn(async move { while handler.next().await.is_some() {} });

        Self {
            browser: Mutex::new(browser),
            handler_task,
            owns_process,
        }
    }
}

impl Drop for CdpContext {
    fn drop(&mut self) {
        self.handler_task.abort();
    }
}

#[async_trait]
impl BrowserContext for CdpContext {
    async fn targets(&self) -> Result<Vec<TargetEntry>> {
        let mut browser = self.browser.lock().await;
        let targets = browser.fetch_targets().await?;
        Ok(targets.iter().map(TargetEntry::from).collect())
    }

    async fn target_events(&self) -> Result<BoxStream<'static, TargetEntry>> {
        let browser = self.browser.lock().await;
        let events = browser.event_listener::<EventTargetCreated>().await?;
        Ok(events
            .map(|event| TargetEntry::from(&event.target_info))
            .boxed())
    }

    async fn pages(&self) -> Result<Vec<SharedPage>> {
        let browser = self.browser.lock().await;
        let pages = browser.pages().await?;
        Ok(pages
            .into_iter()
            .map(|page| Arc::new(CdpPage::new(page)) as SharedPage)
            .collect())
    }

    async fn new_page(&self, url: &str) -> Result<SharedPage> {
        let browser = self.browser.lock().await;
        let page = browser.new_page(url).await?;
        Ok(Arc::new(CdpPage::new(page)))
    }

    async fn close(&self) -> Result<()> {
        if !self.owns_process {
            tracing::debug!("Detaching from remote browser without closing it");
            self.handler_task.abort();
            return Ok(());
        }

        let mut browser = self.browser.lock().await;
        browser.close().await?;
        if let Err(e) = browser.wait().await {
            tracing::debug!("Browser process did not exit cleanly: {}", e);
        }
        Ok(())
    }
}

/// [`PageHandle`] backed by a chromiumoxide [`Page`].
pub struct CdpPage {
    page: Page,
    closed: AtomicBool,
}

impl CdpPage {
    pub fn new(page: Page) -> Self {
        Self {
            page,
            closed: AtomicBool::new(false),
        }
    }

    async fn eval_raw(&self, expression: &str) -> Result<Value> {
        let params = EvaluateParams::builder()
            .expression(expression)
            .await_promise(true)
            .return_by_value(true)
            .build()
            .map_err(BridgeError::JavaScriptError)?;

        let result = self.page.evaluate_expression(params).await?;
        Ok(result.value().cloned().unwrap_or(Value::Null))
    }
}

#[async_trait]
impl PageHandle for CdpPage {
    async fn url(&self) -> Result<Option<String>> {
        Ok(self.page.url().await?)
    }

    async fn goto(&self, url: &str) -> Result<()> {
        self.page.goto(url).await?;
        Ok(())
    }

    async fn reload(&self) -> Result<()> {
        self.page.reload().await?;
        Ok(())
    }

    async fn evaluate(&self, expression: &str) -> Result<Value> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(BridgeError::PageClosed);
        }
        self.eval_raw(expression).await
    }

    async fn click(&self, selector: &Selector) -> Result<()> {
        let coords = self.evaluate(&selector.center_point_js()).await?;

        if coords.is_null() {
            return Err(BridgeError::ElementNotFound(selector.to_string()));
        }

        let x = coords
            .get("x")
            .and_then(|v| v.as_f64())
            .ok_or_else(|| BridgeError::Other("Invalid coordinates".to_string()))?;
        let y = coords
            .get("y")
            .and_then(|v| v.as_f64())
            .ok_or_else(|| BridgeError::Other("Invalid coordinates".to_string()))?;

        // Page::click moves the mouse first so hit-testing targets the element
        self.page.click(Point { x, y }).await?;
        Ok(())
    }

    async fn fill(&self, selector: &Selector, text: &str) -> Result<()> {
        let filled = self.evaluate(&selector.fill_js(text)).await?;
        if filled.as_bool() == Some(true) {
            Ok(())
        } else {
            Err(BridgeError::ElementNotFound(selector.to_string()))
        }
    }

    async fn is_visible(&self, selector: &Selector) -> Result<bool> {
        let visible = self.evaluate(&selector.visible_js()).await?;
        Ok(visible.as_bool().unwrap_or(false))
    }

    async fn bring_to_front(&self) -> Result<()> {
        self.page.bring_to_front().await?;
        Ok(())
    }

    /// Every cookie in the browser context, not only those of the page's URL.
    async fn cookies(&self) -> Result<Vec<StoredCookie>> {
        let response = self.page.execute(GetCookiesParams::default()).await?;
        Ok(response.result.cookies.iter().map(StoredCookie::from).collect())
    }

    async fn set_cookies(&self, cookies: &[StoredCookie]) -> Result<()> {
        if cookies.is_empty() {
            return Ok(());
        }
        let params = cookies.iter().map(cookie_param).collect();
        self.page.set_cookies(params).await?;
        Ok(())
    }

    async fn is_closed(&self) -> bool {
        if self.closed.load(Ordering::SeqCst) {
            return true;
        }

        let check = tokio::time::timeout(LIVENESS_TIMEOUT, self.eval_raw("true")).await;
        let closed = closed_after_liveness_check(check.as_ref().ok());
        if closed {
            self.closed.store(true, Ordering::SeqCst);
        }
        closed
    }

    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.page.clone().close().await?;
        Ok(())
    }
}

impl From<&Cookie> for StoredCookie {
    fn from(cookie: &Cookie) -> Self {
        StoredCookie {
            name: cookie.name.clone(),
            value: cookie.value.clone(),
            domain: cookie.domain.clone(),
            path: cookie.path.clone(),
            // Session cookies report -1
            expires: (cookie.expires > 0.0).then_some(cookie.expires),
            http_only: cookie.http_only,
            secure: cookie.secure,
            same_site: cookie.same_site.as_ref().map(|s| s.as_ref().to_string()),
        }
    }
}

/// Verdict of a liveness check; `None` means it timed out. A slow renderer
/// is still open, so only a failed evaluation counts as closed.
fn closed_after_liveness_check(check: Option<&Result<Value>>) -> bool {
    match check {
        None => {
            tracing::warn!("Page liveness check timed out after {:?}, treating page as open", LIVENESS_TIMEOUT);
            false
        }
        Some(Ok(_)) => false,
        // A thrown exception still means the renderer answered
        Some(Err(BridgeError::Cdp(chromiumoxide::error::CdpError::JavascriptException(_)))) => false,
        Some(Err(e)) => {
            tracing::debug!("Page liveness check failed: {}", e);
            true
        }
    }
}

fn cookie_param(cookie: &StoredCookie) -> CookieParam {
    let mut param = CookieParam::new(cookie.name.clone(), cookie.value.clone());
    param.domain = Some(cookie.domain.clone());
    param.path = Some(cookie.path.clone());
    param.secure = Some(cookie.secure);
    param.http_only = Some(cookie.http_only);
    param.expires = cookie.expires.map(TimeSinceEpoch::new);
    param.same_site = cookie
        .same_site
        .as_deref()
        .and_then(|s| CookieSameSite::from_str(s).ok());
    param
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timed_out_liveness_check_keeps_page_open() {
        assert!(!closed_after_liveness_check(None));
    }

    #[test]
    fn liveness_check_verdicts() {
        assert!(!closed_after_liveness_check(Some(&Ok(Value::Bool(true)))));
        assert!(closed_after_liveness_check(Some(&Err(BridgeError::PageClosed))));
        assert!(closed_after_liveness_check(Some(&Err(BridgeError::CdpConnectionFailed(
            "websocket closed".to_string()
        )))));
    }
}
