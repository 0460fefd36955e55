mod onboarding;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::sleep;

pub use onboarding::onboard;

use crate::browser::{
    click_when_visible, first_visible, wait_for_visible, PageHandle, SessionTimeouts, Selector,
    SharedPage,
};
use crate::config::{WalletConfig, WalletSelectors};
use crate::error::{BridgeError, Result};
use crate::extension::ExtensionHandle;

/// Pause between consecutive clicks of one approval flow, so a button that
/// keeps its selector across screens is not clicked twice on the same screen.
const STEP_SETTLE: Duration = Duration::from_millis(400);

/// How long to wait for the wallet's approval popup before falling back to
/// the control page.
const PROMPT_WAIT: Duration = Duration::from_secs(2);

/// Actions performed inside the wallet extension UI.
#[async_trait]
pub trait WalletActions: Send + Sync {
    async fn unlock(&self) -> Result<()>;
    async fn approve_connection(&self) -> Result<()>;
    async fn approve_network(&self) -> Result<()>;
    async fn confirm_transaction(&self) -> Result<()>;
    async fn confirm_signature(&self) -> Result<()>;
    async fn reject(&self) -> Result<()>;
}

/// [`WalletActions`] driven through the extension's pages with configured
/// selectors. The extension handle is passed in explicitly.
pub struct ExtensionWallet {
    extension: Arc<ExtensionHandle>,
    password: String,
    selectors: WalletSelectors,
    timeouts: SessionTimeouts,
}

impl ExtensionWallet {
    pub fn new(
        extension: Arc<ExtensionHandle>,
        wallet: &WalletConfig,
        timeouts: SessionTimeouts,
    ) -> Self {
        Self {
            extension,
            password: wallet.password.clone(),
            selectors: wallet.selectors.clone(),
            timeouts,
        }
    }

    pub fn extension(&self) -> &ExtensionHandle {
        &self.extension
    }

    async fn prompt_page(&self) -> Result<SharedPage> {
        let wait = PROMPT_WAIT.min(self.timeouts.wallet_step);
        let page = self
            .extension
            .prompt_page(wait, self.timeouts.element_poll)
            .await?;
        if let Err(e) = page.bring_to_front().await {
            tracing::debug!("[wallet] bring_to_front failed: {}", e);
        }
        Ok(page)
    }

    async fn click(&self, page: &dyn PageHandle, step: &'static str, selector: &Selector) -> Result<()> {
        let clicked = click_when_visible(
            page,
            selector,
            self.timeouts.wallet_step,
            self.timeouts.element_poll,
        )
        .await?;

        if clicked {
            Ok(())
        } else {
            Err(BridgeError::WalletStep {
                step,
                reason: format!("'{}' not visible within {:?}", selector, self.timeouts.wallet_step),
            })
        }
    }

    /// Click each selector in order. The first must appear; later ones are
    /// skipped once the prompt page has closed itself.
    async fn drive_steps(&self, step: &'static str, steps: &[Selector]) -> Result<()> {
        let page = self.prompt_page().await?;

        for (i, selector) in steps.iter().enumerate() {
            if i > 0 {
                sleep(STEP_SETTLE).await;
                if page.is_closed().await {
                    tracing::debug!("[wallet] {}: prompt closed after step {}", step, i);
                    return Ok(());
                }
            }
            self.click(page.as_ref(), step, selector).await?;
        }

        tracing::debug!("[wallet] {}: {} step(s) done", step, steps.len());
        Ok(())
    }

    async fn dismiss_popovers(&self, page: &dyn PageHandle) {
        for selector in &self.selectors.dismiss {
            if let Ok(true) = page.is_visible(selector).await {
                if let Err(e) = page.click(selector).await {
                    tracing::debug!("[wallet] dismissing '{}' failed: {}", selector, e);
                }
            }
        }
    }
}

#[async_trait]
impl WalletActions for ExtensionWallet {
    async fn unlock(&self) -> Result<()> {
        let page = self.extension.control_page().await?;
        page.bring_to_front().await?;

        let password_field = &self.selectors.unlock_password;
        let shown = first_visible(
            page.as_ref(),
            &[password_field, &self.selectors.unlocked_home],
            self.timeouts.wallet_step,
            self.timeouts.element_poll,
        )
        .await;

        match shown {
            Some(0) => {}
            Some(_) => {
                tracing::debug!("[wallet] unlock: already unlocked");
                self.dismiss_popovers(page.as_ref()).await;
                return Ok(());
            }
            None => {
                tracing::debug!("[wallet] unlock: no password field, assuming unlocked");
                self.dismiss_popovers(page.as_ref()).await;
                return Ok(());
            }
        }

        page.fill(password_field, &self.password).await?;
        self.click(page.as_ref(), "unlock", &self.selectors.unlock_submit)
            .await?;

        // The field disappears once the vault is open
        let deadline = tokio::time::Instant::now() + self.timeouts.wallet_step;
        while page.is_visible(password_field).await.unwrap_or(false) {
            if tokio::time::Instant::now() >= deadline {
                return Err(BridgeError::WalletStep {
                    step: "unlock",
                    reason: "password was not accepted".to_string(),
                });
            }
            sleep(self.timeouts.element_poll).await;
        }

        self.dismiss_popovers(page.as_ref()).await;
        tracing::info!("[wallet] unlocked {}", self.extension.id());
        Ok(())
    }

    async fn approve_connection(&self) -> Result<()> {
        self.drive_steps("approve_connection", &self.selectors.connect_steps)
            .await
    }

    async fn approve_network(&self) -> Result<()> {
        self.drive_steps("approve_network", &self.selectors.network_steps)
            .await
    }

    async fn confirm_transaction(&self) -> Result<()> {
        self.drive_steps(
            "confirm_transaction",
            std::slice::from_ref(&self.selectors.transaction_confirm),
        )
        .await
    }

    async fn confirm_signature(&self) -> Result<()> {
        let page = self.prompt_page().await?;

        // Long typed-data messages must be scrolled before the button enables
        if wait_for_visible(
            page.as_ref(),
            &self.selectors.signature_scroll,
            self.timeouts.element_poll * 10,
            self.timeouts.element_poll,
        )
        .await
        {
            page.click(&self.selectors.signature_scroll).await?;
            sleep(STEP_SETTLE).await;
        }

        self.click(
            page.as_ref(),
            "confirm_signature",
            &self.selectors.signature_confirm,
        )
        .await
    }

    async fn reject(&self) -> Result<()> {
        let page = self.prompt_page().await?;
        self.click(page.as_ref(), "reject", &self.selectors.reject)
            .await
    }
}
