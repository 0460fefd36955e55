use tokio::time::sleep;

use crate::browser::{click_when_visible, wait_for_visible, PageHandle, SessionTimeouts, Selector};
use crate::config::OnboardingSelectors;
use crate::error::{BridgeError, Result};
use crate::profile::WalletSetup;

/// Import `setup` into a freshly installed wallet through its first-run UI.
/// Used by the pre-bake step; never at test time.
pub async fn onboard(
    page: &dyn PageHandle,
    selectors: &OnboardingSelectors,
    setup: &WalletSetup,
    timeouts: &SessionTimeouts,
) -> Result<()> {
    let words: Vec<&str> = setup.seed_phrase.split_whitespace().collect();
    if !matches!(words.len(), 12 | 15 | 18 | 21 | 24) {
        return Err(BridgeError::ConfigError(format!(
            "wallet.seed_phrase must have 12-24 words, got {}",
            words.len()
        )));
    }

    let step = Onboarding { page, timeouts };

    step.click("terms", &selectors.terms_checkbox).await?;
    step.click("import wallet", &selectors.import_wallet).await?;
    step.click_if_shown(&selectors.metrics_decline).await?;

    for (index, word) in words.iter().enumerate() {
        let field = selectors.seed_word(index);
        step.wait("seed words", &field).await?;
        page.fill(&field, word).await?;
    }
    step.click("confirm seed", &selectors.seed_confirm).await?;

    step.wait("password", &selectors.password_new).await?;
    page.fill(&selectors.password_new, &setup.password).await?;
    page.fill(&selectors.password_confirm, &setup.password).await?;
    step.click("password terms", &selectors.password_terms).await?;
    step.click("import", &selectors.password_submit).await?;

    for selector in &selectors.finish_steps {
        step.click_if_shown(selector).await?;
    }

    tracing::info!("[wallet] onboarding complete ({} words imported)", words.len());
    Ok(())
}

struct Onboarding<'a> {
    page: &'a dyn PageHandle,
    timeouts: &'a SessionTimeouts,
}

impl Onboarding<'_> {
    async fn wait(&self, what: &str, selector: &Selector) -> Result<()> {
        if wait_for_visible(
            self.page,
            selector,
            self.timeouts.wallet_step,
            self.timeouts.element_poll,
        )
        .await
        {
            Ok(())
        } else {
            Err(BridgeError::WalletStep {
                step: "onboard",
                reason: format!("{}: '{}' never appeared", what, selector),
            })
        }
    }

    async fn click(&self, what: &str, selector: &Selector) -> Result<()> {
        self.wait(what, selector).await?;
        self.page.click(selector).await?;
        sleep(self.timeouts.element_poll * 3).await;
        Ok(())
    }

    async fn click_if_shown(&self, selector: &Selector) -> Result<()> {
        let clicked = click_when_visible(
            self.page,
            selector,
            self.timeouts.element_poll * 20,
            self.timeouts.element_poll,
        )
        .await?;
        if clicked {
            sleep(self.timeouts.element_poll * 3).await;
        } else {
            tracing::debug!("[wallet] onboarding: '{}' not shown, skipping", selector);
        }
        Ok(())
    }
}
