//! Real-browser contract tests.
//!
//! Run with a pre-baked profile and a dApp served locally:
//!
//! ```text
//! walletbridge prebake
//! WALLETBRIDGE_E2E=1 WALLETBRIDGE_E2E_DAPP_URL=http://localhost:3000 \
//!     cargo test --test e2e -- --ignored --test-threads=1
//! ```

use std::sync::Arc;

use walletbridge::config::Config;
use walletbridge::extension::{ExtensionInstaller, ExtensionLocator};
use walletbridge::provider::{self, InjectedProvider};
use walletbridge::state_transfer;
use walletbridge::{Bridge, Result};

fn enabled() -> bool {
    std::env::var("WALLETBRIDGE_E2E").is_ok_and(|v| v == "1")
}

fn dapp_url() -> String {
    std::env::var("WALLETBRIDGE_E2E_DAPP_URL").unwrap_or_else(|_| "http://localhost:3000".to_string())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("info,walletbridge=debug,chromiumoxide=warn")
        .with_test_writer()
        .try_init();
}

#[tokio::test]
#[ignore = "needs a browser; set WALLETBRIDGE_E2E=1"]
async fn pinned_extension_has_manifest() -> Result<()> {
    if !enabled() {
        return Ok(());
    }
    let config = Config::load()?;
    let installer = ExtensionInstaller::new(config.cache.root_dir(), &config.wallet);

    let installed = installer.ensure(&config.wallet.version).await?;

    assert!(installed.path.join("manifest.json").is_file());
    Ok(())
}

#[tokio::test]
#[ignore = "needs a browser; set WALLETBRIDGE_E2E=1"]
async fn launched_browser_exposes_extension() -> Result<()> {
    if !enabled() {
        return Ok(());
    }
    init_tracing();
    let config = Config::load()?;
    let bridge = Bridge::from_config(config.clone());

    let session = bridge.open_scratch_session("e2e-locate").await?;
    let located = ExtensionLocator::from_config(&config.wallet, &session.timeouts())
        .locate(session.context()?.as_ref())
        .await;
    session.teardown().await;

    let id = located?;
    assert_eq!(id.len(), 32);
    Ok(())
}

#[tokio::test]
#[ignore = "needs a browser; set WALLETBRIDGE_E2E=1"]
async fn connected_accounts_survive_same_origin_navigation() -> Result<()> {
    if !enabled() {
        return Ok(());
    }
    init_tracing();
    let bridge = Bridge::from_config(Config::load()?);
    let session = bridge.open_session("e2e-connect").await?;
    let profile = session.profile_path().map(|p| p.to_path_buf());

    let outcome: Result<()> = async {
        let page = session.open_dapp(&dapp_url()).await?;

        let report = session.connect_wallet(&page).await?;
        assert!(report.connected, "connect failed: {:?}", report);

        let provider = InjectedProvider::new(Arc::clone(&page));
        assert!(!provider::accounts(&provider).await?.is_empty());

        page.reload().await?;
        assert!(!provider::accounts(&provider).await?.is_empty());

        let again = session.connect_wallet(&page).await?;
        assert!(again.already_connected);

        assert!(session.ensure_network(&page).await?);
        Ok(())
    }
    .await;

    session.teardown().await;
    if let Some(profile) = profile {
        assert!(!profile.exists(), "profile left behind at {}", profile.display());
    }
    outcome
}

#[tokio::test]
#[ignore = "needs a browser; set WALLETBRIDGE_E2E=1"]
async fn captured_state_includes_cookies_set_by_the_dapp() -> Result<()> {
    if !enabled() {
        return Ok(());
    }
    init_tracing();
    let bridge = Bridge::from_config(Config::load()?);
    let session = bridge.open_scratch_session("e2e-capture").await?;

    let outcome: Result<state_transfer::StorageState> = async {
        let page = session.open_dapp(&dapp_url()).await?;
        page.evaluate("document.cookie = 'wb_e2e=1; path=/'; true").await?;
        let origin = dapp_url().trim_end_matches('/').to_string();
        state_transfer::capture(session.context()?.as_ref(), &[origin]).await
    }
    .await;

    session.teardown().await;
    let state = outcome?;
    assert!(
        state.cookies.iter().any(|c| c.name == "wb_e2e" && c.value == "1"),
        "cookies captured: {:?}",
        state.cookies
    );
    Ok(())
}
