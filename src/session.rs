use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::OnceCell;

use crate::browser::{
    provider_from_config, BrowserContext, ContextProvider, LaunchSpec, SessionTimeouts, SharedPage,
};
use crate::config::{Config, DappConfig, NetworkConfig, WalletConfig};
use crate::connection::{
    ConnectReport, ConnectionOrchestrator, ConnectionState, NetworkReconciler, DEFAULT_MAX_ATTEMPTS,
};
use crate::error::{BridgeError, Result};
use crate::extension::{ExtensionHandle, ExtensionInstaller, ExtensionLocator, InstalledExtension};
use crate::profile::{Fingerprint, ProfileDir, ProfileManager, WalletSetup};
use crate::state_transfer::{self, StorageState};
use crate::wallet::{self, ExtensionWallet};

/// Worker-level setup shared by every session it opens: the context
/// provider, the extension cache and the pre-baked profile cache.
pub struct Bridge {
    config: Config,
    provider: Arc<dyn ContextProvider>,
    installer: ExtensionInstaller,
    profiles: ProfileManager,
    fingerprint: Fingerprint,
    extension: OnceCell<Option<InstalledExtension>>,
}

impl Bridge {
    /// Launch or attach depending on the configured remote-debugging URL.
    pub fn from_config(config: Config) -> Self {
        let provider = provider_from_config(&config);
        Self::with_provider(config, provider)
    }

    pub fn with_provider(config: Config, provider: Arc<dyn ContextProvider>) -> Self {
        let installer = ExtensionInstaller::new(config.cache.root_dir(), &config.wallet);
        let profiles = ProfileManager::from_config(&config.cache);
        let fingerprint = WalletSetup::from_config(&config).fingerprint();

        Self {
            config,
            provider,
            installer,
            profiles,
            fingerprint,
            extension: OnceCell::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    pub fn installer(&self) -> &ExtensionInstaller {
        &self.installer
    }

    pub fn profiles(&self) -> &ProfileManager {
        &self.profiles
    }

    /// Make the pinned extension available, once per worker. Attached
    /// browsers already carry their extension, so nothing is installed.
    pub async fn prepare_worker(&self) -> Result<Option<&InstalledExtension>> {
        let installed = self
            .extension
            .get_or_try_init(move || async move {
                if !self.provider.launches_browser() {
                    tracing::debug!("Attach mode: skipping extension install");
                    return Ok::<_, BridgeError>(None);
                }
                let installed = self.installer.ensure(&self.config.wallet.version).await?;
                tracing::info!(
                    "Using {} v{} from {}",
                    installed.declared_name,
                    installed.version,
                    installed.path.display()
                );
                Ok(Some(installed))
            })
            .await?;
        Ok(installed.as_ref())
    }

    /// Open the browser context for one test, seeded from the pre-baked
    /// profile when this bridge launches its own browser.
    pub async fn open_session(&self, test_id: &str) -> Result<AutomationSession> {
        let profile = if self.provider.launches_browser() {
            Some(self.profiles.acquire(
                &self.config.browser.engine,
                test_id,
                &self.fingerprint,
            )?)
        } else {
            None
        };
        self.open_with_profile(profile).await
    }

    /// Like [`Bridge::open_session`] but with an empty profile.
    pub async fn open_scratch_session(&self, test_id: &str) -> Result<AutomationSession> {
        let profile = if self.provider.launches_browser() {
            Some(self.profiles.scratch(&self.config.browser.engine, test_id)?)
        } else {
            None
        };
        self.open_with_profile(profile).await
    }

    async fn open_with_profile(&self, profile: Option<ProfileDir>) -> Result<AutomationSession> {
        let extension_dir = self.prepare_worker().await?.map(|e| e.path.clone());
        let spec = LaunchSpec {
            user_data_dir: profile.as_ref().map(|p| p.path().to_path_buf()),
            extension_dir,
        };

        // On failure `profile` is dropped and its directory removed
        let context = self.provider.resolve_context(&spec).await?;

        Ok(AutomationSession::new(
            context,
            profile,
            &self.config,
            self.provider.timeouts(),
        ))
    }

    /// Onboard the configured wallet in a fresh profile and store that
    /// profile in the cache under the setup fingerprint.
    pub async fn prebake(&self, force: bool) -> Result<PathBuf> {
        if !self.provider.launches_browser() {
            return Err(BridgeError::ConfigError(
                "prebake launches its own browser; unset the remote debugging URL".to_string(),
            ));
        }
        if self.profiles.has_prebaked(&self.fingerprint) && !force {
            tracing::info!("Pre-baked profile {} already cached", self.fingerprint);
            return Ok(self.profiles.cache_dir(&self.fingerprint));
        }

        let mut session = self.open_scratch_session("prebake").await?;
        let setup = WalletSetup::from_config(&self.config);

        let onboarded: Result<()> = async {
            let extension = session.extension().await?;
            let page = extension.control_page().await?;
            wallet::onboard(
                page.as_ref(),
                &self.config.wallet.selectors.onboarding,
                &setup,
                &session.timeouts,
            )
            .await
        }
        .await;

        // Close the browser so the profile is flushed before copying
        let profile = session.close_context().await;
        onboarded?;

        let profile = profile.ok_or_else(|| {
            BridgeError::Other("prebake session has no profile directory".to_string())
        })?;
        let stored = self
            .profiles
            .store_prebaked(profile.path(), &self.fingerprint, force)?;
        profile.release();
        Ok(stored)
    }
}

/// Everything one test owns: a browser context, the extension inside it and
/// the profile directory it runs on.
///
/// Fields drop in declaration order, so the browser goes away before its
/// profile directory is removed.
pub struct AutomationSession {
    extension: OnceCell<Arc<ExtensionHandle>>,
    context: Option<Arc<dyn BrowserContext>>,
    profile: Option<ProfileDir>,
    wallet: WalletConfig,
    dapp: DappConfig,
    network: NetworkConfig,
    timeouts: SessionTimeouts,
}

impl AutomationSession {
    pub fn new(
        context: Arc<dyn BrowserContext>,
        profile: Option<ProfileDir>,
        config: &Config,
        timeouts: SessionTimeouts,
    ) -> Self {
        Self {
            extension: OnceCell::new(),
            context: Some(context),
            profile,
            wallet: config.wallet.clone(),
            dapp: config.dapp.clone(),
            network: config.network.clone(),
            timeouts,
        }
    }

    pub fn context(&self) -> Result<&Arc<dyn BrowserContext>> {
        self.context.as_ref().ok_or(BridgeError::PageClosed)
    }

    pub fn profile_path(&self) -> Option<&Path> {
        self.profile.as_ref().map(ProfileDir::path)
    }

    pub fn timeouts(&self) -> SessionTimeouts {
        self.timeouts
    }

    /// The wallet extension of this session, located on first use.
    pub async fn extension(&self) -> Result<Arc<ExtensionHandle>> {
        let context = self.context()?;
        let handle = self
            .extension
            .get_or_try_init(move || async move {
                let locator = ExtensionLocator::from_config(&self.wallet, &self.timeouts);
                let id = locator.locate(context.as_ref()).await?;
                tracing::info!("[wallet] extension id {}", id);
                Ok::<_, BridgeError>(Arc::new(ExtensionHandle::new(
                    id,
                    Arc::clone(context),
                    &self.wallet,
                )))
            })
            .await?;
        Ok(Arc::clone(handle))
    }

    pub async fn wallet(&self) -> Result<ExtensionWallet> {
        let extension = self.extension().await?;
        Ok(ExtensionWallet::new(extension, &self.wallet, self.timeouts))
    }

    pub async fn open_dapp(&self, url: &str) -> Result<SharedPage> {
        self.context()?.new_page(url).await
    }

    pub async fn restore_state(&self, state: &StorageState) -> Result<()> {
        state_transfer::replay(self.context()?.as_ref(), state).await
    }

    pub async fn capture_state(&self, origins: &[String]) -> Result<StorageState> {
        state_transfer::capture(self.context()?.as_ref(), origins).await
    }

    /// Unlock the wallet, then run the connect handshake on `page`.
    /// Only locating the extension can fail; interaction problems end up
    /// in the report.
    pub async fn connect_wallet(&self, page: &SharedPage) -> Result<ConnectReport> {
        let wallet = self.wallet().await?;
        let orchestrator = ConnectionOrchestrator::new(self.dapp.clone(), self.timeouts);

        if !orchestrator.unlock(&wallet).await {
            return Ok(ConnectReport {
                connected: false,
                attempts: 0,
                already_connected: false,
                final_state: ConnectionState::Failed,
            });
        }

        Ok(orchestrator
            .connect_with_report(page, &wallet, DEFAULT_MAX_ATTEMPTS)
            .await)
    }

    pub async fn ensure_network(&self, page: &SharedPage) -> Result<bool> {
        let wallet = self.wallet().await?;
        Ok(NetworkReconciler::new(self.timeouts)
            .ensure_network(page, &wallet, &self.network)
            .await)
    }

    /// Close the browser context and delete the profile directory.
    pub async fn teardown(mut self) {
        if let Some(profile) = self.close_context().await {
            profile.release();
        }
    }

    async fn close_context(&mut self) -> Option<ProfileDir> {
        self.extension = OnceCell::new();
        if let Some(context) = self.context.take() {
            if let Err(e) = context.close().await {
                tracing::warn!("Failed to close browser context: {}", e);
            }
        }
        self.profile.take()
    }
}
