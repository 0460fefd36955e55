use std::future::Future;
use std::sync::Arc;

use serde_json::Value;
use tokio::time::timeout;

use crate::browser::{SessionTimeouts, SharedPage};
use crate::config::NetworkConfig;
use crate::error::{BridgeError, Result};
use crate::provider::{self, Eip1193, InjectedProvider, RequestStatus};
use crate::wallet::WalletActions;

/// Brings the wallet's active chain in line with the expected network.
pub struct NetworkReconciler {
    timeouts: SessionTimeouts,
}

impl NetworkReconciler {
    pub fn new(timeouts: SessionTimeouts) -> Self {
        Self { timeouts }
    }

    pub async fn ensure_network(
        &self,
        page: &SharedPage,
        wallet: &dyn WalletActions,
        expected: &NetworkConfig,
    ) -> bool {
        let provider = InjectedProvider::new(Arc::clone(page));
        self.ensure_network_via(&provider, wallet, expected).await
    }

    /// `true` once the provider reports `expected.chain_id`. Errors are
    /// logged and reported as `false`.
    pub async fn ensure_network_via(
        &self,
        provider: &dyn Eip1193,
        wallet: &dyn WalletActions,
        expected: &NetworkConfig,
    ) -> bool {
        match self.reconcile(provider, wallet, expected).await {
            Ok(matched) => matched,
            Err(e) => {
                tracing::warn!("[network] reconciling to {} failed: {}", expected.name, e);
                false
            }
        }
    }

    async fn reconcile(
        &self,
        provider: &dyn Eip1193,
        wallet: &dyn WalletActions,
        expected: &NetworkConfig,
    ) -> Result<bool> {
        let current = self.bounded("eth_chainId", provider::chain_id(provider)).await?;
        if current == expected.chain_id {
            tracing::debug!("[network] already on chain {}", current);
            return Ok(true);
        }

        tracing::info!(
            "[network] chain {} != expected {} ({}), adding network",
            current,
            expected.chain_id,
            expected.name
        );

        let added = self
            .request_with_approval(
                provider,
                wallet,
                "wallet_addEthereumChain",
                provider::add_chain_params(expected),
            )
            .await?;

        if !added || self.bounded("eth_chainId", provider::chain_id(provider)).await? != expected.chain_id {
            tracing::info!("[network] switching to chain {}", expected.chain_id);
            self.request_with_approval(
                provider,
                wallet,
                "wallet_switchEthereumChain",
                provider::switch_chain_params(expected),
            )
            .await?;
        }

        let current = self.bounded("eth_chainId", provider::chain_id(provider)).await?;
        if current == expected.chain_id {
            tracing::info!("[network] on chain {}", current);
            Ok(true)
        } else {
            tracing::warn!(
                "[network] still on chain {} after add/switch (expected {})",
                current,
                expected.chain_id
            );
            Ok(false)
        }
    }

    /// Submit a request and drive the wallet approval if it stays pending.
    /// Returns whether the provider accepted the request.
    async fn request_with_approval(
        &self,
        provider: &dyn Eip1193,
        wallet: &dyn WalletActions,
        method: &str,
        params: Value,
    ) -> Result<bool> {
        let ticket = self.bounded(method, provider.submit(method, params)).await?;

        let status = provider::settle(
            provider,
            &ticket,
            self.timeouts.settlement,
            self.timeouts.provider_poll,
            move || async move {
                if let Err(e) = wallet.approve_network().await {
                    tracing::warn!("[network] {}: approving in wallet failed: {}", method, e);
                }
            },
        )
        .await?;

        match status {
            RequestStatus::Resolved(_) => Ok(true),
            RequestStatus::Rejected { code, message } => {
                tracing::info!("[network] {} rejected ({}): {}", method, code, message);
                Ok(false)
            }
            RequestStatus::Pending => {
                tracing::warn!(
                    "[network] {} still pending after {:?}",
                    method,
                    self.timeouts.settlement
                );
                Ok(false)
            }
        }
    }

    /// A single provider call, cut off at the settlement timeout.
    async fn bounded<T>(&self, what: &str, call: impl Future<Output = Result<T>>) -> Result<T> {
        match timeout(self.timeouts.settlement, call).await {
            Ok(result) => result,
            Err(_) => Err(BridgeError::Timeout(format!(
                "{} did not answer within {:?}",
                what, self.timeouts.settlement
            ))),
        }
    }
}
