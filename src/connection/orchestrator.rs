use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::time::{sleep, timeout, timeout_at, Instant};

use crate::browser::{click_when_visible, PageHandle, SessionTimeouts, SharedPage};
use crate::config::DappConfig;
use crate::error::BridgeError;
use crate::provider::{self, Eip1193, InjectedProvider};
use crate::wallet::WalletActions;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 2;

/// How long the dApp gets to render its connect control or wallet picker.
const AFFORDANCE_WAIT: Duration = Duration::from_secs(3);

/// Progress of one dApp-to-wallet handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Idle,
    WalletPickerOpen,
    HandshakeRequested,
    AwaitingProviderAck,
    Connected,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectReport {
    pub connected: bool,
    /// Handshake attempts made; 0 when nothing had to be done
    pub attempts: u32,
    pub already_connected: bool,
    pub final_state: ConnectionState,
}

impl ConnectReport {
    fn done(connected: bool, attempts: u32, already_connected: bool, state: ConnectionState) -> Self {
        Self {
            connected,
            attempts,
            already_connected,
            final_state: state,
        }
    }
}

/// Result of polling the provider during one attempt.
enum Ack {
    Accounts(usize),
    /// Provider could not be queried; the DOM indicator confirmed instead
    DomFallback,
    TimedOut,
    PageClosed,
}

/// Drives wallet unlock and the dApp connect handshake.
///
/// Interaction failures never escape: they are logged with the step and
/// attempt number and reported as `connected == false`.
pub struct ConnectionOrchestrator {
    dapp: DappConfig,
    timeouts: SessionTimeouts,
}

impl ConnectionOrchestrator {
    pub fn new(dapp: DappConfig, timeouts: SessionTimeouts) -> Self {
        Self { dapp, timeouts }
    }

    /// Unlock the wallet; `false` when the unlock step failed.
    pub async fn unlock(&self, wallet: &dyn WalletActions) -> bool {
        match wallet.unlock().await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("[wallet] unlock failed: {}", e);
                false
            }
        }
    }

    pub async fn connect(&self, page: &SharedPage, wallet: &dyn WalletActions, max_attempts: u32) -> bool {
        self.connect_with_report(page, wallet, max_attempts)
            .await
            .connected
    }

    pub async fn connect_with_report(
        &self,
        page: &SharedPage,
        wallet: &dyn WalletActions,
        max_attempts: u32,
    ) -> ConnectReport {
        let provider = InjectedProvider::new(Arc::clone(page));
        self.connect_via(page.as_ref(), &provider, wallet, max_attempts)
            .await
    }

    /// Handshake against an explicit provider client.
    pub async fn connect_via(
        &self,
        page: &dyn PageHandle,
        provider: &dyn Eip1193,
        wallet: &dyn WalletActions,
        max_attempts: u32,
    ) -> ConnectReport {
        let max_attempts = max_attempts.max(1);

        if page.is_closed().await {
            tracing::info!("[connect] page closed, skipping");
            return ConnectReport::done(false, 0, false, ConnectionState::Idle);
        }

        let poll = self.timeouts.element_poll;
        let affordance_wait = AFFORDANCE_WAIT.min(self.timeouts.handshake);

        if let Ok(Ok(accounts)) = timeout(affordance_wait, provider::accounts(provider)).await {
            if !accounts.is_empty() {
                tracing::debug!("[connect] already connected as {}", accounts[0]);
                return ConnectReport::done(true, 0, true, ConnectionState::Connected);
            }
        }

        let mut state = match click_when_visible(page, &self.dapp.connect_button, affordance_wait, poll).await {
            Ok(true) => next(ConnectionState::Idle, ConnectionState::WalletPickerOpen),
            Ok(false) => {
                tracing::debug!(
                    "[connect] no '{}' control, treating as connected",
                    self.dapp.connect_button
                );
                return ConnectReport::done(true, 0, true, ConnectionState::Connected);
            }
            Err(e) => {
                tracing::warn!("[connect] attempt 1/{}: clicking connect failed: {}", max_attempts, e);
                return ConnectReport::done(false, 0, false, ConnectionState::Failed);
            }
        };

        match click_when_visible(page, &self.dapp.wallet_option, affordance_wait, poll).await {
            Ok(true) => {}
            Ok(false) => tracing::debug!("[connect] no wallet picker shown"),
            Err(e) => tracing::warn!("[connect] attempt 1/{}: wallet option: {}", max_attempts, e),
        }
        state = next(state, ConnectionState::HandshakeRequested);

        let mut attempt = 0;
        while attempt < max_attempts {
            attempt += 1;

            if let Err(e) = wallet.approve_connection().await {
                tracing::warn!(
                    "[connect] attempt {}/{}: approve_connection: {}",
                    attempt,
                    max_attempts,
                    e
                );
            }
            state = next(state, ConnectionState::AwaitingProviderAck);

            match self.await_accounts(page, provider).await {
                Ack::Accounts(n) => {
                    tracing::info!("[connect] connected with {} account(s) after {} attempt(s)", n, attempt);
                    return ConnectReport::done(true, attempt, false, ConnectionState::Connected);
                }
                Ack::DomFallback => {
                    tracing::info!("[connect] connected (account indicator) after {} attempt(s)", attempt);
                    return ConnectReport::done(true, attempt, false, ConnectionState::Connected);
                }
                Ack::PageClosed => {
                    tracing::info!("[connect] attempt {}/{}: page closed", attempt, max_attempts);
                    return ConnectReport::done(false, attempt, false, ConnectionState::Failed);
                }
                Ack::TimedOut => {
                    tracing::warn!(
                        "[connect] attempt {}/{}: no accounts within {:?}",
                        attempt,
                        max_attempts,
                        self.timeouts.handshake
                    );
                }
            }

            if attempt >= max_attempts {
                break;
            }

            match timeout(affordance_wait, page.is_visible(&self.dapp.retry_button)).await {
                Ok(Ok(true)) => {
                    if let Err(e) = page.click(&self.dapp.retry_button).await {
                        tracing::warn!("[connect] attempt {}/{}: retry click: {}", attempt, max_attempts, e);
                        break;
                    }
                    state = next(state, ConnectionState::HandshakeRequested);
                }
                _ => {
                    tracing::warn!(
                        "[connect] attempt {}/{}: no '{}' control, giving up",
                        attempt,
                        max_attempts,
                        self.dapp.retry_button
                    );
                    break;
                }
            }
        }

        tracing::warn!(
            "[connect] failed after {} attempt(s) (last state {:?})",
            attempt,
            state
        );
        ConnectReport::done(false, attempt, false, ConnectionState::Failed)
    }

    /// Poll `eth_accounts` until it is non-empty or the handshake budget runs
    /// out. Every provider and page call is bounded by the same deadline. The
    /// DOM indicator is consulted only when the provider itself cannot be
    /// queried.
    async fn await_accounts(&self, page: &dyn PageHandle, provider: &dyn Eip1193) -> Ack {
        let deadline = Instant::now() + self.timeouts.handshake;

        loop {
            match timeout_at(deadline, provider::accounts(provider)).await {
                Err(_) => return Ack::TimedOut,
                Ok(Ok(accounts)) if !accounts.is_empty() => return Ack::Accounts(accounts.len()),
                Ok(Ok(_)) => {}
                Ok(Err(e)) => {
                    match timeout_at(deadline, page.is_closed()).await {
                        Ok(true) => return Ack::PageClosed,
                        Ok(false) => {}
                        Err(_) => return Ack::TimedOut,
                    }
                    if self.provider_unreachable(&e) && self.account_indicator_visible(page, deadline).await {
                        return Ack::DomFallback;
                    }
                    tracing::debug!("[connect] eth_accounts failed: {}", e);
                }
            }

            if Instant::now() >= deadline {
                return Ack::TimedOut;
            }
            sleep(self.timeouts.provider_poll).await;
        }
    }

    fn provider_unreachable(&self, error: &BridgeError) -> bool {
        !matches!(error, BridgeError::Provider { .. })
    }

    async fn account_indicator_visible(&self, page: &dyn PageHandle, deadline: Instant) -> bool {
        let Some(selector) = &self.dapp.account_indicator else {
            return false;
        };
        matches!(timeout_at(deadline, page.is_visible(selector)).await, Ok(Ok(true)))
    }
}

fn next(from: ConnectionState, to: ConnectionState) -> ConnectionState {
    tracing::trace!("[connect] {:?} -> {:?}", from, to);
    to
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use serde_json::{json, Value};

    use super::*;
    use crate::browser::Selector;
    use crate::error::Result;
    use crate::provider::{RequestStatus, RequestTicket};
    use crate::state_transfer::StoredCookie;

    #[derive(Default)]
    struct StubPage {
        closed: AtomicBool,
        visible: Mutex<Vec<Selector>>,
        clicks: Mutex<Vec<Selector>>,
    }

    impl StubPage {
        fn showing(selectors: &[Selector]) -> Self {
            let page = Self::default();
            *page.visible.lock().unwrap() = selectors.to_vec();
            page
        }

        fn clicked(&self, selector: &Selector) -> usize {
            self.clicks.lock().unwrap().iter().filter(|s| *s == selector).count()
        }
    }

    #[async_trait]
    impl PageHandle for StubPage {
        async fn url(&self) -> Result<Option<String>> {
            Ok(Some("http://dapp.local/".to_string()))
        }
        async fn goto(&self, _url: &str) -> Result<()> {
            Ok(())
        }
        async fn reload(&self) -> Result<()> {
            Ok(())
        }
        async fn evaluate(&self, _expression: &str) -> Result<Value> {
            Ok(Value::Null)
        }
        async fn click(&self, selector: &Selector) -> Result<()> {
            self.clicks.lock().unwrap().push(selector.clone());
            Ok(())
        }
        async fn fill(&self, _selector: &Selector, _text: &str) -> Result<()> {
            Ok(())
        }
        async fn is_visible(&self, selector: &Selector) -> Result<bool> {
            Ok(self.visible.lock().unwrap().contains(selector))
        }
        async fn bring_to_front(&self) -> Result<()> {
            Ok(())
        }
        async fn cookies(&self) -> Result<Vec<StoredCookie>> {
            Ok(Vec::new())
        }
        async fn set_cookies(&self, _cookies: &[StoredCookie]) -> Result<()> {
            Ok(())
        }
        async fn is_closed(&self) -> bool {
            self.closed.load(Ordering::SeqCst)
        }
        async fn close(&self) -> Result<()> {
            self.closed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    /// Returns accounts once `approve_connection` has been called `after` times.
    struct StubProvider<'a> {
        wallet: &'a StubWallet,
        after: u32,
        unavailable: bool,
    }

    #[async_trait]
    impl Eip1193 for StubProvider<'_> {
        async fn request(&self, method: &str, _params: Value) -> Result<Value> {
            assert_eq!(method, "eth_accounts");
            if self.unavailable {
                return Err(BridgeError::ProviderUnavailable);
            }
            if self.after > 0 && self.wallet.approvals.load(Ordering::SeqCst) >= self.after {
                Ok(json!(["0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266"]))
            } else {
                Ok(json!([]))
            }
        }
        async fn submit(&self, method: &str, _params: Value) -> Result<RequestTicket> {
            Ok(RequestTicket {
                id: "t".to_string(),
                method: method.to_string(),
            })
        }
        async fn poll(&self, _ticket: &RequestTicket) -> Result<RequestStatus> {
            Ok(RequestStatus::Pending)
        }
    }

    #[derive(Default)]
    struct StubWallet {
        approvals: AtomicU32,
    }

    #[async_trait]
    impl WalletActions for StubWallet {
        async fn unlock(&self) -> Result<()> {
            Err(BridgeError::WalletStep {
                step: "unlock",
                reason: "password was not accepted".to_string(),
            })
        }
        async fn approve_connection(&self) -> Result<()> {
            self.approvals.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        async fn approve_network(&self) -> Result<()> {
            Ok(())
        }
        async fn confirm_transaction(&self) -> Result<()> {
            Ok(())
        }
        async fn confirm_signature(&self) -> Result<()> {
            Ok(())
        }
        async fn reject(&self) -> Result<()> {
            Ok(())
        }
    }

    fn orchestrator(dapp: DappConfig) -> ConnectionOrchestrator {
        ConnectionOrchestrator::new(dapp, SessionTimeouts::default())
    }

    #[tokio::test(start_paused = true)]
    async fn closed_page_is_not_connected_without_error() {
        let dapp = DappConfig::default();
        let page = StubPage::showing(&[dapp.connect_button.clone()]);
        page.closed.store(true, Ordering::SeqCst);
        let wallet = StubWallet::default();
        let provider = StubProvider { wallet: &wallet, after: 1, unavailable: false };

        let report = orchestrator(dapp).connect_via(&page, &provider, &wallet, 2).await;

        assert!(!report.connected);
        assert_eq!(report.attempts, 0);
        assert_eq!(wallet.approvals.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn connects_on_first_attempt() {
        let dapp = DappConfig::default();
        let page = StubPage::showing(&[dapp.connect_button.clone(), dapp.wallet_option.clone()]);
        let wallet = StubWallet::default();
        let provider = StubProvider { wallet: &wallet, after: 1, unavailable: false };

        let report = orchestrator(dapp.clone()).connect_via(&page, &provider, &wallet, 2).await;

        assert!(report.connected);
        assert!(!report.already_connected);
        assert_eq!(report.attempts, 1);
        assert_eq!(report.final_state, ConnectionState::Connected);
        assert_eq!(page.clicked(&dapp.connect_button), 1);
        assert_eq!(page.clicked(&dapp.wallet_option), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_connect_control_is_a_no_op_success() {
        let page = StubPage::default();
        let wallet = StubWallet::default();
        let provider = StubProvider { wallet: &wallet, after: 0, unavailable: false };

        let report = orchestrator(DappConfig::default())
            .connect_via(&page, &provider, &wallet, 2)
            .await;

        assert!(report.connected);
        assert!(report.already_connected);
        assert_eq!(wallet.approvals.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn stops_after_one_attempt_without_retry_control() {
        let dapp = DappConfig::default();
        let page = StubPage::showing(&[dapp.connect_button.clone()]);
        let wallet = StubWallet::default();
        let provider = StubProvider { wallet: &wallet, after: 0, unavailable: false };

        let report = orchestrator(dapp).connect_via(&page, &provider, &wallet, 2).await;

        assert!(!report.connected);
        assert_eq!(report.attempts, 1);
        assert_eq!(report.final_state, ConnectionState::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn account_indicator_only_counts_when_provider_is_unreachable() {
        let mut dapp = DappConfig::default();
        let indicator = Selector::css("[data-testid=account]");
        dapp.account_indicator = Some(indicator.clone());
        let page = StubPage::showing(&[dapp.connect_button.clone(), indicator]);
        let wallet = StubWallet::default();

        // Provider answers with no accounts: the indicator is ignored
        let provider = StubProvider { wallet: &wallet, after: 0, unavailable: false };
        let report = orchestrator(dapp.clone()).connect_via(&page, &provider, &wallet, 1).await;
        assert!(!report.connected);

        let provider = StubProvider { wallet: &wallet, after: 0, unavailable: true };
        let report = orchestrator(dapp).connect_via(&page, &provider, &wallet, 1).await;
        assert!(report.connected);
    }

    /// Answers the first `eth_accounts` with no accounts, then hangs.
    #[derive(Default)]
    struct HangingProvider {
        calls: AtomicU32,
    }

    #[async_trait]
    impl Eip1193 for HangingProvider {
        async fn request(&self, _method: &str, _params: Value) -> Result<Value> {
            if self.calls.fetch_add(1, Ordering::SeqCst) > 0 {
                sleep(Duration::from_secs(60)).await;
            }
            Ok(json!([]))
        }
        async fn submit(&self, method: &str, _params: Value) -> Result<RequestTicket> {
            Ok(RequestTicket {
                id: "t".to_string(),
                method: method.to_string(),
            })
        }
        async fn poll(&self, _ticket: &RequestTicket) -> Result<RequestStatus> {
            Ok(RequestStatus::Pending)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_provider_cannot_stretch_an_attempt_past_the_handshake() {
        let dapp = DappConfig::default();
        let page = StubPage::showing(&[dapp.connect_button.clone(), dapp.wallet_option.clone()]);
        let wallet = StubWallet::default();
        let provider = HangingProvider::default();
        let timeouts = SessionTimeouts::default();

        let started = Instant::now();
        let report = ConnectionOrchestrator::new(dapp, timeouts)
            .connect_via(&page, &provider, &wallet, 1)
            .await;
        let elapsed = started.elapsed();

        assert!(!report.connected);
        assert_eq!(report.attempts, 1);
        assert!(
            elapsed <= timeouts.handshake + AFFORDANCE_WAIT,
            "attempt took {:?} with a {:?} handshake",
            elapsed,
            timeouts.handshake
        );
    }

    #[tokio::test]
    async fn unlock_failure_is_reported_as_false() {
        let wallet = StubWallet::default();
        assert!(!orchestrator(DappConfig::default()).unlock(&wallet).await);
    }
}
