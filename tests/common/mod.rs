//! In-memory stand-ins for the browser, the injected provider and the wallet.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use serde_json::{json, Value};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

use walletbridge::browser::{
    BrowserContext, ContextProvider, LaunchSpec, PageHandle, Selector, SessionTimeouts,
    SharedPage, TargetEntry, TargetKind,
};
use walletbridge::provider::{Eip1193, RequestStatus, RequestTicket};
use walletbridge::state_transfer::StoredCookie;
use walletbridge::wallet::WalletActions;
use walletbridge::{BridgeError, Result};

pub const WALLET_ID: &str = "nkbihfbeogaeaoehlefnkodbefgpgknn";
/// Chrome's PDF viewer, denylisted by default
pub const PDF_VIEWER_ID: &str = "mhjfbmdgcfjbbpaeojofohoefgiehjai";

pub fn extension_target(id: &str, kind: TargetKind, path: &str) -> TargetEntry {
    TargetEntry::new(
        format!("target-{}-{}", id, path),
        kind,
        format!("chrome-extension://{}/{}", id, path),
    )
}

// ---------------------------------------------------------------------------
// Browser
// ---------------------------------------------------------------------------

pub struct FakeContext {
    targets: Mutex<Vec<TargetEntry>>,
    events: broadcast::Sender<TargetEntry>,
    pages: Mutex<Vec<Arc<FakePage>>>,
    /// Browser-wide cookie jar and `localStorage`, visible to every new page
    cookies: Mutex<Vec<StoredCookie>>,
    storage: Mutex<HashMap<String, Vec<(String, String)>>>,
    closed: AtomicBool,
}

impl FakeContext {
    pub fn new() -> Arc<Self> {
        Self::with_targets(Vec::new())
    }

    pub fn with_targets(targets: Vec<TargetEntry>) -> Arc<Self> {
        let (events, _) = broadcast::channel(64);
        Arc::new(Self {
            targets: Mutex::new(targets),
            events,
            pages: Mutex::new(Vec::new()),
            cookies: Mutex::new(Vec::new()),
            storage: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
        })
    }

    pub fn seed_cookie(&self, cookie: StoredCookie) {
        self.cookies.lock().unwrap().push(cookie);
    }

    pub fn seed_storage(&self, origin: &str, entries: &[(&str, &str)]) {
        self.storage.lock().unwrap().insert(
            origin.to_string(),
            entries
                .iter()
                .map(|(name, value)| (name.to_string(), value.to_string()))
                .collect(),
        );
    }

    /// Open a page directly, as the user or the wallet would.
    pub fn open_page(&self, url: &str) -> Arc<FakePage> {
        let page = Arc::new(FakePage::at(url));
        *page.cookies.lock().unwrap() = self.cookies.lock().unwrap().clone();
        *page.storage.lock().unwrap() = self.storage.lock().unwrap().clone();
        self.pages.lock().unwrap().push(Arc::clone(&page));
        page
    }

    pub fn add_target(&self, target: TargetEntry) {
        self.targets.lock().unwrap().push(target.clone());
        let _ = self.events.send(target);
    }

    /// Announce `target` after `delay`, as a slow extension start would.
    pub fn add_target_after(self: &Arc<Self>, delay: Duration, target: TargetEntry) {
        let context = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            context.add_target(target);
        });
    }

    pub fn opened_pages(&self) -> Vec<Arc<FakePage>> {
        self.pages.lock().unwrap().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BrowserContext for FakeContext {
    async fn targets(&self) -> Result<Vec<TargetEntry>> {
        Ok(self.targets.lock().unwrap().clone())
    }

    async fn target_events(&self) -> Result<BoxStream<'static, TargetEntry>> {
        Ok(BroadcastStream::new(self.events.subscribe())
            .filter_map(|event| async move { event.ok() })
            .boxed())
    }

    async fn pages(&self) -> Result<Vec<SharedPage>> {
        let mut open: Vec<SharedPage> = Vec::new();
        for page in self.pages.lock().unwrap().iter() {
            if !page.closed.load(Ordering::SeqCst) {
                open.push(page.clone());
            }
        }
        Ok(open)
    }

    async fn new_page(&self, url: &str) -> Result<SharedPage> {
        Ok(self.open_page(url))
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// What a click on a selector does to the page.
#[derive(Debug, Clone)]
pub enum ClickEffect {
    Hide(Selector),
    Close,
}

#[derive(Default)]
pub struct FakePage {
    url: Mutex<String>,
    visible: Mutex<Vec<Selector>>,
    clicks: Mutex<Vec<Selector>>,
    fills: Mutex<Vec<(Selector, String)>>,
    effects: Mutex<Vec<(Selector, ClickEffect)>>,
    visits: Mutex<Vec<String>>,
    reloads: AtomicU32,
    scripts: Mutex<Vec<String>>,
    /// Canned `evaluate` results, returned in order before falling back to
    /// the current origin's `localStorage` entries
    responses: Mutex<VecDeque<Value>>,
    cookies: Mutex<Vec<StoredCookie>>,
    /// `localStorage` per origin
    storage: Mutex<HashMap<String, Vec<(String, String)>>>,
    closed: AtomicBool,
}

impl FakePage {
    pub fn at(url: &str) -> Self {
        let page = Self::default();
        *page.url.lock().unwrap() = url.to_string();
        page
    }

    pub fn show(&self, selector: &Selector) {
        self.visible.lock().unwrap().push(selector.clone());
    }

    pub fn hide(&self, selector: &Selector) {
        self.visible.lock().unwrap().retain(|s| s != selector);
    }

    pub fn on_click(&self, selector: &Selector, effect: ClickEffect) {
        self.effects.lock().unwrap().push((selector.clone(), effect));
    }

    pub fn respond_with(&self, value: Value) {
        self.responses.lock().unwrap().push_back(value);
    }

    pub fn clicks(&self) -> Vec<Selector> {
        self.clicks.lock().unwrap().clone()
    }

    pub fn fills(&self) -> Vec<(Selector, String)> {
        self.fills.lock().unwrap().clone()
    }

    pub fn reloads(&self) -> u32 {
        self.reloads.load(Ordering::SeqCst)
    }

    pub fn clicks_on(&self, selector: &Selector) -> usize {
        self.clicks
            .lock()
            .unwrap()
            .iter()
            .filter(|s| *s == selector)
            .count()
    }

    pub fn visits(&self) -> Vec<String> {
        self.visits.lock().unwrap().clone()
    }

    pub fn scripts(&self) -> Vec<String> {
        self.scripts.lock().unwrap().clone()
    }

    pub fn stored_cookies(&self) -> Vec<StoredCookie> {
        self.cookies.lock().unwrap().clone()
    }

    pub fn set_closed(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn was_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PageHandle for FakePage {
    async fn url(&self) -> Result<Option<String>> {
        Ok(Some(self.url.lock().unwrap().clone()))
    }

    async fn goto(&self, url: &str) -> Result<()> {
        if self.was_closed() {
            return Err(BridgeError::PageClosed);
        }
        *self.url.lock().unwrap() = url.to_string();
        self.visits.lock().unwrap().push(url.to_string());
        Ok(())
    }

    async fn reload(&self) -> Result<()> {
        if self.was_closed() {
            return Err(BridgeError::PageClosed);
        }
        self.reloads.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn evaluate(&self, expression: &str) -> Result<Value> {
        if self.was_closed() {
            return Err(BridgeError::PageClosed);
        }
        self.scripts.lock().unwrap().push(expression.to_string());
        if let Some(response) = self.responses.lock().unwrap().pop_front() {
            return Ok(response);
        }
        let origin = self.url.lock().unwrap().clone();
        let entries = self
            .storage
            .lock()
            .unwrap()
            .get(&origin)
            .cloned()
            .unwrap_or_default();
        let entries: Vec<Value> = entries
            .into_iter()
            .map(|(name, value)| json!({ "name": name, "value": value }))
            .collect();
        Ok(Value::Array(entries))
    }

    async fn click(&self, selector: &Selector) -> Result<()> {
        if self.was_closed() {
            return Err(BridgeError::PageClosed);
        }
        if !self.visible.lock().unwrap().contains(selector) {
            return Err(BridgeError::ElementNotFound(selector.to_string()));
        }
        self.clicks.lock().unwrap().push(selector.clone());

        let effects: Vec<ClickEffect> = self
            .effects
            .lock()
            .unwrap()
            .iter()
            .filter(|(on, _)| on == selector)
            .map(|(_, effect)| effect.clone())
            .collect();
        for effect in effects {
            match effect {
                ClickEffect::Hide(hidden) => self.hide(&hidden),
                ClickEffect::Close => self.set_closed(),
            }
        }
        Ok(())
    }

    async fn fill(&self, selector: &Selector, text: &str) -> Result<()> {
        if self.was_closed() {
            return Err(BridgeError::PageClosed);
        }
        self.fills
            .lock()
            .unwrap()
            .push((selector.clone(), text.to_string()));
        Ok(())
    }

    async fn is_visible(&self, selector: &Selector) -> Result<bool> {
        if self.was_closed() {
            return Err(BridgeError::PageClosed);
        }
        Ok(self.visible.lock().unwrap().contains(selector))
    }

    async fn bring_to_front(&self) -> Result<()> {
        Ok(())
    }

    async fn cookies(&self) -> Result<Vec<StoredCookie>> {
        Ok(self.stored_cookies())
    }

    async fn set_cookies(&self, cookies: &[StoredCookie]) -> Result<()> {
        self.cookies.lock().unwrap().extend_from_slice(cookies);
        Ok(())
    }

    async fn is_closed(&self) -> bool {
        self.was_closed()
    }

    async fn close(&self) -> Result<()> {
        self.set_closed();
        Ok(())
    }
}

/// Hands out one prepared context; attach mode unless told otherwise.
pub struct FakeProvider {
    context: Arc<FakeContext>,
    launches: bool,
    pub specs: Mutex<Vec<LaunchSpec>>,
}

impl FakeProvider {
    pub fn attached(context: Arc<FakeContext>) -> Arc<Self> {
        Arc::new(Self {
            context,
            launches: false,
            specs: Mutex::new(Vec::new()),
        })
    }

    pub fn launching(context: Arc<FakeContext>) -> Arc<Self> {
        Arc::new(Self {
            context,
            launches: true,
            specs: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl ContextProvider for FakeProvider {
    async fn resolve_context(&self, spec: &LaunchSpec) -> Result<Arc<dyn BrowserContext>> {
        self.specs.lock().unwrap().push(spec.clone());
        Ok(self.context.clone())
    }

    fn launches_browser(&self) -> bool {
        self.launches
    }

    fn timeouts(&self) -> SessionTimeouts {
        SessionTimeouts::default()
    }
}

// ---------------------------------------------------------------------------
// Wallet and provider
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct FakeWallet {
    pub unlocks: AtomicU32,
    pub connection_approvals: AtomicU32,
    pub network_approvals: AtomicU32,
}

impl FakeWallet {
    pub fn connection_approvals(&self) -> u32 {
        self.connection_approvals.load(Ordering::SeqCst)
    }

    pub fn network_approvals(&self) -> u32 {
        self.network_approvals.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WalletActions for FakeWallet {
    async fn unlock(&self) -> Result<()> {
        self.unlocks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn approve_connection(&self) -> Result<()> {
        self.connection_approvals.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn approve_network(&self) -> Result<()> {
        self.network_approvals.fetch_add(1, Ordering::SeqCst);
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

/// Injected provider backed by [`FakeWallet`] counters.
///
/// Accounts appear once the wallet approved the pairing `approvals_needed`
/// times. Network requests stay pending until the wallet approves them;
/// adding a chain the wallet already knows is rejected.
pub struct FakeChain {
    wallet: Arc<FakeWallet>,
    pub approvals_needed: u32,
    chain_id: AtomicU64,
    pub known_chains: Mutex<Vec<u64>>,
    pub submitted: Mutex<Vec<String>>,
    tickets: Mutex<HashMap<String, (String, u64, u32)>>,
}

impl FakeChain {
    pub fn new(wallet: Arc<FakeWallet>, chain_id: u64) -> Self {
        Self {
            wallet,
            approvals_needed: 1,
            chain_id: AtomicU64::new(chain_id),
            known_chains: Mutex::new(vec![1, chain_id]),
            submitted: Mutex::new(Vec::new()),
            tickets: Mutex::new(HashMap::new()),
        }
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id.load(Ordering::SeqCst)
    }

    pub fn submitted(&self) -> Vec<String> {
        self.submitted.lock().unwrap().clone()
    }
}

#[async_trait]
impl Eip1193 for FakeChain {
    async fn request(&self, method: &str, _params: Value) -> Result<Value> {
        match method {
            "eth_accounts" => {
                if self.wallet.connection_approvals() >= self.approvals_needed {
                    Ok(json!(["0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266"]))
                } else {
                    Ok(json!([]))
                }
            }
            "eth_chainId" => Ok(json!(format!("0x{:x}", self.chain_id()))),
            other => Err(BridgeError::Provider {
                code: 4200,
                message: format!("unsupported method {}", other),
            }),
        }
    }

    async fn submit(&self, method: &str, params: Value) -> Result<RequestTicket> {
        let chain = walletbridge::provider::parse_chain_id(&params[0]["chainId"]).unwrap_or(0);
        let mut submitted = self.submitted.lock().unwrap();
        submitted.push(method.to_string());
        let id = format!("ticket-{}", submitted.len());

        self.tickets.lock().unwrap().insert(
            id.clone(),
            (method.to_string(), chain, self.wallet.network_approvals()),
        );
        Ok(RequestTicket {
            id,
            method: method.to_string(),
        })
    }

    async fn poll(&self, ticket: &RequestTicket) -> Result<RequestStatus> {
        let (method, chain, approvals_at_submit) = self
            .tickets
            .lock()
            .unwrap()
            .get(&ticket.id)
            .cloned()
            .ok_or_else(|| BridgeError::Other("unknown ticket".to_string()))?;

        if method == "wallet_addEthereumChain" && self.known_chains.lock().unwrap().contains(&chain) {
            return Ok(RequestStatus::Rejected {
                code: -32602,
                message: format!("Chain 0x{:x} already added", chain),
            });
        }

        if self.wallet.network_approvals() <= approvals_at_submit {
            return Ok(RequestStatus::Pending);
        }

        match method.as_str() {
            "wallet_addEthereumChain" => {
                self.known_chains.lock().unwrap().push(chain);
                self.chain_id.store(chain, Ordering::SeqCst);
            }
            "wallet_switchEthereumChain" => self.chain_id.store(chain, Ordering::SeqCst),
            _ => {}
        }
        Ok(RequestStatus::Resolved(Value::Null))
    }
}
