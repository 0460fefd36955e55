//! Client for the page's injected EIP-1193 provider (`window.ethereum`).
//!
//! The bridge only reads from and calls the provider; it never redefines it.

use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::time::{sleep, timeout_at, Instant};

use crate::browser::SharedPage;
use crate::config::NetworkConfig;
use crate::error::{BridgeError, Result};

/// Handle of a request submitted without waiting for its result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestTicket {
    pub id: String,
    pub method: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RequestStatus {
    Pending,
    Resolved(Value),
    Rejected { code: i64, message: String },
}

#[async_trait]
pub trait Eip1193: Send + Sync {
    /// Send a request and wait for its result. Provider rejections surface
    /// as [`BridgeError::Provider`].
    async fn request(&self, method: &str, params: Value) -> Result<Value>;

    /// Send a request that may wait on a wallet prompt, without awaiting it.
    async fn submit(&self, method: &str, params: Value) -> Result<RequestTicket>;

    async fn poll(&self, ticket: &RequestTicket) -> Result<RequestStatus>;
}

/// Accounts currently exposed to the page.
pub async fn accounts(provider: &dyn Eip1193) -> Result<Vec<String>> {
    let value = provider.request("eth_accounts", json!([])).await?;
    Ok(serde_json::from_value(value).unwrap_or_default())
}

/// Active chain id as a number.
pub async fn chain_id(provider: &dyn Eip1193) -> Result<u64> {
    let value = provider.request("eth_chainId", json!([])).await?;
    parse_chain_id(&value).ok_or_else(|| {
        BridgeError::Other(format!("Provider returned an unreadable chain id: {}", value))
    })
}

/// Parse a chain id given as `0x`-hex, decimal string or JSON number.
pub fn parse_chain_id(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => {
            let s = s.trim();
            match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
                Some(hex) => u64::from_str_radix(hex, 16).ok(),
                None => s.parse().ok(),
            }
        }
        _ => None,
    }
}

/// `wallet_addEthereumChain` parameters for a network definition.
pub fn add_chain_params(network: &NetworkConfig) -> Value {
    let mut chain = json!({
        "chainId": network.chain_id_hex(),
        "chainName": network.name,
        "rpcUrls": [network.rpc_url],
        "nativeCurrency": {
            "name": network.symbol,
            "symbol": network.symbol,
            "decimals": network.decimals,
        },
    });
    if let Some(explorer) = &network.explorer_url {
        chain["blockExplorerUrls"] = json!([explorer]);
    }
    json!([chain])
}

pub fn switch_chain_params(network: &NetworkConfig) -> Value {
    json!([{ "chainId": network.chain_id_hex() }])
}

/// Poll a submitted request until it settles or `timeout` elapses. The
/// `on_pending` callback runs once, after the first poll still reports
/// pending, so callers can drive the wallet prompt. Polls and the callback
/// share the deadline; running out of time reports `Pending`.
pub async fn settle<F, Fut>(
    provider: &dyn Eip1193,
    ticket: &RequestTicket,
    timeout: Duration,
    poll: Duration,
    on_pending: F,
) -> Result<RequestStatus>
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = ()>,
{
    let deadline = Instant::now() + timeout;
    let mut on_pending = Some(on_pending);

    loop {
        let status = match timeout_at(deadline, provider.poll(ticket)).await {
            Ok(status) => status?,
            Err(_) => return Ok(RequestStatus::Pending),
        };
        if status != RequestStatus::Pending {
            return Ok(status);
        }

        if let Some(drive) = on_pending.take() {
            if timeout_at(deadline, drive()).await.is_err() {
                return Ok(RequestStatus::Pending);
            }
            continue;
        }

        if Instant::now() >= deadline {
            return Ok(RequestStatus::Pending);
        }
        sleep(poll).await;
    }
}

/// [`Eip1193`] over `window.ethereum` of a live page.
pub struct InjectedProvider {
    page: SharedPage,
}

impl InjectedProvider {
    pub fn new(page: SharedPage) -> Self {
        Self { page }
    }
}

#[derive(Debug, Deserialize)]
struct CallOutcome {
    #[serde(default)]
    unavailable: bool,
    #[serde(default)]
    ok: bool,
    #[serde(default)]
    result: Value,
    #[serde(default)]
    code: Option<i64>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PendingSlot {
    state: String,
    #[serde(default)]
    result: Value,
    #[serde(default)]
    code: Option<i64>,
    #[serde(default)]
    message: Option<String>,
}

#[async_trait]
impl Eip1193 for InjectedProvider {
    async fn request(&self, method: &str, params: Value) -> Result<Value> {
        let payload = json!({ "method": method, "params": params });
        let js = format!(
            r#"(async () => {{
    if (!window.ethereum || typeof window.ethereum.request !== 'function') return {{ unavailable: true }};
    try {{
        const result = await window.ethereum.request({payload});
        return {{ ok: true, result: result ?? null }};
    }} catch (e) {{
        return {{ ok: false, code: typeof e?.code === 'number' ? e.code : -1, message: String(e?.message ?? e) }};
    }}
}})()"#
        );

        let raw = self.page.evaluate(&js).await?;
        let outcome: CallOutcome = serde_json::from_value(raw)?;

        if outcome.unavailable {
            return Err(BridgeError::ProviderUnavailable);
        }
        if outcome.ok {
            return Ok(outcome.result);
        }
        Err(BridgeError::Provider {
            code: outcome.code.unwrap_or(-1),
            message: outcome.message.unwrap_or_default(),
        })
    }

    async fn submit(&self, method: &str, params: Value) -> Result<RequestTicket> {
        let id = format!("wb{:016x}", rand::thread_rng().gen::<u64>());
        let payload = json!({ "method": method, "params": params });
        let id_json = Value::String(id.clone());
        let js = format!(
            r#"(() => {{
    if (!window.ethereum || typeof window.ethereum.request !== 'function') return false;
    const pending = (window.__walletBridgePending = window.__walletBridgePending || {{}});
    const slot = {{ state: 'pending' }};
    pending[{id_json}] = slot;
    window.ethereum.request({payload}).then(
        (result) => {{ slot.state = 'resolved'; slot.result = result ?? null; }},
        (e) => {{ slot.state = 'rejected'; slot.code = typeof e?.code === 'number' ? e.code : -1; slot.message = String(e?.message ?? e); }}
    );
    return true;
}})()"#
        );

        let submitted = self.page.evaluate(&js).await?;
        if submitted.as_bool() != Some(true) {
            return Err(BridgeError::ProviderUnavailable);
        }

        Ok(RequestTicket {
            id,
            method: method.to_string(),
        })
    }

    async fn poll(&self, ticket: &RequestTicket) -> Result<RequestStatus> {
        let id_json = Value::String(ticket.id.clone());
        let js = format!(
            r#"(() => {{
    const p = window.__walletBridgePending;
    const slot = p && p[{id_json}];
    if (!slot) return null;
    if (slot.state !== 'pending') delete p[{id_json}];
    return slot;
}})()"#
        );

        let raw = self.page.evaluate(&js).await?;
        if raw.is_null() {
            return Err(BridgeError::Other(format!(
                "Pending {} request was lost (page navigated?)",
                ticket.method
            )));
        }

        let slot: PendingSlot = serde_json::from_value(raw)?;
        Ok(match slot.state.as_str() {
            "resolved" => RequestStatus::Resolved(slot.result),
            "rejected" => RequestStatus::Rejected {
                code: slot.code.unwrap_or(-1),
                message: slot.message.unwrap_or_default(),
            },
            _ => RequestStatus::Pending,
        })
    }
}
