use serde::{Deserialize, Serialize};

use crate::browser::Selector;

/// Wallet extension configuration: which package to install and how to drive its UI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletConfig {
    /// Expected wallet name, matched against the extension manifest
    #[serde(default = "default_wallet_name")]
    pub name: String,

    /// Pinned extension version
    #[serde(default = "default_wallet_version")]
    pub version: String,

    /// Release archive URL; `{version}` is substituted
    #[serde(default = "default_download_url")]
    pub download_url: String,

    /// Hosts the archive may be downloaded from
    #[serde(default = "default_allowed_hosts")]
    pub allowed_hosts: Vec<String>,

    /// Extension page that hosts the wallet UI
    #[serde(default = "default_home_path")]
    pub home_path: String,

    /// Extension page the wallet opens for pending approvals
    #[serde(default = "default_notification_path")]
    pub notification_path: String,

    #[serde(default = "default_password")]
    pub password: String,

    #[serde(default = "default_seed_phrase")]
    pub seed_phrase: String,

    /// Extension identifiers that are never accepted as the wallet
    #[serde(default = "default_denylist")]
    pub denylist: Vec<String>,

    #[serde(default)]
    pub selectors: WalletSelectors,
}

fn default_wallet_name() -> String {
    "MetaMask".to_string()
}

fn default_wallet_version() -> String {
    "11.9.1".to_string()
}

fn default_download_url() -> String {
    "https://github.com/MetaMask/metamask-extension/releases/download/v{version}/metamask-chrome-{version}.zip"
        .to_string()
}

fn default_allowed_hosts() -> Vec<String> {
    vec!["github.com".to_string(), "githubusercontent.com".to_string()]
}

fn default_home_path() -> String {
    "home.html".to_string()
}

fn default_notification_path() -> String {
    "notification.html".to_string()
}

fn default_password() -> String {
    "Tester@1234".to_string()
}

// Well-known development mnemonic (Hardhat / Anvil default accounts).
fn default_seed_phrase() -> String {
    "test test test test test test test test test test test junk".to_string()
}

// Chrome component extensions that show up as chrome-extension:// targets in
// fresh profiles (PDF viewer, Docs offline, hangouts) but are not the wallet.
fn default_denylist() -> Vec<String> {
    vec![
        "mhjfbmdgcfjbbpaeojofohoefgiehjai".to_string(),
        "ghbmnnjooekpmoecnnnilnnbdlolhkhi".to_string(),
        "nkeimhogjdpnpccoofpliimaahmaaome".to_string(),
        "neajdppkdcdipfabeoofebfddakdcjhd".to_string(),
    ]
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            name: default_wallet_name(),
            version: default_wallet_version(),
            download_url: default_download_url(),
            allowed_hosts: default_allowed_hosts(),
            home_path: default_home_path(),
            notification_path: default_notification_path(),
            password: default_password(),
            seed_phrase: default_seed_phrase(),
            denylist: default_denylist(),
            selectors: WalletSelectors::default(),
        }
    }
}

/// Selectors inside the extension UI. Defaults target MetaMask 11.x test ids.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletSelectors {
    pub unlock_password: Selector,
    pub unlock_submit: Selector,
    /// Rendered on the home screen only once the vault is open
    #[serde(default = "default_unlocked_home")]
    pub unlocked_home: Selector,
    /// Steps of the pairing approval, clicked in order
    pub connect_steps: Vec<Selector>,
    /// Steps of the add/switch network approval, clicked in order when visible
    pub network_steps: Vec<Selector>,
    pub transaction_confirm: Selector,
    pub signature_scroll: Selector,
    pub signature_confirm: Selector,
    pub reject: Selector,
    /// Popovers that may cover the UI after unlock
    pub dismiss: Vec<Selector>,
    #[serde(default)]
    pub onboarding: OnboardingSelectors,
}

fn testid(id: &str) -> Selector {
    Selector::css(format!("[data-testid=\"{}\"]", id))
}

fn default_unlocked_home() -> Selector {
    testid("account-menu-icon")
}

impl Default for WalletSelectors {
    fn default() -> Self {
        Self {
            unlock_password: testid("unlock-password"),
            unlock_submit: testid("unlock-submit"),
            unlocked_home: default_unlocked_home(),
            connect_steps: vec![
                testid("page-container-footer-next"),
                testid("page-container-footer-next"),
            ],
            network_steps: vec![
                testid("confirmation-submit-button"),
                testid("confirmation-submit-button"),
            ],
            transaction_confirm: testid("page-container-footer-next"),
            signature_scroll: testid("signature-request-scroll-button"),
            signature_confirm: testid("page-container-footer-next"),
            reject: testid("page-container-footer-cancel"),
            dismiss: vec![
                testid("popover-close"),
                Selector::text("Got it"),
                Selector::text("No thanks"),
            ],
            onboarding: OnboardingSelectors::default(),
        }
    }
}

/// Selectors for the first-run import flow used by the pre-bake step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OnboardingSelectors {
    pub terms_checkbox: Selector,
    pub import_wallet: Selector,
    pub metrics_decline: Selector,
    /// `{index}` is replaced with the zero-based word index
    pub seed_word_template: String,
    pub seed_confirm: Selector,
    pub password_new: Selector,
    pub password_confirm: Selector,
    pub password_terms: Selector,
    pub password_submit: Selector,
    /// Final "done"/"next" buttons, clicked in order when visible
    pub finish_steps: Vec<Selector>,
}

impl Default for OnboardingSelectors {
    fn default() -> Self {
        Self {
            terms_checkbox: testid("onboarding-terms-checkbox"),
            import_wallet: testid("onboarding-import-wallet"),
            metrics_decline: testid("metametrics-no-thanks"),
            seed_word_template: "[data-testid=\"import-srp__srp-word-{index}\"]".to_string(),
            seed_confirm: testid("import-srp-confirm"),
            password_new: testid("create-password-new"),
            password_confirm: testid("create-password-confirm"),
            password_terms: testid("create-password-terms"),
            password_submit: testid("create-password-import"),
            finish_steps: vec![
                testid("onboarding-complete-done"),
                testid("pin-extension-next"),
                testid("pin-extension-done"),
            ],
        }
    }
}

impl OnboardingSelectors {
    pub fn seed_word(&self, index: usize) -> Selector {
        Selector::css(self.seed_word_template.replace("{index}", &index.to_string()))
    }
}

/// dApp page affordances used by the connection handshake.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DappConfig {
    #[serde(default = "default_connect_button")]
    pub connect_button: Selector,

    #[serde(default = "default_wallet_option")]
    pub wallet_option: Selector,

    #[serde(default = "default_retry_button")]
    pub retry_button: Selector,

    /// Rendered once an account is connected; fallback signal only
    pub account_indicator: Option<Selector>,
}

fn default_connect_button() -> Selector {
    Selector::text("Connect Wallet")
}

fn default_wallet_option() -> Selector {
    Selector::text("MetaMask")
}

fn default_retry_button() -> Selector {
    Selector::text("Retry")
}

impl Default for DappConfig {
    fn default() -> Self {
        Self {
            connect_button: default_connect_button(),
            wallet_option: default_wallet_option(),
            retry_button: default_retry_button(),
            account_indicator: None,
        }
    }
}

/// Network definition used for `wallet_addEthereumChain` and chain comparison.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConfig {
    #[serde(default = "default_network_name")]
    pub name: String,

    #[serde(default = "default_rpc_url")]
    pub rpc_url: String,

    #[serde(default = "default_chain_id")]
    pub chain_id: u64,

    #[serde(default = "default_symbol")]
    pub symbol: String,

    #[serde(default = "default_decimals")]
    pub decimals: u8,

    pub explorer_url: Option<String>,
}

fn default_network_name() -> String {
    "Localhost 8545".to_string()
}

fn default_rpc_url() -> String {
    "http://127.0.0.1:8545".to_string()
}

fn default_chain_id() -> u64 {
    31337
}

fn default_symbol() -> String {
    "ETH".to_string()
}

fn default_decimals() -> u8 {
    18
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            name: default_network_name(),
            rpc_url: default_rpc_url(),
            chain_id: default_chain_id(),
            symbol: default_symbol(),
            decimals: default_decimals(),
            explorer_url: None,
        }
    }
}

impl NetworkConfig {
    /// Chain id in the `0x`-prefixed lowercase hex form providers use
    pub fn chain_id_hex(&self) -> String {
        format!("0x{:x}", self.chain_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_word_selector_uses_index() {
        let onboarding = OnboardingSelectors::default();
        assert_eq!(
            onboarding.seed_word(3),
            Selector::css("[data-testid=\"import-srp__srp-word-3\"]")
        );
    }

    #[test]
    fn chain_id_hex_is_lowercase() {
        let network = NetworkConfig {
            chain_id: 0xAA36A7,
            ..Default::default()
        };
        assert_eq!(network.chain_id_hex(), "0xaa36a7");
    }

    #[test]
    fn denylist_ids_have_extension_id_shape() {
        for id in default_denylist() {
            assert_eq!(id.len(), 32);
            assert!(id.chars().all(|c| ('a'..='p').contains(&c)));
        }
    }
}
