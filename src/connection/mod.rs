//! Wallet-to-dApp connection: the connect handshake and network reconciliation.

mod network;
mod orchestrator;

pub use network::NetworkReconciler;
pub use orchestrator::{ConnectReport, ConnectionOrchestrator, ConnectionState, DEFAULT_MAX_ATTEMPTS};
