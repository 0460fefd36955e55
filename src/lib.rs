//! Session bridge between end-to-end dApp tests, a Chromium-family browser
//! and a wallet browser extension.
//!
//! A [`session::Bridge`] is created once per worker. It installs the pinned
//! wallet extension and opens one [`session::AutomationSession`] per test,
//! which owns a browser context and a disposable profile seeded from the
//! pre-baked cache. Sessions locate the extension, replay stored state,
//! connect the wallet to a dApp page and reconcile the active network.

pub mod browser;
pub mod config;
pub mod connection;
pub mod error;
pub mod extension;
pub mod profile;
pub mod provider;
pub mod scenario;
pub mod session;
pub mod snapshot;
pub mod state_transfer;
pub mod wallet;

pub use error::{BridgeError, Result};
pub use session::{AutomationSession, Bridge};
