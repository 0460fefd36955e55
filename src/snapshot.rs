//! Before/after balance snapshots handed to formula-verification code.
//!
//! The bridge only records values; it does not interpret them.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Immutable view of balances, oracle prices and pool reserves at one
/// point of a scenario. Build with [`BalanceSnapshot::builder`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BalanceSnapshot {
    label: String,
    token_balances: BTreeMap<String, u128>,
    oracle_prices: BTreeMap<String, f64>,
    pool_reserves: BTreeMap<String, (u128, u128)>,
}

impl BalanceSnapshot {
    pub fn builder(label: impl Into<String>) -> SnapshotBuilder {
        SnapshotBuilder {
            snapshot: BalanceSnapshot {
                label: label.into(),
                ..Default::default()
            },
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn balance(&self, token: &str) -> Option<u128> {
        self.token_balances.get(token).copied()
    }

    pub fn price(&self, feed: &str) -> Option<f64> {
        self.oracle_prices.get(feed).copied()
    }

    pub fn reserves(&self, pool: &str) -> Option<(u128, u128)> {
        self.pool_reserves.get(pool).copied()
    }

    pub fn token_balances(&self) -> &BTreeMap<String, u128> {
        &self.token_balances
    }

    pub fn oracle_prices(&self) -> &BTreeMap<String, f64> {
        &self.oracle_prices
    }

    pub fn pool_reserves(&self) -> &BTreeMap<String, (u128, u128)> {
        &self.pool_reserves
    }
}

pub struct SnapshotBuilder {
    snapshot: BalanceSnapshot,
}

impl SnapshotBuilder {
    pub fn balance(mut self, token: impl Into<String>, amount: u128) -> Self {
        self.snapshot.token_balances.insert(token.into(), amount);
        self
    }

    pub fn price(mut self, feed: impl Into<String>, price: f64) -> Self {
        self.snapshot.oracle_prices.insert(feed.into(), price);
        self
    }

    pub fn reserves(mut self, pool: impl Into<String>, reserve0: u128, reserve1: u128) -> Self {
        self.snapshot.pool_reserves.insert(pool.into(), (reserve0, reserve1));
        self
    }

    pub fn build(self) -> BalanceSnapshot {
        self.snapshot
    }
}

/// Snapshots taken around one action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotPair {
    pub before: BalanceSnapshot,
    pub after: BalanceSnapshot,
}

impl SnapshotPair {
    pub fn new(before: BalanceSnapshot, after: BalanceSnapshot) -> Self {
        Self { before, after }
    }

    /// Signed change of a token balance; a token missing on one side counts as 0.
    pub fn balance_delta(&self, token: &str) -> i128 {
        let before = self.before.balance(token).unwrap_or(0);
        let after = self.after.balance(token).unwrap_or(0);
        signed_delta(before, after)
    }

    /// Change of every token seen in either snapshot.
    pub fn balance_deltas(&self) -> BTreeMap<String, i128> {
        self.before
            .token_balances
            .keys()
            .chain(self.after.token_balances.keys())
            .map(|token| (token.clone(), self.balance_delta(token)))
            .collect()
    }

    /// `None` unless both snapshots carry the feed.
    pub fn price_delta(&self, feed: &str) -> Option<f64> {
        Some(self.after.price(feed)? - self.before.price(feed)?)
    }

    /// Per-side change of a pool's reserves; `None` unless both snapshots carry the pool.
    pub fn reserves_delta(&self, pool: &str) -> Option<(i128, i128)> {
        let (b0, b1) = self.before.reserves(pool)?;
        let (a0, a1) = self.after.reserves(pool)?;
        Some((signed_delta(b0, a0), signed_delta(b1, a1)))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

fn signed_delta(before: u128, after: u128) -> i128 {
    if after >= before {
        i128::try_from(after - before).unwrap_or(i128::MAX)
    } else {
        i128::try_from(before - after).map(|d| -d).unwrap_or(i128::MIN)
    }
}
