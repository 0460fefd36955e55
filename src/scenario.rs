//! Step runner for wallet-driven scenarios.
//!
//! A closed page ends the scenario early without failing it. Confirmations
//! that cannot be observed reliably go through [`Scenario::best_effort`],
//! which records them as unconfirmed instead of asserting.

use std::future::Future;

use serde::Serialize;

use crate::browser::SharedPage;
use crate::error::{BridgeError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ScenarioStatus {
    Complete,
    /// The page closed before `at_step` could run or finish
    Incomplete { at_step: String },
}

/// Result of a step whose effect is not asserted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StepOutcome {
    Confirmed,
    Unconfirmed { reason: String },
}

impl StepOutcome {
    pub fn is_confirmed(&self) -> bool {
        matches!(self, StepOutcome::Confirmed)
    }
}

pub struct Scenario {
    name: String,
    page: SharedPage,
    status: ScenarioStatus,
    unconfirmed: Vec<(String, String)>,
}

impl Scenario {
    pub fn new(name: impl Into<String>, page: SharedPage) -> Self {
        Self {
            name: name.into(),
            page,
            status: ScenarioStatus::Complete,
            unconfirmed: Vec::new(),
        }
    }

    pub fn page(&self) -> &SharedPage {
        &self.page
    }

    pub fn status(&self) -> &ScenarioStatus {
        &self.status
    }

    pub fn is_incomplete(&self) -> bool {
        matches!(self.status, ScenarioStatus::Incomplete { .. })
    }

    /// `(step, reason)` for every best-effort step that was not confirmed.
    pub fn unconfirmed(&self) -> &[(String, String)] {
        &self.unconfirmed
    }

    /// Run a step. Returns `Ok(None)` without running it once the scenario
    /// is incomplete, and marks the scenario incomplete when the page is
    /// gone before or during the step. Other errors propagate.
    pub async fn step<T, F, Fut>(&mut self, name: &str, run: F) -> Result<Option<T>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if self.is_incomplete() {
            return Ok(None);
        }
        if self.page.is_closed().await {
            self.stop(name);
            return Ok(None);
        }

        let error = match run().await {
            Ok(value) => return Ok(Some(value)),
            Err(e) => e,
        };

        if matches!(error, BridgeError::PageClosed) || self.page.is_closed().await {
            tracing::debug!("[{}] '{}' ended with closed page: {}", self.name, name, error);
            self.stop(name);
            return Ok(None);
        }
        Err(error)
    }

    /// Run a step whose success cannot be asserted. Failures and `false`
    /// results are recorded as unconfirmed; this never fails the scenario.
    pub async fn best_effort<F, Fut>(&mut self, name: &str, run: F) -> StepOutcome
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<bool>>,
    {
        let outcome = match self.step(name, run).await {
            Ok(Some(true)) => StepOutcome::Confirmed,
            Ok(Some(false)) => StepOutcome::Unconfirmed {
                reason: "not observed".to_string(),
            },
            Ok(None) => StepOutcome::Unconfirmed {
                reason: "page closed".to_string(),
            },
            Err(e) => StepOutcome::Unconfirmed {
                reason: e.to_string(),
            },
        };

        if let StepOutcome::Unconfirmed { reason } = &outcome {
            tracing::info!("[{}] '{}' unconfirmed: {}", self.name, name, reason);
            self.unconfirmed.push((name.to_string(), reason.clone()));
        }
        outcome
    }

    pub fn finish(self) -> ScenarioStatus {
        if let ScenarioStatus::Incomplete { at_step } = &self.status {
            tracing::info!("[{}] incomplete at '{}'", self.name, at_step);
        }
        self.status
    }

    fn stop(&mut self, step: &str) {
        tracing::info!("[{}] page closed, skipping from '{}'", self.name, step);
        self.status = ScenarioStatus::Incomplete {
            at_step: step.to_string(),
        };
    }
}
