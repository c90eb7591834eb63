//! End-to-end scenarios and the recorder that drives each of them through
//! `Setup -> Act -> Settle -> Verify -> Conclude`.
//!
//! A scenario body returns early with a [`ScenarioError`] when a mandatory
//! step cannot go on. Independent negative checks are recorded on the
//! [`ScenarioRun`] instead so that one violation does not hide the next.

mod edge_cases;
mod heartbeat;
mod inference;
mod registration;
mod reward;
mod unregistered;

pub use edge_cases::EdgeCases;
pub use heartbeat::Heartbeat;
pub use inference::InferenceVerification;
pub use registration::Registration;
pub use reward::RewardClaim;
pub use unregistered::UnregisteredAccess;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::{Address, B256, U256};
use async_trait::async_trait;
use log::{debug, error, info};
use thiserror::Error;
use tokio::time::Instant;

use crate::actions::{ActionError, ActionOutput, NegativeOutcome, ProtocolActions};
use crate::chain::{ChainClient, ChainError};
use crate::clock::Clock;
use crate::config::HarnessConfig;
use crate::session::{Session, SessionError};

#[derive(Error, Debug)]
pub enum ScenarioError {
    #[error("{action} failed: {source}")]
    Action {
        action: &'static str,
        source: ActionError,
    },
    #[error("{action} was mined with a failing status in tx {tx_hash}")]
    Reverted { action: &'static str, tx_hash: B256 },
    #[error("balance query for {address} failed: {source}")]
    Balance { address: Address, source: ChainError },
    #[error(transparent)]
    Session(#[from] SessionError),
}

/// Everything a scenario needs, shared by all scenarios of a run
#[derive(Clone)]
pub struct ScenarioContext {
    pub config: Arc<HarnessConfig>,
    pub actions: ProtocolActions,
    pub session: Arc<Session>,
    pub clock: Arc<dyn Clock>,
}

impl ScenarioContext {
    pub fn client(&self) -> &dyn ChainClient {
        self.actions.client()
    }

    pub async fn balance(&self, address: Address) -> Result<U256, ScenarioError> {
        self.client()
            .read_balance(address)
            .await
            .map_err(|source| ScenarioError::Balance { address, source })
    }
}

#[async_trait]
pub trait Scenario: Send + Sync {
    fn name(&self) -> &str;

    /// Drive `run` through the scenario's steps
    async fn execute(&self, ctx: &ScenarioContext, run: &mut ScenarioRun)
        -> Result<(), ScenarioError>;
}

/// Run one scenario to its result; errors become a failed result
pub async fn run_scenario(scenario: &dyn Scenario, ctx: &ScenarioContext) -> ScenarioResult {
    let mut run = ScenarioRun::new(scenario.name(), ctx.clock.clone(), ctx.config.settle_delay());
    if let Err(e) = scenario.execute(ctx, &mut run).await {
        run.fail(e.to_string());
    }
    run.conclude()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Setup,
    Act,
    Settle,
    Verify,
    Conclude,
}

/// Records the progress of one scenario
pub struct ScenarioRun {
    name: String,
    phase: Phase,
    clock: Arc<dyn Clock>,
    settle_delay: Duration,
    started: Instant,
    // a state-mutating action succeeded since the last settle
    unsettled: bool,
    failures: Vec<String>,
    notes: Vec<String>,
}

impl ScenarioRun {
    pub fn new(name: impl Into<String>, clock: Arc<dyn Clock>, settle_delay: Duration) -> Self {
        let started = clock.now();
        Self {
            name: name.into(),
            phase: Phase::Setup,
            clock,
            settle_delay,
            started,
            unsettled: false,
            failures: Vec::new(),
            notes: Vec::new(),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    fn enter(&mut self, phase: Phase) {
        debug!("[{}] {:?} -> {:?}", self.name, self.phase, phase);
        self.phase = phase;
    }

    pub fn act(&mut self) {
        self.enter(Phase::Act);
    }

    /// Wait the settle delay so auxiliary indices catch up, then verify
    pub async fn settle(&mut self) {
        self.enter(Phase::Settle);
        self.clock.sleep(self.settle_delay).await;
        self.unsettled = false;
        self.enter(Phase::Verify);
    }

    /// Move to verification, settling first if state changed since the last
    /// settle
    pub async fn verify(&mut self) {
        if self.unsettled {
            self.settle().await;
        } else {
            self.enter(Phase::Verify);
        }
    }

    /// Mark that on-chain state changed outside of `require_success`
    pub fn mutated(&mut self) {
        self.unsettled = true;
    }

    /// A mandatory action: anything but a mined success ends the scenario
    pub fn require_success(
        &mut self,
        action: &'static str,
        result: Result<ActionOutput, ActionError>,
    ) -> Result<ActionOutput, ScenarioError> {
        let output = result.map_err(|source| ScenarioError::Action { action, source })?;
        if !output.succeeded() {
            return Err(ScenarioError::Reverted {
                action,
                tx_hash: output.outcome.tx_hash,
            });
        }
        info!("{} successful", action);
        self.unsettled = true;
        Ok(output)
    }

    /// A mandatory negative check: the action must have been rejected.
    ///
    /// Returns whether the check held. A violation is recorded and the
    /// scenario continues.
    pub fn expect_rejected(&mut self, check: &str, outcome: &NegativeOutcome) -> bool {
        match outcome {
            NegativeOutcome::Rejected(rejection) => {
                info!("{} correctly failed ({})", check, rejection);
                true
            }
            NegativeOutcome::Accepted(output) => {
                self.fail(format!(
                    "{} succeeded in tx {} (SECURITY ISSUE)",
                    check, output.outcome.tx_hash
                ));
                // the unexpected success mutated state
                self.unsettled = true;
                false
            }
            NegativeOutcome::Inconclusive(e) => {
                self.fail(format!("{} could not be checked: {}", check, e));
                false
            }
        }
    }

    /// Informational only, never affects the verdict
    pub fn note(&mut self, note: impl Into<String>) {
        let note = note.into();
        info!("{}", note);
        self.notes.push(note);
    }

    /// Record a mandatory assertion that did not hold
    pub fn fail(&mut self, reason: impl Into<String>) {
        let reason = reason.into();
        error!("[{}] {}", self.name, reason);
        self.failures.push(reason);
    }

    pub fn conclude(mut self) -> ScenarioResult {
        self.enter(Phase::Conclude);
        let elapsed = self.clock.now() - self.started;
        let status = if self.failures.is_empty() {
            ScenarioStatus::Passed
        } else {
            ScenarioStatus::Failed
        };
        let detail = if self.failures.is_empty() {
            None
        } else {
            Some(self.failures.join("; "))
        };
        ScenarioResult {
            name: self.name,
            status,
            detail,
            notes: self.notes,
            elapsed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScenarioStatus {
    Passed,
    Failed,
    /// Not executed because `blocked_by` did not pass
    Skipped { blocked_by: String },
}

impl fmt::Display for ScenarioStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Passed => f.write_str("PASSED"),
            Self::Failed => f.write_str("FAILED"),
            Self::Skipped { .. } => f.write_str("SKIPPED"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioResult {
    pub name: String,
    pub status: ScenarioStatus,
    pub detail: Option<String>,
    pub notes: Vec<String>,
    pub elapsed: Duration,
}

impl ScenarioResult {
    pub fn skipped(name: impl Into<String>, blocked_by: impl Into<String>) -> Self {
        let blocked_by = blocked_by.into();
        Self {
            name: name.into(),
            detail: Some(format!("prerequisite '{}' did not pass", blocked_by)),
            status: ScenarioStatus::Skipped { blocked_by },
            notes: Vec::new(),
            elapsed: Duration::ZERO,
        }
    }

    pub fn passed(&self) -> bool {
        self.status == ScenarioStatus::Passed
    }

    pub fn failed(&self) -> bool {
        self.status == ScenarioStatus::Failed
    }

    pub fn skipped_by(&self) -> Option<&str> {
        match &self.status {
            ScenarioStatus::Skipped { blocked_by } => Some(blocked_by),
            _ => None,
        }
    }
}

/// Log what an optional probe could not confirm
pub(crate) fn note_unavailable(run: &mut ScenarioRun, method: &str) {
    run.note(format!(
        "{} not available, not yet verifiable (RPC may not be implemented yet)",
        method
    ));
}
