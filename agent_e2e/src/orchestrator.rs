//! Dependency-gated sequencing of scenarios.
//!
//! Scenarios form a small DAG: each node names the scenarios that must have
//! passed before it runs. Nodes are executed in insertion order and a node
//! may only depend on nodes inserted before it, so the graph is acyclic by
//! construction. A node whose prerequisite failed or was itself skipped is
//! recorded as skipped, never as failed.

use indexmap::IndexMap;
use log::{debug, info, warn};
use thiserror::Error;

use crate::report;
use crate::scenarios::{
    self, EdgeCases, Heartbeat, InferenceVerification, Registration, RewardClaim, Scenario,
    ScenarioContext, ScenarioResult, ScenarioStatus, UnregisteredAccess,
};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OrchestratorError {
    #[error("scenario '{0}' is already part of the plan")]
    DuplicateScenario(String),
    #[error("scenario '{scenario}' depends on '{prerequisite}', which is not planned before it")]
    UnknownPrerequisite {
        scenario: String,
        prerequisite: String,
    },
}

struct ScenarioNode {
    scenario: Box<dyn Scenario>,
    prerequisites: Vec<String>,
}

/// Ordered scenario plan with prerequisite edges
#[derive(Default)]
pub struct Orchestrator {
    nodes: IndexMap<String, ScenarioNode>,
}

impl Orchestrator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registration first, everything else gated on it
    pub fn default_plan() -> Result<Self, OrchestratorError> {
        const REGISTRATION: &str = "Agent Registration";

        let mut plan = Self::new();
        plan.add(Registration, &[])?;
        plan.add(Heartbeat, &[REGISTRATION])?;
        plan.add(InferenceVerification, &[REGISTRATION])?;
        plan.add(RewardClaim, &[REGISTRATION])?;
        plan.add(EdgeCases, &[REGISTRATION])?;
        plan.add(UnregisteredAccess, &[REGISTRATION])?;
        Ok(plan)
    }

    /// Append `scenario`; every prerequisite must already be planned
    pub fn add<S: Scenario + 'static>(
        &mut self,
        scenario: S,
        prerequisites: &[&str],
    ) -> Result<&mut Self, OrchestratorError> {
        let name = scenario.name().to_string();
        if self.nodes.contains_key(&name) {
            return Err(OrchestratorError::DuplicateScenario(name));
        }
        if let Some(missing) = prerequisites.iter().find(|p| !self.nodes.contains_key(**p)) {
            return Err(OrchestratorError::UnknownPrerequisite {
                scenario: name,
                prerequisite: missing.to_string(),
            });
        }

        self.nodes.insert(
            name,
            ScenarioNode {
                scenario: Box::new(scenario),
                prerequisites: prerequisites.iter().map(|p| p.to_string()).collect(),
            },
        );
        Ok(self)
    }

    pub fn scenario_names(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(String::as_str)
    }

    /// Run every scenario in order, one at a time
    pub async fn run(&self, ctx: &ScenarioContext) -> RunSummary {
        let mut summary = RunSummary::default();
        debug!(
            "Planned scenarios: {}",
            self.scenario_names().collect::<Vec<_>>().join(", ")
        );

        for (name, node) in &self.nodes {
            let blocker = node
                .prerequisites
                .iter()
                .find(|p| !summary.get(p).map(ScenarioResult::passed).unwrap_or(false));

            let result = match blocker {
                Some(blocker) => {
                    warn!("Skipping {}: prerequisite '{}' did not pass", name, blocker);
                    ScenarioResult::skipped(name.clone(), blocker.clone())
                }
                None => {
                    report::section(name);
                    scenarios::run_scenario(node.scenario.as_ref(), ctx).await
                }
            };
            report::scenario_verdict(&result);
            summary.record(result);
        }

        info!(
            "Run finished: {} passed, {} failed, {} skipped",
            summary.passed(),
            summary.failed(),
            summary.skipped()
        );
        summary
    }
}

/// Results of one run, in execution order
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    results: IndexMap<String, ScenarioResult>,
}

impl RunSummary {
    pub fn record(&mut self, result: ScenarioResult) {
        self.results.insert(result.name.clone(), result);
    }

    pub fn get(&self, name: &str) -> Option<&ScenarioResult> {
        self.results.get(name)
    }

    pub fn results(&self) -> impl Iterator<Item = &ScenarioResult> {
        self.results.values()
    }

    fn count(&self, f: impl Fn(&ScenarioStatus) -> bool) -> usize {
        self.results.values().filter(|r| f(&r.status)).count()
    }

    pub fn passed(&self) -> usize {
        self.count(|s| *s == ScenarioStatus::Passed)
    }

    pub fn failed(&self) -> usize {
        self.count(|s| *s == ScenarioStatus::Failed)
    }

    pub fn skipped(&self) -> usize {
        self.count(|s| matches!(s, ScenarioStatus::Skipped { .. }))
    }

    /// Scenarios that actually ran
    pub fn executed(&self) -> usize {
        self.passed() + self.failed()
    }

    pub fn total(&self) -> usize {
        self.results.len()
    }

    pub fn is_success(&self) -> bool {
        self.failed() == 0
    }

    /// Process exit status: skipped scenarios never count as failures
    pub fn exit_code(&self) -> i32 {
        if self.is_success() {
            0
        } else {
            1
        }
    }
}
