//! Whole runs of the default plan against the simulated node

mod common;

use std::time::Duration;

use agent_e2e::{chain::ChainError, Orchestrator, RunSummary, ScenarioStatus};
use common::{Harness, NodeBehavior};

async fn run_default_plan(harness: &Harness) -> anyhow::Result<RunSummary> {
    harness.prepare().await?;
    let plan = Orchestrator::default_plan()?;
    Ok(plan.run(&harness.context).await)
}

fn status_of<'a>(summary: &'a RunSummary, name: &str) -> &'a ScenarioStatus {
    &summary.get(name).expect("scenario recorded").status
}

#[tokio::test]
async fn test_conforming_node_passes_every_scenario() -> anyhow::Result<()> {
    let harness = Harness::new(NodeBehavior::default());
    let summary = run_default_plan(&harness).await?;

    for result in summary.results() {
        assert_eq!(result.status, ScenarioStatus::Passed, "{}: {:?}", result.name, result.detail);
    }
    assert_eq!(summary.total(), 6);
    assert_eq!(summary.passed(), 6);
    assert_eq!(summary.exit_code(), 0);
    Ok(())
}

#[tokio::test]
async fn test_funding_timeout_skips_all_dependents() -> anyhow::Result<()> {
    let harness = Harness::new(NodeBehavior::default());
    harness.chain.inject_fault(
        None,
        harness.agent_address(),
        ChainError::Timeout(Duration::from_secs(30)),
    );

    let summary = run_default_plan(&harness).await?;

    assert_eq!(status_of(&summary, "Agent Registration"), &ScenarioStatus::Failed);
    assert_eq!(summary.failed(), 1);
    assert_eq!(summary.skipped(), 5);
    for result in summary.results().skip(1) {
        assert_eq!(result.skipped_by(), Some("Agent Registration"));
    }
    assert_eq!(summary.exit_code(), 1);

    // nothing after the failed funding reached the node
    assert!(harness.chain.agent(&harness.agent_address()).is_none());
    Ok(())
}

#[tokio::test]
async fn test_missing_introspection_methods_do_not_fail_the_run() -> anyhow::Result<()> {
    let harness = Harness::new(NodeBehavior {
        status_methods: false,
        ..Default::default()
    });
    let summary = run_default_plan(&harness).await?;

    assert_eq!(summary.failed(), 0);
    assert_eq!(summary.exit_code(), 0);
    let registration = summary.get("Agent Registration").unwrap();
    assert!(registration
        .notes
        .iter()
        .any(|n| n.contains("not yet verifiable")));
    Ok(())
}

#[tokio::test]
async fn test_refusals_at_submission_count_as_rejections() -> anyhow::Result<()> {
    let harness = Harness::new(NodeBehavior {
        refuse_failing: true,
        ..Default::default()
    });
    let summary = run_default_plan(&harness).await?;

    assert_eq!(summary.passed(), 6);
    Ok(())
}

#[tokio::test]
async fn test_foreign_inference_is_a_security_failure() -> anyhow::Result<()> {
    let harness = Harness::new(NodeBehavior {
        accept_foreign_inference: true,
        ..Default::default()
    });
    let summary = run_default_plan(&harness).await?;

    let inference = summary.get("Verify Inference").unwrap();
    assert_eq!(inference.status, ScenarioStatus::Failed);
    assert!(inference.detail.as_deref().unwrap().contains("SECURITY ISSUE"));
    assert_eq!(summary.failed(), 1);
    assert_eq!(summary.exit_code(), 1);
    Ok(())
}

#[tokio::test]
async fn test_duplicate_registration_fails_edge_cases_only() -> anyhow::Result<()> {
    let harness = Harness::new(NodeBehavior {
        accept_duplicate_registration: true,
        ..Default::default()
    });
    let summary = run_default_plan(&harness).await?;

    let edge_cases = summary.get("Edge Cases").unwrap();
    assert_eq!(edge_cases.status, ScenarioStatus::Failed);
    assert!(edge_cases
        .detail
        .as_deref()
        .unwrap()
        .contains("double registration"));
    assert_eq!(summary.failed(), 1);
    Ok(())
}

#[tokio::test]
async fn test_unregistered_access_is_detected() -> anyhow::Result<()> {
    let harness = Harness::new(NodeBehavior {
        accept_unregistered: true,
        ..Default::default()
    });
    let summary = run_default_plan(&harness).await?;

    assert_eq!(status_of(&summary, "Edge Cases"), &ScenarioStatus::Failed);
    let unregistered = summary.get("Unregistered Access").unwrap();
    assert_eq!(unregistered.status, ScenarioStatus::Failed);
    let detail = unregistered.detail.as_deref().unwrap();
    assert!(detail.contains("heartbeat from unregistered identity"));
    assert!(detail.contains("verifyInference for unregistered identity"));
    assert!(detail.contains("claimReward from unregistered identity"));

    assert_eq!(status_of(&summary, "Verify Inference"), &ScenarioStatus::Passed);
    assert_eq!(summary.failed(), 2);
    Ok(())
}

#[tokio::test]
async fn test_settle_delays_follow_state_changes() -> anyhow::Result<()> {
    let harness = Harness::new(NodeBehavior::default());
    run_default_plan(&harness).await?;

    let sleeps = harness.clock.sleeps();
    let settles = sleeps
        .iter()
        .filter(|d| **d == Duration::from_millis(2000))
        .count();
    let funding = sleeps
        .iter()
        .filter(|d| **d == Duration::from_millis(1000))
        .count();
    // registration, heartbeat, inference and a successful claim
    assert_eq!(settles, 4);
    // two throwaway identities in edge cases, one for unregistered access
    assert_eq!(funding, 3);
    Ok(())
}

#[tokio::test]
async fn test_setup_fails_without_deployer_funds() -> anyhow::Result<()> {
    let harness = Harness::new(NodeBehavior::default());
    let deployer = harness.context.session.deployer().address();
    harness.chain.set_balance(deployer, Default::default());

    assert!(harness.prepare().await.is_err());
    Ok(())
}
