//! Human readable run report, emitted through the log facade.

use log::{error, info, warn};

use crate::orchestrator::RunSummary;
use crate::scenarios::{ScenarioResult, ScenarioStatus};

const RULE_WIDTH: usize = 80;

pub fn section(title: &str) {
    let rule = "=".repeat(RULE_WIDTH);
    info!("{}", rule);
    info!("  {}", title);
    info!("{}", rule);
}

/// One line verdict printed when a scenario concludes
pub fn scenario_verdict(result: &ScenarioResult) {
    match &result.status {
        ScenarioStatus::Passed => info!("✓ {} PASSED ({:.1?})", result.name, result.elapsed),
        ScenarioStatus::Failed => error!(
            "✗ {} FAILED: {}",
            result.name,
            result.detail.as_deref().unwrap_or("no detail")
        ),
        ScenarioStatus::Skipped { blocked_by } => {
            warn!("- {} SKIPPED (requires {})", result.name, blocked_by)
        }
    }
}

pub fn summary(summary: &RunSummary) {
    section("Test Summary");

    for result in summary.results() {
        match &result.status {
            ScenarioStatus::Passed => info!("{}: PASSED", result.name),
            ScenarioStatus::Failed => error!("{}: FAILED", result.name),
            ScenarioStatus::Skipped { .. } => warn!("{}: SKIPPED", result.name),
        }
        for note in &result.notes {
            info!("    note: {}", note);
        }
    }

    info!("{}", "=".repeat(RULE_WIDTH));
    info!(
        "Total: {} tests ({} executed)",
        summary.total(),
        summary.executed()
    );
    info!("Passed: {}", summary.passed());
    if summary.failed() > 0 {
        error!("Failed: {}", summary.failed());
    } else {
        info!("Failed: 0");
    }
    if summary.skipped() > 0 {
        warn!("Skipped: {}", summary.skipped());
    }
    info!("{}", "=".repeat(RULE_WIDTH));
}
