use async_trait::async_trait;
use log::info;

use super::{note_unavailable, Scenario, ScenarioContext, ScenarioError, ScenarioRun};
use crate::probes::{self, Probe, METHOD_AGENT_STATUS};

/// Heartbeat from the registered agent must succeed
pub struct Heartbeat;

#[async_trait]
impl Scenario for Heartbeat {
    fn name(&self) -> &str {
        "Agent Heartbeat"
    }

    async fn execute(&self, ctx: &ScenarioContext, run: &mut ScenarioRun) -> Result<(), ScenarioError> {
        let agent = ctx.session.agent();

        let initial = probes::agent_status(ctx.client(), agent.address()).await;
        info!("Initial status: {:?}", initial.observed());

        run.act();
        run.require_success("heartbeat", ctx.actions.heartbeat(agent).await)?;

        run.verify().await;
        match probes::agent_status(ctx.client(), agent.address()).await {
            Probe::Observed(status) => {
                match status.last_heartbeat() {
                    Some(at) => info!("lastHeartbeat found in status: {}", at),
                    None => run.note("lastHeartbeat missing from status"),
                }
                if status.is_active() {
                    info!("Agent status verified: active with updated heartbeat");
                } else {
                    run.note(format!("Status: {:?}", status.status));
                }
            }
            Probe::Unavailable => note_unavailable(run, METHOD_AGENT_STATUS),
        }

        Ok(())
    }
}
