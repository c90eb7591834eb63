use alloy::primitives::U256;
use async_trait::async_trait;
use log::info;

use super::{note_unavailable, Scenario, ScenarioContext, ScenarioError, ScenarioRun};
use crate::probes::{self, Probe, METHOD_AGENT_META, METHOD_IS_AGENT};

/// Fund the test agent and register it.
///
/// Both transactions are mandatory. An existence probe that answers `false`
/// after a successful registration is a contradiction and fails the
/// scenario; the metadata probe is informational.
pub struct Registration;

#[async_trait]
impl Scenario for Registration {
    fn name(&self) -> &str {
        "Agent Registration"
    }

    async fn execute(&self, ctx: &ScenarioContext, run: &mut ScenarioRun) -> Result<(), ScenarioError> {
        let session = &ctx.session;
        let identity = session.identity();

        let initial = ctx.balance(identity.address).await?;
        info!("Test agent initial balance: {} wei", initial);

        run.act();
        let funding = U256::from(ctx.config.test.agent_funding_wei);
        run.require_success(
            "funding transfer",
            ctx.actions.fund(session.deployer(), identity.address, funding).await,
        )?;
        let funded = ctx.balance(identity.address).await?;
        info!("Test agent funded balance: {} wei", funded);

        run.require_success(
            "agent registration",
            ctx.actions.register(session.agent(), identity).await,
        )?;

        run.verify().await;

        match probes::is_agent(ctx.client(), identity.address).await {
            Probe::Observed(true) => info!("{} confirmed: true", METHOD_IS_AGENT),
            Probe::Observed(false) => {
                run.fail(format!("{} returned false after registration", METHOD_IS_AGENT))
            }
            Probe::Unavailable => note_unavailable(run, METHOD_IS_AGENT),
        }

        match probes::agent_meta(ctx.client(), identity.address).await {
            Probe::Observed(meta) if meta.name.as_deref() == Some(identity.name.as_str()) => {
                info!("Agent metadata verified");
            }
            Probe::Observed(meta) => run.note(format!(
                "Name in metadata: {:?} (expected: {:?})",
                meta.name, identity.name
            )),
            Probe::Unavailable => note_unavailable(run, METHOD_AGENT_META),
        }

        Ok(())
    }
}
