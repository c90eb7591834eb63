use async_trait::async_trait;
use log::info;

use super::inference::inference_args;
use super::{Scenario, ScenarioContext, ScenarioError, ScenarioRun};
use crate::actions::expect_failure;

/// A funded account that never registered may not heartbeat, attest
/// inferences for itself, or claim rewards
pub struct UnregisteredAccess;

#[async_trait]
impl Scenario for UnregisteredAccess {
    fn name(&self) -> &str {
        "Unregistered Access"
    }

    async fn execute(&self, ctx: &ScenarioContext, run: &mut ScenarioRun) -> Result<(), ScenarioError> {
        let stranger = ctx
            .session
            .fresh_funded_identity(&ctx.actions, &ctx.config, ctx.clock.as_ref())
            .await?;
        info!("Unregistered identity: {}", stranger.address());

        run.act();
        let outcome = expect_failure(ctx.actions.heartbeat(&stranger)).await;
        run.expect_rejected("heartbeat from unregistered identity", &outcome);

        let args = inference_args(ctx, stranger.address());
        let outcome = expect_failure(ctx.actions.verify_inference(&stranger, &args)).await;
        run.expect_rejected("verifyInference for unregistered identity", &outcome);

        let outcome = expect_failure(ctx.actions.claim_reward(&stranger)).await;
        run.expect_rejected("claimReward from unregistered identity", &outcome);

        Ok(())
    }
}
