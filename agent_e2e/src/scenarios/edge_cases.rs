use async_trait::async_trait;
use log::info;

use super::{Scenario, ScenarioContext, ScenarioError, ScenarioRun};
use crate::actions::{expect_failure, AgentIdentity, NegativeOutcome};

/// Independent negative sub-checks around registration and liveness.
///
/// Every sub-check runs even when an earlier one failed. Registration with an
/// empty name is informational only.
pub struct EdgeCases;

#[async_trait]
impl Scenario for EdgeCases {
    fn name(&self) -> &str {
        "Edge Cases"
    }

    async fn execute(&self, ctx: &ScenarioContext, run: &mut ScenarioRun) -> Result<(), ScenarioError> {
        let session = &ctx.session;
        run.act();

        info!("Testing double registration (should fail)");
        let duplicate = session
            .identity()
            .with_name(ctx.config.test.duplicate_agent_name.clone());
        let outcome = expect_failure(ctx.actions.register(session.agent(), &duplicate)).await;
        run.expect_rejected("double registration", &outcome);

        info!("Testing heartbeat from non-agent (should fail)");
        match session
            .fresh_funded_identity(&ctx.actions, &ctx.config, ctx.clock.as_ref())
            .await
        {
            Ok(non_agent) => {
                let outcome = expect_failure(ctx.actions.heartbeat(&non_agent)).await;
                run.expect_rejected("heartbeat from non-agent", &outcome);
            }
            Err(e) => run.fail(format!("heartbeat from non-agent could not be set up: {}", e)),
        }

        run.note("verifyInference from wrong caller: covered by Verify Inference");

        info!("Testing registration with empty name");
        match session
            .fresh_funded_identity(&ctx.actions, &ctx.config, ctx.clock.as_ref())
            .await
        {
            Ok(signer) => {
                let base = session.identity();
                let unnamed = AgentIdentity::new(
                    signer.address(),
                    "",
                    base.model_hash,
                    base.capabilities.clone(),
                );
                match expect_failure(ctx.actions.register(&signer, &unnamed)).await {
                    NegativeOutcome::Rejected(rejection) => {
                        run.note(format!("Registration with empty name failed ({})", rejection))
                    }
                    NegativeOutcome::Accepted(_) => {
                        run.note("Registration with empty name succeeded (may be allowed)")
                    }
                    NegativeOutcome::Inconclusive(e) => {
                        run.note(format!("Registration with empty name inconclusive: {}", e))
                    }
                }
            }
            Err(e) => run.note(format!("Registration with empty name not checked: {}", e)),
        }

        Ok(())
    }
}
