//! One operation per precompile, plus the funding transfer that precedes them.
//!
//! Each action encodes its calldata, submits it with the operation's gas
//! ceiling and hands back the unmodified outcome together with the envelope
//! that was sent.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use alloy::primitives::{Address, B256, U256};
use alloy::signers::local::PrivateKeySigner;
use log::{debug, info};
use thiserror::Error;

use crate::calldata::{self, CallEnvelope, EncodeError, VerifyInferenceArgs};
use crate::chain::{CallRequest, ChainClient, ChainError, TransactionOutcome};
use crate::config::{GasLimits, PrecompileAddresses};

/// Client-side description of an agent, fixed for the whole run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentIdentity {
    pub address: Address,
    pub name: String,
    pub model_hash: B256,
    pub capabilities: Vec<String>,
}

impl AgentIdentity {
    pub fn new(
        address: Address,
        name: impl Into<String>,
        model_hash: B256,
        capabilities: Vec<String>,
    ) -> Self {
        Self {
            address,
            name: name.into(),
            model_hash,
            capabilities,
        }
    }

    /// Same identity declaring another name
    pub fn with_name(&self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..self.clone()
        }
    }

    pub fn register_envelope(&self) -> Result<CallEnvelope, EncodeError> {
        calldata::encode_register(&self.name, &self.model_hash, &self.capabilities)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    Fund,
    Register,
    Heartbeat,
    VerifyInference,
    ClaimReward,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Fund => "fund",
            Self::Register => "register",
            Self::Heartbeat => "heartbeat",
            Self::VerifyInference => "verifyInference",
            Self::ClaimReward => "claimReward",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ActionError {
    #[error("invalid calldata: {0}")]
    Encode(#[from] EncodeError),
    #[error(transparent)]
    Chain(#[from] ChainError),
    #[error("identity {identity} cannot be registered by signer {signer}")]
    IdentityMismatch { identity: Address, signer: Address },
}

impl ActionError {
    /// The node answered and refused the transaction
    pub fn is_protocol_rejection(&self) -> bool {
        matches!(self, Self::Chain(e) if e.is_rejection())
    }
}

/// A submitted action: what was sent and what the chain made of it
#[derive(Debug, Clone)]
pub struct ActionOutput {
    pub kind: ActionKind,
    pub envelope: CallEnvelope,
    pub outcome: TransactionOutcome,
}

impl ActionOutput {
    pub fn succeeded(&self) -> bool {
        self.outcome.succeeded()
    }
}

/// The precompile operations, bound to one chain client
#[derive(Clone)]
pub struct ProtocolActions {
    client: Arc<dyn ChainClient>,
    precompiles: PrecompileAddresses,
    gas: GasLimits,
}

impl ProtocolActions {
    pub fn new(client: Arc<dyn ChainClient>, precompiles: PrecompileAddresses, gas: GasLimits) -> Self {
        Self {
            client,
            precompiles,
            gas,
        }
    }

    pub fn client(&self) -> &dyn ChainClient {
        self.client.as_ref()
    }

    async fn submit(
        &self,
        kind: ActionKind,
        signer: &PrivateKeySigner,
        request: CallRequest,
        envelope: CallEnvelope,
    ) -> Result<ActionOutput, ActionError> {
        debug!("{} call data: {}", kind, envelope);
        let outcome = self.client.submit_and_confirm(signer, request).await?;
        info!(
            "{} tx {} mined in block {} ({:?})",
            kind,
            outcome.tx_hash,
            outcome
                .block_number
                .map(|b| b.to_string())
                .unwrap_or_else(|| "?".to_string()),
            outcome.status
        );
        Ok(ActionOutput {
            kind,
            envelope,
            outcome,
        })
    }

    /// Plain value transfer from `from` to `to`
    pub async fn fund(
        &self,
        from: &PrivateKeySigner,
        to: Address,
        amount: U256,
    ) -> Result<ActionOutput, ActionError> {
        info!("Funding {} with {} wei", to, amount);
        let request = CallRequest::transfer(to, amount, self.gas.transfer);
        self.submit(ActionKind::Fund, from, request, CallEnvelope::empty())
            .await
    }

    /// Register `identity`; the signer must be the identity's own account
    pub async fn register(
        &self,
        signer: &PrivateKeySigner,
        identity: &AgentIdentity,
    ) -> Result<ActionOutput, ActionError> {
        if signer.address() != identity.address {
            return Err(ActionError::IdentityMismatch {
                identity: identity.address,
                signer: signer.address(),
            });
        }
        info!("Registering agent: {:?}", identity.name);

        let envelope = identity.register_envelope()?;
        let request = CallRequest::call(self.precompiles.agent_register, &envelope, self.gas.register);
        self.submit(ActionKind::Register, signer, request, envelope)
            .await
    }

    pub async fn heartbeat(&self, signer: &PrivateKeySigner) -> Result<ActionOutput, ActionError> {
        info!("Sending heartbeat from {}", signer.address());
        let envelope = calldata::encode_heartbeat();
        let request = CallRequest::call(self.precompiles.agent_heartbeat, &envelope, self.gas.heartbeat);
        self.submit(ActionKind::Heartbeat, signer, request, envelope)
            .await
    }

    /// Attest an inference result for `args.agent`, submitted by `signer`
    pub async fn verify_inference(
        &self,
        signer: &PrivateKeySigner,
        args: &VerifyInferenceArgs,
    ) -> Result<ActionOutput, ActionError> {
        info!(
            "Verifying inference for {} from {}",
            args.agent,
            signer.address()
        );
        let envelope = calldata::encode_verify_inference(args);
        let request = CallRequest::call(
            self.precompiles.verify_inference,
            &envelope,
            self.gas.verify_inference,
        );
        self.submit(ActionKind::VerifyInference, signer, request, envelope)
            .await
    }

    pub async fn claim_reward(&self, signer: &PrivateKeySigner) -> Result<ActionOutput, ActionError> {
        info!("Claiming reward for {}", signer.address());
        let envelope = calldata::encode_claim_reward();
        let request = CallRequest::call(self.precompiles.claim_reward, &envelope, self.gas.claim_reward);
        self.submit(ActionKind::ClaimReward, signer, request, envelope)
            .await
    }
}

/// How the chain refused an action
#[derive(Debug, Clone)]
pub enum Rejection {
    /// Mined with a failing status
    Reverted(TransactionOutcome),
    /// Refused by the node before mining
    Refused(ChainError),
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reverted(outcome) => write!(f, "reverted in tx {}", outcome.tx_hash),
            Self::Refused(e) => write!(f, "refused: {}", e),
        }
    }
}

/// Result of an action that is expected to fail
#[derive(Debug, Clone)]
pub enum NegativeOutcome {
    /// The protocol refused the action, which is what the check wants
    Rejected(Rejection),
    /// The action went through although it should not have
    Accepted(ActionOutput),
    /// Nothing can be concluded, the action never reached a verdict
    Inconclusive(ActionError),
}

impl NegativeOutcome {
    pub fn from_result(result: Result<ActionOutput, ActionError>) -> Self {
        match result {
            Ok(output) if output.succeeded() => Self::Accepted(output),
            Ok(output) => Self::Rejected(Rejection::Reverted(output.outcome)),
            Err(ActionError::Chain(e)) if e.is_rejection() => Self::Rejected(Rejection::Refused(e)),
            Err(e) => Self::Inconclusive(e),
        }
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected(_))
    }
}

/// Run an action that must be refused by the protocol.
///
/// A revert or a node-side refusal is the passing case. Transport failures
/// and local precondition errors are inconclusive, not a pass.
pub async fn expect_failure<F>(action: F) -> NegativeOutcome
where
    F: Future<Output = Result<ActionOutput, ActionError>>,
{
    let outcome = NegativeOutcome::from_result(action.await);
    match &outcome {
        NegativeOutcome::Rejected(rejection) => debug!("Correctly rejected: {}", rejection),
        NegativeOutcome::Accepted(output) => {
            debug!("{} unexpectedly succeeded in tx {}", output.kind, output.outcome.tx_hash)
        }
        NegativeOutcome::Inconclusive(e) => debug!("Negative check inconclusive: {}", e),
    }
    outcome
}
