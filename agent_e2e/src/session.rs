//! Signing identities shared by all scenarios of a run.

use std::str::FromStr;

use alloy::primitives::{Address, U256};
use alloy::signers::local::PrivateKeySigner;
use log::{debug, info};
use thiserror::Error;

use crate::actions::{ActionError, AgentIdentity, ProtocolActions};
use crate::clock::Clock;
use crate::config::{HarnessConfig, SecretKey, TestParameters};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("no deployer key configured, set deployer_private_key or AGENT_E2E_DEPLOYER_KEY")]
    MissingDeployerKey,
    #[error("invalid deployer key: {0}")]
    InvalidKey(String),
    #[error("funding {address} failed: {source}")]
    Funding {
        address: Address,
        source: ActionError,
    },
    #[error("funding transfer to {0} was mined with a failing status")]
    FundingReverted(Address),
}

/// The long-lived identities of a run.
///
/// The deployer pays for everything, the agent is the identity under test and
/// the outsider is an unrelated, never registered account used by negative
/// checks.
pub struct Session {
    deployer: PrivateKeySigner,
    agent: PrivateKeySigner,
    outsider: PrivateKeySigner,
    identity: AgentIdentity,
}

impl Session {
    /// Build a session from the configured deployer key and fresh random
    /// agent and outsider keys
    pub fn new(config: &HarnessConfig) -> Result<Self, SessionError> {
        let key = config.deployer_key().ok_or(SessionError::MissingDeployerKey)?;
        let deployer = parse_key(&key)?;
        Ok(Self::from_signers(
            deployer,
            PrivateKeySigner::random(),
            PrivateKeySigner::random(),
            &config.test,
        ))
    }

    pub fn from_signers(
        deployer: PrivateKeySigner,
        agent: PrivateKeySigner,
        outsider: PrivateKeySigner,
        params: &TestParameters,
    ) -> Self {
        let identity = AgentIdentity::new(
            agent.address(),
            params.agent_name.clone(),
            params.model_hash,
            params.capabilities.clone(),
        );
        Self {
            deployer,
            agent,
            outsider,
            identity,
        }
    }

    pub fn deployer(&self) -> &PrivateKeySigner {
        &self.deployer
    }

    pub fn agent(&self) -> &PrivateKeySigner {
        &self.agent
    }

    pub fn outsider(&self) -> &PrivateKeySigner {
        &self.outsider
    }

    pub fn identity(&self) -> &AgentIdentity {
        &self.identity
    }

    /// Fund the outsider so it can pay for the transactions it must get
    /// rejected
    pub async fn prepare(
        &self,
        actions: &ProtocolActions,
        config: &HarnessConfig,
    ) -> Result<(), SessionError> {
        info!("Deployer: {}", self.deployer.address());
        info!("Test agent address: {}", self.agent.address());
        info!("Funding outsider {} for negative tests", self.outsider.address());

        self.fund(
            actions,
            self.outsider.address(),
            U256::from(config.test.auxiliary_funding_wei),
        )
        .await
    }

    /// Transfer `amount` from the deployer to `to`, requiring a successful
    /// receipt
    pub async fn fund(
        &self,
        actions: &ProtocolActions,
        to: Address,
        amount: U256,
    ) -> Result<(), SessionError> {
        let output = actions
            .fund(&self.deployer, to, amount)
            .await
            .map_err(|source| SessionError::Funding { address: to, source })?;
        if !output.succeeded() {
            return Err(SessionError::FundingReverted(to));
        }
        Ok(())
    }

    /// Create and fund a throwaway identity, then wait for the funding to be
    /// visible
    pub async fn fresh_funded_identity(
        &self,
        actions: &ProtocolActions,
        config: &HarnessConfig,
        clock: &dyn Clock,
    ) -> Result<PrivateKeySigner, SessionError> {
        let signer = PrivateKeySigner::random();
        debug!("Created throwaway identity {}", signer.address());

        self.fund(
            actions,
            signer.address(),
            U256::from(config.test.auxiliary_funding_wei),
        )
        .await?;
        clock.sleep(config.funding_settle_delay()).await;
        Ok(signer)
    }
}

fn parse_key(key: &SecretKey) -> Result<PrivateKeySigner, SessionError> {
    PrivateKeySigner::from_str(key.expose().trim())
        .map_err(|e| SessionError::InvalidKey(e.to_string()))
}
