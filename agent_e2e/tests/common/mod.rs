// Common test utilities: an in-process node that implements the agent
// economy precompiles well enough to drive the scenarios.
//
// Each submission is mined in its own block. Behaviour knobs turn the node
// into a non-conforming one so the harness verdicts can be checked.

#![allow(dead_code)]

pub mod rpc;

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use agent_e2e::{
    actions::ProtocolActions,
    calldata,
    chain::{CallRequest, ChainClient, ChainError, TransactionOutcome},
    clock::Clock,
    config::{defaults, HarnessConfig, PrecompileAddresses},
    probes::{METHOD_AGENT_META, METHOD_AGENT_STATUS, METHOD_IS_AGENT},
    scenarios::ScenarioContext,
    session::Session,
};
use alloy::primitives::{Address, B256, U256};
use alloy::signers::local::PrivateKeySigner;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::time::Instant;

pub const BLOCK_TIME_SECS: u64 = 2;
pub const GENESIS_TIMESTAMP: u64 = 1_700_000_000;

/// How the simulated node deviates from a conforming one
#[derive(Debug, Clone)]
pub struct NodeBehavior {
    /// Answer the `agent_*` introspection methods
    pub status_methods: bool,
    /// Refuse failing transactions at submission instead of mining a revert
    pub refuse_failing: bool,
    pub accept_duplicate_registration: bool,
    pub accept_foreign_inference: bool,
    pub accept_unregistered: bool,
    pub reward_per_token: U256,
}

impl Default for NodeBehavior {
    fn default() -> Self {
        Self {
            status_methods: true,
            refuse_failing: false,
            accept_duplicate_registration: false,
            accept_foreign_inference: false,
            accept_unregistered: false,
            reward_per_token: U256::from(1_000_000_000u64),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentRecord {
    pub name: String,
    pub model_hash: B256,
    pub capabilities: Vec<String>,
    pub total_inferences: u64,
    pub pending_tokens: U256,
    pub last_heartbeat: Option<u64>,
}

/// A transaction as the node saw it
#[derive(Debug, Clone)]
pub struct Submission {
    pub from: Address,
    pub to: Address,
    pub data: Vec<u8>,
    pub value: U256,
    pub gas_limit: u64,
    pub success: bool,
}

#[derive(Default)]
struct ChainState {
    block: u64,
    balances: HashMap<Address, U256>,
    agents: HashMap<Address, AgentRecord>,
    faults: Vec<(Option<Address>, Address, ChainError)>,
    submissions: Vec<Submission>,
}

impl ChainState {
    fn balance(&self, address: &Address) -> U256 {
        self.balances.get(address).copied().unwrap_or_default()
    }

    fn transfer(&mut self, from: Address, to: Address, value: U256) -> bool {
        let available = self.balance(&from);
        if available < value {
            return false;
        }
        self.balances.insert(from, available - value);
        let credited = self.balance(&to) + value;
        self.balances.insert(to, credited);
        true
    }

    fn fault_for(&self, from: Address, to: Address) -> Option<ChainError> {
        self.faults
            .iter()
            .find(|(f, t, _)| *t == to && f.map_or(true, |f| f == from))
            .map(|(_, _, e)| e.clone())
    }
}

pub struct SimulatedChain {
    chain_id: u64,
    precompiles: PrecompileAddresses,
    reward_pool: Address,
    behavior: NodeBehavior,
    state: Mutex<ChainState>,
}

impl SimulatedChain {
    pub fn new(config: &HarnessConfig, behavior: NodeBehavior) -> Self {
        Self {
            chain_id: config.network.chain_id,
            precompiles: config.precompiles.clone(),
            reward_pool: config.reward_pool,
            behavior,
            state: Mutex::new(ChainState::default()),
        }
    }

    pub fn set_balance(&self, address: Address, balance: U256) {
        self.state.lock().balances.insert(address, balance);
    }

    /// Fail every submission to `to` (from `from` only, when given) with
    /// `error` before anything is mined
    pub fn inject_fault(&self, from: Option<Address>, to: Address, error: ChainError) {
        self.state.lock().faults.push((from, to, error));
    }

    pub fn agent(&self, address: &Address) -> Option<AgentRecord> {
        self.state.lock().agents.get(address).cloned()
    }

    pub fn submissions(&self) -> Vec<Submission> {
        self.state.lock().submissions.clone()
    }

    pub fn submissions_to(&self, to: Address) -> Vec<Submission> {
        self.submissions().into_iter().filter(|s| s.to == to).collect()
    }

    fn timestamp(block: u64) -> u64 {
        GENESIS_TIMESTAMP + block * BLOCK_TIME_SECS
    }

    fn execute(&self, state: &mut ChainState, from: Address, request: &CallRequest) -> bool {
        let to = request.to;
        let registered = state.agents.contains_key(&from);

        if to == self.precompiles.agent_register {
            let Ok(args) = calldata::decode_register(&request.data) else {
                return false;
            };
            if registered && !self.behavior.accept_duplicate_registration {
                return false;
            }
            state.agents.insert(
                from,
                AgentRecord {
                    name: args.name,
                    model_hash: args.model_hash,
                    capabilities: args.capabilities,
                    total_inferences: 0,
                    pending_tokens: U256::ZERO,
                    last_heartbeat: None,
                },
            );
            true
        } else if to == self.precompiles.agent_heartbeat {
            let now = Self::timestamp(state.block);
            match state.agents.get_mut(&from) {
                Some(record) => {
                    record.last_heartbeat = Some(now);
                    true
                }
                None => self.behavior.accept_unregistered,
            }
        } else if to == self.precompiles.verify_inference {
            let Ok(args) = calldata::decode_verify_inference(&request.data) else {
                return false;
            };
            if args.agent != from && !self.behavior.accept_foreign_inference {
                return false;
            }
            match state.agents.get_mut(&args.agent) {
                Some(record) => {
                    record.total_inferences += 1;
                    record.pending_tokens += args.tokens_processed;
                    true
                }
                None => self.behavior.accept_unregistered,
            }
        } else if to == self.precompiles.claim_reward {
            let Some(record) = state.agents.get_mut(&from) else {
                return self.behavior.accept_unregistered;
            };
            if record.pending_tokens.is_zero() {
                // no contributions recorded yet
                return false;
            }
            let owed = record.pending_tokens * self.behavior.reward_per_token;
            record.pending_tokens = U256::ZERO;
            let pool = self.reward_pool;
            let paid = owed.min(state.balance(&pool));
            state.transfer(pool, from, paid)
        } else {
            true
        }
    }
}

#[async_trait]
impl ChainClient for SimulatedChain {
    async fn submit_and_confirm(
        &self,
        signer: &PrivateKeySigner,
        request: CallRequest,
    ) -> Result<TransactionOutcome, ChainError> {
        let from = signer.address();
        let mut state = self.state.lock();

        if let Some(error) = state.fault_for(from, request.to) {
            return Err(error);
        }
        if !request.value.is_zero() && !state.transfer(from, request.to, request.value) {
            return Err(ChainError::Refused {
                code: -32000,
                message: "insufficient funds for transfer".to_string(),
            });
        }

        let success = self.execute(&mut state, from, &request);
        if !success && self.behavior.refuse_failing {
            return Err(ChainError::Refused {
                code: 3,
                message: "execution reverted".to_string(),
            });
        }

        state.block += 1;
        let block = state.block;
        state.submissions.push(Submission {
            from,
            to: request.to,
            data: request.data.to_vec(),
            value: request.value,
            gas_limit: request.gas_limit,
            success,
        });

        let tx_hash = B256::left_padding_from(&(state.submissions.len() as u64).to_be_bytes());
        let receipt = json!({
            "transactionHash": tx_hash,
            "status": if success { "0x1" } else { "0x0" },
            "blockNumber": format!("{:#x}", block),
            "gasUsed": format!("{:#x}", request.gas_limit / 2),
        });
        TransactionOutcome::from_receipt(tx_hash, receipt)
    }

    async fn read_balance(&self, address: Address) -> Result<U256, ChainError> {
        Ok(self.state.lock().balance(&address))
    }

    async fn call_status_method(&self, method: &str, params: Value) -> Option<Value> {
        if !self.behavior.status_methods {
            return None;
        }
        let address: Address = serde_json::from_value(params.get(0)?.clone()).ok()?;
        let state = self.state.lock();
        let record = state.agents.get(&address);

        match method {
            METHOD_IS_AGENT => Some(json!(record.is_some())),
            METHOD_AGENT_META => record.map(|r| {
                json!({
                    "name": r.name,
                    "modelHash": r.model_hash,
                    "totalInferences": r.total_inferences,
                })
            }),
            METHOD_AGENT_STATUS => record.map(|r| {
                json!({
                    "status": if r.last_heartbeat.is_some() { "active" } else { "inactive" },
                    "lastHeartbeat": r.last_heartbeat.map(|t| format!("{:#x}", t)),
                })
            }),
            _ => None,
        }
    }

    async fn chain_id(&self) -> Result<u64, ChainError> {
        Ok(self.chain_id)
    }

    async fn block_number(&self) -> Result<u64, ChainError> {
        Ok(self.state.lock().block)
    }
}

/// Clock that returns immediately and remembers every requested sleep
#[derive(Default)]
pub struct RecordingClock {
    sleeps: Mutex<Vec<Duration>>,
    offset: Mutex<Duration>,
}

impl RecordingClock {
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().clone()
    }
}

impl Clock for RecordingClock {
    fn now(&self) -> Instant {
        Instant::now() + *self.offset.lock()
    }

    fn sleep(&self, d: Duration) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        self.sleeps.lock().push(d);
        *self.offset.lock() += d;
        Box::pin(async {})
    }
}

pub fn deployer() -> PrivateKeySigner {
    PrivateKeySigner::random()
}

/// Configuration with short, recognizable delays
pub fn test_config() -> HarnessConfig {
    let mut config = HarnessConfig::default();
    config.network.rpc_url = "http://127.0.0.1:8545".to_string();
    config.timing.settle_delay_ms = 2000;
    config.timing.funding_settle_delay_ms = 1000;
    config
}

pub struct Harness {
    pub chain: Arc<SimulatedChain>,
    pub clock: Arc<RecordingClock>,
    pub context: ScenarioContext,
}

impl Harness {
    pub fn new(behavior: NodeBehavior) -> Self {
        Self::with_config(test_config(), behavior)
    }

    pub fn with_config(config: HarnessConfig, behavior: NodeBehavior) -> Self {
        let chain = Arc::new(SimulatedChain::new(&config, behavior));
        let deployer = deployer();
        chain.set_balance(deployer.address(), U256::from(1_000 * defaults::COIN));
        chain.set_balance(config.reward_pool, U256::from(100 * defaults::COIN));

        let session = Session::from_signers(
            deployer,
            PrivateKeySigner::random(),
            PrivateKeySigner::random(),
            &config.test,
        );
        let clock = Arc::new(RecordingClock::default());
        let context = ScenarioContext {
            actions: ProtocolActions::new(
                chain.clone(),
                config.precompiles.clone(),
                config.gas.clone(),
            ),
            config: Arc::new(config),
            session: Arc::new(session),
            clock: clock.clone(),
        };

        Self {
            chain,
            clock,
            context,
        }
    }

    pub fn agent_address(&self) -> Address {
        self.context.session.agent().address()
    }

    pub fn outsider_address(&self) -> Address {
        self.context.session.outsider().address()
    }

    pub async fn prepare(&self) -> anyhow::Result<()> {
        self.context
            .session
            .prepare(&self.context.actions, &self.context.config)
            .await?;
        Ok(())
    }
}
