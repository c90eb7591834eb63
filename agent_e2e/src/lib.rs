//! Agent economy end-to-end harness
//!
//! Drives the register, heartbeat, verify-inference and claim-reward
//! precompiles of a live node through dependency-gated scenarios and reports
//! a pass/fail/skip verdict per scenario.

pub mod actions;
pub mod calldata;
pub mod chain;
pub mod clock;
pub mod config;
pub mod logger;
pub mod orchestrator;
pub mod probes;
pub mod report;
pub mod scenarios;
pub mod session;

pub use actions::{expect_failure, AgentIdentity, NegativeOutcome, ProtocolActions};
pub use calldata::CallEnvelope;
pub use chain::{ChainClient, ChainError, RpcChainClient, TransactionOutcome};
pub use config::{ConfigValidationError, HarnessConfig};
pub use orchestrator::{Orchestrator, OrchestratorError, RunSummary};
pub use probes::Probe;
pub use scenarios::{ScenarioContext, ScenarioResult, ScenarioStatus};
pub use session::{Session, SessionError};
