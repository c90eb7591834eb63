use std::fmt;
use std::path::Path;
use std::time::Duration;

use alloy::primitives::{Address, B256};
use anyhow::{anyhow, Result};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::calldata::{self, EncodeError};
use crate::chain::RpcClientConfig;

/// Default values for configuration
pub mod defaults {
    use alloy::primitives::{address, Address};

    pub const RPC_URL: &str = "https://node-1.plumise.com/testnet/rpc";
    pub const CHAIN_ID: u64 = 419561;

    pub const VERIFY_INFERENCE: Address = address!("0000000000000000000000000000000000000020");
    pub const AGENT_REGISTER: Address = address!("0000000000000000000000000000000000000021");
    pub const AGENT_HEARTBEAT: Address = address!("0000000000000000000000000000000000000022");
    pub const CLAIM_REWARD: Address = address!("0000000000000000000000000000000000000023");
    pub const REWARD_POOL: Address = address!("0000000000000000000000000000000000001000");

    // Registration carries variable-length data, the caller-based calls carry none
    pub const GAS_REGISTER: u64 = 500_000;
    pub const GAS_HEARTBEAT: u64 = 100_000;
    pub const GAS_VERIFY_INFERENCE: u64 = 100_000;
    pub const GAS_CLAIM_REWARD: u64 = 100_000;
    pub const GAS_TRANSFER: u64 = 21_000;

    pub const REQUEST_TIMEOUT_SECS: u64 = 30;
    pub const CONNECTION_TIMEOUT_SECS: u64 = 10;
    pub const CONFIRMATION_TIMEOUT_SECS: u64 = 60;
    pub const RECEIPT_POLL_INTERVAL_MS: u64 = 1000;
    pub const SETTLE_DELAY_MS: u64 = 2000;
    pub const FUNDING_SETTLE_DELAY_MS: u64 = 1000;

    pub const COIN: u128 = 1_000_000_000_000_000_000;
    pub const AGENT_FUNDING_WEI: u128 = 10 * COIN;
    pub const AUXILIARY_FUNDING_WEI: u128 = COIN;

    pub const AGENT_NAME: &str = "e2e-test-agent";
    pub const DUPLICATE_AGENT_NAME: &str = "duplicate-agent";
    pub const CAPABILITIES: [&str; 2] = ["text-generation", "code-completion"];
    pub const TOKENS_PROCESSED: u64 = 1000;

    pub const LOG_LEVEL: &str = "info";

    // Validation limits
    pub const MIN_TIMEOUT_SECS: u64 = 1;
    pub const MAX_TIMEOUT_SECS: u64 = 300;
    pub const MIN_POLL_INTERVAL_MS: u64 = 100;
    pub const MAX_POLL_INTERVAL_MS: u64 = 30_000;
    pub const MAX_SETTLE_DELAY_MS: u64 = 60_000;
}

/// Environment variable holding the funding identity's key
pub const DEPLOYER_KEY_ENV: &str = "AGENT_E2E_DEPLOYER_KEY";

/// A hex private key that never shows up in logs
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SecretKey(String);

impl SecretKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretKey(<redacted>)")
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub rpc_url: String,
    pub chain_id: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            rpc_url: defaults::RPC_URL.to_string(),
            chain_id: defaults::CHAIN_ID,
        }
    }
}

/// Fixed addresses of the agent economy precompiles
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrecompileAddresses {
    pub verify_inference: Address,
    pub agent_register: Address,
    pub agent_heartbeat: Address,
    pub claim_reward: Address,
}

impl Default for PrecompileAddresses {
    fn default() -> Self {
        Self {
            verify_inference: defaults::VERIFY_INFERENCE,
            agent_register: defaults::AGENT_REGISTER,
            agent_heartbeat: defaults::AGENT_HEARTBEAT,
            claim_reward: defaults::CLAIM_REWARD,
        }
    }
}

/// Gas ceiling per operation
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GasLimits {
    pub register: u64,
    pub heartbeat: u64,
    pub verify_inference: u64,
    pub claim_reward: u64,
    pub transfer: u64,
}

impl Default for GasLimits {
    fn default() -> Self {
        Self {
            register: defaults::GAS_REGISTER,
            heartbeat: defaults::GAS_HEARTBEAT,
            verify_inference: defaults::GAS_VERIFY_INFERENCE,
            claim_reward: defaults::GAS_CLAIM_REWARD,
            transfer: defaults::GAS_TRANSFER,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub request_timeout_secs: u64,
    pub connection_timeout_secs: u64,
    pub confirmation_timeout_secs: u64,
    pub receipt_poll_interval_ms: u64,
    /// Pause between a state-mutating action and the probes that check it
    pub settle_delay_ms: u64,
    /// Pause after funding a throwaway identity
    pub funding_settle_delay_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: defaults::REQUEST_TIMEOUT_SECS,
            connection_timeout_secs: defaults::CONNECTION_TIMEOUT_SECS,
            confirmation_timeout_secs: defaults::CONFIRMATION_TIMEOUT_SECS,
            receipt_poll_interval_ms: defaults::RECEIPT_POLL_INTERVAL_MS,
            settle_delay_ms: defaults::SETTLE_DELAY_MS,
            funding_settle_delay_ms: defaults::FUNDING_SETTLE_DELAY_MS,
        }
    }
}

/// Inputs of the scenarios
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct TestParameters {
    pub agent_funding_wei: u128,
    pub auxiliary_funding_wei: u128,
    pub agent_name: String,
    pub duplicate_agent_name: String,
    pub model_hash: B256,
    pub capabilities: Vec<String>,
    pub input_hash: B256,
    pub output_hash: B256,
    pub tokens_processed: u64,
}

impl Default for TestParameters {
    fn default() -> Self {
        Self {
            agent_funding_wei: defaults::AGENT_FUNDING_WEI,
            auxiliary_funding_wei: defaults::AUXILIARY_FUNDING_WEI,
            agent_name: defaults::AGENT_NAME.to_string(),
            duplicate_agent_name: defaults::DUPLICATE_AGENT_NAME.to_string(),
            model_hash: B256::repeat_byte(0x11),
            capabilities: defaults::CAPABILITIES.iter().map(|c| c.to_string()).collect(),
            input_hash: B256::repeat_byte(0x22),
            output_hash: B256::repeat_byte(0x33),
            tokens_processed: defaults::TOKENS_PROCESSED,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub disable_log_color: bool,
    pub log_file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::LOG_LEVEL.to_string(),
            disable_log_color: false,
            log_file: None,
        }
    }
}

/// Complete harness configuration.
///
/// `HarnessConfig::default()` targets the public testnet; every field can be
/// overridden from a JSON file.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    pub network: NetworkConfig,
    pub precompiles: PrecompileAddresses,
    pub reward_pool: Address,
    pub gas: GasLimits,
    pub timing: TimingConfig,
    pub test: TestParameters,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deployer_private_key: Option<SecretKey>,
    pub logging: LoggingConfig,
    pub strict_validation: bool,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            network: NetworkConfig::default(),
            precompiles: PrecompileAddresses::default(),
            reward_pool: defaults::REWARD_POOL,
            gas: GasLimits::default(),
            timing: TimingConfig::default(),
            test: TestParameters::default(),
            deployer_private_key: None,
            logging: LoggingConfig::default(),
            strict_validation: false,
        }
    }
}

/// Configuration validation errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigValidationError {
    #[error("Invalid RPC URL: '{0}' - must be a valid HTTP/HTTPS URL")]
    InvalidRpcUrl(String),
    #[error("Invalid {field}: {value} - must be between {min} and {max}")]
    OutOfRange {
        field: &'static str,
        value: u64,
        min: u64,
        max: u64,
    },
    #[error("Invalid {field}: {source}")]
    Unencodable {
        field: &'static str,
        source: EncodeError,
    },
    #[error("Address {address} is used for both {first} and {second}")]
    DuplicateAddress {
        address: Address,
        first: &'static str,
        second: &'static str,
    },
    #[error("Gas limit for {0} must be nonzero")]
    ZeroGasLimit(&'static str),
    #[error("Invalid log level: '{0}'")]
    InvalidLogLevel(String),
    #[error("{0} (strict validation)")]
    Strict(String),
}

pub struct ConfigValidator {
    strict_mode: bool,
}

impl ConfigValidator {
    pub fn new(strict_mode: bool) -> Self {
        Self { strict_mode }
    }

    /// Validate `config`, returning the warnings that did not stop it.
    ///
    /// In strict mode the first warning is returned as an error instead.
    pub fn validate(&self, config: &HarnessConfig) -> Result<Vec<String>, ConfigValidationError> {
        let mut warnings = Vec::new();

        let url = Url::parse(&config.network.rpc_url)
            .map_err(|_| ConfigValidationError::InvalidRpcUrl(config.network.rpc_url.clone()))?;
        match url.scheme() {
            "https" => {}
            "http" => warnings.push(format!(
                "RPC URL {} is not using TLS",
                config.network.rpc_url
            )),
            _ => {
                return Err(ConfigValidationError::InvalidRpcUrl(
                    config.network.rpc_url.clone(),
                ))
            }
        }

        let timing = &config.timing;
        for (field, value) in [
            ("request_timeout_secs", timing.request_timeout_secs),
            ("connection_timeout_secs", timing.connection_timeout_secs),
            ("confirmation_timeout_secs", timing.confirmation_timeout_secs),
        ] {
            check_range(field, value, defaults::MIN_TIMEOUT_SECS, defaults::MAX_TIMEOUT_SECS)?;
        }
        check_range(
            "receipt_poll_interval_ms",
            timing.receipt_poll_interval_ms,
            defaults::MIN_POLL_INTERVAL_MS,
            defaults::MAX_POLL_INTERVAL_MS,
        )?;
        check_range("settle_delay_ms", timing.settle_delay_ms, 0, defaults::MAX_SETTLE_DELAY_MS)?;
        check_range(
            "funding_settle_delay_ms",
            timing.funding_settle_delay_ms,
            0,
            defaults::MAX_SETTLE_DELAY_MS,
        )?;
        if timing.settle_delay_ms == 0 {
            warnings.push("settle_delay_ms is zero, probes may read stale indices".to_string());
        }

        let test = &config.test;
        for (field, name) in [
            ("agent_name", &test.agent_name),
            ("duplicate_agent_name", &test.duplicate_agent_name),
        ] {
            calldata::string_slot(field, name)
                .map_err(|source| ConfigValidationError::Unencodable { field, source })?;
        }
        for capability in &test.capabilities {
            calldata::string_slot("capability", capability).map_err(|source| {
                ConfigValidationError::Unencodable {
                    field: "capabilities",
                    source,
                }
            })?;
        }
        if test.agent_name.is_empty() {
            warnings.push("agent_name is empty".to_string());
        }
        if test.agent_funding_wei == 0 {
            warnings.push("agent_funding_wei is zero, the agent cannot pay for gas".to_string());
        }

        let precompiles = &config.precompiles;
        let named = [
            ("verify_inference", precompiles.verify_inference),
            ("agent_register", precompiles.agent_register),
            ("agent_heartbeat", precompiles.agent_heartbeat),
            ("claim_reward", precompiles.claim_reward),
            ("reward_pool", config.reward_pool),
        ];
        for (i, (first, a)) in named.iter().enumerate() {
            for (second, b) in &named[i + 1..] {
                if a == b {
                    return Err(ConfigValidationError::DuplicateAddress {
                        address: *a,
                        first: *first,
                        second: *second,
                    });
                }
            }
        }

        let gas = &config.gas;
        for (field, limit) in [
            ("register", gas.register),
            ("heartbeat", gas.heartbeat),
            ("verify_inference", gas.verify_inference),
            ("claim_reward", gas.claim_reward),
            ("transfer", gas.transfer),
        ] {
            if limit == 0 {
                return Err(ConfigValidationError::ZeroGasLimit(field));
            }
        }

        if config.logging.level.parse::<log::LevelFilter>().is_err() {
            return Err(ConfigValidationError::InvalidLogLevel(
                config.logging.level.clone(),
            ));
        }

        if self.strict_mode {
            if let Some(first) = warnings.into_iter().next() {
                return Err(ConfigValidationError::Strict(first));
            }
            return Ok(Vec::new());
        }

        for warning in &warnings {
            warn!("Configuration warning: {}", warning);
        }
        Ok(warnings)
    }
}

fn check_range(field: &'static str, value: u64, min: u64, max: u64) -> Result<(), ConfigValidationError> {
    if value < min || value > max {
        return Err(ConfigValidationError::OutOfRange {
            field,
            value,
            min,
            max,
        });
    }
    Ok(())
}

impl HarnessConfig {
    pub fn to_rpc_client_config(&self) -> RpcClientConfig {
        RpcClientConfig {
            request_timeout: Duration::from_secs(self.timing.request_timeout_secs),
            connection_timeout: Duration::from_secs(self.timing.connection_timeout_secs),
            confirmation_timeout: Duration::from_secs(self.timing.confirmation_timeout_secs),
            poll_interval: Duration::from_millis(self.timing.receipt_poll_interval_ms),
        }
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.timing.settle_delay_ms)
    }

    pub fn funding_settle_delay(&self) -> Duration {
        Duration::from_millis(self.timing.funding_settle_delay_ms)
    }

    pub fn log_level(&self) -> log::LevelFilter {
        self.logging.level.parse().unwrap_or(log::LevelFilter::Info)
    }

    /// Key of the funding identity: the configured one, or the environment
    pub fn deployer_key(&self) -> Option<SecretKey> {
        self.deployer_private_key.clone().or_else(|| {
            std::env::var(DEPLOYER_KEY_ENV)
                .ok()
                .filter(|k| !k.trim().is_empty())
                .map(SecretKey::new)
        })
    }

    /// Load configuration from a JSON file.
    ///
    /// Only parses; validation is left to the caller once logging is up.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(|e| {
            anyhow!(
                "Failed to read config file '{}': {}",
                path.as_ref().display(),
                e
            )
        })?;

        let config: HarnessConfig = serde_json::from_str(&content).map_err(|e| {
            anyhow!(
                "Failed to parse config file '{}': {}",
                path.as_ref().display(),
                e
            )
        })?;

        Ok(config)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| anyhow!("Failed to serialize config: {}", e))?;

        std::fs::write(&path, content).map_err(|e| {
            anyhow!(
                "Failed to write config file '{}': {}",
                path.as_ref().display(),
                e
            )
        })?;

        info!("Configuration saved to: {}", path.as_ref().display());
        Ok(())
    }

    /// Write the default configuration as a template
    pub fn generate_template<P: AsRef<Path>>(path: P) -> Result<()> {
        HarnessConfig::default().save_to_file(path)
    }
}
