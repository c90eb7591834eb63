//! Best-effort introspection of agent state through node specific RPC methods.
//!
//! These methods are optional protocol surface. A probe that cannot be
//! answered yields [`Probe::Unavailable`], which is deliberately distinct
//! from an observed `false` or an empty record.

use alloy::primitives::Address;
use log::debug;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::chain::ChainClient;

pub const METHOD_IS_AGENT: &str = "agent_isAgentAccount";
pub const METHOD_AGENT_META: &str = "agent_getAgentMeta";
pub const METHOD_AGENT_STATUS: &str = "agent_getStatus";

/// Outcome of an optional query
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Probe<T> {
    Observed(T),
    Unavailable,
}

impl<T> Probe<T> {
    pub fn observed(&self) -> Option<&T> {
        match self {
            Self::Observed(v) => Some(v),
            Self::Unavailable => None,
        }
    }

    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Probe<U> {
        match self {
            Self::Observed(v) => Probe::Observed(f(v)),
            Self::Unavailable => Probe::Unavailable,
        }
    }
}

/// Agent metadata as reported by `agent_getAgentMeta`
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentMeta {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub model_hash: Option<String>,
    #[serde(default)]
    total_inferences: Option<Value>,
}

impl AgentMeta {
    /// Cumulative inference count, accepting both JSON numbers and hex quantities
    pub fn total_inferences(&self) -> Option<u64> {
        self.total_inferences.as_ref().and_then(value_as_u64)
    }
}

/// Liveness record as reported by `agent_getStatus`
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentStatus {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    last_heartbeat: Option<Value>,
}

impl AgentStatus {
    pub fn is_active(&self) -> bool {
        self.status.as_deref() == Some("active")
    }

    pub fn last_heartbeat(&self) -> Option<u64> {
        self.last_heartbeat.as_ref().and_then(value_as_u64)
    }
}

fn value_as_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => match s.strip_prefix("0x") {
            Some(hex) => u64::from_str_radix(hex, 16).ok(),
            None => s.parse().ok(),
        },
        _ => None,
    }
}

/// `true` or `"true"` is an agent, `false` or `"false"` is not, anything else
/// cannot be interpreted
pub fn parse_is_agent(value: &Value) -> Probe<bool> {
    match value {
        Value::Bool(b) => Probe::Observed(*b),
        Value::String(s) if s == "true" => Probe::Observed(true),
        Value::String(s) if s == "false" => Probe::Observed(false),
        other => {
            debug!("Unrecognized {} result: {}", METHOD_IS_AGENT, other);
            Probe::Unavailable
        }
    }
}

fn parse_record<T: for<'de> Deserialize<'de>>(method: &str, value: Value) -> Probe<T> {
    match serde_json::from_value(value) {
        Ok(record) => Probe::Observed(record),
        Err(e) => {
            debug!("Unrecognized {} result: {}", method, e);
            Probe::Unavailable
        }
    }
}

pub async fn is_agent<C: ChainClient + ?Sized>(client: &C, address: Address) -> Probe<bool> {
    match client.call_status_method(METHOD_IS_AGENT, json!([address])).await {
        Some(value) => parse_is_agent(&value),
        None => Probe::Unavailable,
    }
}

pub async fn agent_meta<C: ChainClient + ?Sized>(client: &C, address: Address) -> Probe<AgentMeta> {
    match client.call_status_method(METHOD_AGENT_META, json!([address])).await {
        Some(value) => parse_record(METHOD_AGENT_META, value),
        None => Probe::Unavailable,
    }
}

pub async fn agent_status<C: ChainClient + ?Sized>(
    client: &C,
    address: Address,
) -> Probe<AgentStatus> {
    match client
        .call_status_method(METHOD_AGENT_STATUS, json!([address]))
        .await
    {
        Some(value) => parse_record(METHOD_AGENT_STATUS, value),
        None => Probe::Unavailable,
    }
}
