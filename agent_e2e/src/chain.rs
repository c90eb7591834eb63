use std::fmt;
use std::time::Duration;

use alloy::{
    consensus::{SignableTransaction, TxEnvelope, TxLegacy},
    eips::eip2718::Encodable2718,
    network::TxSignerSync,
    primitives::{Address, Bytes, TxKind, B256, U256, U64},
    signers::local::PrivateKeySigner,
};
use async_trait::async_trait;
use log::{debug, trace, warn};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use thiserror::Error;
use tokio::time::{sleep, Instant};
use url::Url;

use crate::calldata::CallEnvelope;

/// Failures of the chain client.
///
/// `Refused` is the node declining a signed transaction at submission and is
/// the only variant that says something about the protocol. An `Rpc` error
/// from any other method (nonce, gas price, receipt polling) is node trouble
/// like the transport variants.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChainError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("transaction {tx_hash} was not confirmed within {waited:?}")]
    ConfirmationTimeout { tx_hash: B256, waited: Duration },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("transaction refused ({code}): {message}")]
    Refused { code: i64, message: String },
    #[error("signing failed: {0}")]
    Signing(String),
    #[error("malformed response to {method}: {reason}")]
    MalformedResponse { method: String, reason: String },
}

impl ChainError {
    /// The node answered the submission and refused the transaction
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::Refused { .. })
    }

    fn malformed(method: &str, reason: impl fmt::Display) -> Self {
        Self::MalformedResponse {
            method: method.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// A transaction to submit: target, payload, attached value and gas ceiling
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallRequest {
    pub to: Address,
    pub data: Bytes,
    pub value: U256,
    pub gas_limit: u64,
}

impl CallRequest {
    /// A precompile call carrying `envelope` and no value
    pub fn call(to: Address, envelope: &CallEnvelope, gas_limit: u64) -> Self {
        Self {
            to,
            data: envelope.to_bytes(),
            value: U256::ZERO,
            gas_limit,
        }
    }

    /// A plain value transfer
    pub fn transfer(to: Address, value: U256, gas_limit: u64) -> Self {
        Self {
            to,
            data: Bytes::new(),
            value,
            gas_limit,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxStatus {
    Success,
    Failure,
}

/// Normalized result of a mined transaction
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionOutcome {
    pub tx_hash: B256,
    pub status: TxStatus,
    pub block_number: Option<u64>,
    pub gas_used: Option<u64>,
    /// Receipt exactly as returned by the node
    pub receipt: Value,
}

impl TransactionOutcome {
    /// Build an outcome from a raw receipt.
    ///
    /// Only an explicit `status` of one counts as success; a receipt without
    /// a status field is treated as a failure.
    pub fn from_receipt(tx_hash: B256, receipt: Value) -> Result<Self, ChainError> {
        const METHOD: &str = "eth_getTransactionReceipt";

        if !receipt.is_object() {
            return Err(ChainError::malformed(METHOD, "receipt is not an object"));
        }

        let status = match optional_quantity(METHOD, receipt.get("status"))? {
            Some(1) => TxStatus::Success,
            _ => TxStatus::Failure,
        };
        let block_number = optional_quantity(METHOD, receipt.get("blockNumber"))?;
        let gas_used = optional_quantity(METHOD, receipt.get("gasUsed"))?;

        Ok(Self {
            tx_hash,
            status,
            block_number,
            gas_used,
            receipt,
        })
    }

    pub fn succeeded(&self) -> bool {
        self.status == TxStatus::Success
    }
}

fn parse_quantity(method: &str, value: &Value) -> Result<u64, ChainError> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .ok_or_else(|| ChainError::malformed(method, format!("{} is not a u64", n))),
        _ => serde_json::from_value::<U64>(value.clone())
            .map(|q| q.to::<u64>())
            .map_err(|e| ChainError::malformed(method, e)),
    }
}

fn optional_quantity(method: &str, value: Option<&Value>) -> Result<Option<u64>, ChainError> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(v) => parse_quantity(method, v).map(Some),
    }
}

/// Network access used by the harness.
///
/// Mandatory operations propagate every failure. `call_status_method` is
/// best effort: it never fails and reports anything but a non-null result
/// as unavailable.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Sign `request` with `signer`, send it and block until it is mined
    async fn submit_and_confirm(
        &self,
        signer: &PrivateKeySigner,
        request: CallRequest,
    ) -> Result<TransactionOutcome, ChainError>;

    async fn read_balance(&self, address: Address) -> Result<U256, ChainError>;

    /// Invoke a node specific informational method
    async fn call_status_method(&self, method: &str, params: Value) -> Option<Value>;

    async fn chain_id(&self) -> Result<u64, ChainError>;

    async fn block_number(&self) -> Result<u64, ChainError>;
}

/// Timeouts of the JSON-RPC client
#[derive(Debug, Clone)]
pub struct RpcClientConfig {
    pub request_timeout: Duration,
    pub connection_timeout: Duration,
    pub confirmation_timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for RpcClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            connection_timeout: Duration::from_secs(10),
            confirmation_timeout: Duration::from_secs(60),
            poll_interval: Duration::from_millis(1000),
        }
    }
}

#[derive(Debug, serde::Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    id: u32,
    method: &'a str,
    params: Value,
}

#[derive(Debug, serde::Deserialize)]
struct JsonRpcResponse {
    result: Option<Value>,
    error: Option<JsonRpcError>,
}

#[derive(Debug, serde::Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

/// JSON-RPC client for a single EVM-compatible endpoint.
///
/// Transactions are signed locally as EIP-155 legacy transactions and
/// confirmed by polling for their receipt.
pub struct RpcChainClient {
    client: Client,
    url: Url,
    chain_id: u64,
    config: RpcClientConfig,
}

impl RpcChainClient {
    pub fn new(rpc_url: &str, chain_id: u64, config: RpcClientConfig) -> Result<Self, ChainError> {
        let url = if rpc_url.starts_with("http://") || rpc_url.starts_with("https://") {
            Url::parse(rpc_url)
        } else {
            Url::parse(&format!("http://{}", rpc_url))
        }
        .map_err(|e| ChainError::Transport(format!("invalid RPC URL '{}': {}", rpc_url, e)))?;

        let client = Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.connection_timeout)
            .build()
            .map_err(|e| ChainError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            url,
            chain_id,
            config,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Send one JSON-RPC request and return its `result`, `null` included
    async fn request_value(&self, method: &str, params: Value) -> Result<Value, ChainError> {
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            id: rand::random::<u32>(),
            method,
            params,
        };
        trace!("JSON-RPC request to {}: {}", self.url, method);

        let response = self
            .client
            .post(self.url.clone())
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ChainError::Timeout(self.config.request_timeout)
                } else if e.is_connect() {
                    ChainError::Transport(format!("connection failed: {}", e))
                } else {
                    ChainError::Transport(format!("network error: {}", e))
                }
            })?;

        if !response.status().is_success() {
            return Err(ChainError::Transport(format!(
                "HTTP error {}: {}",
                response.status().as_u16(),
                response.status().canonical_reason().unwrap_or("Unknown error")
            )));
        }

        let rpc_response: JsonRpcResponse = response
            .json()
            .await
            .map_err(|e| ChainError::malformed(method, e))?;

        if let Some(error) = rpc_response.error {
            return Err(ChainError::Rpc {
                code: error.code,
                message: error.message,
            });
        }

        Ok(rpc_response.result.unwrap_or(Value::Null))
    }

    async fn request<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, ChainError> {
        let value = self.request_value(method, params).await?;
        serde_json::from_value(value).map_err(|e| ChainError::malformed(method, e))
    }

    async fn request_quantity(&self, method: &str, params: Value) -> Result<u64, ChainError> {
        let value = self.request_value(method, params).await?;
        parse_quantity(method, &value)
    }

    async fn pending_nonce(&self, address: Address) -> Result<u64, ChainError> {
        self.request_quantity("eth_getTransactionCount", json!([address, "pending"]))
            .await
    }

    async fn gas_price(&self) -> Result<u128, ChainError> {
        let price: U256 = self.request("eth_gasPrice", json!([])).await?;
        price
            .try_into()
            .map_err(|_| ChainError::malformed("eth_gasPrice", "gas price exceeds u128"))
    }

    async fn wait_for_receipt(&self, tx_hash: B256) -> Result<Value, ChainError> {
        let started = Instant::now();
        loop {
            let receipt = self
                .request_value("eth_getTransactionReceipt", json!([tx_hash]))
                .await?;
            if !receipt.is_null() {
                return Ok(receipt);
            }

            let waited = started.elapsed();
            if waited >= self.config.confirmation_timeout {
                return Err(ChainError::ConfirmationTimeout { tx_hash, waited });
            }
            sleep(self.config.poll_interval).await;
        }
    }
}

#[async_trait]
impl ChainClient for RpcChainClient {
    async fn submit_and_confirm(
        &self,
        signer: &PrivateKeySigner,
        request: CallRequest,
    ) -> Result<TransactionOutcome, ChainError> {
        let from = signer.address();
        let nonce = self.pending_nonce(from).await?;
        let gas_price = self.gas_price().await?;

        let mut tx = TxLegacy {
            chain_id: Some(self.chain_id),
            nonce,
            gas_price,
            gas_limit: request.gas_limit,
            to: TxKind::Call(request.to),
            value: request.value,
            input: request.data,
        };
        let signature = signer
            .sign_transaction_sync(&mut tx)
            .map_err(|e| ChainError::Signing(e.to_string()))?;
        let signed = tx.into_signed(signature);
        let tx_hash = *signed.hash();
        let raw = TxEnvelope::from(signed).encoded_2718();

        debug!(
            "Submitting tx {} from {} (nonce {}, gas limit {})",
            tx_hash, from, nonce, request.gas_limit
        );
        let accepted: B256 = self
            .request("eth_sendRawTransaction", json!([format!("0x{}", hex::encode(&raw))]))
            .await
            .map_err(|e| match e {
                ChainError::Rpc { code, message } => ChainError::Refused { code, message },
                other => other,
            })?;
        if accepted != tx_hash {
            warn!("Node reported tx hash {} for locally computed {}", accepted, tx_hash);
        }

        let receipt = self.wait_for_receipt(tx_hash).await?;
        TransactionOutcome::from_receipt(tx_hash, receipt)
    }

    async fn read_balance(&self, address: Address) -> Result<U256, ChainError> {
        self.request("eth_getBalance", json!([address, "latest"]))
            .await
    }

    async fn call_status_method(&self, method: &str, params: Value) -> Option<Value> {
        match self.request_value(method, params).await {
            Ok(Value::Null) => {
                debug!("{} returned null", method);
                None
            }
            Ok(value) => Some(value),
            Err(e) => {
                debug!("{} unavailable: {}", method, e);
                None
            }
        }
    }

    async fn chain_id(&self) -> Result<u64, ChainError> {
        self.request_quantity("eth_chainId", json!([])).await
    }

    async fn block_number(&self) -> Result<u64, ChainError> {
        self.request_quantity("eth_blockNumber", json!([])).await
    }
}

impl fmt::Debug for RpcChainClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RpcChainClient")
            .field("url", &self.url)
            .field("chain_id", &self.chain_id)
            .finish()
    }
}
