//! JSON-RPC transport for a ledger node.
//!
//! `NodeAccountSigner` relies on the node managing the account key (hardhat or
//! anvil dev nodes, or a node with an unlocked account), so no private key
//! material ever enters this process.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};
use tracing::{debug, warn};
use url::Url;

use crate::abi::Word;
use crate::relayer::TypedData;
use crate::types::{Address, TxHash};

use super::{ChainError, ChainReader, LogEntry, TransactionSigner, TxReceipt};

const LOG_TARGET: &str = "chain::rpc";
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);
const DEFAULT_RECEIPT_TIMEOUT: Duration = Duration::from_secs(120);

pub struct JsonRpcClient {
    url: Url,
    http: reqwest::Client,
    next_id: AtomicU64,
}

#[derive(Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorObject>,
}

#[derive(Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
    data: Option<JsonValue>,
}

impl RpcErrorObject {
    /// Nodes disagree on where revert bytes live: geth puts a hex string in
    /// `data`, hardhat nests it one level deeper.
    fn revert_data(&self) -> Option<Vec<u8>> {
        let raw = match self.data.as_ref()? {
            JsonValue::String(raw) => raw.as_str(),
            JsonValue::Object(map) => map.get("data")?.as_str()?,
            _ => return None,
        };
        decode_hex(raw).ok()
    }
}

impl JsonRpcClient {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            http: reqwest::Client::new(),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub async fn request<T: DeserializeOwned>(
        &self,
        method: &str,
        params: JsonValue,
    ) -> Result<Option<T>, ChainError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": params });
        debug!(target = LOG_TARGET, id, method, "rpc request");

        let response = self
            .http
            .post(self.url.clone())
            .json(&body)
            .send()
            .await
            .map_err(|err| ChainError::Transport(err.to_string()))?;
        let parsed: RpcResponse<T> = response
            .json()
            .await
            .map_err(|err| ChainError::InvalidResponse(err.to_string()))?;

        if let Some(error) = parsed.error {
            if let Some(data) = error.revert_data() {
                return Err(ChainError::Reverted { data });
            }
            return Err(ChainError::Rpc {
                code: error.code,
                message: error.message,
            });
        }
        Ok(parsed.result)
    }

    async fn request_required<T: DeserializeOwned>(
        &self,
        method: &str,
        params: JsonValue,
    ) -> Result<T, ChainError> {
        self.request(method, params)
            .await?
            .ok_or_else(|| ChainError::InvalidResponse(format!("{method} returned null")))
    }
}

fn decode_hex(raw: &str) -> Result<Vec<u8>, ChainError> {
    let trimmed = raw.strip_prefix("0x").unwrap_or(raw);
    hex::decode(trimmed).map_err(|err| ChainError::InvalidResponse(format!("bad hex: {err}")))
}

fn parse_quantity(raw: &str) -> Result<u64, ChainError> {
    let trimmed = raw.strip_prefix("0x").unwrap_or(raw);
    u64::from_str_radix(trimmed, 16)
        .map_err(|err| ChainError::InvalidResponse(format!("bad quantity {raw}: {err}")))
}

fn encode_hex(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

/// `eth_call` based reader.
pub struct RpcChainReader {
    client: Arc<JsonRpcClient>,
}

impl RpcChainReader {
    pub fn new(client: Arc<JsonRpcClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ChainReader for RpcChainReader {
    async fn call(&self, to: Address, data: Vec<u8>) -> Result<Vec<u8>, ChainError> {
        let raw: String = self
            .client
            .request_required(
                "eth_call",
                json!([{ "to": to.to_string(), "data": encode_hex(&data) }, "latest"]),
            )
            .await?;
        decode_hex(&raw)
    }

    async fn chain_id(&self) -> Result<u64, ChainError> {
        let raw: String = self.client.request_required("eth_chainId", json!([])).await?;
        parse_quantity(&raw)
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcReceipt {
    transaction_hash: String,
    block_number: String,
    status: Option<String>,
    #[serde(default)]
    logs: Vec<RpcLog>,
}

#[derive(Deserialize)]
struct RpcLog {
    address: String,
    topics: Vec<String>,
    data: String,
}

impl RpcReceipt {
    fn into_receipt(self) -> Result<TxReceipt, ChainError> {
        let logs = self
            .logs
            .into_iter()
            .map(RpcLog::into_entry)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(TxReceipt {
            tx_hash: parse_fixed(&self.transaction_hash)?,
            block_number: parse_quantity(&self.block_number)?,
            // Pre-byzantium receipts carry no status; treat them as success.
            success: match self.status {
                Some(status) => parse_quantity(&status)? == 1,
                None => true,
            },
            logs,
        })
    }
}

impl RpcLog {
    fn into_entry(self) -> Result<LogEntry, ChainError> {
        let topics = self
            .topics
            .iter()
            .map(|topic| {
                let bytes = decode_hex(topic)?;
                Word::try_from(bytes.as_slice())
                    .map_err(|_| ChainError::InvalidResponse(format!("bad topic {topic}")))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(LogEntry {
            address: parse_fixed(&self.address)?,
            topics,
            data: decode_hex(&self.data)?,
        })
    }
}

fn parse_fixed<T>(raw: &str) -> Result<T, ChainError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse()
        .map_err(|err: T::Err| ChainError::InvalidResponse(format!("{raw}: {err}")))
}

/// Signer for an account whose key is held by the node itself.
pub struct NodeAccountSigner {
    client: Arc<JsonRpcClient>,
    address: Address,
    poll_interval: Duration,
    receipt_timeout: Duration,
}

impl NodeAccountSigner {
    pub fn new(client: Arc<JsonRpcClient>, address: Address) -> Self {
        Self {
            client,
            address,
            poll_interval: DEFAULT_POLL_INTERVAL,
            receipt_timeout: DEFAULT_RECEIPT_TIMEOUT,
        }
    }

    /// Uses the first account the node manages.
    pub async fn first_account(client: Arc<JsonRpcClient>) -> Result<Self, ChainError> {
        let accounts: Vec<String> = client.request_required("eth_accounts", json!([])).await?;
        let first = accounts
            .first()
            .ok_or_else(|| ChainError::InvalidResponse("node manages no accounts".into()))?;
        Ok(Self::new(client, parse_fixed(first)?))
    }

    pub fn with_receipt_timeout(mut self, timeout: Duration) -> Self {
        self.receipt_timeout = timeout;
        self
    }
}

#[async_trait]
impl TransactionSigner for NodeAccountSigner {
    fn address(&self) -> Address {
        self.address
    }

    async fn send_transaction(&self, to: Address, data: Vec<u8>) -> Result<TxHash, ChainError> {
        let raw: String = self
            .client
            .request_required(
                "eth_sendTransaction",
                json!([{
                    "from": self.address.to_string(),
                    "to": to.to_string(),
                    "data": encode_hex(&data),
                }]),
            )
            .await?;
        parse_fixed(&raw)
    }

    async fn wait_for_receipt(&self, tx_hash: TxHash) -> Result<TxReceipt, ChainError> {
        let deadline = tokio::time::Instant::now() + self.receipt_timeout;
        loop {
            let receipt: Option<RpcReceipt> = self
                .client
                .request("eth_getTransactionReceipt", json!([tx_hash.to_string()]))
                .await?;
            if let Some(receipt) = receipt {
                return receipt.into_receipt();
            }
            if tokio::time::Instant::now() >= deadline {
                warn!(target = LOG_TARGET, %tx_hash, "gave up waiting for receipt");
                return Err(ChainError::ReceiptUnavailable(tx_hash));
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    async fn sign_typed_data(&self, typed: &TypedData) -> Result<String, ChainError> {
        let payload = serde_json::to_string(&typed.to_json())
            .map_err(|err| ChainError::Signing(err.to_string()))?;
        self.client
            .request_required(
                "eth_signTypedData_v4",
                json!([self.address.to_string(), payload]),
            )
            .await
            .map_err(|err| match err {
                ChainError::Rpc { message, .. } => ChainError::Signing(message),
                other => other,
            })
    }
}
