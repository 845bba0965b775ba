pub mod contract;
pub mod rpc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::abi::Word;
use crate::relayer::TypedData;
use crate::types::{Address, TxHash};

pub use contract::{ContractError, ShadowContract};
pub use rpc::{JsonRpcClient, NodeAccountSigner, RpcChainReader};

#[derive(Debug, Clone, Error)]
pub enum ChainError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("execution reverted")]
    Reverted { data: Vec<u8> },
    #[error("transaction {0} was not confirmed")]
    ReceiptUnavailable(TxHash),
    #[error("invalid node response: {0}")]
    InvalidResponse(String),
    #[error("signing rejected: {0}")]
    Signing(String),
}

/// Log entry attached to a transaction receipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub address: Address,
    pub topics: Vec<Word>,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxReceipt {
    pub tx_hash: TxHash,
    pub block_number: u64,
    pub success: bool,
    pub logs: Vec<LogEntry>,
}

/// Read-only access to a ledger node.
#[async_trait]
pub trait ChainReader: Send + Sync {
    /// Executes a view call against `to` and returns the raw return data.
    async fn call(&self, to: Address, data: Vec<u8>) -> Result<Vec<u8>, ChainError>;

    async fn chain_id(&self) -> Result<u64, ChainError>;
}

/// A wallet account able to send transactions and sign typed data.
#[async_trait]
pub trait TransactionSigner: Send + Sync {
    fn address(&self) -> Address;

    async fn send_transaction(&self, to: Address, data: Vec<u8>) -> Result<TxHash, ChainError>;

    /// Blocks until the transaction is included and returns its receipt.
    async fn wait_for_receipt(&self, tx_hash: TxHash) -> Result<TxReceipt, ChainError>;

    /// Signs an EIP-712 payload; returns the `0x`-prefixed signature.
    async fn sign_typed_data(&self, typed: &TypedData) -> Result<String, ChainError>;
}
