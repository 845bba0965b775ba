//! Seam to the confidential-compute relayer.
//!
//! The relayer owns key management and threshold decryption; this crate only
//! needs the four operations below. [`crate::devnet::DevRelayer`] provides an
//! in-process implementation backed by the dev network's plaintext table.

pub mod eip712;

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::types::{Address, Handle};

pub use eip712::{Eip712Domain, TypedData, UserDecryptRequestVerification};

pub type DecryptedValues = HashMap<Handle, String>;

/// Ephemeral keypair used to re-encrypt user-decryption results.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Keypair {
    pub public_key: String,
    pub private_key: String,
}

impl std::fmt::Debug for Keypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Keypair")
            .field("public_key", &self.public_key)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandleContractPair {
    pub handle: Handle,
    pub contract_address: Address,
}

#[derive(Debug, Clone)]
pub struct UserDecryptRequest {
    pub pairs: Vec<HandleContractPair>,
    pub keypair: Keypair,
    /// Wallet signature over the EIP-712 payload, hex without `0x`.
    pub signature: String,
    pub contract_addresses: Vec<Address>,
    pub user_address: Address,
    pub start_timestamp: u64,
    pub duration_days: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RelayerError {
    #[error("handle {0} is not publicly decryptable")]
    NotPubliclyDecryptable(Handle),
    #[error("{user} is not allowed to decrypt {handle}")]
    NotAuthorized { user: Address, handle: Handle },
    #[error("contract {0} is not covered by the signed request")]
    ContractNotAuthorized(Address),
    #[error("invalid user decryption signature")]
    InvalidSignature,
    #[error("user decryption request is outside its validity window")]
    RequestExpired,
    #[error("unknown handle {0}")]
    UnknownHandle(Handle),
    #[error("empty decryption request")]
    EmptyRequest,
    #[error("relayer unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait DecryptClient: Send + Sync {
    /// Decrypts a batch of publicly decryptable handles in one round trip.
    async fn public_decrypt(&self, handles: &[Handle]) -> Result<DecryptedValues, RelayerError>;

    fn generate_keypair(&self) -> Keypair;

    fn create_eip712(
        &self,
        public_key: &str,
        contract_addresses: &[Address],
        start_timestamp: u64,
        duration_days: u64,
    ) -> TypedData;

    async fn user_decrypt(
        &self,
        request: UserDecryptRequest,
    ) -> Result<DecryptedValues, RelayerError>;
}
