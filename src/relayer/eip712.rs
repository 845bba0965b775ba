//! EIP-712 payload authorizing a user decryption.
//!
//! The relayer only releases a private value when the requester signs a
//! `UserDecryptRequestVerification` struct that binds an ephemeral public key,
//! the contracts whose ciphertexts may be read, and a validity window.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};

use crate::abi::{address_word, keccak256, uint_word, Word};
use crate::types::Address;

const DOMAIN_TYPE: &str =
    "EIP712Domain(string name,string version,uint256 chainId,address verifyingContract)";
const REQUEST_TYPE: &str = "UserDecryptRequestVerification(bytes publicKey,address[] contractAddresses,uint256 startTimestamp,uint256 durationDays)";

pub const DOMAIN_NAME: &str = "Decryption";
pub const DOMAIN_VERSION: &str = "1";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Eip712Domain {
    pub name: String,
    pub version: String,
    pub chain_id: u64,
    pub verifying_contract: Address,
}

impl Eip712Domain {
    pub fn decryption(chain_id: u64, verifying_contract: Address) -> Self {
        Self {
            name: DOMAIN_NAME.to_string(),
            version: DOMAIN_VERSION.to_string(),
            chain_id,
            verifying_contract,
        }
    }

    pub fn separator(&self) -> Word {
        let mut encoded = Vec::with_capacity(5 * 32);
        encoded.extend_from_slice(&keccak256(DOMAIN_TYPE));
        encoded.extend_from_slice(&keccak256(self.name.as_bytes()));
        encoded.extend_from_slice(&keccak256(self.version.as_bytes()));
        encoded.extend_from_slice(&uint_word(self.chain_id));
        encoded.extend_from_slice(&address_word(&self.verifying_contract));
        keccak256(encoded)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserDecryptRequestVerification {
    /// Ephemeral public key, hex encoded without `0x`.
    pub public_key: String,
    pub contract_addresses: Vec<Address>,
    pub start_timestamp: u64,
    pub duration_days: u64,
}

impl UserDecryptRequestVerification {
    fn public_key_bytes(&self) -> Vec<u8> {
        let trimmed = self.public_key.trim_start_matches("0x");
        // Keys are produced by the decrypt client as hex; anything else is
        // hashed as raw text so the digest still binds the exact value.
        hex::decode(trimmed).unwrap_or_else(|_| self.public_key.as_bytes().to_vec())
    }

    pub fn struct_hash(&self) -> Word {
        let addresses: Vec<u8> = self
            .contract_addresses
            .iter()
            .flat_map(|address| address_word(address).into_iter())
            .collect();
        let mut encoded = Vec::with_capacity(5 * 32);
        encoded.extend_from_slice(&keccak256(REQUEST_TYPE));
        encoded.extend_from_slice(&keccak256(self.public_key_bytes()));
        encoded.extend_from_slice(&keccak256(addresses));
        encoded.extend_from_slice(&uint_word(self.start_timestamp));
        encoded.extend_from_slice(&uint_word(self.duration_days));
        keccak256(encoded)
    }

    /// Whether `now` (unix seconds) falls inside the signed validity window.
    pub fn is_valid_at(&self, now: u64) -> bool {
        let end = self
            .start_timestamp
            .saturating_add(self.duration_days.saturating_mul(24 * 60 * 60));
        self.start_timestamp <= now && now < end
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypedData {
    pub domain: Eip712Domain,
    pub message: UserDecryptRequestVerification,
}

impl TypedData {
    pub const PRIMARY_TYPE: &'static str = "UserDecryptRequestVerification";

    pub fn user_decrypt(
        domain: Eip712Domain,
        public_key: &str,
        contract_addresses: &[Address],
        start_timestamp: u64,
        duration_days: u64,
    ) -> Self {
        Self {
            domain,
            message: UserDecryptRequestVerification {
                public_key: public_key.trim_start_matches("0x").to_string(),
                contract_addresses: contract_addresses.to_vec(),
                start_timestamp,
                duration_days,
            },
        }
    }

    /// Digest the wallet signs: `keccak256(0x1901 ‖ domainSeparator ‖ structHash)`.
    pub fn signing_hash(&self) -> Word {
        let mut encoded = Vec::with_capacity(2 + 64);
        encoded.extend_from_slice(&[0x19, 0x01]);
        encoded.extend_from_slice(&self.domain.separator());
        encoded.extend_from_slice(&self.message.struct_hash());
        keccak256(encoded)
    }

    /// JSON shape accepted by `eth_signTypedData_v4`.
    pub fn to_json(&self) -> JsonValue {
        json!({
            "types": {
                "EIP712Domain": [
                    { "name": "name", "type": "string" },
                    { "name": "version", "type": "string" },
                    { "name": "chainId", "type": "uint256" },
                    { "name": "verifyingContract", "type": "address" }
                ],
                "UserDecryptRequestVerification": [
                    { "name": "publicKey", "type": "bytes" },
                    { "name": "contractAddresses", "type": "address[]" },
                    { "name": "startTimestamp", "type": "uint256" },
                    { "name": "durationDays", "type": "uint256" }
                ]
            },
            "primaryType": Self::PRIMARY_TYPE,
            "domain": {
                "name": self.domain.name,
                "version": self.domain.version,
                "chainId": self.domain.chain_id,
                "verifyingContract": self.domain.verifying_contract.to_string(),
            },
            "message": {
                "publicKey": format!("0x{}", self.message.public_key),
                "contractAddresses": self
                    .message
                    .contract_addresses
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>(),
                "startTimestamp": self.message.start_timestamp.to_string(),
                "durationDays": self.message.duration_days.to_string(),
            }
        })
    }
}
