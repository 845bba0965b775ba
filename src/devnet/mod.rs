//! In-process development network.
//!
//! Simulates the ShadowProtocol contract, the node that executes it and the
//! relayer that holds ciphertext plaintexts. Health values are stored in the
//! clear next to their handles, together with the ACL the real runtime would
//! enforce, so both decryption paths behave like the deployed system.
//!
//! The state is serializable so CLI invocations can share one network through
//! a JSON file.

mod relayer;

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use rand::{rngs::StdRng, Rng, RngCore, SeedableRng};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::abi::{self, keccak256, ContractRevert, ShadowCall, ShadowEvent};
use crate::chain::{ChainError, ChainReader, LogEntry, TransactionSigner, TxReceipt};
use crate::config::ClientConfig;
use crate::relayer::TypedData;
use crate::types::{Address, Handle, PlayerSnapshot, TxHash, Zone, ZoneKind, ZoneRoster};

pub use relayer::DevRelayer;

const LOG_TARGET: &str = "devnet";

pub const DEV_CHAIN_ID: u64 = 31337;
pub const DEV_GATEWAY_CHAIN_ID: u64 = 55815;
pub const PROTOCOL_ID: u64 = 10001;
pub const MIN_HEALTH: u32 = 1;
pub const MAX_HEALTH: u32 = 10;

/// Deterministic account address for a human-readable label.
pub fn dev_account(label: &str) -> Address {
    let hash = keccak256(format!("shadow-devnet/account/{label}"));
    let mut bytes = [0u8; 20];
    bytes.copy_from_slice(&hash[12..]);
    Address::new(bytes)
}

pub fn dev_contract_address() -> Address {
    dev_account("ShadowProtocol")
}

pub fn dev_verifying_contract() -> Address {
    dev_account("DecryptionVerifier")
}

/// Signature scheme of dev accounts: `keccak256(address ‖ eip712 digest)`.
pub fn dev_signature(signer: &Address, typed: &TypedData) -> String {
    let mut preimage = signer.as_bytes().to_vec();
    preimage.extend_from_slice(&typed.signing_hash());
    format!("0x{}", hex::encode(keccak256(preimage)))
}

#[derive(Debug, Error)]
pub enum DevnetError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("state file is not valid json: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Ciphertext {
    value: u32,
    allowed: BTreeSet<Address>,
    publicly_decryptable: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DevState {
    contract: Address,
    block_number: u64,
    tx_count: u64,
    players: BTreeMap<Address, PlayerSnapshot>,
    shadow_players: Vec<Address>,
    public_players: Vec<Address>,
    ciphertexts: BTreeMap<Handle, Ciphertext>,
    receipts: BTreeMap<TxHash, TxReceipt>,
}

impl DevState {
    fn new(contract: Address) -> Self {
        Self {
            contract,
            block_number: 0,
            tx_count: 0,
            players: BTreeMap::new(),
            shadow_players: Vec::new(),
            public_players: Vec::new(),
            ciphertexts: BTreeMap::new(),
            receipts: BTreeMap::new(),
        }
    }

    fn list(&self, zone: ZoneKind) -> &Vec<Address> {
        match zone {
            ZoneKind::Shadow => &self.shadow_players,
            ZoneKind::Public => &self.public_players,
        }
    }

    fn list_mut(&mut self, zone: ZoneKind) -> &mut Vec<Address> {
        match zone {
            ZoneKind::Shadow => &mut self.shadow_players,
            ZoneKind::Public => &mut self.public_players,
        }
    }

    fn roster(&self, zone: ZoneKind) -> ZoneRoster {
        let addresses = self.list(zone).clone();
        let handles = addresses
            .iter()
            .map(|address| {
                self.players
                    .get(address)
                    .map(|player| player.health)
                    .unwrap_or_else(Handle::zero)
            })
            .collect();
        ZoneRoster::new(addresses, handles).unwrap_or_default()
    }

    fn player(&self, address: &Address) -> PlayerSnapshot {
        self.players
            .get(address)
            .copied()
            .unwrap_or_else(PlayerSnapshot::absent)
    }

    fn view(&self, call: ShadowCall) -> Vec<u8> {
        match call {
            ShadowCall::GetPlayer(address) => abi::encode_player(&self.player(&address)),
            ShadowCall::GetShadowPlayers => abi::encode_roster(&self.roster(ZoneKind::Shadow)),
            ShadowCall::GetPublicPlayers => abi::encode_roster(&self.roster(ZoneKind::Public)),
            ShadowCall::CurrentZone(address) => {
                abi::encode_u64(u64::from(self.player(&address).zone.as_u8()))
            }
            ShadowCall::TotalShadowPlayers => abi::encode_u64(self.shadow_players.len() as u64),
            ShadowCall::TotalPublicPlayers => abi::encode_u64(self.public_players.len() as u64),
            ShadowCall::ProtocolId => abi::encode_u64(PROTOCOL_ID),
            ShadowCall::JoinShadow | ShadowCall::JoinPublic => Vec::new(),
        }
    }

    /// Applies a join, minting a fresh ciphertext for the player's health.
    fn join(
        &mut self,
        from: Address,
        target: ZoneKind,
        rng: &mut StdRng,
    ) -> Result<ShadowEvent, ContractRevert> {
        let previous = self.player(&from).zone;
        if previous == target.zone() {
            return Err(ContractRevert::AlreadyInZone(previous));
        }
        if let Some(kind) = previous.kind() {
            self.list_mut(kind).retain(|address| *address != from);
        }
        self.list_mut(target).push(from);

        let mut salt = [0u8; 32];
        rng.fill_bytes(&mut salt);
        let mut preimage = self.contract.as_bytes().to_vec();
        preimage.extend_from_slice(from.as_bytes());
        preimage.extend_from_slice(&self.tx_count.to_be_bytes());
        preimage.extend_from_slice(&salt);
        let handle = Handle::new(keccak256(preimage));

        let publicly_decryptable = target == ZoneKind::Public;
        self.ciphertexts.insert(
            handle,
            Ciphertext {
                value: rng.gen_range(MIN_HEALTH..=MAX_HEALTH),
                allowed: BTreeSet::from([from, self.contract]),
                publicly_decryptable,
            },
        );
        self.players.insert(
            from,
            PlayerSnapshot {
                exists: true,
                zone: target.zone(),
                health: handle,
                publicly_decryptable,
            },
        );

        Ok(match previous {
            Zone::None => ShadowEvent::PlayerJoined {
                player: from,
                zone: target.zone(),
            },
            previous_zone => ShadowEvent::PlayerZoneUpdated {
                player: from,
                previous_zone,
                new_zone: target.zone(),
            },
        })
    }

    fn record_receipt(&mut self, from: Address, events: Vec<ShadowEvent>) -> TxHash {
        self.tx_count += 1;
        self.block_number += 1;
        let mut preimage = from.as_bytes().to_vec();
        preimage.extend_from_slice(&self.tx_count.to_be_bytes());
        let tx_hash = TxHash::new(keccak256(preimage));
        let logs = events
            .iter()
            .map(|event| LogEntry {
                address: self.contract,
                topics: event.topics(),
                data: Vec::new(),
            })
            .collect();
        self.receipts.insert(
            tx_hash,
            TxReceipt {
                tx_hash,
                block_number: self.block_number,
                success: true,
                logs,
            },
        );
        tx_hash
    }
}

/// Handle to a shared dev network; clones observe the same state.
#[derive(Clone)]
pub struct DevNetwork {
    state: Arc<Mutex<DevState>>,
    rng: Arc<Mutex<StdRng>>,
}

impl DevNetwork {
    pub fn new() -> Self {
        Self::from_state(DevState::new(dev_contract_address()), StdRng::from_entropy())
    }

    pub fn with_seed(seed: u64) -> Self {
        Self::from_state(
            DevState::new(dev_contract_address()),
            StdRng::seed_from_u64(seed),
        )
    }

    fn from_state(state: DevState, rng: StdRng) -> Self {
        Self {
            state: Arc::new(Mutex::new(state)),
            rng: Arc::new(Mutex::new(rng)),
        }
    }

    /// Loads a network persisted with [`DevNetwork::save`], or starts a fresh
    /// one when the file does not exist yet.
    pub fn load_or_new(path: &Path) -> Result<Self, DevnetError> {
        if !path.exists() {
            info!(target = LOG_TARGET, path = %path.display(), "starting fresh dev network");
            return Ok(Self::new());
        }
        let raw = std::fs::read_to_string(path)?;
        let state: DevState = serde_json::from_str(&raw)?;
        debug!(
            target = LOG_TARGET,
            path = %path.display(),
            block = state.block_number,
            "loaded dev network state"
        );
        Ok(Self::from_state(state, StdRng::from_entropy()))
    }

    pub fn save(&self, path: &Path) -> Result<(), DevnetError> {
        let raw = serde_json::to_string_pretty(&*self.state.lock())?;
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, raw)?;
        Ok(())
    }

    pub fn contract_address(&self) -> Address {
        self.state.lock().contract
    }

    pub fn block_number(&self) -> u64 {
        self.state.lock().block_number
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig::new(
            self.contract_address(),
            DEV_GATEWAY_CHAIN_ID,
            dev_verifying_contract(),
        )
    }

    pub fn signer(&self, address: Address) -> DevSigner {
        DevSigner {
            network: self.clone(),
            address,
        }
    }

    pub fn relayer(&self) -> DevRelayer {
        DevRelayer::new(self.clone())
    }

    fn execute_transaction(
        &self,
        from: Address,
        to: Address,
        data: &[u8],
    ) -> Result<TxHash, ChainError> {
        let call = ShadowCall::decode(data).map_err(|_| ChainError::Reverted { data: Vec::new() })?;
        let mut state = self.state.lock();
        if to != state.contract {
            return Err(ChainError::Reverted { data: Vec::new() });
        }
        let events = match call {
            ShadowCall::JoinShadow | ShadowCall::JoinPublic => {
                let target = if call == ShadowCall::JoinShadow {
                    ZoneKind::Shadow
                } else {
                    ZoneKind::Public
                };
                let mut rng = self.rng.lock();
                let event = state.join(from, target, &mut rng).map_err(|revert| {
                    debug!(target = LOG_TARGET, %from, %revert, "join reverted");
                    ChainError::Reverted {
                        data: revert.encode(),
                    }
                })?;
                vec![event]
            }
            _ => Vec::new(),
        };
        let tx_hash = state.record_receipt(from, events);
        debug!(target = LOG_TARGET, %from, %tx_hash, call = call.signature(), "mined");
        Ok(tx_hash)
    }

    fn receipt(&self, tx_hash: &TxHash) -> Option<TxReceipt> {
        self.state.lock().receipts.get(tx_hash).cloned()
    }

    /// Reads a ciphertext record under the lock.
    fn with_ciphertext<T>(
        &self,
        handle: &Handle,
        f: impl FnOnce(u32, &BTreeSet<Address>, bool) -> T,
    ) -> Option<T> {
        let state = self.state.lock();
        state
            .ciphertexts
            .get(handle)
            .map(|ciphertext| f(ciphertext.value, &ciphertext.allowed, ciphertext.publicly_decryptable))
    }
}

impl Default for DevNetwork {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChainReader for DevNetwork {
    async fn call(&self, to: Address, data: Vec<u8>) -> Result<Vec<u8>, ChainError> {
        let state = self.state.lock();
        if to != state.contract {
            return Ok(Vec::new());
        }
        let call = ShadowCall::decode(&data).map_err(|_| ChainError::Reverted { data: Vec::new() })?;
        Ok(state.view(call))
    }

    async fn chain_id(&self) -> Result<u64, ChainError> {
        Ok(DEV_CHAIN_ID)
    }
}

/// Dev account that mines its transactions immediately.
#[derive(Clone)]
pub struct DevSigner {
    network: DevNetwork,
    address: Address,
}

#[async_trait]
impl TransactionSigner for DevSigner {
    fn address(&self) -> Address {
        self.address
    }

    async fn send_transaction(&self, to: Address, data: Vec<u8>) -> Result<TxHash, ChainError> {
        self.network.execute_transaction(self.address, to, &data)
    }

    async fn wait_for_receipt(&self, tx_hash: TxHash) -> Result<TxReceipt, ChainError> {
        self.network
            .receipt(&tx_hash)
            .ok_or(ChainError::ReceiptUnavailable(tx_hash))
    }

    async fn sign_typed_data(&self, typed: &TypedData) -> Result<String, ChainError> {
        Ok(dev_signature(&self.address, typed))
    }
}
