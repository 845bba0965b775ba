use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info};

use crate::abi::{self, AbiError, ContractRevert, ShadowCall, ShadowEvent};
use crate::types::{Address, PlayerSnapshot, TxHash, Zone, ZoneKind, ZoneRoster};

use super::{ChainError, ChainReader, TransactionSigner, TxReceipt};

const LOG_TARGET: &str = "chain::contract";

#[derive(Debug, Clone, Error)]
pub enum ContractError {
    #[error("execution reverted: {0}")]
    Reverted(ContractRevert),
    #[error(transparent)]
    Chain(ChainError),
    #[error("failed to decode {call} output: {source}")]
    Decode {
        call: &'static str,
        #[source]
        source: AbiError,
    },
    #[error("transaction {0} failed on-chain")]
    ReceiptFailed(TxHash),
}

impl From<ChainError> for ContractError {
    fn from(err: ChainError) -> Self {
        match err {
            ChainError::Reverted { data } => ContractError::Reverted(ContractRevert::decode(&data)),
            other => ContractError::Chain(other),
        }
    }
}

/// Confirmed join transaction together with the contract events it emitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinReceipt {
    pub tx_hash: TxHash,
    pub block_number: u64,
    pub events: Vec<ShadowEvent>,
}

/// Typed facade over the deployed ShadowProtocol contract.
#[derive(Clone)]
pub struct ShadowContract {
    address: Address,
    reader: Arc<dyn ChainReader>,
}

impl ShadowContract {
    pub fn new(address: Address, reader: Arc<dyn ChainReader>) -> Self {
        Self { address, reader }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    async fn view<T>(
        &self,
        call: ShadowCall,
        decode: fn(&[u8]) -> Result<T, AbiError>,
    ) -> Result<T, ContractError> {
        debug!(target = LOG_TARGET, call = call.signature(), "eth_call");
        let output = self.reader.call(self.address, call.encode()).await?;
        decode(&output).map_err(|source| ContractError::Decode {
            call: call.signature(),
            source,
        })
    }

    pub async fn get_player(&self, player: Address) -> Result<PlayerSnapshot, ContractError> {
        self.view(ShadowCall::GetPlayer(player), abi::decode_player)
            .await
    }

    pub async fn get_shadow_players(&self) -> Result<ZoneRoster, ContractError> {
        self.roster(ZoneKind::Shadow).await
    }

    pub async fn get_public_players(&self) -> Result<ZoneRoster, ContractError> {
        self.roster(ZoneKind::Public).await
    }

    pub async fn roster(&self, zone: ZoneKind) -> Result<ZoneRoster, ContractError> {
        let call = match zone {
            ZoneKind::Shadow => ShadowCall::GetShadowPlayers,
            ZoneKind::Public => ShadowCall::GetPublicPlayers,
        };
        self.view(call, abi::decode_roster).await
    }

    pub async fn current_zone(&self, player: Address) -> Result<Zone, ContractError> {
        self.view(ShadowCall::CurrentZone(player), abi::decode_zone)
            .await
    }

    pub async fn total_players(&self, zone: ZoneKind) -> Result<u64, ContractError> {
        let call = match zone {
            ZoneKind::Shadow => ShadowCall::TotalShadowPlayers,
            ZoneKind::Public => ShadowCall::TotalPublicPlayers,
        };
        self.view(call, abi::decode_u64).await
    }

    pub async fn protocol_id(&self) -> Result<u64, ContractError> {
        self.view(ShadowCall::ProtocolId, abi::decode_u64).await
    }

    /// Submits `joinShadow()` / `joinPublic()` and returns once it is sent.
    pub async fn submit_join(
        &self,
        signer: &dyn TransactionSigner,
        zone: ZoneKind,
    ) -> Result<TxHash, ContractError> {
        let call = match zone {
            ZoneKind::Shadow => ShadowCall::JoinShadow,
            ZoneKind::Public => ShadowCall::JoinPublic,
        };
        let tx_hash = signer
            .send_transaction(self.address, call.encode())
            .await?;
        info!(
            target = LOG_TARGET,
            %tx_hash,
            from = %signer.address(),
            call = call.signature(),
            "transaction submitted"
        );
        Ok(tx_hash)
    }

    /// Submits a join and waits for its receipt.
    pub async fn join(
        &self,
        signer: &dyn TransactionSigner,
        zone: ZoneKind,
    ) -> Result<JoinReceipt, ContractError> {
        let tx_hash = self.submit_join(signer, zone).await?;
        let receipt = signer.wait_for_receipt(tx_hash).await?;
        if !receipt.success {
            return Err(ContractError::ReceiptFailed(tx_hash));
        }
        let events = self.decode_events(&receipt)?;
        info!(
            target = LOG_TARGET,
            %tx_hash,
            block = receipt.block_number,
            events = events.len(),
            "transaction confirmed"
        );
        Ok(JoinReceipt {
            tx_hash,
            block_number: receipt.block_number,
            events,
        })
    }

    fn decode_events(&self, receipt: &TxReceipt) -> Result<Vec<ShadowEvent>, ContractError> {
        let mut events = Vec::new();
        for log in receipt.logs.iter().filter(|log| log.address == self.address) {
            let decoded = ShadowEvent::decode(&log.topics, &log.data).map_err(|source| {
                ContractError::Decode {
                    call: "receipt logs",
                    source,
                }
            })?;
            events.extend(decoded);
        }
        Ok(events)
    }
}
