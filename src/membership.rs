//! Join-zone orchestration.

use tracing::{info, warn};

use crate::abi::ShadowEvent;
use crate::app::ShadowApp;
use crate::error::{ConnectionGap, ProtocolError};
use crate::state::{AppAction, AppState, Banner};
use crate::types::{TxHash, ZoneKind};

const LOG_TARGET: &str = "membership";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinOutcome {
    pub zone: ZoneKind,
    pub tx_hash: TxHash,
    pub block_number: u64,
    pub events: Vec<ShadowEvent>,
}

pub fn success_message(zone: ZoneKind) -> &'static str {
    match zone {
        ZoneKind::Shadow => "Joined the shadow zone with a fresh encrypted health!",
        ZoneKind::Public => "Joined the public zone successfully.",
    }
}

impl ShadowApp {
    /// Moves the connected account into `zone`.
    ///
    /// On confirmation every decrypted value is dropped (the account's handle
    /// changed), the query cache is invalidated and the rosters and player
    /// record are refetched.
    pub async fn join_zone(&self, zone: ZoneKind) -> Result<JoinOutcome, ProtocolError> {
        let Some(session) = self.session() else {
            return Err(self.fail(ProtocolError::NotConnected(ConnectionGap::NoWallet)));
        };
        let Some(signer) = session.signer.clone() else {
            return Err(self.fail(ProtocolError::NotConnected(ConnectionGap::NoSigner)));
        };
        if !self
            .store
            .dispatch_if(|state: &AppState| !state.is_joining(), AppAction::JoinStarted(zone))
        {
            return Err(ProtocolError::JoinInProgress);
        }
        self.store.dispatch(AppAction::ShowBanner(Banner::info(format!(
            "Confirm the transaction to join the {zone} zone."
        ))));
        info!(target = LOG_TARGET, account = %session.address, %zone, "joining zone");

        let result = match self.contract.join(signer.as_ref(), zone).await {
            Ok(receipt) => {
                self.reset_decryptions();
                self.queries.invalidate_all();
                if let Err(err) = self.refresh_all().await {
                    warn!(target = LOG_TARGET, error = %err, "refresh after join failed");
                }
                self.store
                    .dispatch(AppAction::ShowBanner(Banner::success(success_message(zone))));
                info!(
                    target = LOG_TARGET,
                    account = %session.address,
                    %zone,
                    tx_hash = %receipt.tx_hash,
                    "joined zone"
                );
                Ok(JoinOutcome {
                    zone,
                    tx_hash: receipt.tx_hash,
                    block_number: receipt.block_number,
                    events: receipt.events,
                })
            }
            Err(err) => Err(self.fail(ProtocolError::transaction(err))),
        };

        self.store.dispatch(AppAction::JoinSettled);
        result
    }
}
