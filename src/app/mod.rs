//! Application facade tying the contract, caches, decrypt client and state
//! store together. The join flow lives in [`crate::membership`] and the
//! decrypt flow in [`crate::decryption`].

#[cfg(test)]
mod tests;

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::chain::{ChainReader, ContractError, ShadowContract, TransactionSigner};
use crate::config::ClientConfig;
use crate::error::ProtocolError;
use crate::query::ZoneQueries;
use crate::reconcile::{PublicRevealReconciler, ReconcileOutcome};
use crate::relayer::DecryptClient;
use crate::state::{AppAction, AppState, AppStore, Banner};
use crate::types::{Address, PlayerSnapshot, ZoneKind, ZoneRoster};

const LOG_TARGET: &str = "app";

/// Connected wallet. A read-only session has an address but cannot sign.
#[derive(Clone)]
pub struct WalletSession {
    pub address: Address,
    pub signer: Option<Arc<dyn TransactionSigner>>,
}

impl WalletSession {
    pub fn with_signer(signer: Arc<dyn TransactionSigner>) -> Self {
        Self {
            address: signer.address(),
            signer: Some(signer),
        }
    }

    pub fn read_only(address: Address) -> Self {
        Self {
            address,
            signer: None,
        }
    }
}

impl std::fmt::Debug for WalletSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalletSession")
            .field("address", &self.address)
            .field("can_sign", &self.signer.is_some())
            .finish()
    }
}

pub struct ShadowApp {
    pub(crate) config: ClientConfig,
    pub(crate) contract: ShadowContract,
    pub(crate) queries: ZoneQueries,
    pub(crate) store: AppStore,
    reconciler: PublicRevealReconciler,
    session: RwLock<Option<WalletSession>>,
    decrypt_client: RwLock<Option<Arc<dyn DecryptClient>>>,
    last_reveal: Mutex<Option<JoinHandle<ReconcileOutcome>>>,
}

impl ShadowApp {
    pub fn new(config: ClientConfig, reader: Arc<dyn ChainReader>) -> Self {
        let contract = ShadowContract::new(config.contract, reader);
        let store = AppStore::new();
        Self {
            queries: ZoneQueries::new(Some(contract.clone())),
            reconciler: PublicRevealReconciler::new(store.clone()),
            config,
            contract,
            store,
            session: RwLock::new(None),
            decrypt_client: RwLock::new(None),
            last_reveal: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn contract(&self) -> &ShadowContract {
        &self.contract
    }

    pub fn queries(&self) -> &ZoneQueries {
        &self.queries
    }

    pub fn state(&self) -> AppState {
        self.store.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<AppState> {
        self.store.subscribe()
    }

    pub fn connect(&self, session: WalletSession) {
        info!(target = LOG_TARGET, ?session, "wallet connected");
        *self.session.write() = Some(session);
    }

    pub fn disconnect(&self) {
        if let Some(session) = self.session.write().take() {
            info!(target = LOG_TARGET, account = %session.address, "wallet disconnected");
        }
    }

    pub fn session(&self) -> Option<WalletSession> {
        self.session.read().clone()
    }

    pub fn account(&self) -> Option<Address> {
        self.session.read().as_ref().map(|session| session.address)
    }

    /// Installs (or removes) the decrypt client. A ready client immediately
    /// reveals any public values already on screen.
    pub fn set_decrypt_client(&self, client: Option<Arc<dyn DecryptClient>>) {
        let ready = client.is_some();
        *self.decrypt_client.write() = client;
        if ready {
            info!(target = LOG_TARGET, "decrypt client ready");
            self.reveal_public_values();
        } else {
            self.reconciler.cancel();
        }
    }

    pub fn decrypt_client(&self) -> Option<Arc<dyn DecryptClient>> {
        self.decrypt_client.read().clone()
    }

    pub fn dismiss_banner(&self) {
        self.store.dispatch(AppAction::DismissBanner);
    }

    /// Own player record from the cache, if one has been fetched.
    pub fn player(&self) -> Option<PlayerSnapshot> {
        self.queries.player(self.account()).data
    }

    /// Refetches one roster. A fresh public roster starts a reconciliation
    /// run for any handles it introduced.
    pub async fn refetch_roster(
        &self,
        zone: ZoneKind,
    ) -> Result<Option<ZoneRoster>, ContractError> {
        let roster = self.queries.refetch_roster(zone).await?;
        if zone == ZoneKind::Public && roster.is_some() {
            self.reveal_public_values();
        }
        Ok(roster)
    }

    pub async fn refetch_player(&self) -> Result<Option<PlayerSnapshot>, ContractError> {
        self.queries.refetch_player(self.account()).await
    }

    /// Refetches both rosters and the connected player's record
    /// concurrently, then reconciles public values against the new roster.
    pub async fn refresh_all(&self) -> Result<(), ContractError> {
        let account = self.account();
        let (shadow, public, player) = tokio::join!(
            self.queries.refetch_roster(ZoneKind::Shadow),
            self.queries.refetch_roster(ZoneKind::Public),
            self.queries.refetch_player(account),
        );
        self.reveal_public_values();
        shadow?;
        public?;
        player?;
        Ok(())
    }

    /// Starts a reconciliation run over the cached public roster.
    pub fn reveal_public_values(&self) {
        let Some(client) = self.decrypt_client() else {
            return;
        };
        let Some(roster) = self.queries.public_roster().data else {
            return;
        };
        let handle = self.reconciler.schedule(client, &roster);
        *self.last_reveal.lock() = handle;
    }

    /// Waits for the most recent reconciliation run, if any.
    pub async fn settle_reveals(&self) -> Option<ReconcileOutcome> {
        let handle = self.last_reveal.lock().take()?;
        match handle.await {
            Ok(outcome) => Some(outcome),
            Err(err) => {
                warn!(target = LOG_TARGET, error = %err, "reveal task aborted");
                None
            }
        }
    }

    /// Drops every decrypted value and aborts the reconciliation that was
    /// working from the old cache.
    pub(crate) fn reset_decryptions(&self) {
        self.reconciler.cancel();
        self.store.dispatch(AppAction::ClearDecryptions);
    }

    pub(crate) fn fail(&self, err: ProtocolError) -> ProtocolError {
        warn!(target = LOG_TARGET, error = %err, "operation failed");
        self.store
            .dispatch(AppAction::ShowBanner(Banner::error(err.to_string())));
        err
    }
}
