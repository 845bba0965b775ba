//! Fixtures shared by the unit and scenario tests.

use std::sync::Arc;

use crate::app::{ShadowApp, WalletSession};
use crate::chain::contract::JoinReceipt;
use crate::chain::{ShadowContract, TransactionSigner};
use crate::devnet::{dev_account, DevNetwork, DevRelayer};
use crate::types::{Address, PlayerSnapshot, ZoneKind};

const SEED: u64 = 0x5eed;

/// A fresh dev network with a few named accounts.
pub struct DevFixture {
    pub network: DevNetwork,
}

impl DevFixture {
    pub fn new() -> Self {
        Self {
            network: DevNetwork::with_seed(SEED),
        }
    }

    pub fn alice(&self) -> Address {
        dev_account("alice")
    }

    pub fn bob(&self) -> Address {
        dev_account("bob")
    }

    pub fn carol(&self) -> Address {
        dev_account("carol")
    }

    pub fn contract(&self) -> ShadowContract {
        ShadowContract::new(self.network.contract_address(), Arc::new(self.network.clone()))
    }

    pub fn signer(&self, account: Address) -> Arc<dyn TransactionSigner> {
        Arc::new(self.network.signer(account))
    }

    pub fn relayer(&self) -> DevRelayer {
        self.network.relayer()
    }

    /// Joins directly through the contract, bypassing any app.
    pub async fn join(&self, account: Address, zone: ZoneKind) -> JoinReceipt {
        self.contract()
            .join(self.signer(account).as_ref(), zone)
            .await
            .expect("fixture join should succeed")
    }

    pub async fn player(&self, account: Address) -> PlayerSnapshot {
        self.contract()
            .get_player(account)
            .await
            .expect("player read should succeed")
    }

    /// App with no wallet and no decrypt client.
    pub fn app(&self) -> ShadowApp {
        ShadowApp::new(self.network.client_config(), Arc::new(self.network.clone()))
    }

    /// App connected as `account`, using `relayer` for decryption.
    pub fn app_with(&self, account: Address, relayer: &DevRelayer) -> ShadowApp {
        let app = self.app();
        app.connect(WalletSession::with_signer(self.signer(account)));
        app.set_decrypt_client(Some(Arc::new(relayer.clone())));
        app
    }

    pub fn app_for(&self, account: Address) -> (ShadowApp, DevRelayer) {
        let relayer = self.relayer();
        (self.app_with(account, &relayer), relayer)
    }
}

impl Default for DevFixture {
    fn default() -> Self {
        Self::new()
    }
}
