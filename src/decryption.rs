//! Resolving health handles to plaintext.

use std::sync::Arc;

use tracing::{debug, info};

use crate::app::ShadowApp;
use crate::error::ProtocolError;
use crate::relayer::{DecryptClient, HandleContractPair, UserDecryptRequest};
use crate::state::{AppAction, AppState};
use crate::types::{Address, Handle, Zone, ZoneKind};

const LOG_TARGET: &str = "decryption";

fn unix_now() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp()).unwrap_or_default()
}

/// The relayer takes the wallet signature without its single `0x` prefix.
fn strip_hex_prefix(signature: &str) -> &str {
    signature.strip_prefix("0x").unwrap_or(signature)
}

impl ShadowApp {
    /// Decrypts `handle` owned by `owner` through the path matching its zone.
    ///
    /// Returns `Ok(None)` when the relayer did not return the handle or when
    /// the same handle is already being decrypted.
    pub async fn decrypt(
        &self,
        zone: ZoneKind,
        owner: Address,
        handle: Handle,
    ) -> Result<Option<String>, ProtocolError> {
        let Some(client) = self.decrypt_client() else {
            return Err(self.fail(ProtocolError::ServiceNotReady));
        };
        if !self.store.dispatch_if(
            |state: &AppState| !state.is_pending(&handle),
            AppAction::DecryptStarted(handle),
        ) {
            debug!(target = LOG_TARGET, %handle, "decryption already pending");
            return Ok(None);
        }

        let result = match zone {
            ZoneKind::Public => self.public_value(client.as_ref(), handle).await,
            ZoneKind::Shadow => self.private_value(client, owner, handle).await,
        };

        self.store.dispatch(AppAction::DecryptSettled {
            handle,
            value: result.as_ref().ok().cloned().flatten(),
        });
        match result {
            Ok(value) => {
                info!(
                    target = LOG_TARGET,
                    %handle,
                    path = zone.as_str(),
                    resolved = value.is_some(),
                    "decryption finished"
                );
                Ok(value)
            }
            Err(err) => Err(self.fail(err)),
        }
    }

    /// Decrypts the connected account's own health. Public-zone players use
    /// the public path; everyone else needs a signed user decryption.
    pub async fn decrypt_personal(&self) -> Result<Option<String>, ProtocolError> {
        let Some(account) = self.account() else {
            return Ok(None);
        };
        let Some(player) = self.player() else {
            return Ok(None);
        };
        let Some(handle) = player.health_handle() else {
            return Ok(None);
        };
        let path = match player.zone {
            Zone::Public => ZoneKind::Public,
            Zone::Shadow | Zone::None => ZoneKind::Shadow,
        };
        self.decrypt(path, account, handle).await
    }

    async fn public_value(
        &self,
        client: &dyn DecryptClient,
        handle: Handle,
    ) -> Result<Option<String>, ProtocolError> {
        let mut values = client.public_decrypt(&[handle]).await?;
        Ok(values.remove(&handle))
    }

    async fn private_value(
        &self,
        client: Arc<dyn DecryptClient>,
        owner: Address,
        handle: Handle,
    ) -> Result<Option<String>, ProtocolError> {
        let session = self.session();
        let caller = session.as_ref().map(|session| session.address);
        if caller != Some(owner) {
            return Err(ProtocolError::Unauthorized { caller, owner });
        }
        let Some(signer) = session.and_then(|session| session.signer) else {
            return Err(ProtocolError::SignerUnavailable);
        };

        let keypair = client.generate_keypair();
        let contract = self.contract.address();
        let contract_addresses = vec![contract];
        let start_timestamp = unix_now();
        let duration_days = self.config.decrypt_duration_days;
        let typed = client.create_eip712(
            &keypair.public_key,
            &contract_addresses,
            start_timestamp,
            duration_days,
        );
        let signature = signer.sign_typed_data(&typed).await?;

        let request = UserDecryptRequest {
            pairs: vec![HandleContractPair {
                handle,
                contract_address: contract,
            }],
            keypair,
            signature: strip_hex_prefix(&signature).to_string(),
            contract_addresses,
            user_address: owner,
            start_timestamp,
            duration_days,
        };
        let mut values = client.user_decrypt(request).await?;
        Ok(values.remove(&handle))
    }
}
