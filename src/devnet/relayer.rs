use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use rand::RngCore;
use tokio::sync::Semaphore;
use tracing::debug;

use crate::abi::keccak256;
use crate::relayer::{
    DecryptClient, DecryptedValues, Eip712Domain, Keypair, RelayerError, TypedData,
    UserDecryptRequest,
};
use crate::types::{Address, Handle};

use super::{dev_signature, dev_verifying_contract, DevNetwork, DEV_GATEWAY_CHAIN_ID};

const LOG_TARGET: &str = "devnet::relayer";

/// Relayer backed by the dev network's plaintext table.
///
/// Enforces the same rules as the production relayer: public decryption only
/// for handles flagged publicly decryptable, user decryption only with a valid
/// signature from an account on the ciphertext's ACL.
#[derive(Clone)]
pub struct DevRelayer {
    network: DevNetwork,
    domain: Eip712Domain,
    gate: Option<Arc<Semaphore>>,
    fail_public: Arc<AtomicBool>,
    public_batches: Arc<Mutex<Vec<Vec<Handle>>>>,
}

impl DevRelayer {
    pub(super) fn new(network: DevNetwork) -> Self {
        Self {
            network,
            domain: Eip712Domain::decryption(DEV_GATEWAY_CHAIN_ID, dev_verifying_contract()),
            gate: None,
            fail_public: Arc::new(AtomicBool::new(false)),
            public_batches: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_domain(mut self, domain: Eip712Domain) -> Self {
        self.domain = domain;
        self
    }

    /// Holds every public decryption until the semaphore hands out a permit.
    pub fn with_gate(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Makes public decryptions fail with [`RelayerError::Unavailable`].
    pub fn set_public_outage(&self, down: bool) {
        self.fail_public.store(down, Ordering::SeqCst);
    }

    /// Handles requested by each public decryption call, in call order.
    pub fn public_batches(&self) -> Vec<Vec<Handle>> {
        self.public_batches.lock().clone()
    }
}

#[async_trait]
impl DecryptClient for DevRelayer {
    async fn public_decrypt(&self, handles: &[Handle]) -> Result<DecryptedValues, RelayerError> {
        self.public_batches.lock().push(handles.to_vec());
        if let Some(gate) = &self.gate {
            let permit = gate
                .acquire()
                .await
                .map_err(|_| RelayerError::Unavailable("gate closed".into()))?;
            permit.forget();
        }
        if self.fail_public.load(Ordering::SeqCst) {
            return Err(RelayerError::Unavailable("public decryption offline".into()));
        }
        if handles.is_empty() {
            return Err(RelayerError::EmptyRequest);
        }

        let mut values = DecryptedValues::with_capacity(handles.len());
        for handle in handles {
            let value = self
                .network
                .with_ciphertext(handle, |value, _, public| public.then_some(value))
                .ok_or(RelayerError::UnknownHandle(*handle))?
                .ok_or(RelayerError::NotPubliclyDecryptable(*handle))?;
            values.insert(*handle, value.to_string());
        }
        debug!(target = LOG_TARGET, count = values.len(), "public decryption served");
        Ok(values)
    }

    fn generate_keypair(&self) -> Keypair {
        let mut secret = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut secret);
        let public_key = hex::encode(keccak256(secret));
        Keypair {
            public_key,
            private_key: hex::encode(secret),
        }
    }

    fn create_eip712(
        &self,
        public_key: &str,
        contract_addresses: &[Address],
        start_timestamp: u64,
        duration_days: u64,
    ) -> TypedData {
        TypedData::user_decrypt(
            self.domain.clone(),
            public_key,
            contract_addresses,
            start_timestamp,
            duration_days,
        )
    }

    async fn user_decrypt(
        &self,
        request: UserDecryptRequest,
    ) -> Result<DecryptedValues, RelayerError> {
        if request.pairs.is_empty() {
            return Err(RelayerError::EmptyRequest);
        }

        let typed = self.create_eip712(
            &request.keypair.public_key,
            &request.contract_addresses,
            request.start_timestamp,
            request.duration_days,
        );
        let now = u64::try_from(chrono::Utc::now().timestamp()).unwrap_or_default();
        if !typed.message.is_valid_at(now) {
            return Err(RelayerError::RequestExpired);
        }
        let expected = dev_signature(&request.user_address, &typed);
        if expected.trim_start_matches("0x") != request.signature.trim_start_matches("0x") {
            return Err(RelayerError::InvalidSignature);
        }

        let mut values = DecryptedValues::with_capacity(request.pairs.len());
        for pair in &request.pairs {
            if !request.contract_addresses.contains(&pair.contract_address) {
                return Err(RelayerError::ContractNotAuthorized(pair.contract_address));
            }
            let value = self
                .network
                .with_ciphertext(&pair.handle, |value, allowed, _| {
                    (allowed.contains(&request.user_address)
                        && allowed.contains(&pair.contract_address))
                    .then_some(value)
                })
                .ok_or(RelayerError::UnknownHandle(pair.handle))?
                .ok_or(RelayerError::NotAuthorized {
                    user: request.user_address,
                    handle: pair.handle,
                })?;
            values.insert(pair.handle, value.to_string());
        }
        debug!(
            target = LOG_TARGET,
            user = %request.user_address,
            count = values.len(),
            "user decryption served"
        );
        Ok(values)
    }
}
