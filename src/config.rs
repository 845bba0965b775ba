use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::relayer::Eip712Domain;
use crate::types::Address;

pub const DEFAULT_DECRYPT_DURATION_DAYS: u64 = 10;
pub const DEPLOYMENT_FILE: &str = "ShadowProtocol.json";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub contract: Address,
    /// Chain id of the gateway that verifies user-decryption signatures.
    pub gateway_chain_id: u64,
    pub verifying_contract: Address,
    pub decrypt_duration_days: u64,
}

impl ClientConfig {
    pub fn new(contract: Address, gateway_chain_id: u64, verifying_contract: Address) -> Self {
        Self {
            contract,
            gateway_chain_id,
            verifying_contract,
            decrypt_duration_days: DEFAULT_DECRYPT_DURATION_DAYS,
        }
    }

    pub fn with_decrypt_duration_days(mut self, days: u64) -> Self {
        self.decrypt_duration_days = days;
        self
    }

    pub fn decryption_domain(&self) -> Eip712Domain {
        Eip712Domain::decryption(self.gateway_chain_id, self.verifying_contract)
    }
}

/// Deployment record written by the deploy scripts.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Deployment {
    pub address: Address,
}

impl Deployment {
    pub fn path(dir: &Path, network: &str) -> PathBuf {
        dir.join(network).join(DEPLOYMENT_FILE)
    }

    /// Reads `<dir>/<network>/ShadowProtocol.json`.
    pub fn load(dir: &Path, network: &str) -> Result<Self> {
        let path = Self::path(dir, network);
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("ShadowProtocol is not deployed on {network} ({})", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("malformed deployment record {}", path.display()))
    }
}
