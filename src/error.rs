use thiserror::Error;

use crate::chain::{ChainError, ContractError};
use crate::relayer::RelayerError;
use crate::types::Address;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionGap {
    NoWallet,
    NoSigner,
}

impl std::fmt::Display for ConnectionGap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ConnectionGap::NoWallet => "Connect your wallet before joining a zone.",
            ConnectionGap::NoSigner => "Unable to access signer from wallet.",
        })
    }
}

/// Failure of a user-facing operation. `Display` is the banner text shown to
/// the user.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("{0}")]
    NotConnected(ConnectionGap),
    #[error("Encryption service is not ready yet.")]
    ServiceNotReady,
    #[error("Only the player can decrypt their shadow health.")]
    Unauthorized {
        caller: Option<Address>,
        owner: Address,
    },
    #[error("Signer unavailable for decryption request.")]
    SignerUnavailable,
    #[error("A zone join is already in progress.")]
    JoinInProgress,
    #[error("Failed to join zone: {0}")]
    TransactionFailed(String),
    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),
}

impl ProtocolError {
    pub fn transaction(err: ContractError) -> Self {
        ProtocolError::TransactionFailed(err.to_string())
    }

    pub fn decryption(reason: impl std::fmt::Display) -> Self {
        ProtocolError::DecryptionFailed(reason.to_string())
    }
}

impl From<RelayerError> for ProtocolError {
    fn from(err: RelayerError) -> Self {
        ProtocolError::decryption(err)
    }
}

impl From<ChainError> for ProtocolError {
    /// Chain failures on the decryption path come from typed-data signing.
    fn from(err: ChainError) -> Self {
        ProtocolError::decryption(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abi::ContractRevert;
    use crate::types::Zone;

    #[test]
    fn banner_texts() {
        assert_eq!(
            ProtocolError::NotConnected(ConnectionGap::NoWallet).to_string(),
            "Connect your wallet before joining a zone."
        );
        assert_eq!(
            ProtocolError::NotConnected(ConnectionGap::NoSigner).to_string(),
            "Unable to access signer from wallet."
        );
        assert_eq!(
            ProtocolError::ServiceNotReady.to_string(),
            "Encryption service is not ready yet."
        );
        assert_eq!(
            ProtocolError::from(RelayerError::InvalidSignature).to_string(),
            "Decryption failed: invalid user decryption signature"
        );
    }

    #[test]
    fn revert_reason_is_rendered_verbatim() {
        let err = ProtocolError::transaction(ContractError::Reverted(
            ContractRevert::AlreadyInZone(Zone::Shadow),
        ));
        assert_eq!(
            err.to_string(),
            "Failed to join zone: execution reverted: AlreadyInZone(Shadow)"
        );
    }
}
