pub mod abi;
pub mod app;
pub mod chain;
pub mod config;
pub mod decryption;
pub mod devnet;
pub mod error;
pub mod membership;
pub mod query;
pub mod reconcile;
pub mod relayer;
pub mod state;
pub mod tokio_tools;
pub mod types;
pub mod view;

#[cfg(test)]
pub mod test_utils;

pub use app::{ShadowApp, WalletSession};
pub use error::{ConnectionGap, ProtocolError};
pub use membership::JoinOutcome;
pub use types::{Address, Handle, PlayerSnapshot, Zone, ZoneKind, ZoneRoster};
