use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseHexError {
    #[error("invalid hex: {0}")]
    Hex(String),
    #[error("expected {expected} bytes, got {actual}")]
    Length { expected: usize, actual: usize },
}

fn decode_fixed<const N: usize>(value: &str) -> Result<[u8; N], ParseHexError> {
    let trimmed = value.trim();
    let without_prefix = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    let bytes = hex::decode(without_prefix).map_err(|err| ParseHexError::Hex(err.to_string()))?;
    if bytes.len() != N {
        return Err(ParseHexError::Length {
            expected: N,
            actual: bytes.len(),
        });
    }
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes);
    Ok(out)
}

macro_rules! hex_newtype {
    ($name:ident, $len:expr) => {
        impl $name {
            pub const LEN: usize = $len;

            pub const fn new(bytes: [u8; $len]) -> Self {
                Self(bytes)
            }

            pub const fn zero() -> Self {
                Self([0u8; $len])
            }

            pub fn is_zero(&self) -> bool {
                self.0.iter().all(|byte| *byte == 0)
            }

            pub fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }

            pub fn into_bytes(self) -> [u8; $len] {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "0x{}", hex::encode(self.0))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self)
            }
        }

        impl FromStr for $name {
            type Err = ParseHexError;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                decode_fixed::<$len>(value).map(Self)
            }
        }

        impl From<[u8; $len]> for $name {
            fn from(bytes: [u8; $len]) -> Self {
                Self(bytes)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let raw = String::deserialize(deserializer)?;
                raw.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

/// 20-byte account address. Equality is byte-wise, so two hex spellings that
/// differ only in letter case compare equal.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address([u8; 20]);

hex_newtype!(Address, 20);

/// Reference to a ciphertext held by the confidential-compute runtime.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle([u8; 32]);

hex_newtype!(Handle, 32);

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TxHash([u8; 32]);

hex_newtype!(TxHash, 32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Zone {
    #[default]
    None,
    Shadow,
    Public,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("unknown zone discriminant {0}")]
pub struct UnknownZone(pub u8);

impl Zone {
    pub fn as_u8(self) -> u8 {
        match self {
            Zone::None => 0,
            Zone::Shadow => 1,
            Zone::Public => 2,
        }
    }

    pub fn kind(self) -> Option<ZoneKind> {
        match self {
            Zone::None => None,
            Zone::Shadow => Some(ZoneKind::Shadow),
            Zone::Public => Some(ZoneKind::Public),
        }
    }
}

impl TryFrom<u8> for Zone {
    type Error = UnknownZone;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Zone::None),
            1 => Ok(Zone::Shadow),
            2 => Ok(Zone::Public),
            other => Err(UnknownZone(other)),
        }
    }
}

impl fmt::Display for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Zone::None => "None",
            Zone::Shadow => "Shadow",
            Zone::Public => "Public",
        };
        f.write_str(name)
    }
}

/// The two joinable zones, which double as the two decryption paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZoneKind {
    Shadow,
    Public,
}

impl ZoneKind {
    pub fn zone(self) -> Zone {
        match self {
            ZoneKind::Shadow => Zone::Shadow,
            ZoneKind::Public => Zone::Public,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ZoneKind::Shadow => "shadow",
            ZoneKind::Public => "public",
        }
    }
}

impl fmt::Display for ZoneKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<ZoneKind> for Zone {
    fn from(kind: ZoneKind) -> Self {
        kind.zone()
    }
}

/// On-chain player record as returned by `getPlayer`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerSnapshot {
    pub exists: bool,
    pub zone: Zone,
    pub health: Handle,
    pub publicly_decryptable: bool,
}

impl PlayerSnapshot {
    pub fn absent() -> Self {
        Self {
            exists: false,
            zone: Zone::None,
            health: Handle::zero(),
            publicly_decryptable: false,
        }
    }

    /// The player's handle, if they hold a ciphertext at all.
    pub fn health_handle(&self) -> Option<Handle> {
        (self.exists && !self.health.is_zero()).then_some(self.health)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("roster has {addresses} addresses but {handles} handles")]
pub struct RosterMismatch {
    pub addresses: usize,
    pub handles: usize,
}

/// Parallel (address, handle) lists for one zone, in contract order.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ZoneRoster {
    addresses: Vec<Address>,
    handles: Vec<Handle>,
}

impl ZoneRoster {
    pub fn new(addresses: Vec<Address>, handles: Vec<Handle>) -> Result<Self, RosterMismatch> {
        if addresses.len() != handles.len() {
            return Err(RosterMismatch {
                addresses: addresses.len(),
                handles: handles.len(),
            });
        }
        Ok(Self { addresses, handles })
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn addresses(&self) -> &[Address] {
        &self.addresses
    }

    pub fn handles(&self) -> &[Handle] {
        &self.handles
    }

    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = (Address, Handle)> + '_ {
        self.addresses
            .iter()
            .copied()
            .zip(self.handles.iter().copied())
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.addresses.contains(address)
    }

    pub fn handle_of(&self, address: &Address) -> Option<Handle> {
        self.entries()
            .find(|(candidate, _)| candidate == address)
            .map(|(_, handle)| handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_parsing_ignores_case_and_prefix() {
        let lower: Address = "0xabcdefabcdefabcdefabcdefabcdefabcdefabcd".parse().unwrap();
        let upper: Address = "ABCDEFABCDEFABCDEFABCDEFABCDEFABCDEFABCD".parse().unwrap();
        assert_eq!(lower, upper);
        assert_eq!(
            upper.to_string(),
            "0xabcdefabcdefabcdefabcdefabcdefabcdefabcd"
        );
    }

    #[test]
    fn address_rejects_wrong_length() {
        let err = "0x1234".parse::<Address>().unwrap_err();
        assert_eq!(
            err,
            ParseHexError::Length {
                expected: 20,
                actual: 2
            }
        );
    }

    #[test]
    fn zone_discriminants_match_contract_enum() {
        for zone in [Zone::None, Zone::Shadow, Zone::Public] {
            assert_eq!(Zone::try_from(zone.as_u8()), Ok(zone));
        }
        assert_eq!(Zone::try_from(3), Err(UnknownZone(3)));
    }

    #[test]
    fn roster_requires_parallel_lists() {
        let err = ZoneRoster::new(vec![Address::zero()], Vec::new()).unwrap_err();
        assert_eq!(
            err,
            RosterMismatch {
                addresses: 1,
                handles: 0
            }
        );
    }

    #[test]
    fn roster_lookup_by_address() {
        let alice = Address::new([1u8; 20]);
        let bob = Address::new([2u8; 20]);
        let roster = ZoneRoster::new(
            vec![alice, bob],
            vec![Handle::new([7u8; 32]), Handle::new([8u8; 32])],
        )
        .unwrap();
        assert_eq!(roster.handle_of(&bob), Some(Handle::new([8u8; 32])));
        assert!(!roster.contains(&Address::zero()));
    }

    #[test]
    fn absent_player_has_no_handle() {
        assert_eq!(PlayerSnapshot::absent().health_handle(), None);
    }
}
