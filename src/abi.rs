//! Static ABI schema for the ShadowProtocol contract.
//!
//! Every call, return tuple, custom error and event the client touches has a
//! typed encoder/decoder here. Decoding validates word boundaries, padding and
//! value ranges so malformed node responses surface as [`AbiError`] instead of
//! silently producing garbage.

use std::fmt;

use sha3::{Digest, Keccak256};
use thiserror::Error;

use crate::types::{Address, Handle, PlayerSnapshot, RosterMismatch, UnknownZone, Zone, ZoneRoster};

pub type Word = [u8; 32];

const WORD: usize = 32;
const ERROR_STRING_SELECTOR: [u8; 4] = [0x08, 0xc3, 0x79, 0xa0];
const PANIC_SELECTOR: [u8; 4] = [0x4e, 0x48, 0x7b, 0x71];

pub fn keccak256(bytes: impl AsRef<[u8]>) -> Word {
    let mut hasher = Keccak256::new();
    hasher.update(bytes.as_ref());
    hasher.finalize().into()
}

pub fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AbiError {
    #[error("payload truncated: need {needed} bytes, have {len}")]
    Truncated { needed: usize, len: usize },
    #[error("word {index} is not a valid bool")]
    InvalidBool { index: usize },
    #[error("word {index} has non-zero address padding")]
    InvalidAddressPadding { index: usize },
    #[error("word {index} overflows the target integer")]
    IntegerOverflow { index: usize },
    #[error("dynamic offset {offset} is not word aligned or out of range")]
    InvalidOffset { offset: usize },
    #[error("unknown selector 0x{}", hex::encode(.0))]
    UnknownSelector([u8; 4]),
    #[error(transparent)]
    Zone(#[from] UnknownZone),
    #[error(transparent)]
    Roster(#[from] RosterMismatch),
    #[error("string payload is not utf-8")]
    InvalidUtf8,
}

// ---- Word reader ---------------------------------------------------------------------------

struct WordReader<'a> {
    data: &'a [u8],
}

impl<'a> WordReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    fn word_at(&self, offset: usize) -> Result<&'a [u8], AbiError> {
        let end = offset.checked_add(WORD).ok_or(AbiError::InvalidOffset { offset })?;
        self.data.get(offset..end).ok_or(AbiError::Truncated {
            needed: end,
            len: self.data.len(),
        })
    }

    fn word(&self, index: usize) -> Result<&'a [u8], AbiError> {
        self.word_at(index * WORD)
    }

    fn usize_at(&self, offset: usize, index: usize) -> Result<usize, AbiError> {
        let word = self.word_at(offset)?;
        if word[..24].iter().any(|byte| *byte != 0) {
            return Err(AbiError::IntegerOverflow { index });
        }
        let mut buf = [0u8; 8];
        buf.copy_from_slice(&word[24..]);
        usize::try_from(u64::from_be_bytes(buf)).map_err(|_| AbiError::IntegerOverflow { index })
    }

    fn u64(&self, index: usize) -> Result<u64, AbiError> {
        let word = self.word(index)?;
        if word[..24].iter().any(|byte| *byte != 0) {
            return Err(AbiError::IntegerOverflow { index });
        }
        let mut buf = [0u8; 8];
        buf.copy_from_slice(&word[24..]);
        Ok(u64::from_be_bytes(buf))
    }

    fn u8(&self, index: usize) -> Result<u8, AbiError> {
        let value = self.u64(index)?;
        u8::try_from(value).map_err(|_| AbiError::IntegerOverflow { index })
    }

    fn bool(&self, index: usize) -> Result<bool, AbiError> {
        match self.u64(index) {
            Ok(0) => Ok(false),
            Ok(1) => Ok(true),
            _ => Err(AbiError::InvalidBool { index }),
        }
    }

    fn address_at(&self, offset: usize, index: usize) -> Result<Address, AbiError> {
        let word = self.word_at(offset)?;
        if word[..12].iter().any(|byte| *byte != 0) {
            return Err(AbiError::InvalidAddressPadding { index });
        }
        let mut out = [0u8; 20];
        out.copy_from_slice(&word[12..]);
        Ok(Address::new(out))
    }

    fn address(&self, index: usize) -> Result<Address, AbiError> {
        self.address_at(index * WORD, index)
    }

    fn bytes32_at(&self, offset: usize) -> Result<Word, AbiError> {
        let word = self.word_at(offset)?;
        let mut out = [0u8; 32];
        out.copy_from_slice(word);
        Ok(out)
    }

    fn bytes32(&self, index: usize) -> Result<Word, AbiError> {
        self.bytes32_at(index * WORD)
    }

    /// Resolves the head word at `index` to the start of its dynamic tail.
    fn tail_start(&self, index: usize) -> Result<usize, AbiError> {
        let offset = self.usize_at(index * WORD, index)?;
        if offset % WORD != 0 || offset >= self.data.len() {
            return Err(AbiError::InvalidOffset { offset });
        }
        Ok(offset)
    }

    fn array<T>(
        &self,
        index: usize,
        mut item: impl FnMut(&Self, usize) -> Result<T, AbiError>,
    ) -> Result<Vec<T>, AbiError> {
        let start = self.tail_start(index)?;
        let len = self.usize_at(start, index)?;
        let needed = len
            .checked_mul(WORD)
            .and_then(|bytes| bytes.checked_add(start + WORD))
            .ok_or(AbiError::InvalidOffset { offset: start })?;
        if needed > self.data.len() {
            return Err(AbiError::Truncated {
                needed,
                len: self.data.len(),
            });
        }
        (0..len)
            .map(|position| item(self, start + WORD * (position + 1)))
            .collect()
    }

    fn string(&self, index: usize) -> Result<String, AbiError> {
        let start = self.tail_start(index)?;
        let len = self.usize_at(start, index)?;
        let from = start + WORD;
        let bytes = self.data.get(from..from + len).ok_or(AbiError::Truncated {
            needed: from + len,
            len: self.data.len(),
        })?;
        String::from_utf8(bytes.to_vec()).map_err(|_| AbiError::InvalidUtf8)
    }
}

// ---- Word writer ---------------------------------------------------------------------------

#[derive(Default)]
struct WordWriter {
    head: Vec<Word>,
    tail: Vec<Word>,
    /// Head slots that hold a tail-relative offset still to be rebased.
    pending_offsets: Vec<usize>,
}

impl WordWriter {
    fn uint(&mut self, value: u64) {
        self.head.push(uint_word(value));
    }

    fn bool(&mut self, value: bool) {
        self.uint(u64::from(value));
    }

    fn address(&mut self, address: &Address) {
        self.head.push(address_word(address));
    }

    fn bytes32(&mut self, word: Word) {
        self.head.push(word);
    }

    fn array(&mut self, items: impl ExactSizeIterator<Item = Word>) {
        self.pending_offsets.push(self.head.len());
        self.head.push(uint_word((self.tail.len() * WORD) as u64));
        self.tail.push(uint_word(items.len() as u64));
        self.tail.extend(items);
    }

    fn string(&mut self, value: &str) {
        self.pending_offsets.push(self.head.len());
        self.head.push(uint_word((self.tail.len() * WORD) as u64));
        self.tail.push(uint_word(value.len() as u64));
        for chunk in value.as_bytes().chunks(WORD) {
            let mut word = [0u8; 32];
            word[..chunk.len()].copy_from_slice(chunk);
            self.tail.push(word);
        }
    }

    fn finish(mut self) -> Vec<u8> {
        let head_bytes = (self.head.len() * WORD) as u64;
        for slot in self.pending_offsets {
            let relative = word_to_u64(&self.head[slot]);
            self.head[slot] = uint_word(head_bytes + relative);
        }
        self.head
            .into_iter()
            .chain(self.tail)
            .flat_map(|word| word.into_iter())
            .collect()
    }
}

pub fn uint_word(value: u64) -> Word {
    let mut word = [0u8; 32];
    word[24..].copy_from_slice(&value.to_be_bytes());
    word
}

pub fn address_word(address: &Address) -> Word {
    let mut word = [0u8; 32];
    word[12..].copy_from_slice(address.as_bytes());
    word
}

fn word_to_u64(word: &Word) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&word[24..]);
    u64::from_be_bytes(buf)
}

fn with_selector(selector: [u8; 4], body: Vec<u8>) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + body.len());
    out.extend_from_slice(&selector);
    out.extend_from_slice(&body);
    out
}

fn split_selector(data: &[u8]) -> Result<([u8; 4], &[u8]), AbiError> {
    if data.len() < 4 {
        return Err(AbiError::Truncated {
            needed: 4,
            len: data.len(),
        });
    }
    let mut selector = [0u8; 4];
    selector.copy_from_slice(&data[..4]);
    Ok((selector, &data[4..]))
}

// ---- Calls ---------------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShadowCall {
    GetPlayer(Address),
    GetShadowPlayers,
    GetPublicPlayers,
    JoinShadow,
    JoinPublic,
    CurrentZone(Address),
    TotalShadowPlayers,
    TotalPublicPlayers,
    ProtocolId,
}

impl ShadowCall {
    const ALL_SIGNATURES: [&'static str; 9] = [
        "getPlayer(address)",
        "getShadowPlayers()",
        "getPublicPlayers()",
        "joinShadow()",
        "joinPublic()",
        "currentZone(address)",
        "totalShadowPlayers()",
        "totalPublicPlayers()",
        "protocolId()",
    ];

    pub fn signature(&self) -> &'static str {
        let index = match self {
            ShadowCall::GetPlayer(_) => 0,
            ShadowCall::GetShadowPlayers => 1,
            ShadowCall::GetPublicPlayers => 2,
            ShadowCall::JoinShadow => 3,
            ShadowCall::JoinPublic => 4,
            ShadowCall::CurrentZone(_) => 5,
            ShadowCall::TotalShadowPlayers => 6,
            ShadowCall::TotalPublicPlayers => 7,
            ShadowCall::ProtocolId => 8,
        };
        Self::ALL_SIGNATURES[index]
    }

    pub fn selector(&self) -> [u8; 4] {
        selector(self.signature())
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut writer = WordWriter::default();
        match self {
            ShadowCall::GetPlayer(address) | ShadowCall::CurrentZone(address) => {
                writer.address(address)
            }
            _ => {}
        }
        with_selector(self.selector(), writer.finish())
    }

    /// Parses calldata back into a call; used by the dev network node.
    pub fn decode(data: &[u8]) -> Result<Self, AbiError> {
        let (selector, body) = split_selector(data)?;
        let reader = WordReader::new(body);
        let position = Self::ALL_SIGNATURES
            .iter()
            .position(|signature| self::selector(signature) == selector)
            .ok_or(AbiError::UnknownSelector(selector))?;
        let call = match position {
            0 => ShadowCall::GetPlayer(reader.address(0)?),
            1 => ShadowCall::GetShadowPlayers,
            2 => ShadowCall::GetPublicPlayers,
            3 => ShadowCall::JoinShadow,
            4 => ShadowCall::JoinPublic,
            5 => ShadowCall::CurrentZone(reader.address(0)?),
            6 => ShadowCall::TotalShadowPlayers,
            7 => ShadowCall::TotalPublicPlayers,
            _ => ShadowCall::ProtocolId,
        };
        Ok(call)
    }
}

// ---- Return tuples -------------------------------------------------------------------------

/// `(bool exists, uint8 zone, bytes32 health, bool publiclyDecryptable)`
pub fn decode_player(data: &[u8]) -> Result<PlayerSnapshot, AbiError> {
    let reader = WordReader::new(data);
    Ok(PlayerSnapshot {
        exists: reader.bool(0)?,
        zone: Zone::try_from(reader.u8(1)?)?,
        health: Handle::new(reader.bytes32(2)?),
        publicly_decryptable: reader.bool(3)?,
    })
}

pub fn encode_player(player: &PlayerSnapshot) -> Vec<u8> {
    let mut writer = WordWriter::default();
    writer.bool(player.exists);
    writer.uint(u64::from(player.zone.as_u8()));
    writer.bytes32(player.health.into_bytes());
    writer.bool(player.publicly_decryptable);
    writer.finish()
}

/// `(address[] playersList, bytes32[] healthList)`
pub fn decode_roster(data: &[u8]) -> Result<ZoneRoster, AbiError> {
    let reader = WordReader::new(data);
    let addresses = reader.array(0, |reader, offset| reader.address_at(offset, 0))?;
    let handles = reader.array(1, |reader, offset| {
        reader.bytes32_at(offset).map(Handle::new)
    })?;
    Ok(ZoneRoster::new(addresses, handles)?)
}

pub fn encode_roster(roster: &ZoneRoster) -> Vec<u8> {
    let mut writer = WordWriter::default();
    writer.array(roster.addresses().iter().map(address_word));
    writer.array(roster.handles().iter().map(|handle| handle.into_bytes()));
    writer.finish()
}

pub fn decode_zone(data: &[u8]) -> Result<Zone, AbiError> {
    Ok(Zone::try_from(WordReader::new(data).u8(0)?)?)
}

pub fn decode_u64(data: &[u8]) -> Result<u64, AbiError> {
    WordReader::new(data).u64(0)
}

pub fn encode_u64(value: u64) -> Vec<u8> {
    uint_word(value).to_vec()
}

// ---- Reverts -------------------------------------------------------------------------------

/// Decoded revert payload of a failed contract call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContractRevert {
    AlreadyInZone(Zone),
    InvalidZone,
    PlayerNotFound(Address),
    Message(String),
    Panic(u64),
    Unknown(Vec<u8>),
}

impl ContractRevert {
    const ALREADY_IN_ZONE: &'static str = "AlreadyInZone(uint8)";
    const INVALID_ZONE: &'static str = "InvalidZone()";
    const PLAYER_NOT_FOUND: &'static str = "PlayerNotFound(address)";

    pub fn decode(data: &[u8]) -> Self {
        Self::try_decode(data).unwrap_or_else(|_| ContractRevert::Unknown(data.to_vec()))
    }

    fn try_decode(data: &[u8]) -> Result<Self, AbiError> {
        let (found, body) = split_selector(data)?;
        let reader = WordReader::new(body);
        if found == selector(Self::ALREADY_IN_ZONE) {
            Ok(ContractRevert::AlreadyInZone(Zone::try_from(reader.u8(0)?)?))
        } else if found == selector(Self::INVALID_ZONE) {
            Ok(ContractRevert::InvalidZone)
        } else if found == selector(Self::PLAYER_NOT_FOUND) {
            Ok(ContractRevert::PlayerNotFound(reader.address(0)?))
        } else if found == ERROR_STRING_SELECTOR {
            Ok(ContractRevert::Message(reader.string(0)?))
        } else if found == PANIC_SELECTOR {
            Ok(ContractRevert::Panic(reader.u64(0)?))
        } else {
            Err(AbiError::UnknownSelector(found))
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut writer = WordWriter::default();
        let selector = match self {
            ContractRevert::AlreadyInZone(zone) => {
                writer.uint(u64::from(zone.as_u8()));
                selector(Self::ALREADY_IN_ZONE)
            }
            ContractRevert::InvalidZone => selector(Self::INVALID_ZONE),
            ContractRevert::PlayerNotFound(address) => {
                writer.address(address);
                selector(Self::PLAYER_NOT_FOUND)
            }
            ContractRevert::Message(message) => {
                writer.string(message);
                ERROR_STRING_SELECTOR
            }
            ContractRevert::Panic(code) => {
                writer.uint(*code);
                PANIC_SELECTOR
            }
            ContractRevert::Unknown(raw) => return raw.clone(),
        };
        with_selector(selector, writer.finish())
    }
}

impl fmt::Display for ContractRevert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContractRevert::AlreadyInZone(zone) => write!(f, "AlreadyInZone({zone})"),
            ContractRevert::InvalidZone => f.write_str("InvalidZone()"),
            ContractRevert::PlayerNotFound(address) => write!(f, "PlayerNotFound({address})"),
            ContractRevert::Message(message) => f.write_str(message),
            ContractRevert::Panic(code) => write!(f, "Panic(0x{code:02x})"),
            ContractRevert::Unknown(raw) => write!(f, "unrecognized revert 0x{}", hex::encode(raw)),
        }
    }
}

// ---- Events --------------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShadowEvent {
    PlayerJoined {
        player: Address,
        zone: Zone,
    },
    PlayerZoneUpdated {
        player: Address,
        previous_zone: Zone,
        new_zone: Zone,
    },
}

impl ShadowEvent {
    const PLAYER_JOINED: &'static str = "PlayerJoined(address,uint8)";
    const PLAYER_ZONE_UPDATED: &'static str = "PlayerZoneUpdated(address,uint8,uint8)";

    /// Returns `Ok(None)` for logs that belong to some other event.
    pub fn decode(topics: &[Word], _data: &[u8]) -> Result<Option<Self>, AbiError> {
        let Some(signature) = topics.first() else {
            return Ok(None);
        };
        let indexed: Vec<u8> = topics[1..].iter().flatten().copied().collect();
        let reader = WordReader::new(&indexed);
        if *signature == keccak256(Self::PLAYER_JOINED) {
            Ok(Some(ShadowEvent::PlayerJoined {
                player: reader.address(0)?,
                zone: Zone::try_from(reader.u8(1)?)?,
            }))
        } else if *signature == keccak256(Self::PLAYER_ZONE_UPDATED) {
            Ok(Some(ShadowEvent::PlayerZoneUpdated {
                player: reader.address(0)?,
                previous_zone: Zone::try_from(reader.u8(1)?)?,
                new_zone: Zone::try_from(reader.u8(2)?)?,
            }))
        } else {
            Ok(None)
        }
    }

    pub fn topics(&self) -> Vec<Word> {
        match self {
            ShadowEvent::PlayerJoined { player, zone } => vec![
                keccak256(Self::PLAYER_JOINED),
                address_word(player),
                uint_word(u64::from(zone.as_u8())),
            ],
            ShadowEvent::PlayerZoneUpdated {
                player,
                previous_zone,
                new_zone,
            } => vec![
                keccak256(Self::PLAYER_ZONE_UPDATED),
                address_word(player),
                uint_word(u64::from(previous_zone.as_u8())),
                uint_word(u64::from(new_zone.as_u8())),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selectors_match_known_values() {
        // Well-known ERC-20 selector keeps the keccak wiring honest.
        assert_eq!(selector("transfer(address,uint256)"), [0xa9, 0x05, 0x9c, 0xbb]);
        assert_eq!(ShadowCall::JoinShadow.encode().len(), 4);
        assert_eq!(ShadowCall::GetPlayer(Address::zero()).encode().len(), 36);
    }

    #[test]
    fn calldata_decodes_to_the_same_call() {
        let alice = Address::new([0xaa; 20]);
        let call = ShadowCall::GetPlayer(alice);
        assert_eq!(ShadowCall::decode(&call.encode()), Ok(call));
        assert_eq!(
            ShadowCall::decode(&[0, 0, 0, 0]),
            Err(AbiError::UnknownSelector([0, 0, 0, 0]))
        );
    }

    #[test]
    fn roster_layout_uses_dynamic_offsets() {
        let roster = ZoneRoster::new(
            vec![Address::new([1; 20]), Address::new([2; 20])],
            vec![Handle::new([3; 32]), Handle::new([4; 32])],
        )
        .unwrap();
        let encoded = encode_roster(&roster);
        // head (2 words) + two arrays of (len + 2 items)
        assert_eq!(encoded.len(), 32 * 8);
        assert_eq!(encoded[31], 0x40);
        assert_eq!(encoded[63], 0xa0);
        assert_eq!(decode_roster(&encoded), Ok(roster));
    }

    #[test]
    fn empty_roster_decodes() {
        let encoded = encode_roster(&ZoneRoster::empty());
        assert_eq!(decode_roster(&encoded), Ok(ZoneRoster::empty()));
    }

    #[test]
    fn player_decode_rejects_bad_bool_and_zone() {
        let mut encoded = encode_player(&PlayerSnapshot {
            exists: true,
            zone: Zone::Shadow,
            health: Handle::new([9; 32]),
            publicly_decryptable: false,
        });
        assert_eq!(decode_player(&encoded).unwrap().zone, Zone::Shadow);

        encoded[63] = 7;
        assert_eq!(decode_player(&encoded), Err(AbiError::Zone(UnknownZone(7))));

        encoded[63] = 1;
        encoded[31] = 2;
        assert_eq!(decode_player(&encoded), Err(AbiError::InvalidBool { index: 0 }));
    }

    #[test]
    fn truncated_payload_is_reported() {
        assert!(matches!(
            decode_player(&[0u8; 40]),
            Err(AbiError::Truncated { .. })
        ));
    }

    #[test]
    fn already_in_zone_revert_renders_verbatim() {
        let revert = ContractRevert::AlreadyInZone(Zone::Shadow);
        let decoded = ContractRevert::decode(&revert.encode());
        assert_eq!(decoded, revert);
        assert_eq!(decoded.to_string(), "AlreadyInZone(Shadow)");
    }

    #[test]
    fn error_string_revert_decodes() {
        let revert = ContractRevert::Message("not allowed".into());
        assert_eq!(ContractRevert::decode(&revert.encode()), revert);
    }

    #[test]
    fn unrelated_log_is_ignored() {
        assert_eq!(ShadowEvent::decode(&[[0u8; 32]], &[]), Ok(None));
        let event = ShadowEvent::PlayerZoneUpdated {
            player: Address::new([5; 20]),
            previous_zone: Zone::Shadow,
            new_zone: Zone::Public,
        };
        assert_eq!(ShadowEvent::decode(&event.topics(), &[]), Ok(Some(event)));
    }
}
