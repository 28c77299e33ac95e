//! Digest engine: fixed-layout header serialization, SHA-256 and the
//! payload commitment stored in `merkle_root`.
//!
//! Every integer is written little-endian with no padding, so two nodes that
//! hash the same header always hash the same bytes.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

use super::block::{BlockHeader, Payload};
use super::{HEADER_VERSION, HEADER_VERSION_LEGACY};
use crate::transaction::Transaction;

pub const HASH_LEN: usize = 32;

/// Size of the current (`HEADER_VERSION`) header encoding.
pub const HEADER_LEN: usize = 4 + 4 + HASH_LEN + HASH_LEN + 8 + 4 + 4;

/// Size of the legacy block info that precedes the payload in a legacy digest.
pub const LEGACY_INFO_LEN: usize = 4 + 4 + 8 + 8 + HASH_LEN;

/// 32-byte SHA-256 digest, passed around by value.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct Hash256(pub [u8; HASH_LEN]);

impl Hash256 {
    pub const fn zero() -> Self {
        Hash256([0u8; HASH_LEN])
    }

    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|&b| b == 0)
    }

    pub fn as_bytes(&self) -> &[u8; HASH_LEN] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let mut out = [0u8; HASH_LEN];
        hex::decode_to_slice(s, &mut out)?;
        Ok(Hash256(out))
    }
}

impl fmt::Display for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash256({})", self.to_hex())
    }
}

impl FromStr for Hash256 {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Hash256::from_hex(s)
    }
}

impl Serialize for Hash256 {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Hash256 {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Hash256::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Single SHA-256.
pub fn sha256(bytes: &[u8]) -> Hash256 {
    Hash256(Sha256::digest(bytes).into())
}

/// SHA-256 applied to the SHA-256 of `bytes`.
pub fn double_hash(bytes: &[u8]) -> Hash256 {
    let first = Sha256::digest(bytes);
    Hash256(Sha256::digest(first).into())
}

/// Current header layout:
/// `version | index | previous_hash | merkle_root | timestamp | difficulty | nonce`.
pub fn serialize_header(header: &BlockHeader) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_LEN);
    out.extend_from_slice(&header.version.to_le_bytes());
    out.extend_from_slice(&header.index.to_le_bytes());
    out.extend_from_slice(header.previous_hash.as_bytes());
    out.extend_from_slice(header.merkle_root.as_bytes());
    out.extend_from_slice(&header.timestamp.to_le_bytes());
    out.extend_from_slice(&header.difficulty.to_le_bytes());
    out.extend_from_slice(&header.nonce.to_le_bytes());
    debug_assert_eq!(out.len(), HEADER_LEN);
    out
}

/// Legacy layout: `index | difficulty | timestamp | nonce (u64) | previous_hash`.
///
/// Neither `version` nor `merkle_root` appear here; a legacy digest commits
/// to the payload by appending it after these bytes.
pub fn serialize_legacy_info(header: &BlockHeader) -> Vec<u8> {
    let mut out = Vec::with_capacity(LEGACY_INFO_LEN);
    out.extend_from_slice(&header.index.to_le_bytes());
    out.extend_from_slice(&header.difficulty.to_le_bytes());
    out.extend_from_slice(&header.timestamp.to_le_bytes());
    out.extend_from_slice(&u64::from(header.nonce).to_le_bytes());
    out.extend_from_slice(header.previous_hash.as_bytes());
    debug_assert_eq!(out.len(), LEGACY_INFO_LEN);
    out
}

/// Commitment to an ordered transaction list.
///
/// Not a tree: the concatenated encodings are double-hashed as one unit.
/// Switching to a binary tree would change every existing root.
pub fn merkle_root(transactions: &[Transaction]) -> Hash256 {
    if transactions.is_empty() {
        return Hash256::zero();
    }
    let mut bytes = Vec::with_capacity(transactions.len() * crate::transaction::TX_ENCODED_LEN);
    for tx in transactions {
        bytes.extend_from_slice(&tx.to_bytes());
    }
    double_hash(&bytes)
}

/// Commitment to any payload; an empty payload commits to the zero hash.
pub fn payload_root(payload: &Payload) -> Hash256 {
    match payload {
        Payload::Transactions(txs) => merkle_root(txs),
        Payload::Raw(data) if data.is_empty() => Hash256::zero(),
        Payload::Raw(data) => double_hash(data),
    }
}

/// Single SHA-256 over the legacy block info followed by the payload bytes.
pub fn legacy_digest(header: &BlockHeader, payload: &Payload) -> Hash256 {
    let mut bytes = serialize_legacy_info(header);
    bytes.extend_from_slice(&payload.to_bytes());
    sha256(&bytes)
}

/// The hash a block stores, chosen by header version. `None` for a version
/// this node does not know how to hash.
pub fn block_digest(header: &BlockHeader, payload: &Payload) -> Option<Hash256> {
    match header.version {
        HEADER_VERSION_LEGACY => Some(legacy_digest(header, payload)),
        HEADER_VERSION => Some(double_hash(&serialize_header(header))),
        _ => None,
    }
}
