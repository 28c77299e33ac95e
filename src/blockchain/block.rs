use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;

use super::hash::{self, Hash256};
use super::{
    GENESIS_DATA, GENESIS_DIFFICULTY, GENESIS_TIMESTAMP, HEADER_VERSION, HEADER_VERSION_LEGACY,
};
use crate::transaction::Transaction;

/// Fixed-size block header. `merkle_root` is derived from the payload and
/// `nonce` is only ever written by the miner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub version: u32,
    pub index: u32,
    pub previous_hash: Hash256,
    pub merkle_root: Hash256,
    pub timestamp: u64, // Unix timestamp (UTC)
    pub difficulty: u32,
    pub nonce: u32,
}

impl BlockHeader {
    pub fn is_legacy(&self) -> bool {
        self.version == HEADER_VERSION_LEGACY
    }
}

/// What a block carries: either an opaque buffer or a list of transactions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Payload {
    Raw(#[serde(with = "hex")] Vec<u8>),
    Transactions(Vec<Transaction>),
}

impl Payload {
    /// Bytes committed to by the block: the raw buffer as-is, or every
    /// transaction's fixed encoding back to back.
    pub fn to_bytes(&self) -> Cow<'_, [u8]> {
        match self {
            Payload::Raw(data) => Cow::Borrowed(data.as_slice()),
            Payload::Transactions(txs) => {
                Cow::Owned(txs.iter().flat_map(|tx| tx.to_bytes()).collect())
            }
        }
    }

    pub fn transactions(&self) -> &[Transaction] {
        match self {
            Payload::Transactions(txs) => txs,
            Payload::Raw(_) => &[],
        }
    }
}

/// A single block: header, payload and the hash it was sealed with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    pub payload: Payload,
    pub hash: Hash256, // Cached hash of the block
}

impl Block {
    /// The canonical genesis block every chain starts from.
    pub fn genesis() -> Self {
        build_genesis_block(GENESIS_TIMESTAMP, Payload::Raw(GENESIS_DATA.to_vec()))
    }

    /// Wrap a mined header with its payload. Nothing is checked here; the
    /// chain does that on `append`.
    pub fn seal(header: BlockHeader, payload: Payload, hash: Hash256) -> Self {
        Self {
            header,
            payload,
            hash,
        }
    }

    /// Recompute the digest from the current header and payload; `None` when
    /// the header version is unknown.
    pub fn compute_hash(&self) -> Option<Hash256> {
        hash::block_digest(&self.header, &self.payload)
    }

    /// True when both the stored hash and the merkle root recompute.
    /// Pure; says nothing about linkage or proof-of-work.
    pub fn verify_self(&self) -> bool {
        self.compute_hash() == Some(self.hash)
            && self.header.merkle_root == hash::payload_root(&self.payload)
    }
}

/// Build the block at position 0. Pure: the same inputs always give the same
/// block, which is what lets a fixed genesis anchor every chain.
pub fn build_genesis_block(timestamp: u64, payload: Payload) -> Block {
    let header = BlockHeader {
        version: HEADER_VERSION_LEGACY,
        index: 0,
        previous_hash: Hash256::zero(),
        merkle_root: hash::payload_root(&payload),
        timestamp,
        difficulty: GENESIS_DIFFICULTY,
        nonce: 0,
    };
    let hash = hash::legacy_digest(&header, &payload);
    Block {
        header,
        payload,
        hash,
    }
}

/// Unmined header extending `previous`, stamped with the current time.
/// It must go through the miner before the chain will take it.
pub fn build_candidate_block(previous: &Block, payload: &Payload, difficulty: u32) -> BlockHeader {
    let now = u64::try_from(Utc::now().timestamp()).unwrap_or(0);
    build_candidate_block_at(previous, payload, difficulty, now)
}

pub fn build_candidate_block_at(
    previous: &Block,
    payload: &Payload,
    difficulty: u32,
    timestamp: u64,
) -> BlockHeader {
    BlockHeader {
        version: HEADER_VERSION,
        index: previous.header.index.wrapping_add(1),
        previous_hash: previous.hash,
        merkle_root: hash::payload_root(payload),
        timestamp,
        difficulty,
        nonce: 0,
    }
}
