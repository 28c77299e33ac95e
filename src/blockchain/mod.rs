pub mod block;
pub mod error;
pub mod hash;
pub mod miner;
pub mod model;
pub mod verify;

pub use block::{Block, BlockHeader, Payload};
pub use error::{ChainError, ErrorKind, LedgerError, MiningError};
pub use hash::Hash256;
pub use miner::CancelFlag;
pub use model::Blockchain;

/// Header version of the chain anchor: single SHA-256 over the legacy block
/// info followed by the payload.
pub const HEADER_VERSION_LEGACY: u32 = 0;

/// Header version of every mined block: double SHA-256 over the full header.
pub const HEADER_VERSION: u32 = 1;

/// Canonical genesis block, shared by every compatible chain.
pub const GENESIS_TIMESTAMP: u64 = 1_537_578_000;
pub const GENESIS_DATA: &[u8; 16] = b"Holberton School";
pub const GENESIS_DIFFICULTY: u32 = 0;
#[cfg(test)]
pub const GENESIS_HASH: [u8; 32] = [
    0xc5, 0x2c, 0x26, 0xc8, 0xb5, 0x46, 0x16, 0x39, 0x63, 0x5d, 0x8e, 0xdf, 0x2a, 0x97, 0xd4, 0x8d,
    0x0c, 0x8e, 0x00, 0x09, 0xc8, 0x17, 0xf2, 0xb1, 0xd3, 0xd7, 0xff, 0x2f, 0x04, 0x51, 0x58, 0x03,
];

/// Default Proof-of-Work difficulty (leading zero bytes = difficulty / 2).
pub const DEFAULT_DIFFICULTY: u32 = 4;

/// Difficulty ceiling accepted from config and the API (dev friendly).
pub const DIFF_MAX: u32 = 6;

/// Default nonce budget for one search.
pub const MAX_ATTEMPTS: u64 = 100_000_000;

/// Coinbase amount paid to the miner of a transaction block.
pub const BASE_REWARD: f64 = 50.0;

/// How many recent intervals `/stats/` averages over.
pub const STATS_WINDOW: usize = 10;
