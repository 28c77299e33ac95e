use serde::Serialize;
use thiserror::Error;

/// Why a block was refused by the chain or by the verifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Error)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    #[error("previous hash or index does not follow the preceding block")]
    LinkMismatch,

    #[error("stored hash or merkle root does not match the recomputed value")]
    SelfInconsistent,

    #[error("hash does not satisfy the declared difficulty")]
    ProofOfWorkMissing,

    #[error("mining attempt budget exhausted")]
    Exhausted,

    #[error("cryptographic primitive unavailable")]
    PrimitiveUnavailable,

    #[error("resource exhausted")]
    ResourceExhausted,
}

/// A failed check pinned to the zero-based chain position where it happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("block at position {position}: {kind}")]
pub struct ChainError {
    pub position: usize,
    pub kind: ErrorKind,
}

impl ChainError {
    pub fn new(position: usize, kind: ErrorKind) -> Self {
        Self { position, kind }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MiningError {
    #[error("no nonce met difficulty {difficulty} within {attempts} attempts")]
    Exhausted { attempts: u64, difficulty: u32 },

    #[error("mining cancelled after {attempts} attempts")]
    Cancelled { attempts: u64 },

    #[error("legacy headers are anchors only and cannot be mined")]
    LegacyHeader,
}

impl MiningError {
    /// Nonces actually hashed before the search gave up.
    pub fn attempts(&self) -> u64 {
        match self {
            MiningError::Exhausted { attempts, .. } | MiningError::Cancelled { attempts } => {
                *attempts
            }
            MiningError::LegacyHeader => 0,
        }
    }
}

/// Failure of the build + mine + append round trip.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("chain rejected block: {0}")]
    Chain(#[from] ChainError),

    #[error("mining failed: {0}")]
    Mining(#[from] MiningError),
}

impl LedgerError {
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            LedgerError::Chain(e) => Some(e.kind),
            LedgerError::Mining(MiningError::Exhausted { .. }) => Some(ErrorKind::Exhausted),
            LedgerError::Mining(_) => None,
        }
    }
}
