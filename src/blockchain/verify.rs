//! Whole-chain verification.
//!
//! Each block is checked in the same order: self-consistency, link to its
//! predecessor, proof-of-work. The first failing position is reported.
//! Only position 0 may carry a legacy header.

use rayon::prelude::*;

use super::block::Block;
use super::error::{ChainError, ErrorKind};
use super::miner::meets_difficulty;
use super::model::Blockchain;
use super::{HEADER_VERSION, HEADER_VERSION_LEGACY};

/// Chains at least this long are checked on the rayon pool.
pub const PARALLEL_VERIFY_MIN: usize = 64;

pub fn verify_chain(chain: &Blockchain) -> Result<(), ChainError> {
    if chain.len() >= PARALLEL_VERIFY_MIN {
        verify_blocks_parallel(chain.blocks())
    } else {
        verify_blocks(chain.blocks())
    }
}

/// Walk `blocks` from genesis to tail. An empty slice has no anchor and
/// fails at position 0.
pub fn verify_blocks(blocks: &[Block]) -> Result<(), ChainError> {
    if blocks.is_empty() {
        return Err(ChainError::new(0, ErrorKind::LinkMismatch));
    }
    (0..blocks.len()).try_for_each(|position| check_block(blocks, position))
}

/// Same result as [`verify_blocks`], with blocks checked on the rayon pool.
pub fn verify_blocks_parallel(blocks: &[Block]) -> Result<(), ChainError> {
    if blocks.is_empty() {
        return Err(ChainError::new(0, ErrorKind::LinkMismatch));
    }
    match (0..blocks.len())
        .into_par_iter()
        .filter_map(|position| check_block(blocks, position).err())
        .min_by_key(|e| e.position)
    {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

fn check_block(blocks: &[Block], position: usize) -> Result<(), ChainError> {
    let block = &blocks[position];
    let fail = |kind| Err(ChainError::new(position, kind));

    let expected_version = if position == 0 {
        HEADER_VERSION_LEGACY
    } else {
        HEADER_VERSION
    };
    if block.header.version != expected_version || !block.verify_self() {
        return fail(ErrorKind::SelfInconsistent);
    }

    let linked = match position.checked_sub(1).map(|p| &blocks[p]) {
        None => block.header.index == 0 && block.header.previous_hash.is_zero(),
        Some(prev) => {
            block.header.previous_hash == prev.hash
                && Some(block.header.index) == prev.header.index.checked_add(1)
        }
    };
    if !linked {
        return fail(ErrorKind::LinkMismatch);
    }

    if !meets_difficulty(&block.hash, block.header.difficulty) {
        return fail(ErrorKind::ProofOfWorkMissing);
    }
    Ok(())
}
