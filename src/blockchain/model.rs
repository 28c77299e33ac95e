use log::{info, warn};

use super::block::{Block, BlockHeader, Payload, build_candidate_block};
use super::error::{ChainError, ErrorKind};
use super::miner::meets_difficulty;
use super::verify;
use super::{DEFAULT_DIFFICULTY, HEADER_VERSION};

/// In-memory, append-only blockchain with Proof-of-Work.
///
/// Owns every block it holds. `append` is the only way the block list ever
/// changes; nothing can be edited, reordered or removed.
#[derive(Debug, Clone)]
pub struct Blockchain {
    chain: Vec<Block>,
    difficulty: u32,
}

impl Blockchain {
    /// Chain holding only the canonical genesis block.
    pub fn bootstrap() -> Self {
        Self {
            chain: vec![Block::genesis()],
            difficulty: DEFAULT_DIFFICULTY,
        }
    }

    /// Bootstrapped chain targeting `difficulty` for new candidates.
    pub fn new(difficulty: u32) -> Self {
        let mut chain = Self::bootstrap();
        chain.set_difficulty(difficulty);
        chain
    }

    /// Return the last block in the chain.
    pub fn last_block(&self) -> &Block {
        self.chain
            .last()
            .expect("Blockchain should always have at least the genesis block")
    }

    pub fn blocks(&self) -> &[Block] {
        &self.chain
    }

    pub fn get(&self, index: usize) -> Option<&Block> {
        self.chain.get(index)
    }

    pub fn len(&self) -> usize {
        self.chain.len()
    }

    pub fn difficulty(&self) -> u32 {
        self.difficulty
    }

    pub fn set_difficulty(&mut self, difficulty: u32) {
        // NOTE: Changing difficulty affects future blocks only.
        self.difficulty = difficulty;
    }

    /// Unmined header extending the current tail at the chain's difficulty.
    pub fn candidate(&self, payload: &Payload) -> BlockHeader {
        build_candidate_block(self.last_block(), payload, self.difficulty)
    }

    /// Accept a mined block as the new tail.
    ///
    /// Checks, in order: linkage to the tail, self-consistency (including a
    /// current header version), and the block's own declared difficulty.
    /// Errors carry the position the block would have taken. Either the block
    /// is appended whole or the chain is left untouched.
    pub fn append(&mut self, block: Block) -> Result<(), ChainError> {
        let position = self.chain.len();
        let tail = self.last_block();

        let expected_index = tail.header.index.checked_add(1);
        if block.header.previous_hash != tail.hash || Some(block.header.index) != expected_index {
            warn!(
                "rejecting block #{}: previous_hash={} does not follow tail {}",
                block.header.index, block.header.previous_hash, tail.hash
            );
            return Err(ChainError::new(position, ErrorKind::LinkMismatch));
        }
        if block.header.version != HEADER_VERSION {
            warn!(
                "rejecting block #{}: header version {} cannot extend the chain",
                block.header.index, block.header.version
            );
            return Err(ChainError::new(position, ErrorKind::SelfInconsistent));
        }
        if !block.verify_self() {
            warn!("rejecting block #{}: not self-consistent", block.header.index);
            return Err(ChainError::new(position, ErrorKind::SelfInconsistent));
        }
        if !meets_difficulty(&block.hash, block.header.difficulty) {
            warn!(
                "rejecting block #{}: hash {} misses difficulty {}",
                block.header.index, block.hash, block.header.difficulty
            );
            return Err(ChainError::new(position, ErrorKind::ProofOfWorkMissing));
        }

        self.chain
            .try_reserve(1)
            .map_err(|_| ChainError::new(position, ErrorKind::ResourceExhausted))?;
        info!(
            "appended block #{} hash={} txs={}",
            block.header.index,
            block.hash,
            block.payload.transactions().len()
        );
        self.chain.push(block);
        Ok(())
    }

    /// Validate the entire chain: hashes, linkage and PoW.
    pub fn verify(&self) -> Result<(), ChainError> {
        verify::verify_chain(self)
    }
}

#[cfg(test)]
impl Blockchain {
    /// Build a candidate for `payload`, mine it and append it, all while
    /// holding `&mut self`.
    pub fn mine_block(
        &mut self,
        payload: Payload,
        max_attempts: u64,
        cancel: &super::CancelFlag,
    ) -> Result<&Block, super::LedgerError> {
        let candidate = self.candidate(&payload);
        let (header, hash) = super::miner::mine(candidate, self.difficulty, max_attempts, cancel)?;
        self.append(Block::seal(header, payload, hash))?;
        Ok(self.last_block())
    }
}
