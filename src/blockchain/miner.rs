//! Proof-of-work nonce search.
//!
//! The difficulty predicate works on whole bytes: a hash satisfies difficulty
//! `d` when its first `d / 2` bytes are zero. Searches are bounded by an
//! attempt budget and poll a [`CancelFlag`] before every nonce.

use log::{debug, info};
use rayon::prelude::*;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use super::block::BlockHeader;
use super::error::MiningError;
use super::hash::{self, HASH_LEN, Hash256};

/// Size of the nonce space; budgets above this are clamped.
pub const NONCE_SPACE: u64 = u32::MAX as u64 + 1;

/// Shared stop signal for running searches, optionally with a deadline.
///
/// Clones share the same flag, so cancelling any clone stops every search
/// holding one.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag {
    flag: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Same shared flag, but also trips once `deadline` has passed.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed) || self.deadline.is_some_and(|d| Instant::now() >= d)
    }
}

/// True when the leading `difficulty / 2` bytes of `hash` are zero.
pub fn meets_difficulty(hash: &Hash256, difficulty: u32) -> bool {
    let zeros = (difficulty / 2) as usize;
    zeros <= HASH_LEN && hash.0[..zeros].iter().all(|&b| b == 0)
}

fn attempt_ceiling(max_attempts: u64) -> u64 {
    max_attempts.min(NONCE_SPACE)
}

/// Try nonces `start..end` in order until one meets `difficulty`.
fn search_range(
    mut header: BlockHeader,
    difficulty: u32,
    start: u64,
    end: u64,
    stop: impl Fn() -> bool,
) -> Result<(BlockHeader, Hash256), MiningError> {
    header.difficulty = difficulty;
    for nonce in start..end {
        if stop() {
            return Err(MiningError::Cancelled {
                attempts: nonce - start,
            });
        }
        // end <= NONCE_SPACE, so the nonce always fits
        header.nonce = nonce as u32;
        let digest = hash::double_hash(&hash::serialize_header(&header));
        if meets_difficulty(&digest, difficulty) {
            return Ok((header, digest));
        }
    }
    Err(MiningError::Exhausted {
        attempts: end.saturating_sub(start),
        difficulty,
    })
}

/// Search nonces from 0 upwards for a header whose digest meets `difficulty`.
///
/// `difficulty` is written into the returned header. Gives up with
/// `Exhausted` after `max_attempts` nonces (never more than the nonce space)
/// and with `Cancelled` as soon as `cancel` trips.
pub fn mine(
    candidate: BlockHeader,
    difficulty: u32,
    max_attempts: u64,
    cancel: &CancelFlag,
) -> Result<(BlockHeader, Hash256), MiningError> {
    if candidate.is_legacy() {
        return Err(MiningError::LegacyHeader);
    }
    let limit = attempt_ceiling(max_attempts);
    debug!(
        "MINER - searching block #{} diff={} budget={}",
        candidate.index, difficulty, limit
    );
    let result = search_range(candidate, difficulty, 0, limit, || cancel.is_cancelled());
    if let Ok((header, digest)) = &result {
        info!(
            "MINER - sealed block #{} (hash={}, nonce={})",
            header.index, digest, header.nonce
        );
    }
    result
}

/// Like [`mine`], but splits the budget into `workers` disjoint contiguous
/// nonce ranges searched in parallel.
///
/// The first hit stops the other workers. When several workers succeed the
/// lowest nonce wins. Failed searches report the sum of their attempts.
pub fn mine_parallel(
    candidate: BlockHeader,
    difficulty: u32,
    max_attempts: u64,
    workers: usize,
    cancel: &CancelFlag,
) -> Result<(BlockHeader, Hash256), MiningError> {
    if workers <= 1 {
        return mine(candidate, difficulty, max_attempts, cancel);
    }
    if candidate.is_legacy() {
        return Err(MiningError::LegacyHeader);
    }

    let limit = attempt_ceiling(max_attempts);
    let workers = workers as u64;
    let chunk = limit.div_ceil(workers);
    let found = AtomicBool::new(false);
    debug!(
        "MINER - searching block #{} diff={} budget={} workers={}",
        candidate.index, difficulty, limit, workers
    );

    let results: Vec<Result<(BlockHeader, Hash256), MiningError>> = (0..workers)
        .into_par_iter()
        .map(|worker| {
            let start = (worker * chunk).min(limit);
            let end = (start + chunk).min(limit);
            let result = search_range(candidate, difficulty, start, end, || {
                found.load(Ordering::Relaxed) || cancel.is_cancelled()
            });
            if result.is_ok() {
                found.store(true, Ordering::SeqCst);
            }
            result
        })
        .collect();

    let mut attempts = 0u64;
    let mut best: Option<(BlockHeader, Hash256)> = None;
    for result in results {
        match result {
            Ok(hit) => {
                if best.is_none_or(|(header, _)| hit.0.nonce < header.nonce) {
                    best = Some(hit);
                }
            }
            Err(e) => attempts += e.attempts(),
        }
    }

    match best {
        Some((header, digest)) => {
            info!(
                "MINER - sealed block #{} (hash={}, nonce={})",
                header.index, digest, header.nonce
            );
            Ok((header, digest))
        }
        None if cancel.is_cancelled() => Err(MiningError::Cancelled { attempts }),
        None => Err(MiningError::Exhausted {
            attempts,
            difficulty,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::block::{Block, Payload, build_candidate_block_at};
    use std::time::Duration;

    /// Requires 33 zero bytes, which no 32-byte digest can have.
    const UNREACHABLE: u32 = 66;

    fn candidate() -> BlockHeader {
        let payload = Payload::Raw(b"Third Transaction Data".to_vec());
        build_candidate_block_at(&Block::genesis(), &payload, 0, 1_700_000_000)
    }

    #[test]
    fn predicate_counts_leading_zero_bytes() {
        let mut h = Hash256([0xff; 32]);
        assert!(meets_difficulty(&h, 0));
        assert!(meets_difficulty(&h, 1));
        assert!(!meets_difficulty(&h, 2));
        h.0[0] = 0;
        assert!(meets_difficulty(&h, 2));
        assert!(meets_difficulty(&h, 3));
        assert!(!meets_difficulty(&h, 4));
        assert!(meets_difficulty(&Hash256::zero(), 64));
        assert!(!meets_difficulty(&Hash256::zero(), UNREACHABLE));
    }

    #[test]
    fn difficulty_zero_succeeds_at_nonce_zero() {
        let (header, digest) = mine(candidate(), 0, 1, &CancelFlag::new()).unwrap();
        assert_eq!(header.nonce, 0);
        assert_eq!(digest, hash::double_hash(&hash::serialize_header(&header)));
    }

    #[test]
    fn unreachable_difficulty_exhausts_after_exact_budget() {
        let err = mine(candidate(), UNREACHABLE, 100, &CancelFlag::new()).unwrap_err();
        assert_eq!(
            err,
            MiningError::Exhausted {
                attempts: 100,
                difficulty: UNREACHABLE
            }
        );
    }

    #[test]
    fn mining_is_deterministic() {
        let a = mine(candidate(), 2, 1_000_000, &CancelFlag::new()).unwrap();
        let b = mine(candidate(), 2, 1_000_000, &CancelFlag::new()).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.0.difficulty, 2);
        assert!(meets_difficulty(&a.1, 2));
    }

    #[test]
    fn cancelled_flag_stops_before_first_attempt() {
        let cancel = CancelFlag::new();
        cancel.cancel();
        let err = mine(candidate(), UNREACHABLE, 1_000, &cancel).unwrap_err();
        assert_eq!(err, MiningError::Cancelled { attempts: 0 });
    }

    #[test]
    fn clones_share_the_flag() {
        let a = CancelFlag::new();
        let b = a.clone().with_deadline(Instant::now() + Duration::from_secs(3600));
        assert!(!b.is_cancelled());
        a.cancel();
        assert!(b.is_cancelled());
    }

    #[test]
    fn past_deadline_cancels() {
        let cancel = CancelFlag::new().with_deadline(Instant::now());
        let err = mine(candidate(), UNREACHABLE, 1_000, &cancel).unwrap_err();
        assert!(matches!(err, MiningError::Cancelled { .. }));
    }

    #[test]
    fn legacy_headers_are_not_mined() {
        let genesis = Block::genesis();
        let cancel = CancelFlag::new();
        assert_eq!(
            mine(genesis.header, 0, 10, &cancel),
            Err(MiningError::LegacyHeader)
        );
        assert_eq!(
            mine_parallel(genesis.header, 0, 10, 4, &cancel),
            Err(MiningError::LegacyHeader)
        );
    }

    #[test]
    fn parallel_search_finds_a_valid_nonce() {
        let (header, digest) = mine_parallel(candidate(), 2, 1_000_000, 4, &CancelFlag::new()).unwrap();
        assert!(meets_difficulty(&digest, 2));
        assert_eq!(digest, hash::double_hash(&hash::serialize_header(&header)));
    }

    #[test]
    fn parallel_search_exhausts_whole_budget() {
        let err = mine_parallel(candidate(), UNREACHABLE, 103, 4, &CancelFlag::new()).unwrap_err();
        assert_eq!(
            err,
            MiningError::Exhausted {
                attempts: 103,
                difficulty: UNREACHABLE
            }
        );
    }

    #[test]
    fn more_workers_than_budget_still_terminates() {
        let err = mine_parallel(candidate(), UNREACHABLE, 3, 8, &CancelFlag::new()).unwrap_err();
        assert_eq!(err.attempts(), 3);
    }

    #[test]
    fn budget_is_clamped_to_nonce_space() {
        assert_eq!(attempt_ceiling(u64::MAX), NONCE_SPACE);
        assert_eq!(attempt_ceiling(10), 10);
    }
}
