// Proof of Work implementation

use crate::core::{Block, Hash256};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Mining ran out of nonces before meeting the target
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MiningError {
    #[error("mining exhausted: no nonce up to {max_nonce} meets the target ({attempts} attempts)")]
    Exhausted { attempts: u64, max_nonce: u64 },
}

/// Difficulty target `T = 2^(256 - bits)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Target {
    bits: u32,
}

impl Target {
    /// Target for `bits` of difficulty, capped at 256
    pub fn from_difficulty(bits: u32) -> Self {
        Self { bits: bits.min(256) }
    }

    pub fn difficulty_bits(&self) -> u32 {
        self.bits
    }

    /// True when the hash, read as a big-endian integer, is below the target
    ///
    /// `H < 2^(256 - bits)` holds exactly when the top `bits` bits of H are zero.
    pub fn is_met_by(&self, hash: &Hash256) -> bool {
        leading_zero_bits(hash) >= self.bits
    }

    /// Big-endian target value; `None` for zero difficulty (2^256 does not fit)
    pub fn to_hash256(&self) -> Option<Hash256> {
        if self.bits == 0 {
            return None;
        }
        let position = (256 - self.bits) as usize;
        let mut target = [0u8; 32];
        target[31 - position / 8] = 1 << (position % 8);
        Some(Hash256::new(target))
    }
}

/// Number of leading zero bits of a big-endian hash
pub fn leading_zero_bits(hash: &Hash256) -> u32 {
    let mut zeros = 0;
    for byte in hash.as_bytes() {
        if *byte == 0 {
            zeros += 8;
        } else {
            zeros += byte.leading_zeros();
            break;
        }
    }
    zeros
}

/// Nonce search over a block header digest
#[derive(Debug, Clone, Copy)]
pub struct ProofOfWork {
    pub target: Target,
    /// Last nonce tried before giving up
    max_nonce: u64,
}

impl ProofOfWork {
    pub fn new(difficulty_bits: u32) -> Self {
        Self {
            target: Target::from_difficulty(difficulty_bits),
            max_nonce: u64::MAX,
        }
    }

    /// Bound the search; used to give callers a deadline
    pub fn with_max_nonce(mut self, max_nonce: u64) -> Self {
        self.max_nonce = max_nonce;
        self
    }

    pub fn max_nonce(&self) -> u64 {
        self.max_nonce
    }

    /// Find the first nonce, counting up from zero, whose digest meets the target
    pub fn run(&self, merkle_root: &Hash256, prev_hash: &Hash256) -> Result<MiningResult, MiningError> {
        let start_time = Instant::now();
        let mut attempts = 0u64;
        let mut nonce = 0u64;

        loop {
            let hash = Block::header_digest(merkle_root, prev_hash, nonce);
            attempts += 1;

            if self.target.is_met_by(&hash) {
                let result = MiningResult {
                    nonce,
                    hash,
                    attempts,
                    duration: start_time.elapsed(),
                };
                log::debug!(
                    "Found nonce {} after {} attempts ({:.1} KH/s)",
                    nonce,
                    attempts,
                    result.hash_rate() / 1000.0
                );
                return Ok(result);
            }

            if attempts % 100_000 == 0 {
                let elapsed = start_time.elapsed();
                log::debug!(
                    "Mining attempts: {} ({:.1} KH/s)",
                    attempts,
                    attempts as f64 / elapsed.as_secs_f64() / 1000.0
                );
            }

            if nonce >= self.max_nonce {
                return Err(MiningError::Exhausted {
                    attempts,
                    max_nonce: self.max_nonce,
                });
            }
            nonce += 1;
        }
    }

    /// Recompute the digest for the block's recorded nonce and check the target
    pub fn validate(&self, block: &Block) -> bool {
        self.target.is_met_by(&block.compute_hash())
    }
}

/// Outcome of a successful search
#[derive(Debug, Clone)]
pub struct MiningResult {
    pub nonce: u64,
    pub hash: Hash256,
    pub attempts: u64,
    pub duration: Duration,
}

impl MiningResult {
    /// Hashes per second
    pub fn hash_rate(&self) -> f64 {
        let secs = self.duration.as_secs_f64();
        if secs == 0.0 {
            return self.attempts as f64;
        }
        self.attempts as f64 / secs
    }
}
