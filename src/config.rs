// Chain parameters

use crate::consensus::{BlockValidator, ProofOfWork};

/// Value minted by each coinbase transaction
pub const BLOCK_REWARD: u64 = 100;

/// Leading zero bits required of a block hash
pub const DIFFICULTY_BITS: u32 = 12;

/// Coinbase memo of the first block
pub const GENESIS_MEMO: &str = "First block in the chain - Genesis";

/// Fixed parameters of one ledger; no retargeting or reward schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainConfig {
    pub difficulty_bits: u32,
    pub block_reward: u64,
    /// Highest nonce tried before mining reports exhaustion
    pub max_nonce: u64,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            difficulty_bits: DIFFICULTY_BITS,
            block_reward: BLOCK_REWARD,
            max_nonce: u64::MAX,
        }
    }
}

impl ChainConfig {
    pub fn with_difficulty(mut self, difficulty_bits: u32) -> Self {
        self.difficulty_bits = difficulty_bits;
        self
    }

    pub fn with_max_nonce(mut self, max_nonce: u64) -> Self {
        self.max_nonce = max_nonce;
        self
    }

    pub fn proof_of_work(&self) -> ProofOfWork {
        ProofOfWork::new(self.difficulty_bits).with_max_nonce(self.max_nonce)
    }

    pub fn validator(&self) -> BlockValidator {
        BlockValidator::new(self.proof_of_work(), self.block_reward)
    }
}
