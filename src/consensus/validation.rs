// Block validation

use crate::consensus::pow::ProofOfWork;
use crate::core::{Block, Transaction};
use thiserror::Error;

/// Validation error types
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Block hash doesn't meet PoW target
    #[error("Invalid proof of work")]
    InvalidProofOfWork,
    /// Stored hash differs from the digest of the block contents
    #[error("Block hash does not match its contents")]
    HashMismatch,
    /// Block has no transactions
    #[error("Block has no transactions")]
    NoTransactions,
    /// More than one coinbase transaction
    #[error("Multiple coinbase transactions")]
    MultipleCoinbase,
    /// Coinbase mints something other than the block reward
    #[error("Coinbase pays {actual}, reward is {expected}")]
    InvalidCoinbaseValue { expected: u64, actual: u64 },
    /// Transaction has no inputs or outputs
    #[error("Empty transaction")]
    EmptyTransaction,
    /// Output values sum past u64::MAX
    #[error("Output values overflow")]
    ValueOverflow,
}

/// Context-free block checks; signature and spend checks need the ledger
#[derive(Debug, Clone, Copy)]
pub struct BlockValidator {
    pow: ProofOfWork,
    block_reward: u64,
}

impl BlockValidator {
    pub fn new(pow: ProofOfWork, block_reward: u64) -> Self {
        Self { pow, block_reward }
    }

    /// Hash and proof-of-work only
    pub fn validate_header(&self, block: &Block) -> Result<(), ValidationError> {
        if block.compute_hash() != block.hash {
            return Err(ValidationError::HashMismatch);
        }
        if !self.pow.validate(block) {
            return Err(ValidationError::InvalidProofOfWork);
        }
        Ok(())
    }

    /// Structure of the transaction list
    pub fn validate_body(&self, block: &Block) -> Result<(), ValidationError> {
        self.validate_transactions(&block.transactions)
    }

    /// Checks that need no mining, so a candidate list is rejected up front
    pub fn validate_transactions(&self, transactions: &[Transaction]) -> Result<(), ValidationError> {
        if transactions.is_empty() {
            return Err(ValidationError::NoTransactions);
        }

        if transactions.iter().filter(|tx| tx.is_coinbase()).count() > 1 {
            return Err(ValidationError::MultipleCoinbase);
        }

        for tx in transactions {
            if tx.inputs.is_empty() || tx.outputs.is_empty() {
                return Err(ValidationError::EmptyTransaction);
            }

            let actual = tx.total_output_value().ok_or(ValidationError::ValueOverflow)?;
            if tx.is_coinbase() && actual != self.block_reward {
                return Err(ValidationError::InvalidCoinbaseValue {
                    expected: self.block_reward,
                    actual,
                });
            }
        }

        Ok(())
    }

    /// Validate a complete block
    pub fn validate_block(&self, block: &Block) -> Result<(), ValidationError> {
        self.validate_body(block)?;
        self.validate_header(block)
    }
}
