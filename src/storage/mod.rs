// Persistent ledger: sled-backed block store and chain-replay queries

mod blockchain;
mod blockchain_db;
mod utxo;

pub use blockchain::{Blockchain, BlockchainIterator};
pub use blockchain_db::BlockchainDB;
pub use utxo::OutPoint;

use crate::consensus::{MiningError, ValidationError};
use crate::core::{Hash256, SerializeError, TransactionError};
use crate::wallet::WalletError;
use thiserror::Error;

/// Errors that can occur during ledger operations
#[derive(Debug, Error)]
pub enum ChainError {
    #[error("Store error: {0}")]
    Store(#[from] sled::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] SerializeError),

    #[error("Blockchain already exists")]
    ChainExists,

    #[error("No existing blockchain found, create one first")]
    NoChain,

    #[error("Stored tip is not a 32-byte hash")]
    CorruptTip,

    #[error("Block {0} is referenced but not stored")]
    BlockMissing(Hash256),

    #[error("Transaction {0} not found")]
    TransactionNotFound(Hash256),

    #[error("Insufficient funds: required {required}, available {available}")]
    InsufficientFunds { required: u64, available: u64 },

    #[error("Invalid amount: {0}")]
    InvalidAmount(u64),

    #[error("Invalid transaction {0}")]
    InvalidTransaction(Hash256),

    #[error("Output {txid}:{index} is already spent")]
    DoubleSpend { txid: Hash256, index: u32 },

    #[error("Transaction {txid} spends {inputs} but creates {outputs}")]
    ValueNotConserved { txid: Hash256, inputs: u64, outputs: u64 },

    #[error("Invalid block: {0}")]
    Validation(#[from] ValidationError),

    #[error("Transaction error: {0}")]
    Transaction(#[from] TransactionError),

    #[error("Wallet error: {0}")]
    Wallet(#[from] WalletError),

    #[error("Mining error: {0}")]
    Mining(#[from] MiningError),
}
