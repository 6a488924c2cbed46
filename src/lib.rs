// Single-node proof-of-work ledger with UTXO accounting

pub mod cli;
pub mod config;
pub mod consensus;
pub mod core;
pub mod network;
pub mod storage;
pub mod wallet;

// Re-exports for convenience
pub use cli::{Cli, CliHandler, Commands};
pub use config::{ChainConfig, BLOCK_REWARD, DIFFICULTY_BITS};
pub use consensus::{BlockValidator, MiningError, ProofOfWork, Target, ValidationError};
pub use crate::core::{Block, Hash256, Transaction, TxInput, TxOutput};
pub use network::{Message, NodeContext};
pub use storage::{Blockchain, BlockchainDB, ChainError, OutPoint};
pub use wallet::{validate_address, Address, TransactionBuilder, Wallet, WalletError, Wallets};
